use axum::{Json, Router, routing::get};
use serde_json::{Value, json};

use crate::config::RessourcesRef;

mod admin;
mod blacklist;
mod entries;
mod feeds;
mod sync;

pub fn router() -> Router<RessourcesRef> {
	Router::new()
		.route("/health", get(health_handler))
		.nest("/api/v1", v1_router())
}

fn v1_router() -> Router<RessourcesRef> {
	Router::new()
		.nest("/feeds", feeds::router())
		.nest("/sync", sync::router())
		.nest("/admin", admin::router())
		.nest("/entries", entries::router())
		.nest("/blacklist", blacklist::router())
}

async fn health_handler() -> Json<Value> {
	Json(json!({ "ok": true }))
}
