use axum::{Json, Router, routing::post};
use serde::Deserialize;

use crate::{config::RessourcesRef, error::RouteResult, services::SourcesSummary};

pub fn router() -> Router<RessourcesRef> {
	Router::new().route("/feeds", post(sync_feeds_post_handler))
}

#[derive(Debug, Default, Deserialize)]
struct SyncRequest {
	#[serde(default)]
	delete_missing: bool,
}

async fn sync_feeds_post_handler(
	ressources: RessourcesRef,
	Json(body): Json<SyncRequest>,
) -> RouteResult<Json<SourcesSummary>> {
	Ok(Json(
		ressources.feed_service().sync_sources(body.delete_missing)?,
	))
}
