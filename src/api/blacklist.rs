use axum::{
	Json, Router,
	http::StatusCode,
	routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{blacklist::Blacklist, config::RessourcesRef, error::RouteResult};

pub fn router() -> Router<RessourcesRef> {
	Router::new()
		.route("/", get(blacklist_get_handler))
		.route(
			"/feeds",
			post(feeds_post_handler).delete(feeds_delete_handler),
		)
		.route(
			"/domains",
			post(domains_post_handler).delete(domains_delete_handler),
		)
}

#[derive(Debug, Deserialize)]
struct FeedRequest {
	url: String,
}

#[derive(Debug, Deserialize)]
struct DomainRequest {
	domain: String,
}

async fn blacklist_get_handler(ressources: RessourcesRef) -> RouteResult<Json<Blacklist>> {
	Ok(Json(ressources.feed_service().blacklist()?))
}

fn added_response(added: bool) -> (StatusCode, Json<Value>) {
	let status = if added { StatusCode::CREATED } else { StatusCode::OK };
	(status, Json(json!({ "added": added })))
}

async fn feeds_post_handler(
	ressources: RessourcesRef,
	Json(body): Json<FeedRequest>,
) -> RouteResult<(StatusCode, Json<Value>)> {
	let added = ressources.feed_service().ban_feed(&body.url)?;
	Ok(added_response(added))
}

async fn feeds_delete_handler(
	ressources: RessourcesRef,
	Json(body): Json<FeedRequest>,
) -> RouteResult<StatusCode> {
	ressources.feed_service().unban_feed(&body.url)?;
	Ok(StatusCode::NO_CONTENT)
}

async fn domains_post_handler(
	ressources: RessourcesRef,
	Json(body): Json<DomainRequest>,
) -> RouteResult<(StatusCode, Json<Value>)> {
	let added = ressources.feed_service().ban_domain(&body.domain)?;
	Ok(added_response(added))
}

async fn domains_delete_handler(
	ressources: RessourcesRef,
	Json(body): Json<DomainRequest>,
) -> RouteResult<StatusCode> {
	ressources.feed_service().unban_domain(&body.domain)?;
	Ok(StatusCode::NO_CONTENT)
}
