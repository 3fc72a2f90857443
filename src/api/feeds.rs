use axum::{
	Json, Router,
	extract::{Multipart, Path, Query},
	http::{StatusCode, header},
	response::IntoResponse,
	routing::{get, post},
};
use serde::Deserialize;

use crate::{
	config::RessourcesRef,
	database::models::Feed,
	error::{RouteError, RouteResult},
	reader::ReaderFeed,
	services::{FeedList, ImportSummary, MirrorFeedsSummary, ServiceError},
};

pub fn router() -> Router<RessourcesRef> {
	Router::new()
		.route("/", get(feeds_get_handler).post(feeds_post_handler))
		.route("/import-opml", post(import_post_handler))
		.route("/export-opml", get(export_get_handler))
		.route("/reader", get(reader_get_handler))
		.route("/mirror", post(mirror_post_handler))
		.route(
			"/{*url}",
			axum::routing::delete(feed_delete_handler).patch(feed_patch_handler),
		)
}

#[derive(Debug, Deserialize)]
struct FeedsGetQuery {
	enabled: Option<bool>,
}

async fn feeds_get_handler(
	ressources: RessourcesRef,
	Query(query): Query<FeedsGetQuery>,
) -> RouteResult<Json<FeedList>> {
	Ok(Json(ressources.feed_service().list_feeds(query.enabled)?))
}

#[derive(Debug, Deserialize)]
struct FeedsPostRequest {
	url: String,
	title: Option<String>,
	#[serde(default = "enabled_by_default")]
	enabled: bool,
}

const fn enabled_by_default() -> bool {
	true
}

async fn feeds_post_handler(
	ressources: RessourcesRef,
	Json(body): Json<FeedsPostRequest>,
) -> RouteResult<(StatusCode, Json<Feed>)> {
	let feed = ressources
		.feed_service()
		.add_feed(&body.url, body.title.as_deref(), body.enabled)?;
	Ok((StatusCode::CREATED, Json(feed)))
}

async fn feed_delete_handler(
	ressources: RessourcesRef,
	Path(url): Path<String>,
) -> RouteResult<StatusCode> {
	ressources.feed_service().remove_feed(&url)?;
	Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct FeedPatchRequest {
	enabled: bool,
}

async fn feed_patch_handler(
	ressources: RessourcesRef,
	Path(url): Path<String>,
	Json(body): Json<FeedPatchRequest>,
) -> RouteResult<Json<Feed>> {
	Ok(Json(ressources.feed_service().set_enabled(&url, body.enabled)?))
}

// Bulk-add feeds from an uploaded outline document
async fn import_post_handler(
	ressources: RessourcesRef,
	mut multipart: Multipart,
) -> RouteResult<Json<ImportSummary>> {
	let mut document = None;
	while let Some(field) = multipart
		.next_field()
		.await
		.map_err(|err| RouteError::User(format!("could not read multipart field: {err}")))?
	{
		let bytes = field
			.bytes()
			.await
			.map_err(|err| RouteError::User(format!("could not read uploaded file: {err}")))?;
		if !bytes.is_empty() {
			document = Some(bytes);
			break;
		}
	}

	let Some(document) = document else {
		return Err(RouteError::User("no file was uploaded".into()));
	};
	Ok(Json(ressources.feed_service().import_opml(&document)?))
}

#[derive(Debug, Deserialize)]
struct ExportQuery {
	#[serde(default)]
	download: bool,
}

async fn export_get_handler(
	ressources: RessourcesRef,
	Query(query): Query<ExportQuery>,
) -> RouteResult<impl IntoResponse> {
	let document = ressources.feed_service().export_opml()?;

	let disposition = if query.download {
		"attachment; filename=\"feeds.opml\""
	} else {
		"inline"
	};
	Ok((
		[
			(header::CONTENT_TYPE, "application/xml; charset=utf-8"),
			(header::CONTENT_DISPOSITION, disposition),
		],
		document,
	))
}

async fn reader_get_handler(ressources: RessourcesRef) -> RouteResult<Json<Vec<ReaderFeed>>> {
	let feeds = ressources.reader.feeds().map_err(ServiceError::from)?;
	Ok(Json(feeds))
}

async fn mirror_post_handler(ressources: RessourcesRef) -> RouteResult<Json<MirrorFeedsSummary>> {
	Ok(Json(ressources.crawler().mirror_feeds()?))
}
