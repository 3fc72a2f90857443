use axum::{Json, Router, extract::Query, routing::get};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::{
	config::RessourcesRef,
	database::models::EntryDocument,
	error::RouteResult,
	normalize::normalize_url,
	repository::{EntryFilter, EntryRepository},
};

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 1000;

pub fn router() -> Router<RessourcesRef> {
	Router::new().route("/", get(entries_get_handler))
}

#[derive(Debug, Deserialize)]
struct EntriesQuery {
	feed_url: Option<String>,
	domain: Option<String>,
	days: Option<u32>,
	limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct EntriesResponse {
	entries: Vec<EntryDocument>,
	total: usize,
}

async fn entries_get_handler(
	ressources: RessourcesRef,
	Query(query): Query<EntriesQuery>,
) -> RouteResult<Json<EntriesResponse>> {
	let filter = EntryFilter {
		feed_url: query.feed_url.as_deref().map(normalize_url),
		domain: query.domain.map(|domain| domain.trim().to_ascii_lowercase()),
		since: query
			.days
			.filter(|&days| days > 0)
			.map(|days| OffsetDateTime::now_utc() - Duration::days(i64::from(days))),
		limit: query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
	};

	let entries = ressources.entries.find(&filter)?;
	Ok(Json(EntriesResponse {
		total: entries.len(),
		entries,
	}))
}
