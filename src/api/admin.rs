use axum::{
	Json, Router,
	extract::{Path, Query},
	http::StatusCode,
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use time::{Date, macros::format_description};
use uuid::Uuid;

use crate::{
	config::RessourcesRef,
	discovery::DEFAULT_TOP_K,
	error::{RouteError, RouteResult},
	jobs::JobStatus,
	mirror::{self, MirrorReport, PagedReport},
	services::{DiscoverSummary, InitSummary},
	stats::{self, StatsReport},
};

pub fn router() -> Router<RessourcesRef> {
	Router::new()
		.route("/init", post(init_post_handler))
		.route("/update", post(update_post_handler))
		.route("/backfill", post(backfill_post_handler))
		.route("/backfill-range", post(backfill_range_post_handler))
		.route("/backfill-paged", post(backfill_paged_post_handler))
		.route("/discover", post(discover_post_handler))
		.route("/stats", get(stats_get_handler))
		.route("/jobs", get(jobs_get_handler))
		.route("/jobs/{id}", get(job_get_handler))
}

async fn init_post_handler(ressources: RessourcesRef) -> RouteResult<Json<InitSummary>> {
	Ok(Json(ressources.crawler().init_feeds().await?))
}

#[derive(Debug, Deserialize)]
struct UpdateQuery {
	days: Option<u32>,
}

#[derive(Debug, Serialize)]
struct UpdateAccepted {
	status: &'static str,
	job_id: Uuid,
	days: u32,
}

// Sync, refresh and mirror in the background
async fn update_post_handler(
	ressources: RessourcesRef,
	Query(query): Query<UpdateQuery>,
) -> (StatusCode, Json<UpdateAccepted>) {
	let days = query.days.unwrap_or(1);

	let job_ressources = ressources.clone();
	let job_id = ressources.jobs.spawn("update", async move {
		job_ressources.crawler().update_all(Some(days)).await
	});

	(
		StatusCode::ACCEPTED,
		Json(UpdateAccepted {
			status: "accepted",
			job_id,
			days,
		}),
	)
}

#[derive(Debug, Deserialize)]
struct BackfillQuery {
	days: Option<u32>,
}

async fn backfill_post_handler(
	ressources: RessourcesRef,
	Query(query): Query<BackfillQuery>,
) -> RouteResult<Json<MirrorReport>> {
	Ok(Json(ressources.crawler().mirror_entries(query.days)?))
}

#[derive(Debug, Deserialize)]
struct BackfillRangeQuery {
	start: String,
}

fn parse_date(field: &str, raw: &str) -> RouteResult<Date> {
	Date::parse(raw, format_description!("[year]-[month]-[day]"))
		.map_err(|err| RouteError::User(format!("{field} must be a YYYY-MM-DD date: {err}")))
}

async fn backfill_range_post_handler(
	ressources: RessourcesRef,
	Query(query): Query<BackfillRangeQuery>,
) -> RouteResult<Json<MirrorReport>> {
	let start = parse_date("start", &query.start)?;
	Ok(Json(ressources.crawler().mirror_range(start)?))
}

#[derive(Debug, Deserialize)]
struct BackfillPagedRequest {
	url: String,
	since: Option<String>,
	max_pages: Option<usize>,
}

// Follows the `next` pages of one feed, fetching them directly
async fn backfill_paged_post_handler(
	ressources: RessourcesRef,
	Json(body): Json<BackfillPagedRequest>,
) -> RouteResult<Json<PagedReport>> {
	let since = body
		.since
		.as_deref()
		.map(|raw| parse_date("since", raw))
		.transpose()?;
	let max_pages = body.max_pages.unwrap_or(mirror::MAX_PAGES);

	Ok(Json(
		ressources
			.crawler()
			.backfill_paged(&body.url, since, max_pages)
			.await?,
	))
}

#[derive(Debug, Deserialize)]
struct DiscoverRequest {
	url: String,
	top_k: Option<usize>,
}

async fn discover_post_handler(
	ressources: RessourcesRef,
	Json(body): Json<DiscoverRequest>,
) -> RouteResult<Json<DiscoverSummary>> {
	let top_k = body.top_k.unwrap_or(DEFAULT_TOP_K);
	Ok(Json(
		ressources
			.feed_service()
			.discover_feeds(&body.url, top_k)
			.await?,
	))
}

#[derive(Debug, Deserialize)]
struct StatsQuery {
	days: Option<u32>,
}

async fn stats_get_handler(
	ressources: RessourcesRef,
	Query(query): Query<StatsQuery>,
) -> RouteResult<Json<StatsReport>> {
	let days = query.days.unwrap_or(stats::DEFAULT_DAYS);
	if !(1..=stats::MAX_DAYS).contains(&days) {
		return Err(RouteError::User(format!(
			"days must be between 1 and {}",
			stats::MAX_DAYS
		)));
	}

	Ok(Json(StatsReport::collect(
		&ressources.entries,
		&ressources.feeds,
		days,
	)?))
}

async fn jobs_get_handler(ressources: RessourcesRef) -> Json<Vec<JobStatus>> {
	Json(ressources.jobs.list())
}

async fn job_get_handler(
	ressources: RessourcesRef,
	Path(id): Path<Uuid>,
) -> RouteResult<Json<JobStatus>> {
	ressources
		.jobs
		.get(id)
		.map(Json)
		.ok_or_else(|| RouteError::NotFound(format!("job {id}")))
}
