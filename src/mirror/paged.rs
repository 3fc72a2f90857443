//! Mirrors feeds whose history is split over pages chained by `next` links.

use std::{collections::HashSet, time::Duration};

use feed_rs::model;
use reqwest::Client;
use serde::Serialize;
use time::OffsetDateTime;

use super::{BATCH_SIZE, MirrorError, MirrorReport, build_document, flush};
use crate::{reader, repository::EntryRepository};

/// Pages followed when the caller does not say otherwise.
pub const MAX_PAGES: usize = 50;

/// Pause between two page requests.
const PAGE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PagedReport {
	pub pages: usize,
	/// The walk stopped on an entry older than the cutoff.
	pub reached_cutoff: bool,
	pub mirror: MirrorReport,
}

/// Url of the page following this one, if the feed links one.
fn next_page(links: &[model::Link]) -> Option<String> {
	links
		.iter()
		.find(|link| link.rel.as_deref() == Some("next"))
		.map(|link| link.href.clone())
}

/// Fetches `feed_url` and the pages after it, writing entries as they come.
///
/// The walk stops after `max_pages` pages, on a page already seen, on a page
/// without `next` link, or at the first dated entry older than `since`.
/// Documents are keyed like every other mirrored entry and attributed to
/// `feed_url` whatever page they came from.
pub async fn backfill_paged(
	client: &Client,
	store: &dyn EntryRepository,
	feed_url: &str,
	since: Option<OffsetDateTime>,
	max_pages: usize,
) -> Result<PagedReport, MirrorError> {
	let mut report = PagedReport {
		mirror: MirrorReport {
			feeds_scanned: 1,
			..MirrorReport::default()
		},
		..PagedReport::default()
	};
	let mut visited = HashSet::new();
	let mut next = Some(feed_url.to_owned());

	while let Some(page_url) = next.take() {
		if report.pages >= max_pages || !visited.insert(page_url.clone()) {
			break;
		}
		if report.pages > 0 {
			tokio::time::sleep(PAGE_DELAY).await;
		}

		let feed = reader::fetch_feed(client, &page_url).await?;
		report.pages += 1;
		next = next_page(&feed.links);

		let now = OffsetDateTime::now_utc();
		let mut documents = Vec::with_capacity(feed.entries.len());
		for entry in feed.entries {
			let document = build_document(reader::reader_entry(feed_url, entry), now);
			if let (Some(since), Some(published)) = (since, document.published) {
				if published < since {
					report.reached_cutoff = true;
					break;
				}
			}
			documents.push(document);
		}

		for batch in documents.chunks(BATCH_SIZE) {
			flush(store, batch, &mut report.mirror)?;
		}
		tracing::debug!(page = %page_url, entries = documents.len(), "mirrored feed page");

		if report.reached_cutoff {
			break;
		}
	}

	tracing::info!(
		feed = %feed_url,
		pages = report.pages,
		processed = report.mirror.entries_processed,
		reached_cutoff = report.reached_cutoff,
		"backfilled paged feed"
	);
	Ok(report)
}
