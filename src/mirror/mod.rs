//! Copies entries known to the feed reader into the entry collection.

use serde::Serialize;
use time::{Duration, OffsetDateTime};

use crate::{
	database::models::EntryDocument,
	reader::{self, FeedReader, ReaderEntry},
	repository::{EntryRepository, StoreError},
};

mod identity;
mod paged;

pub use self::{
	identity::{entry_domain, entry_key, normalize_timestamp, published_or_updated},
	paged::{MAX_PAGES, PagedReport, backfill_paged},
};

/// Documents written per store round-trip.
pub const BATCH_SIZE: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
	#[error("reader: {0}")]
	Reader(#[from] reader::Error),

	#[error("store: {0}")]
	Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MirrorReport {
	/// Entries turned into documents and handed to the store.
	pub entries_processed: usize,
	pub feeds_scanned: usize,
	/// Feeds whose entries could not be listed.
	pub feeds_skipped: usize,
	pub documents_failed: usize,
}

/// Oldest publication date a mirror run looking back `days` keeps.
///
/// No lookback, or a zero one, keeps everything.
pub fn cutoff(days: Option<u32>, now: OffsetDateTime) -> Option<OffsetDateTime> {
	days.filter(|&days| days > 0)
		.map(|days| now - Duration::days(i64::from(days)))
}

/// Turns a reader entry into the document stored for it.
pub fn build_document(entry: ReaderEntry, mirrored_at: OffsetDateTime) -> EntryDocument {
	let key = entry_key(&entry);
	let published = published_or_updated(&entry);
	let updated = entry.updated.and_then(normalize_timestamp);
	let domain = entry_domain(entry.link.as_deref());

	EntryDocument {
		key,
		feed_url: entry.feed_url,
		title: entry.title,
		link: entry.link,
		published,
		updated,
		authors: entry.authors,
		summary: entry.summary,
		domain,
		mirrored_at,
	}
}

/// Mirrors every entry the reader knows that was published within the last `days`.
///
/// Running it twice over the same reader state writes the same documents.
pub fn mirror_entries(
	reader: &dyn FeedReader,
	store: &dyn EntryRepository,
	days: Option<u32>,
) -> Result<MirrorReport, MirrorError> {
	mirror_since(reader, store, cutoff(days, OffsetDateTime::now_utc()))
}

/// Mirrors every entry published at or after `cutoff`, or all of them without one.
///
/// Entries with neither a publication nor an update date only pass without a cutoff.
pub fn mirror_since(
	reader: &dyn FeedReader,
	store: &dyn EntryRepository,
	cutoff: Option<OffsetDateTime>,
) -> Result<MirrorReport, MirrorError> {
	let now = OffsetDateTime::now_utc();
	let server_side = cutoff.is_some() && reader.supports_newer_than();

	let mut report = MirrorReport::default();
	let mut pending = Vec::with_capacity(BATCH_SIZE);

	for feed in reader.feeds()? {
		report.feeds_scanned += 1;

		let entries = match reader.entries(&feed.url, cutoff.filter(|_| server_side)) {
			Ok(entries) => entries,
			Err(err) => {
				tracing::warn!(feed = %feed.url, err = %err, "could not list feed entries, skipping");
				report.feeds_skipped += 1;
				continue;
			}
		};

		let documents = entries
			.into_iter()
			.map(|entry| build_document(entry, now))
			.filter(|doc| match cutoff {
				Some(cutoff) if !server_side => doc.published.is_some_and(|published| published >= cutoff),
				_ => true,
			});

		for document in documents {
			pending.push(document);
			if pending.len() == BATCH_SIZE {
				flush(store, &pending, &mut report)?;
				pending.clear();
			}
		}
	}

	if !pending.is_empty() {
		flush(store, &pending, &mut report)?;
	}

	tracing::info!(
		processed = report.entries_processed,
		feeds = report.feeds_scanned,
		skipped = report.feeds_skipped,
		failed = report.documents_failed,
		"mirrored entries"
	);
	Ok(report)
}

fn flush(
	store: &dyn EntryRepository,
	batch: &[EntryDocument],
	report: &mut MirrorReport,
) -> Result<(), StoreError> {
	let outcome = store.upsert_batch(batch)?;
	report.entries_processed += batch.len();
	report.documents_failed += outcome.failed;
	tracing::debug!(written = outcome.written, failed = outcome.failed, "flushed entry batch");
	Ok(())
}

#[cfg(test)]
mod tests {
	use std::collections::HashSet;

	use itertools::Itertools;
	use pretty_assertions::assert_eq;
	use time::macros::datetime;

	use super::*;
	use crate::{
		database::open_store,
		reader::{RawTimestamp, ReaderFeed, UpdateSummary},
		repository::{EntryFilter, SqliteEntries},
	};

	#[derive(Default)]
	struct StaticReader {
		entries: Vec<ReaderEntry>,
		broken: HashSet<String>,
		newer_than: bool,
	}

	#[async_trait::async_trait]
	impl FeedReader for StaticReader {
		fn feeds(&self) -> reader::Result<Vec<ReaderFeed>> {
			let urls = self
				.entries
				.iter()
				.map(|entry| entry.feed_url.clone())
				.chain(self.broken.iter().cloned())
				.sorted()
				.dedup();
			Ok(urls
				.map(|url| ReaderFeed {
					url,
					title: None,
					link: None,
				})
				.collect())
		}

		fn add_feed(&self, _url: &str) -> reader::Result<()> {
			Ok(())
		}

		fn delete_feed(&self, _url: &str) -> reader::Result<()> {
			Ok(())
		}

		async fn update_feeds(&self) -> reader::Result<UpdateSummary> {
			Ok(UpdateSummary::default())
		}

		fn entries(
			&self,
			feed_url: &str,
			newer_than: Option<OffsetDateTime>,
		) -> reader::Result<Vec<ReaderEntry>> {
			if self.broken.contains(feed_url) {
				return Err(reader::Error::FeedNotFound(feed_url.to_owned()));
			}
			Ok(self
				.entries
				.iter()
				.filter(|entry| entry.feed_url == feed_url)
				.filter(|entry| {
					newer_than.is_none_or(|cutoff| {
						published_or_updated(entry).is_some_and(|published| published >= cutoff)
					})
				})
				.cloned()
				.collect())
		}

		fn supports_newer_than(&self) -> bool {
			self.newer_than
		}
	}

	fn entry(feed: &str, id: &str, published: Option<OffsetDateTime>) -> ReaderEntry {
		ReaderEntry {
			feed_url: feed.into(),
			id: Some(id.into()),
			title: Some(format!("post {id}")),
			link: Some(format!("https://{feed}/{id}")),
			published: published.map(RawTimestamp::Zoned),
			..ReaderEntry::default()
		}
	}

	fn recent_and_old(now: OffsetDateTime) -> Vec<ReaderEntry> {
		vec![
			entry("a.com", "1", Some(now - Duration::hours(2))),
			entry("a.com", "2", Some(now - Duration::days(30))),
			ReaderEntry {
				updated: Some(RawTimestamp::Zoned(now - Duration::hours(1))),
				..entry("b.com", "3", None)
			},
			entry("b.com", "4", None),
		]
	}

	fn store() -> SqliteEntries {
		SqliteEntries::new(open_store(":memory:").unwrap())
	}

	#[test]
	fn mirroring_twice_writes_the_same_documents() {
		let reader = StaticReader {
			entries: recent_and_old(OffsetDateTime::now_utc()),
			..StaticReader::default()
		};
		let store = store();

		let first = mirror_entries(&reader, &store, None).unwrap();
		let second = mirror_entries(&reader, &store, None).unwrap();

		assert_eq!(first.entries_processed, 4);
		assert_eq!(first, second);
		assert_eq!(store.count().unwrap(), 4);
	}

	#[test]
	fn lookback_filters_on_the_client() {
		let reader = StaticReader {
			entries: recent_and_old(OffsetDateTime::now_utc()),
			..StaticReader::default()
		};
		let store = store();

		let report = mirror_entries(&reader, &store, Some(7)).unwrap();
		assert_eq!(report.entries_processed, 2);

		let keys = store
			.find(&EntryFilter {
				limit: 10,
				..EntryFilter::default()
			})
			.unwrap()
			.into_iter()
			.map(|doc| doc.key)
			.sorted()
			.collect::<Vec<_>>();
		assert_eq!(keys, ["1", "3"]);
	}

	#[test]
	fn lookback_is_handed_to_capable_readers() {
		let reader = StaticReader {
			entries: recent_and_old(OffsetDateTime::now_utc()),
			newer_than: true,
			..StaticReader::default()
		};

		let report = mirror_entries(&reader, &store(), Some(7)).unwrap();
		assert_eq!(report.entries_processed, 2);
	}

	#[test]
	fn zero_days_mirrors_everything() {
		let reader = StaticReader {
			entries: recent_and_old(OffsetDateTime::now_utc()),
			..StaticReader::default()
		};

		assert_eq!(
			mirror_entries(&reader, &store(), Some(0)).unwrap().entries_processed,
			4
		);
		assert_eq!(
			mirror_entries(&reader, &store(), None).unwrap().entries_processed,
			4
		);
	}

	#[test]
	fn failing_feeds_are_skipped() {
		let reader = StaticReader {
			entries: recent_and_old(OffsetDateTime::now_utc()),
			broken: HashSet::from(["gone.com".to_owned()]),
			..StaticReader::default()
		};

		let report = mirror_entries(&reader, &store(), None).unwrap();
		assert_eq!(
			report,
			MirrorReport {
				entries_processed: 4,
				feeds_scanned: 3,
				feeds_skipped: 1,
				documents_failed: 0,
			}
		);
	}

	#[test]
	fn large_runs_are_flushed_in_batches() {
		let now = OffsetDateTime::now_utc();
		let reader = StaticReader {
			entries: (0..2_500)
				.map(|n| entry(if n % 2 == 0 { "a.com" } else { "b.com" }, &n.to_string(), Some(now)))
				.collect(),
			..StaticReader::default()
		};
		let store = store();

		let report = mirror_entries(&reader, &store, None).unwrap();
		assert_eq!(report.entries_processed, 2_500);
		assert_eq!(store.count().unwrap(), 2_500);
	}

	#[test]
	fn documents_carry_normalized_fields() {
		let doc = build_document(
			ReaderEntry {
				feed_url: "http://a.com/feed".into(),
				link: Some("https://Blog.A.com/post".into()),
				updated: Some(RawTimestamp::Epoch(1_709_294_400.0)),
				authors: vec!["Ada".into()],
				..ReaderEntry::default()
			},
			datetime!(2024-06-01 0:00 UTC),
		);

		assert_eq!(doc.key, "https://blog.a.com/post");
		assert_eq!(doc.published, Some(datetime!(2024-03-01 12:00 UTC)));
		assert_eq!(doc.updated, doc.published);
		assert_eq!(doc.domain.as_deref(), Some("blog.a.com"));
		assert_eq!(doc.mirrored_at, datetime!(2024-06-01 0:00 UTC));
	}

	#[test]
	fn cutoff_ignores_zero() {
		let now = datetime!(2024-06-08 0:00 UTC);
		assert_eq!(cutoff(None, now), None);
		assert_eq!(cutoff(Some(0), now), None);
		assert_eq!(cutoff(Some(7), now), Some(datetime!(2024-06-01 0:00 UTC)));
	}
}
