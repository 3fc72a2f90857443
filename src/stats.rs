//! Fixed rollups over the mirrored entries.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use time::{Duration, OffsetDateTime};

use crate::repository::{DomainCount, EntryRepository, FeedRepository, StoreError};

pub const DEFAULT_DAYS: u32 = 7;
pub const MAX_DAYS: u32 = 90;
pub const TOP_DOMAINS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Totals {
	pub entries: u64,
	pub recent: u64,
	pub feeds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedStats {
	pub feed_url: String,
	pub title: String,
	pub total: u64,
	pub recent: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedRange {
	#[serde(with = "time::serde::rfc3339")]
	pub earliest: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339")]
	pub latest: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsReport {
	#[serde(with = "time::serde::rfc3339")]
	pub generated_at: OffsetDateTime,
	pub days: u32,
	pub totals: Totals,
	pub top_domains: Vec<DomainCount>,
	pub feeds: Vec<FeedStats>,
	/// Keyed `1..=7`, sunday first.
	pub weekday_histogram: BTreeMap<u8, u64>,
	pub published_range: Option<PublishedRange>,
}

impl StatsReport {
	/// Rolls up entries, counting as recent what was published within the last `days`.
	pub fn collect(
		entries: &dyn EntryRepository,
		feeds: &dyn FeedRepository,
		days: u32,
	) -> Result<Self, StoreError> {
		let generated_at = OffsetDateTime::now_utc();
		let since = generated_at - Duration::days(i64::from(days));

		let titles = feeds
			.list(None)?
			.into_iter()
			.map(|feed| (feed.url, feed.title))
			.collect::<HashMap<_, _>>();

		let mut per_feed = entries
			.feed_counts(since)?
			.into_iter()
			.map(|count| FeedStats {
				title: titles
					.get(&count.feed_url)
					.cloned()
					.unwrap_or_else(|| count.feed_url.clone()),
				feed_url: count.feed_url,
				total: count.total,
				recent: count.recent,
			})
			.collect::<Vec<_>>();
		per_feed.sort_by(|a, b| {
			b.recent
				.cmp(&a.recent)
				.then_with(|| b.total.cmp(&a.total))
				.then_with(|| a.feed_url.cmp(&b.feed_url))
		});

		Ok(Self {
			generated_at,
			days,
			totals: Totals {
				entries: entries.count()?,
				recent: entries.count_since(since)?,
				feeds: feeds.count()?,
			},
			top_domains: entries.top_domains(since, TOP_DOMAINS)?,
			feeds: per_feed,
			weekday_histogram: entries.weekday_histogram()?,
			published_range: entries
				.published_range()?
				.map(|(earliest, latest)| PublishedRange { earliest, latest }),
		})
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;
	use crate::{
		database::{
			models::{EntryDocument, NewFeed},
			open_store,
		},
		repository::{SqliteEntries, SqliteFeeds},
	};

	#[test]
	fn report_joins_feed_titles_and_ranks_recent_activity() {
		let pool = open_store(":memory:").unwrap();
		let feeds = SqliteFeeds::new(pool.clone());
		let entries = SqliteEntries::new(pool);

		let mut titled = NewFeed::from_url("http://a.com/feed");
		titled.title = "A blog".into();
		feeds.insert(&titled).unwrap();

		let now = OffsetDateTime::now_utc();
		let doc = |key: &str, feed: &str, age: Duration| EntryDocument {
			key: key.into(),
			feed_url: feed.into(),
			title: None,
			link: None,
			published: Some(now - age),
			updated: None,
			authors: Vec::new(),
			summary: None,
			domain: Some("a.com".into()),
			mirrored_at: now,
		};
		entries
			.upsert_batch(&[
				doc("1", "http://a.com/feed", Duration::days(40)),
				doc("2", "http://b.com/feed", Duration::hours(1)),
				doc("3", "http://b.com/feed", Duration::hours(2)),
			])
			.unwrap();

		let report = StatsReport::collect(&entries, &feeds, DEFAULT_DAYS).unwrap();
		assert_eq!(report.days, 7);
		assert_eq!(
			report.totals,
			Totals {
				entries: 3,
				recent: 2,
				feeds: 1,
			}
		);
		assert_eq!(
			report.feeds,
			vec![
				FeedStats {
					feed_url: "http://b.com/feed".into(),
					title: "http://b.com/feed".into(),
					total: 2,
					recent: 2,
				},
				FeedStats {
					feed_url: "http://a.com/feed".into(),
					title: "A blog".into(),
					total: 1,
					recent: 0,
				},
			]
		);
		assert_eq!(report.top_domains[0].count, 2);
		assert_eq!(report.weekday_histogram.values().sum::<u64>(), 3);
		assert!(report.published_range.is_some());
	}
}
