use std::{collections::BTreeSet, time::Instant};

use reqwest::Client;
use serde::Serialize;
use time::{Date, OffsetDateTime};

use super::{Result, ServiceError};
use crate::{
	mirror::{self, MirrorReport, PagedReport},
	normalize::normalize_url,
	reader::{self, FeedReader, UpdateSummary},
	repository::{BlacklistRepository, EntryRepository, FeedRepository, Upserted},
};

/// Lookback used when mirroring right after registration.
const INIT_DAYS: u32 = 7;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReaderSyncSummary {
	pub added: usize,
	pub removed: usize,
	pub total_enabled: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MirrorFeedsSummary {
	pub feeds_upserted: usize,
	pub feeds_modified: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateAllSummary {
	pub sync: ReaderSyncSummary,
	pub update: UpdateSummary,
	pub mirror: MirrorReport,
	pub elapsed_secs: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InitSummary {
	pub registered: usize,
	pub skipped: usize,
	pub update: UpdateSummary,
	pub mirror: Option<MirrorReport>,
	pub mirror_error: Option<String>,
	pub feeds: Option<MirrorFeedsSummary>,
	pub feeds_error: Option<String>,
}

/// Keeps the feed reader in step with the store and mirrors what it fetched.
pub struct CrawlerService<'a> {
	feeds: &'a dyn FeedRepository,
	entries: &'a dyn EntryRepository,
	blacklist: &'a dyn BlacklistRepository,
	reader: &'a dyn FeedReader,
	client: &'a Client,
}

impl<'a> CrawlerService<'a> {
	pub fn new(
		feeds: &'a dyn FeedRepository,
		entries: &'a dyn EntryRepository,
		blacklist: &'a dyn BlacklistRepository,
		reader: &'a dyn FeedReader,
		client: &'a Client,
	) -> Self {
		Self {
			feeds,
			entries,
			blacklist,
			reader,
			client,
		}
	}

	/// Enabled feeds of the store that are not banned.
	fn wanted_feeds(&self) -> Result<Vec<String>> {
		let blacklist = self.blacklist.load()?;
		Ok(self
			.feeds
			.list(Some(true))?
			.into_iter()
			.map(|feed| feed.url)
			.filter(|url| !blacklist.blocks(url))
			.collect())
	}

	/// Subscribes the reader to enabled feeds and drops every other subscription.
	pub fn sync_feeds_to_reader(&self) -> Result<ReaderSyncSummary> {
		let wanted = self.wanted_feeds()?.into_iter().collect::<BTreeSet<_>>();
		let subscribed = self
			.reader
			.feeds()?
			.into_iter()
			.map(|feed| feed.url)
			.collect::<BTreeSet<_>>();

		let mut summary = ReaderSyncSummary {
			total_enabled: wanted.len(),
			..ReaderSyncSummary::default()
		};

		for url in wanted.difference(&subscribed) {
			match self.reader.add_feed(url) {
				Ok(()) => summary.added += 1,
				Err(reader::Error::FeedExists(_)) => {}
				Err(err) => tracing::warn!(url = %url, err = %err, "could not subscribe reader"),
			}
		}
		for url in subscribed.difference(&wanted) {
			match self.reader.delete_feed(url) {
				Ok(()) => summary.removed += 1,
				Err(reader::Error::FeedNotFound(_)) => {}
				Err(err) => tracing::warn!(url = %url, err = %err, "could not unsubscribe reader"),
			}
		}

		tracing::info!(
			added = summary.added,
			removed = summary.removed,
			enabled = summary.total_enabled,
			"synced reader subscriptions"
		);
		Ok(summary)
	}

	pub async fn update_feeds(&self) -> Result<UpdateSummary> {
		let summary = self.reader.update_feeds().await?;
		tracing::info!(updated = summary.updated, failed = summary.failed, "updated reader feeds");
		Ok(summary)
	}

	pub fn mirror_entries(&self, days: Option<u32>) -> Result<MirrorReport> {
		Ok(mirror::mirror_entries(self.reader, self.entries, days)?)
	}

	/// Mirrors entries published since the start of `start`, in UTC.
	pub fn mirror_range(&self, start: Date) -> Result<MirrorReport> {
		let cutoff = start.midnight().assume_utc();
		if cutoff > OffsetDateTime::now_utc() {
			return Err(ServiceError::InvalidInput(format!("{start} is in the future")));
		}
		Ok(mirror::mirror_since(self.reader, self.entries, Some(cutoff))?)
	}

	/// Walks a paged feed from its first document, mirroring up to `max_pages` pages.
	///
	/// Entries are fetched directly, the reader cache is left alone.
	pub async fn backfill_paged(
		&self,
		feed_url: &str,
		since: Option<Date>,
		max_pages: usize,
	) -> Result<PagedReport> {
		let feed_url = normalize_url(feed_url);
		if feed_url.is_empty() {
			return Err(ServiceError::InvalidInput("feed url is empty".into()));
		}
		if max_pages == 0 {
			return Err(ServiceError::InvalidInput("at least one page must be fetched".into()));
		}
		if self.blacklist.load()?.blocks(&feed_url) {
			return Err(ServiceError::Blacklisted(feed_url));
		}

		let since = since.map(|date| date.midnight().assume_utc());
		Ok(mirror::backfill_paged(self.client, self.entries, &feed_url, since, max_pages).await?)
	}

	/// Copies titles and sites the reader learned into the store.
	///
	/// Feeds unknown to the store are added enabled, known ones keep their flag.
	pub fn mirror_feeds(&self) -> Result<MirrorFeedsSummary> {
		let blacklist = self.blacklist.load()?;
		let mut summary = MirrorFeedsSummary::default();

		for feed in self.reader.feeds()? {
			if blacklist.blocks(&feed.url) {
				tracing::debug!(url = %feed.url, "skipping blacklisted reader feed");
				continue;
			}

			let title = feed
				.title
				.as_deref()
				.map(str::trim)
				.filter(|title| !title.is_empty())
				.unwrap_or(&feed.url);
			let site_url = feed.link.as_deref().unwrap_or(&feed.url);

			match self.feeds.upsert_metadata(&feed.url, title, site_url)? {
				Upserted::Inserted => summary.feeds_upserted += 1,
				Upserted::Modified => summary.feeds_modified += 1,
				Upserted::Unchanged => {}
			}
		}

		Ok(summary)
	}

	/// Sync, refresh then mirror.
	pub async fn update_all(&self, days: Option<u32>) -> Result<UpdateAllSummary> {
		let start = Instant::now();

		let sync = self.sync_feeds_to_reader()?;
		let update = self.update_feeds().await?;
		let mirror = self.mirror_entries(days)?;

		Ok(UpdateAllSummary {
			sync,
			update,
			mirror,
			elapsed_secs: start.elapsed().as_secs_f64(),
		})
	}

	/// Registers enabled feeds in the reader, refreshes them and mirrors the last week.
	pub async fn init_feeds(&self) -> Result<InitSummary> {
		let mut summary = InitSummary::default();

		for url in self.wanted_feeds()? {
			match self.reader.add_feed(&url) {
				Ok(()) => summary.registered += 1,
				Err(reader::Error::FeedExists(_)) => summary.skipped += 1,
				Err(err) => {
					tracing::warn!(url = %url, err = %err, "could not register feed");
					summary.skipped += 1;
				}
			}
		}

		summary.update = self.update_feeds().await?;

		match self.mirror_entries(Some(INIT_DAYS)) {
			Ok(report) => summary.mirror = Some(report),
			Err(err) => {
				tracing::error!(err = %err, "could not mirror entries");
				summary.mirror_error = Some(err.to_string());
			}
		}
		match self.mirror_feeds() {
			Ok(feeds) => summary.feeds = Some(feeds),
			Err(err) => {
				tracing::error!(err = %err, "could not mirror feeds");
				summary.feeds_error = Some(err.to_string());
			}
		}

		Ok(summary)
	}
}
