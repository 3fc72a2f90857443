//! Storage seams used by the services, with their sqlite implementations.

use std::collections::BTreeMap;

use serde::Serialize;
use time::OffsetDateTime;

use crate::{
	blacklist::Blacklist,
	database::models::{EntryDocument, Feed, NewFeed},
};

mod blacklist;
mod entries;
mod feeds;

pub use self::{blacklist::SqliteBlacklist, entries::SqliteEntries, feeds::SqliteFeeds};

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("pool: {0}")]
	DbPool(#[from] diesel::r2d2::PoolError),

	#[error("query: {0}")]
	Query(#[from] diesel::result::Error),

	#[error("document: {0}")]
	Document(#[from] serde_json::Error),
}

/// What happened to a feed record on a metadata upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
	Inserted,
	Modified,
	Unchanged,
}

pub trait FeedRepository: Send + Sync {
	/// Every stored feed ordered by url, optionally restricted by the enabled flag.
	fn list(&self, enabled: Option<bool>) -> Result<Vec<Feed>>;

	fn get(&self, url: &str) -> Result<Option<Feed>>;

	/// Returns `false` when a feed with this url is already stored.
	fn insert(&self, feed: &NewFeed<'_>) -> Result<bool>;

	/// Returns `false` when no such feed is stored.
	fn delete(&self, url: &str) -> Result<bool>;

	/// Returns `false` when no such feed is stored.
	fn set_enabled(&self, url: &str, enabled: bool) -> Result<bool>;

	/// Refreshes title and site of a feed, inserting it enabled when unknown.
	fn upsert_metadata(&self, url: &str, title: &str, site_url: &str) -> Result<Upserted>;

	fn count(&self) -> Result<u64>;
}

/// Outcome of writing a batch of documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
	pub written: usize,
	pub failed: usize,
}

/// Restricts which mirrored entries are listed.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
	pub feed_url: Option<String>,
	pub domain: Option<String>,
	pub since: Option<OffsetDateTime>,
	pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainCount {
	pub domain: String,
	pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedCount {
	pub feed_url: String,
	pub total: u64,
	pub recent: u64,
}

pub trait EntryRepository: Send + Sync {
	/// Inserts or replaces every document by key.
	///
	/// A document that cannot be written is logged and counted, the others still land.
	fn upsert_batch(&self, docs: &[EntryDocument]) -> Result<BatchOutcome>;

	fn get(&self, key: &str) -> Result<Option<EntryDocument>>;

	/// Matching documents, most recently published first.
	fn find(&self, filter: &EntryFilter) -> Result<Vec<EntryDocument>>;

	fn count(&self) -> Result<u64>;

	fn count_since(&self, since: OffsetDateTime) -> Result<u64>;

	/// Domains ranked by how many entries they published since `since`.
	fn top_domains(&self, since: OffsetDateTime, limit: usize) -> Result<Vec<DomainCount>>;

	/// Total and recent entry counts of every feed with at least one entry.
	fn feed_counts(&self, since: OffsetDateTime) -> Result<Vec<FeedCount>>;

	/// Entries with a publication date keyed by weekday, `1` being sunday.
	fn weekday_histogram(&self) -> Result<BTreeMap<u8, u64>>;

	/// Earliest and latest publication dates.
	fn published_range(&self) -> Result<Option<(OffsetDateTime, OffsetDateTime)>>;
}

pub trait BlacklistRepository: Send + Sync {
	fn load(&self) -> Result<Blacklist>;

	/// Returns `false` when the url was already banned.
	fn add_feed(&self, url: &str) -> Result<bool>;

	/// Returns `false` when the domain was already banned.
	fn add_domain(&self, domain: &str) -> Result<bool>;

	fn remove_feed(&self, url: &str) -> Result<bool>;

	fn remove_domain(&self, domain: &str) -> Result<bool>;
}
