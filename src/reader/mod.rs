//! The feed-polling side: subscribed feeds and the entries last fetched for them.

use serde::Serialize;
use time::{OffsetDateTime, PrimitiveDateTime};

mod cache;
mod error;
#[rustfmt::skip]
mod schema;

pub use self::cache::{CachedReader, fetch_feed, http_client, parse_feed, reader_entry};
pub use self::error::{Error, Result};

/// A feed as the polling side knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReaderFeed {
	pub url: String,
	pub title: Option<String>,
	pub link: Option<String>,
}

/// A timestamp in whatever shape the polling side produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawTimestamp {
	/// Seconds since the unix epoch.
	Epoch(f64),
	/// A wall-clock time without zone, meant as UTC.
	Naive(PrimitiveDateTime),
	Zoned(OffsetDateTime),
}

/// An entry as the polling side knows it, before any normalization.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReaderEntry {
	pub feed_url: String,
	pub id: Option<String>,
	pub title: Option<String>,
	pub link: Option<String>,
	pub published: Option<RawTimestamp>,
	pub updated: Option<RawTimestamp>,
	pub authors: Vec<String>,
	pub summary: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpdateSummary {
	pub updated: usize,
	pub failed: usize,
}

#[async_trait::async_trait]
pub trait FeedReader: Send + Sync {
	fn feeds(&self) -> Result<Vec<ReaderFeed>>;

	/// Subscribes to `url`. Fails with [`Error::FeedExists`] when already subscribed.
	fn add_feed(&self, url: &str) -> Result<()>;

	/// Unsubscribes from `url` and forgets its entries.
	fn delete_feed(&self, url: &str) -> Result<()>;

	/// Fetches every subscribed feed. One failing feed does not stop the others.
	async fn update_feeds(&self) -> Result<UpdateSummary>;

	/// Entries known for `feed_url`.
	///
	/// `newer_than` is only honored when [`FeedReader::supports_newer_than`] says so.
	fn entries(&self, feed_url: &str, newer_than: Option<OffsetDateTime>) -> Result<Vec<ReaderEntry>>;

	fn supports_newer_than(&self) -> bool {
		false
	}
}
