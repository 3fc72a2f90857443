#![allow(dead_code)]

use std::{collections::BTreeMap, sync::Arc};

use feedmirror::{
	config::{Config, Ressources, RessourcesRef},
	database::open_store,
	reader::{self, FeedReader, ReaderEntry, ReaderFeed, UpdateSummary},
};
use parking_lot::Mutex;
use time::OffsetDateTime;

/// A reader that never touches the network: entries are handed to it up front.
#[derive(Debug, Default)]
pub struct MemoryReader {
	feeds: Mutex<BTreeMap<String, ReaderFeed>>,
	entries: Mutex<Vec<ReaderEntry>>,
	updates: Mutex<usize>,
}

impl MemoryReader {
	pub fn push_entry(&self, entry: ReaderEntry) {
		self.entries.lock().push(entry);
	}

	pub fn set_title(&self, url: &str, title: &str) {
		if let Some(feed) = self.feeds.lock().get_mut(url) {
			feed.title = Some(title.to_owned());
		}
	}

	pub fn subscribed(&self) -> Vec<String> {
		self.feeds.lock().keys().cloned().collect()
	}

	pub fn updates(&self) -> usize {
		*self.updates.lock()
	}
}

#[async_trait::async_trait]
impl FeedReader for MemoryReader {
	fn feeds(&self) -> reader::Result<Vec<ReaderFeed>> {
		Ok(self.feeds.lock().values().cloned().collect())
	}

	fn add_feed(&self, url: &str) -> reader::Result<()> {
		let mut feeds = self.feeds.lock();
		if feeds.contains_key(url) {
			return Err(reader::Error::FeedExists(url.to_owned()));
		}
		feeds.insert(
			url.to_owned(),
			ReaderFeed {
				url: url.to_owned(),
				title: None,
				link: None,
			},
		);
		Ok(())
	}

	fn delete_feed(&self, url: &str) -> reader::Result<()> {
		if self.feeds.lock().remove(url).is_none() {
			return Err(reader::Error::FeedNotFound(url.to_owned()));
		}
		self.entries.lock().retain(|entry| entry.feed_url != url);
		Ok(())
	}

	async fn update_feeds(&self) -> reader::Result<UpdateSummary> {
		*self.updates.lock() += 1;
		Ok(UpdateSummary {
			updated: self.feeds.lock().len(),
			failed: 0,
		})
	}

	fn entries(
		&self,
		feed_url: &str,
		_newer_than: Option<OffsetDateTime>,
	) -> reader::Result<Vec<ReaderEntry>> {
		Ok(self
			.entries
			.lock()
			.iter()
			.filter(|entry| entry.feed_url == feed_url)
			.cloned()
			.collect())
	}
}

pub fn ressources_with(config: Config, reader: Arc<MemoryReader>) -> RessourcesRef {
	let store = open_store(":memory:").unwrap();
	Ressources::with_reader(config, store, reader, reqwest::Client::new()).unwrap()
}

pub fn ressources() -> (RessourcesRef, Arc<MemoryReader>) {
	let reader = Arc::new(MemoryReader::default());
	(ressources_with(Config::default(), reader.clone()), reader)
}
