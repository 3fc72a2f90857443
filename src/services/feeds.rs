use std::{
	collections::{BTreeMap, BTreeSet},
	io,
	path::Path,
};

use eyre::WrapErr;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Result, ServiceError};
use crate::{
	blacklist::{Blacklist, normalize_domain},
	config::SourcesConfig,
	database::models::{Feed, NewFeed},
	discovery,
	normalize::normalize_url,
	opml,
	repository::{BlacklistRepository, FeedRepository},
};

#[derive(Debug, Clone, Serialize)]
pub struct FeedList {
	pub feeds: Vec<Feed>,
	pub total: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
	pub added: usize,
	pub skipped: usize,
	pub total: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourcesSummary {
	pub from_feeds_file: usize,
	pub from_opml_file: usize,
	pub wanted_total: usize,
	pub added: usize,
	pub deleted: usize,
	pub kept: usize,
	pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoverSummary {
	pub source_url: String,
	pub candidates: Vec<String>,
	pub added: usize,
	pub skipped: usize,
}

#[derive(Debug, Default, Deserialize)]
struct SourcesFile {
	#[serde(default)]
	feeds: Vec<SourceFeed>,
}

#[derive(Debug, Deserialize)]
struct SourceFeed {
	url: String,
	title: Option<String>,
}

/// Manages the feed list and the blacklist.
pub struct FeedService<'a> {
	feeds: &'a dyn FeedRepository,
	blacklist: &'a dyn BlacklistRepository,
	sources: &'a SourcesConfig,
	client: &'a Client,
}

impl<'a> FeedService<'a> {
	pub fn new(
		feeds: &'a dyn FeedRepository,
		blacklist: &'a dyn BlacklistRepository,
		sources: &'a SourcesConfig,
		client: &'a Client,
	) -> Self {
		Self {
			feeds,
			blacklist,
			sources,
			client,
		}
	}

	pub fn list_feeds(&self, enabled: Option<bool>) -> Result<FeedList> {
		let feeds = self.feeds.list(enabled)?;
		Ok(FeedList {
			total: feeds.len(),
			feeds,
		})
	}

	pub fn add_feed(&self, url: &str, title: Option<&str>, enabled: bool) -> Result<Feed> {
		let url = normalize_url(url);
		if url.is_empty() {
			return Err(ServiceError::InvalidInput("feed url is empty".into()));
		}
		if self.blacklist.load()?.blocks(&url) {
			return Err(ServiceError::Blacklisted(url));
		}

		let mut new = NewFeed::from_url(url.as_str());
		if let Some(title) = title.map(str::trim).filter(|title| !title.is_empty()) {
			new.title = title.into();
		}
		new.enabled = enabled;

		if !self.feeds.insert(&new)? {
			return Err(ServiceError::AlreadyExists(new.url.into_owned()));
		}
		tracing::info!(url = %new.url, "added feed");

		Ok(Feed {
			url: new.url.into_owned(),
			title: new.title.into_owned(),
			site_url: new.site_url.into_owned(),
			enabled,
		})
	}

	pub fn remove_feed(&self, url: &str) -> Result<()> {
		let url = normalize_url(url);
		if !self.feeds.delete(&url)? {
			return Err(ServiceError::NotFound(url));
		}
		tracing::info!(url = %url, "removed feed");
		Ok(())
	}

	pub fn set_enabled(&self, url: &str, enabled: bool) -> Result<Feed> {
		let url = normalize_url(url);
		if !self.feeds.set_enabled(&url, enabled)? {
			return Err(ServiceError::NotFound(url));
		}
		self.feeds.get(&url)?.ok_or(ServiceError::NotFound(url))
	}

	/// Adds every feed of an outline document that is neither banned nor known.
	pub fn import_opml(&self, raw: &[u8]) -> Result<ImportSummary> {
		let imported = opml::parse_feed_list(raw)?;
		let blacklist = self.blacklist.load()?;

		let mut summary = ImportSummary {
			total: imported.len(),
			..ImportSummary::default()
		};
		for feed in imported {
			if blacklist.blocks(&feed.url) {
				tracing::debug!(url = %feed.url, "skipping blacklisted feed");
				summary.skipped += 1;
				continue;
			}

			let mut new = NewFeed::from_url(feed.url.as_str());
			if let Some(title) = &feed.title {
				new.title = title.as_str().into();
			}
			if self.feeds.insert(&new)? {
				summary.added += 1;
			} else {
				summary.skipped += 1;
			}
		}

		tracing::info!(added = summary.added, skipped = summary.skipped, "imported outline document");
		Ok(summary)
	}

	pub fn export_opml(&self) -> Result<String> {
		let feeds = self.feeds.list(None)?;
		Ok(opml::generate(
			feeds.iter().map(|feed| (feed.url.as_str(), feed.title.as_str())),
		)?)
	}

	/// Brings the store in line with the configured source files.
	///
	/// With `delete_missing`, stored feeds the sources do not list are removed.
	pub fn sync_sources(&self, delete_missing: bool) -> Result<SourcesSummary> {
		let mut summary = SourcesSummary::default();
		let mut wanted = BTreeMap::<String, Option<String>>::new();

		if let Some(path) = &self.sources.feeds_file {
			let listed = read_feeds_file(path).map_err(ServiceError::Sources)?;
			summary.from_feeds_file = listed.len();
			for feed in listed {
				let url = normalize_url(&feed.url);
				if !url.is_empty() {
					wanted.entry(url).or_insert(feed.title);
				}
			}
		}

		if let Some(path) = &self.sources.opml_file {
			if let Some(raw) = read_optional(path).map_err(ServiceError::Sources)? {
				let listed = opml::parse_feed_list(&raw)?;
				summary.from_opml_file = listed.len();
				for feed in listed {
					wanted.entry(feed.url).or_insert(feed.title);
				}
			}
		}

		let blacklist = self.blacklist.load()?;
		wanted.retain(|url, _| {
			let blocked = blacklist.blocks(url);
			if blocked {
				summary.skipped += 1;
			}
			!blocked
		});
		summary.wanted_total = wanted.len();

		let stored = self
			.feeds
			.list(None)?
			.into_iter()
			.map(|feed| feed.url)
			.collect::<BTreeSet<_>>();

		for (url, title) in &wanted {
			if stored.contains(url) {
				summary.kept += 1;
				continue;
			}

			let mut new = NewFeed::from_url(url.as_str());
			if let Some(title) = title {
				new.title = title.as_str().into();
			}
			if self.feeds.insert(&new)? {
				summary.added += 1;
			}
		}

		if delete_missing {
			for url in stored.iter().filter(|url| !wanted.contains_key(*url)) {
				if self.feeds.delete(url)? {
					summary.deleted += 1;
				}
			}
		}

		tracing::info!(
			wanted = summary.wanted_total,
			added = summary.added,
			deleted = summary.deleted,
			"synced feed sources"
		);
		Ok(summary)
	}

	/// Adds the feeds advertised by the page at `url`.
	pub async fn discover_feeds(&self, url: &str, top_k: usize) -> Result<DiscoverSummary> {
		let source_url = url.trim();
		if source_url.is_empty() {
			return Err(ServiceError::InvalidInput("page url is empty".into()));
		}

		let candidates = discovery::discover_feeds(self.client, source_url, top_k)
			.await
			.into_iter()
			.map(|candidate| normalize_url(&candidate))
			.collect::<Vec<_>>();
		let blacklist = self.blacklist.load()?;

		let mut summary = DiscoverSummary {
			source_url: source_url.to_owned(),
			..DiscoverSummary::default()
		};
		for candidate in &candidates {
			if blacklist.blocks(candidate) {
				summary.skipped += 1;
				continue;
			}
			match self.feeds.insert(&NewFeed::from_url(candidate.as_str())) {
				Ok(true) => summary.added += 1,
				Ok(false) => summary.skipped += 1,
				Err(err) => {
					tracing::warn!(url = %candidate, err = %err, "could not add discovered feed");
					summary.skipped += 1;
				}
			}
		}
		summary.candidates = candidates;

		Ok(summary)
	}

	pub fn blacklist(&self) -> Result<Blacklist> {
		Ok(self.blacklist.load()?)
	}

	/// Returns `false` when the url was already banned.
	pub fn ban_feed(&self, url: &str) -> Result<bool> {
		if normalize_url(url).is_empty() {
			return Err(ServiceError::InvalidInput("feed url is empty".into()));
		}
		Ok(self.blacklist.add_feed(url)?)
	}

	/// Returns `false` when the domain was already banned.
	pub fn ban_domain(&self, domain: &str) -> Result<bool> {
		if normalize_domain(domain).is_empty() {
			return Err(ServiceError::InvalidInput("domain is empty".into()));
		}
		Ok(self.blacklist.add_domain(domain)?)
	}

	pub fn unban_feed(&self, url: &str) -> Result<()> {
		if !self.blacklist.remove_feed(url)? {
			return Err(ServiceError::NotFound(normalize_url(url)));
		}
		Ok(())
	}

	pub fn unban_domain(&self, domain: &str) -> Result<()> {
		if !self.blacklist.remove_domain(domain)? {
			return Err(ServiceError::NotFound(normalize_domain(domain)));
		}
		Ok(())
	}
}

fn read_optional(path: &Path) -> eyre::Result<Option<Vec<u8>>> {
	match std::fs::read(path) {
		Ok(raw) => Ok(Some(raw)),
		Err(err) if err.kind() == io::ErrorKind::NotFound => {
			tracing::debug!(path = %path.display(), "source file does not exist");
			Ok(None)
		}
		Err(err) => Err(err).wrap_err_with(|| format!("could not read {}", path.display())),
	}
}

fn read_feeds_file(path: &Path) -> eyre::Result<Vec<SourceFeed>> {
	let Some(raw) = read_optional(path)? else {
		return Ok(Vec::new());
	};
	let content = String::from_utf8(raw).wrap_err("feeds file is not utf-8")?;
	let file = toml::from_str::<SourcesFile>(&content)
		.wrap_err_with(|| format!("{} does not match the expected structure", path.display()))?;
	Ok(file.feeds)
}
