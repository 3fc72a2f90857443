use std::collections::BTreeSet;

use serde::Serialize;

use crate::normalize::{host_of, normalize_url};

/// Feed urls and domains that are never admitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Blacklist {
	pub feeds: BTreeSet<String>,
	pub domains: BTreeSet<String>,
}

impl Blacklist {
	pub fn new<F, D>(feeds: F, domains: D) -> Self
	where
		F: IntoIterator,
		F::Item: AsRef<str>,
		D: IntoIterator,
		D::Item: AsRef<str>,
	{
		Self {
			feeds: feeds
				.into_iter()
				.map(|url| normalize_url(url.as_ref()))
				.filter(|url| !url.is_empty())
				.collect(),
			domains: domains
				.into_iter()
				.map(|domain| normalize_domain(domain.as_ref()))
				.filter(|domain| !domain.is_empty())
				.collect(),
		}
	}

	/// Whether `url` is banned, either by its canonical form or by its host.
	///
	/// A banned domain also bans its subdomains.
	pub fn blocks(&self, url: &str) -> bool {
		let canonical = normalize_url(url);
		if self.feeds.contains(&canonical) {
			return true;
		}

		host_of(&canonical).is_some_and(|host| {
			self.domains.iter().any(|domain| {
				host == *domain
					|| host
						.strip_suffix(domain.as_str())
						.is_some_and(|prefix| prefix.ends_with('.'))
			})
		})
	}

	pub fn len(&self) -> usize {
		self.feeds.len() + self.domains.len()
	}

	pub fn is_empty(&self) -> bool {
		self.feeds.is_empty() && self.domains.is_empty()
	}
}

pub fn normalize_domain(domain: &str) -> String {
	domain.trim().trim_end_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn blacklist() -> Blacklist {
		Blacklist::new(
			["https://example.com/broken/feed.xml"],
			["Spam.Example.com"],
		)
	}

	#[test]
	fn feed_urls_match_in_canonical_form() {
		let bl = blacklist();
		assert!(bl.blocks("https://EXAMPLE.com:443/broken/feed.xml#top"));
		assert!(!bl.blocks("https://example.com/broken/feed.xml/"));
	}

	#[test]
	fn domains_match_themselves_and_subdomains() {
		let bl = blacklist();
		assert!(bl.blocks("http://spam.example.com/rss"));
		assert!(bl.blocks("http://eggs.spam.example.com/rss"));
		assert!(!bl.blocks("http://notspam.example.com/rss"));
		assert!(!bl.blocks("http://example.com/rss"));
	}

	#[test]
	fn empty_entries_are_ignored() {
		let bl = Blacklist::new([" "], [""]);
		assert!(bl.is_empty());
	}
}
