//! Finding feed urls advertised by a web page.

use std::{sync::LazyLock, time::Duration};

use itertools::Itertools;
use regex::Regex;
use reqwest::Client;
use url::Url;

pub const DEFAULT_TOP_K: usize = 3;

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

static LINK_TAG: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?is)<link\b[^>]*>").expect("static regex"));
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r#"(?is)\b([a-z-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("static regex")
});

/// Candidate feed urls for `url`, at most `top_k` of them.
///
/// A page that is itself a feed is its only candidate. Pages that cannot be
/// fetched have none.
pub async fn discover_feeds(client: &Client, url: &str, top_k: usize) -> Vec<String> {
	let body = match fetch_page(client, url).await {
		Ok(body) => body,
		Err(err) => {
			tracing::debug!(url = %url, err = %err, "could not fetch page for discovery");
			return Vec::new();
		}
	};

	let candidates = candidates_from_page(&body, url, top_k);
	if candidates.is_empty() {
		tracing::warn!(url = %url, "no feed found on page");
	} else {
		tracing::debug!(url = %url, count = candidates.len(), "discovered feeds");
	}
	candidates
}

async fn fetch_page(client: &Client, url: &str) -> reqwest::Result<String> {
	client
		.get(url)
		.timeout(DISCOVERY_TIMEOUT)
		.send()
		.await?
		.error_for_status()?
		.text()
		.await
}

/// Feed urls found in an already fetched page body.
pub fn candidates_from_page(body: &str, page_url: &str, top_k: usize) -> Vec<String> {
	if feed_rs::parser::parse(body.as_bytes()).is_ok() {
		return vec![page_url.to_owned()];
	}

	let base = Url::parse(page_url).ok();
	LINK_TAG
		.find_iter(body)
		.filter_map(|tag| feed_href(tag.as_str()))
		.filter_map(|href| match &base {
			Some(base) => base.join(href).map(String::from).ok(),
			None => Url::parse(href).map(String::from).ok(),
		})
		.unique()
		.take(top_k)
		.collect()
}

/// `href` of a `<link>` tag whose type names a feed format.
fn feed_href(tag: &str) -> Option<&str> {
	let mut link_type = None;
	let mut href = None;
	for caps in ATTRIBUTE.captures_iter(tag) {
		let value = caps.get(2).or_else(|| caps.get(3)).map(|value| value.as_str());
		match caps[1].to_ascii_lowercase().as_str() {
			"type" => link_type = value,
			"href" => href = value,
			_ => {}
		}
	}

	let is_feed = link_type.is_some_and(|kind| {
		let kind = kind.to_ascii_lowercase();
		kind.contains("rss") || kind.contains("atom") || kind.contains("xml")
	});
	href.map(str::trim).filter(|href| is_feed && !href.is_empty())
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use wiremock::{
		Mock, MockServer, ResponseTemplate,
		matchers::{method, path},
	};

	use super::*;

	const PAGE: &str = r#"<!doctype html>
<html><head>
  <link rel="stylesheet" href="/style.css">
  <link rel="alternate" type="application/rss+xml" title="RSS" href="/feed.xml">
  <LINK REL='alternate' TYPE='application/atom+xml' HREF='https://cdn.example.com/atom.xml'>
  <link rel="alternate" type="application/rss+xml" href="/feed.xml">
  <link rel="alternate" type="text/xml" href="comments.xml">
</head><body>hello</body></html>"#;

	#[test]
	fn link_tags_are_resolved_and_deduped() {
		let found = candidates_from_page(PAGE, "https://example.com/blog/", 10);
		assert_eq!(
			found,
			[
				"https://example.com/feed.xml",
				"https://cdn.example.com/atom.xml",
				"https://example.com/blog/comments.xml",
			]
		);
	}

	#[test]
	fn candidates_are_capped() {
		let found = candidates_from_page(PAGE, "https://example.com/", DEFAULT_TOP_K - 1);
		assert_eq!(found.len(), 2);
	}

	#[test]
	fn feeds_are_their_own_candidate() {
		let rss = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>t</title></channel></rss>"#;
		assert_eq!(
			candidates_from_page(rss, "https://example.com/rss", 3),
			["https://example.com/rss"]
		);
	}

	#[tokio::test]
	async fn unreachable_pages_have_no_candidates() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/"))
			.respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/missing"))
			.respond_with(ResponseTemplate::new(500))
			.mount(&server)
			.await;

		let client = Client::new();
		let found = discover_feeds(&client, &format!("{}/", server.uri()), 3).await;
		assert_eq!(found.len(), 3);
		assert_eq!(found[0], format!("{}/feed.xml", server.uri()));

		assert!(discover_feeds(&client, &format!("{}/missing", server.uri()), 3).await.is_empty());
	}
}
