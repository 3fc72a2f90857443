use std::collections::HashSet;

use opml::{Head, OPML, Outline};

use crate::normalize::{normalize_url, repair_ampersands};

const EXPORT_TITLE: &str = "Feeds Export";

#[derive(Debug, thiserror::Error)]
pub enum OpmlError {
	#[error("invalid outline document: {0}")]
	Invalid(#[from] opml::Error),
}

/// A feed listed in an outline document, with its url in canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedFeed {
	pub url: String,
	pub title: Option<String>,
}

/// Decodes an uploaded outline document, falling back to latin-1 for bytes that are not utf-8.
pub fn decode(raw: &[u8]) -> String {
	String::from_utf8(raw.to_vec())
		.unwrap_or_else(|_| raw.iter().map(|&byte| char::from(byte)).collect())
}

/// Lists every feed url of an outline document, at any nesting depth.
///
/// Urls are canonicalized and deduplicated, keeping the first occurrence.
pub fn parse_feed_list(raw: &[u8]) -> Result<Vec<ImportedFeed>, OpmlError> {
	let xml = decode(raw);
	let xml = repair_ampersands(&xml);
	let document = OPML::from_str(&xml)?;

	let mut seen = HashSet::new();
	let mut feeds = Vec::new();
	collect_feeds(&document.body.outlines, &mut seen, &mut feeds);
	Ok(feeds)
}

fn collect_feeds(outlines: &[Outline], seen: &mut HashSet<String>, feeds: &mut Vec<ImportedFeed>) {
	for outline in outlines {
		if let Some(xml_url) = outline.xml_url.as_deref() {
			let url = normalize_url(xml_url);
			if !url.is_empty() && seen.insert(url.clone()) {
				let title = outline
					.title
					.clone()
					.or_else(|| Some(outline.text.clone()))
					.filter(|title| !title.trim().is_empty());
				feeds.push(ImportedFeed { url, title });
			}
		}

		collect_feeds(&outline.outlines, seen, feeds);
	}
}

/// Renders `(url, title)` pairs as an OPML 2.0 document, sorted by url.
pub fn generate<'a, I>(feeds: I) -> Result<String, OpmlError>
where
	I: IntoIterator<Item = (&'a str, &'a str)>,
{
	let mut feeds = feeds.into_iter().collect::<Vec<_>>();
	feeds.sort_by_key(|(url, _)| *url);
	feeds.dedup_by_key(|(url, _)| *url);

	let mut document = OPML {
		head: Some(Head {
			title: Some(EXPORT_TITLE.into()),
			..Head::default()
		}),
		..OPML::default()
	};
	document.body.outlines = feeds
		.into_iter()
		.map(|(url, title)| Outline {
			text: title.to_owned(),
			title: Some(title.to_owned()),
			r#type: Some("rss".into()),
			xml_url: Some(url.to_owned()),
			..Outline::default()
		})
		.collect();

	Ok(document.to_string()?)
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	const NESTED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<opml version="2.0">
  <head><title>Subscriptions</title></head>
  <body>
    <outline text="AI" title="AI">
      <outline type="rss" text="OpenAI" title="OpenAI" xmlUrl="https://openai.com/blog/rss.xml"/>
      <outline type="rss" text="Hacker News" xmlUrl="https://hnrss.org/frontpage?points=200&amp;count=50"/>
    </outline>
    <outline text="Research">
      <outline text="Nested">
        <outline type="rss" text="BAIR" xmlUrl="https://BAIR.berkeley.edu/blog/feed.xml"/>
      </outline>
      <outline type="rss" text="OpenAI again" xmlUrl="https://openai.com:443/blog/rss.xml#dup"/>
    </outline>
  </body>
</opml>"#;

	#[test]
	fn walks_nested_outlines_and_dedupes() {
		let feeds = parse_feed_list(NESTED.as_bytes()).unwrap();
		assert_eq!(
			feeds,
			vec![
				ImportedFeed {
					url: "https://openai.com/blog/rss.xml".into(),
					title: Some("OpenAI".into()),
				},
				ImportedFeed {
					url: "https://hnrss.org/frontpage?count=50&points=200".into(),
					title: Some("Hacker News".into()),
				},
				ImportedFeed {
					url: "https://bair.berkeley.edu/blog/feed.xml".into(),
					title: Some("BAIR".into()),
				},
			]
		);
	}

	#[test]
	fn bare_ampersands_are_repaired_before_parsing() {
		let raw = r#"<?xml version="1.0"?>
<opml version="2.0">
  <head><title>Tips & Tricks</title></head>
  <body>
    <outline type="rss" text="x" xmlUrl="http://x.com/a&b"/>
  </body>
</opml>"#;

		let feeds = parse_feed_list(raw.as_bytes()).unwrap();
		assert_eq!(feeds.len(), 1);
		assert_eq!(feeds[0].url, "http://x.com/a&b");
	}

	#[test]
	fn malformed_documents_are_rejected() {
		assert!(parse_feed_list(b"<opml version=\"2.0\"><body>").is_err());
		assert!(parse_feed_list(b"not xml at all").is_err());
	}

	#[test]
	fn latin1_bytes_are_decoded() {
		assert_eq!(decode(b"caf\xe9"), "café");
	}

	#[test]
	fn exported_documents_parse_back() {
		let xml = generate([
			("https://b.example.com/feed", "B"),
			("https://a.example.com/feed?x=1&y=2", "A & co"),
			("https://b.example.com/feed", "B again"),
		])
		.unwrap();
		assert!(xml.contains(EXPORT_TITLE));

		let feeds = parse_feed_list(xml.as_bytes()).unwrap();
		let urls = feeds.iter().map(|feed| feed.url.as_str()).collect::<Vec<_>>();
		assert_eq!(
			urls,
			["https://a.example.com/feed?x=1&y=2", "https://b.example.com/feed"]
		);
		assert_eq!(feeds[0].title.as_deref(), Some("A & co"));
	}
}
