//! Canonical forms for urls used as storage and dedup keys.

use std::{borrow::Cow, collections::BTreeMap, sync::LazyLock};

use regex::{Captures, Regex};
use url::{ParseError, Url};

/// Rewrites `raw` into the single canonical form of the resource it names.
///
/// Two urls that only differ by query parameter order, host case, an
/// explicit default port or a fragment normalize to the same string. The
/// path is kept as is, trailing slash included. Input that cannot be parsed
/// as a url comes back trimmed and unescaped.
#[must_use]
pub fn normalize_url(raw: &str) -> String {
	let unescaped = unescape_fully(raw.trim());
	if unescaped.is_empty() {
		return String::new();
	}

	let mut url = match Url::parse(&unescaped) {
		Ok(url) if url.has_host() => url,
		Ok(_) | Err(ParseError::RelativeUrlWithoutBase) => {
			match Url::parse(&format!("http://{}", unescaped.trim_start_matches('/'))) {
				Ok(url) => url,
				Err(_) => return unescaped.into_owned(),
			}
		}
		Err(_) => return unescaped.into_owned(),
	};

	// `Url` already lowercases scheme and host and drops default ports
	if url.path().is_empty() {
		url.set_path("/");
	}

	let params = url
		.query_pairs()
		.map(|(key, value)| (key.into_owned(), value.into_owned()))
		.collect::<BTreeMap<_, _>>();
	if params.is_empty() {
		url.set_query(None);
	} else {
		url.query_pairs_mut().clear().extend_pairs(&params);
	}

	url.set_fragment(None);
	url.into()
}

/// Decodes html entities until none is left, so `&amp;amp;` ends up as `&`.
fn unescape_fully(raw: &str) -> Cow<'_, str> {
	let mut current = html_escape::decode_html_entities(raw);
	loop {
		let next = html_escape::decode_html_entities(&current).into_owned();
		if next == current {
			return current;
		}
		current = Cow::Owned(next);
	}
}

/// Host of `link`, lowercased. `None` when the link has no parseable host.
#[must_use]
pub fn host_of(link: &str) -> Option<String> {
	Url::parse(link.trim())
		.ok()?
		.host_str()
		.filter(|host| !host.is_empty())
		.map(str::to_ascii_lowercase)
}

static XML_URL_ATTR: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r#"xmlUrl=(?:"([^"]*)"|'([^']*)')"#).expect("static regex"));
static TEXT_WITH_AMP: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r">([^<]*&[^<]*)<").expect("static regex"));

/// Escapes ampersands that do not start an entity or a character reference.
///
/// Only feed url attributes and element text are touched, which is where
/// feed export tools tend to leave raw `&`.
#[must_use]
pub fn repair_ampersands(xml: &str) -> Cow<'_, str> {
	if !xml.contains('&') {
		return Cow::Borrowed(xml);
	}

	let attrs_fixed = XML_URL_ATTR.replace_all(xml, |caps: &Captures<'_>| match (caps.get(1), caps.get(2)) {
		(Some(value), _) => format!(r#"xmlUrl="{}""#, escape_bare_ampersands(value.as_str())),
		(None, Some(value)) => format!("xmlUrl='{}'", escape_bare_ampersands(value.as_str())),
		(None, None) => caps[0].to_owned(),
	});
	let text_fixed = TEXT_WITH_AMP
		.replace_all(&attrs_fixed, |caps: &Captures<'_>| {
			format!(">{}<", escape_bare_ampersands(&caps[1]))
		})
		.into_owned();

	if text_fixed == xml {
		Cow::Borrowed(xml)
	} else {
		Cow::Owned(text_fixed)
	}
}

fn escape_bare_ampersands(value: &str) -> Cow<'_, str> {
	let mut out = String::with_capacity(value.len());
	let mut rest = value;
	let mut changed = false;

	while let Some(pos) = rest.find('&') {
		out.push_str(&rest[..pos]);
		let tail = &rest[pos..];
		if starts_reference(tail) {
			out.push('&');
		} else {
			out.push_str("&amp;");
			changed = true;
		}
		rest = &tail[1..];
	}
	out.push_str(rest);

	if changed {
		Cow::Owned(out)
	} else {
		Cow::Borrowed(value)
	}
}

/// `tail` starts with `&`; checks it opens a predefined entity or a numeric reference.
fn starts_reference(tail: &str) -> bool {
	const ENTITIES: [&str; 5] = ["&amp;", "&lt;", "&gt;", "&quot;", "&apos;"];
	if ENTITIES.iter().any(|entity| tail.starts_with(entity)) {
		return true;
	}

	let Some(reference) = tail.strip_prefix("&#") else {
		return false;
	};
	let Some(end) = reference.find(';') else {
		return false;
	};
	let body = &reference[..end];
	match body.strip_prefix(['x', 'X']) {
		Some(hex) => !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()),
		None => !body.is_empty() && body.chars().all(|c| c.is_ascii_digit()),
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use proptest::prelude::*;

	use super::*;

	#[test]
	fn variants_share_one_canonical_form() {
		let canonical = "http://example.com/feed?a=1&b=2";
		assert_eq!(normalize_url("HTTP://Example.com:80/feed?b=2&a=1#x"), canonical);
		assert_eq!(normalize_url("http://example.com/feed?a=1&b=2"), canonical);
		assert_eq!(normalize_url("http://EXAMPLE.COM/feed?b=2&a=1"), canonical);
		assert_eq!(normalize_url("http://example.com/feed?a=1&b=2#top"), canonical);
	}

	#[test]
	fn https_default_port_is_dropped_and_others_kept() {
		assert_eq!(
			normalize_url("https://example.com:443/rss"),
			"https://example.com/rss"
		);
		assert_eq!(
			normalize_url("https://example.com:8443/rss"),
			"https://example.com:8443/rss"
		);
		assert_eq!(
			normalize_url("http://example.com:443/rss"),
			"http://example.com:443/rss"
		);
	}

	#[test]
	fn missing_scheme_defaults_to_http() {
		assert_eq!(normalize_url("example.com/feed"), "http://example.com/feed");
		assert_eq!(normalize_url("//example.com/feed"), "http://example.com/feed");
	}

	#[test]
	fn path_is_defaulted_but_otherwise_preserved() {
		assert_eq!(normalize_url("http://example.com"), "http://example.com/");
		assert_eq!(normalize_url("http://example.com/feed/"), "http://example.com/feed/");
		assert_eq!(normalize_url("http://example.com/Feed"), "http://example.com/Feed");
	}

	#[test]
	fn duplicate_query_keys_keep_last_value() {
		assert_eq!(
			normalize_url("http://example.com/?tag=a&x=1&tag=b"),
			"http://example.com/?tag=b&x=1"
		);
		assert_eq!(normalize_url("http://example.com/?flag"), "http://example.com/?flag=");
		assert_eq!(normalize_url("http://example.com/?"), "http://example.com/");
	}

	#[test]
	fn html_entities_are_unescaped_first() {
		assert_eq!(
			normalize_url("https://hnrss.org/frontpage?points=200&amp;count=50"),
			"https://hnrss.org/frontpage?count=50&points=200"
		);
	}

	#[test]
	fn entity_text_in_the_path_is_stable() {
		for raw in ["http://x.com/a&amp;amp;b", "http://x.com/p&amp;lt;q", " http://exa mple.com/&amp;amp; "] {
			let once = normalize_url(raw);
			assert_eq!(normalize_url(&once), once, "{raw}");
		}
		assert_eq!(normalize_url("http://x.com/a&amp;amp;b"), "http://x.com/a&b");
		assert_eq!(normalize_url("http://x.com/p&amp;lt;q"), "http://x.com/p%3Cq");
	}

	#[test]
	fn unparseable_input_is_returned_trimmed() {
		assert_eq!(normalize_url("  "), "");
		assert_eq!(normalize_url(" http://exa mple.com "), "http://exa mple.com");
	}

	#[test]
	fn host_is_lowercased() {
		assert_eq!(host_of("https://News.Example.com/a"), Some("news.example.com".into()));
		assert_eq!(host_of("not a link"), None);
		assert_eq!(host_of(""), None);
	}

	#[test]
	fn bare_ampersand_in_feed_url_is_escaped() {
		let xml = r#"<outline text="x" xmlUrl="http://x.com/a&b"/>"#;
		assert_eq!(
			repair_ampersands(xml),
			r#"<outline text="x" xmlUrl="http://x.com/a&amp;b"/>"#
		);
	}

	#[test]
	fn single_quoted_feed_url_is_escaped() {
		let xml = "<outline text='x' xmlUrl='http://x.com/?a=1&b=2'/>";
		assert_eq!(
			repair_ampersands(xml),
			"<outline text='x' xmlUrl='http://x.com/?a=1&amp;b=2'/>"
		);
	}

	#[test]
	fn references_are_left_alone() {
		let xml = r#"<title>A &amp; B &#38; C &#x26; D &lt;E&gt;</title>"#;
		assert!(matches!(repair_ampersands(xml), Cow::Borrowed(_)));
	}

	#[test]
	fn bare_ampersand_in_text_is_escaped() {
		assert_eq!(
			repair_ampersands("<title>Tips & Tricks &#12 done</title>"),
			"<title>Tips &amp; Tricks &amp;#12 done</title>"
		);
	}

	proptest! {
		#[test]
		fn normalization_is_idempotent(
			scheme in "(http|https|HTTP)",
			host in "[a-zA-Z]{1,10}\\.(com|org)",
			port in proptest::option::of(prop_oneof![Just(80u16), Just(443u16), 1024u16..9000]),
			segments in proptest::collection::vec(
				prop_oneof![
					"[a-z0-9]{0,6}",
					Just("&".to_owned()),
					Just("&amp;".to_owned()),
					Just("a&amp;amp;b".to_owned()),
					Just("p&amp;lt;q".to_owned()),
					Just("&#38;x".to_owned()),
				],
				0..4,
			),
			trailing_slash in any::<bool>(),
			query in proptest::collection::vec(("[a-c]{1,2}", "[a-z0-9 ;]{0,4}(&amp;)?"), 0..4),
			fragment in proptest::option::of("[a-z]{1,5}"),
		) {
			let mut raw = format!("{scheme}://{host}");
			if let Some(port) = port {
				raw.push_str(&format!(":{port}"));
			}
			for segment in &segments {
				raw.push('/');
				raw.push_str(segment);
			}
			if trailing_slash {
				raw.push('/');
			}
			if !query.is_empty() {
				let pairs = query.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>();
				raw.push('?');
				raw.push_str(&pairs.join("&"));
			}
			if let Some(fragment) = fragment {
				raw.push('#');
				raw.push_str(&fragment);
			}

			let once = normalize_url(&raw);
			prop_assert_eq!(normalize_url(&once), once);
		}
	}
}
