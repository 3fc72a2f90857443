use sha2::{Digest, Sha256};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{
	normalize::{host_of, normalize_url},
	reader::{RawTimestamp, ReaderEntry},
};

/// Brings any timestamp shape to a single UTC representation.
///
/// Epoch seconds that do not fit a date are treated as missing.
#[allow(clippy::cast_possible_truncation)]
pub fn normalize_timestamp(raw: RawTimestamp) -> Option<OffsetDateTime> {
	match raw {
		RawTimestamp::Epoch(secs) if secs.is_finite() => {
			let nanos = (secs * 1e9) as i128;
			OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
		}
		RawTimestamp::Epoch(_) => None,
		RawTimestamp::Naive(naive) => Some(naive.assume_utc()),
		RawTimestamp::Zoned(zoned) => Some(zoned.to_offset(time::UtcOffset::UTC)),
	}
}

/// Publication date of an entry, falling back to its last update.
pub fn published_or_updated(entry: &ReaderEntry) -> Option<OffsetDateTime> {
	entry
		.published
		.and_then(normalize_timestamp)
		.or_else(|| entry.updated.and_then(normalize_timestamp))
}

/// Stable identity of an entry across mirror runs.
///
/// The id the feed gave wins, then the canonical link, then a digest of what
/// is left.
pub fn entry_key(entry: &ReaderEntry) -> String {
	if let Some(id) = entry.id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
		return id.to_owned();
	}

	if let Some(link) = entry.link.as_deref().map(str::trim).filter(|link| !link.is_empty()) {
		let canonical = normalize_url(link);
		if !canonical.is_empty() {
			return canonical;
		}
	}

	let published = published_or_updated(entry)
		.and_then(|dt| dt.format(&Rfc3339).ok())
		.unwrap_or_default();
	let title = entry.title.as_deref().unwrap_or_default();

	let digest = Sha256::digest(format!("{}|{title}|{published}", entry.feed_url));
	digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Lowercase host of an entry link.
pub fn entry_domain(link: Option<&str>) -> Option<String> {
	link.and_then(host_of)
}
