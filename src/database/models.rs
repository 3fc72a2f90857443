use std::borrow::Cow;

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::database::{from_unix, schema::*, to_unix};

/// A feed known to the store, keyed by its canonical url.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = feed, check_for_backend(diesel::sqlite::Sqlite))]
pub struct Feed {
	pub url: String,
	pub title: String,
	pub site_url: String,
	pub enabled: bool,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = feed)]
pub struct NewFeed<'a> {
	pub url: Cow<'a, str>,
	pub title: Cow<'a, str>,
	pub site_url: Cow<'a, str>,
	pub enabled: bool,
}

impl<'a> NewFeed<'a> {
	/// A feed whose title and site default to its own url.
	pub fn from_url(url: impl Into<Cow<'a, str>>) -> Self {
		let url = url.into();
		Self {
			title: url.clone(),
			site_url: url.clone(),
			url,
			enabled: true,
		}
	}
}

/// One mirrored entry, as written to and read back from the entry collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryDocument {
	#[serde(rename = "id")]
	pub key: String,
	pub feed_url: String,
	pub title: Option<String>,
	pub link: Option<String>,
	#[serde(with = "time::serde::rfc3339::option")]
	pub published: Option<OffsetDateTime>,
	#[serde(with = "time::serde::rfc3339::option")]
	pub updated: Option<OffsetDateTime>,
	pub authors: Vec<String>,
	pub summary: Option<String>,
	pub domain: Option<String>,
	#[serde(with = "time::serde::rfc3339")]
	pub mirrored_at: OffsetDateTime,
}

#[derive(Debug, Clone, Insertable, Queryable, Selectable)]
#[diesel(table_name = entry, check_for_backend(diesel::sqlite::Sqlite))]
pub struct EntryRow {
	pub id: String,
	pub feed_url: String,
	pub title: Option<String>,
	pub link: Option<String>,
	pub published: Option<i64>,
	pub updated: Option<i64>,
	pub authors: String,
	pub summary: Option<String>,
	pub domain: Option<String>,
	pub mirrored_at: i64,
}

impl EntryRow {
	pub fn from_document(doc: &EntryDocument) -> serde_json::Result<Self> {
		Ok(Self {
			id: doc.key.clone(),
			feed_url: doc.feed_url.clone(),
			title: doc.title.clone(),
			link: doc.link.clone(),
			published: doc.published.map(to_unix),
			updated: doc.updated.map(to_unix),
			authors: serde_json::to_string(&doc.authors)?,
			summary: doc.summary.clone(),
			domain: doc.domain.clone(),
			mirrored_at: to_unix(doc.mirrored_at),
		})
	}

	pub fn into_document(self) -> serde_json::Result<EntryDocument> {
		Ok(EntryDocument {
			key: self.id,
			feed_url: self.feed_url,
			title: self.title,
			link: self.link,
			published: self.published.and_then(from_unix),
			updated: self.updated.and_then(from_unix),
			authors: serde_json::from_str(&self.authors)?,
			summary: self.summary,
			domain: self.domain,
			mirrored_at: from_unix(self.mirrored_at).unwrap_or(OffsetDateTime::UNIX_EPOCH),
		})
	}
}

#[cfg(test)]
mod tests {
	use time::macros::datetime;

	use super::*;

	#[test]
	fn entry_row_keeps_document_fields() {
		let doc = EntryDocument {
			key: "urn:entry:1".into(),
			feed_url: "http://example.com/feed".into(),
			title: Some("Hello".into()),
			link: Some("http://example.com/hello".into()),
			published: Some(datetime!(2024-03-01 12:00 UTC)),
			updated: None,
			authors: vec!["Ada".into(), "Grace".into()],
			summary: None,
			domain: Some("example.com".into()),
			mirrored_at: datetime!(2024-03-02 08:30 UTC),
		};

		let row = EntryRow::from_document(&doc).unwrap();
		assert_eq!(row.authors, r#"["Ada","Grace"]"#);
		assert_eq!(row.published, Some(1_709_294_400));

		assert_eq!(row.into_document().unwrap(), doc);
	}
}
