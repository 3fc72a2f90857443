use std::time::Duration;

use diesel::{dsl, prelude::*, result::DatabaseErrorKind};
use diesel_migrations::{EmbeddedMigrations, embed_migrations};
use eyre::WrapErr;
use feed_rs::{model, parser};
use reqwest::Client;
use time::OffsetDateTime;

use super::{
	Error, FeedReader, RawTimestamp, ReaderEntry, ReaderFeed, Result, UpdateSummary,
	schema::{reader_entry, reader_feed},
};
use crate::{
	database::{PoolConnection, open_pool},
	mirror::{entry_key, normalize_timestamp},
};

pub const READER_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/reader");

/// Builds the client used for every outgoing request.
pub fn http_client(timeout: Duration) -> eyre::Result<Client> {
	let user_agent = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
	Client::builder()
		.user_agent(user_agent)
		.timeout(timeout)
		.build()
		.wrap_err("could not build client")
}

/// Polls feeds over http and keeps what it fetched in its own sqlite cache.
#[derive(Debug, Clone)]
pub struct CachedReader {
	client: Client,
	db_pool: PoolConnection,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = reader_feed, check_for_backend(diesel::sqlite::Sqlite))]
struct CachedFeed {
	url: String,
	title: Option<String>,
	link: Option<String>,
}

#[derive(Debug, Insertable, Queryable, Selectable)]
#[diesel(table_name = reader_entry, check_for_backend(diesel::sqlite::Sqlite))]
struct CachedEntry {
	feed_url: String,
	id: String,
	title: Option<String>,
	link: Option<String>,
	published: Option<i64>,
	updated: Option<i64>,
	authors: String,
	summary: Option<String>,
}

impl CachedEntry {
	fn from_model(feed_url: &str, entry: model::Entry) -> Result<Self> {
		let mut fetched = reader_entry(feed_url, entry);
		let id = fetched.id.take().unwrap_or_else(|| entry_key(&fetched));
		let unix = |raw: Option<RawTimestamp>| {
			raw.and_then(normalize_timestamp)
				.map(OffsetDateTime::unix_timestamp)
		};

		Ok(Self {
			id,
			published: unix(fetched.published),
			updated: unix(fetched.updated),
			authors: serde_json::to_string(&fetched.authors)?,
			feed_url: fetched.feed_url,
			title: fetched.title,
			link: fetched.link,
			summary: fetched.summary,
		})
	}

	fn into_reader_entry(self) -> Result<ReaderEntry> {
		Ok(ReaderEntry {
			feed_url: self.feed_url,
			id: Some(self.id),
			title: self.title,
			link: self.link,
			published: self.published.map(|ts| RawTimestamp::Epoch(epoch_seconds(ts))),
			updated: self.updated.map(|ts| RawTimestamp::Epoch(epoch_seconds(ts))),
			authors: serde_json::from_str(&self.authors)?,
			summary: self.summary,
		})
	}
}

#[allow(clippy::cast_precision_loss)]
const fn epoch_seconds(ts: i64) -> f64 {
	ts as f64
}

/// Parses a feed body. Links are resolved against `base_uri`.
///
/// Entries without an id keep an empty one, their key is derived later from
/// what they carry.
pub fn parse_feed(body: &[u8], base_uri: &str) -> Result<model::Feed> {
	let parser = parser::Builder::new()
		.base_uri(Some(base_uri))
		.sanitize_content(true)
		.id_generator(|_, _, _| String::new())
		.build();
	Ok(parser.parse(body)?)
}

/// Downloads and parses the feed at `url`.
pub async fn fetch_feed(client: &Client, url: &str) -> Result<model::Feed> {
	let body = client
		.get(url)
		.send()
		.await?
		.error_for_status()?
		.bytes()
		.await?;

	parse_feed(&body, url)
}

/// A parsed entry as the polling side hands it out.
pub fn reader_entry(feed_url: &str, entry: model::Entry) -> ReaderEntry {
	ReaderEntry {
		feed_url: feed_url.to_owned(),
		id: Some(entry.id).filter(|id| !id.trim().is_empty()),
		title: entry.title.map(|text| text.content),
		link: entry.links.into_iter().next().map(|link| link.href),
		published: entry
			.published
			.map(|dt| RawTimestamp::Epoch(epoch_seconds(dt.timestamp()))),
		updated: entry
			.updated
			.map(|dt| RawTimestamp::Epoch(epoch_seconds(dt.timestamp()))),
		authors: entry.authors.into_iter().map(|person| person.name).collect(),
		summary: entry.summary.map(|text| text.content),
	}
}

impl CachedReader {
	pub fn setup(database_url: &str, client: Client) -> eyre::Result<Self> {
		let db_pool = open_pool(database_url, READER_MIGRATIONS)
			.wrap_err("could not open the reader cache")?;
		Ok(Self { client, db_pool })
	}

	fn feed_urls(&self) -> Result<Vec<String>> {
		let mut conn = self.db_pool.get()?;
		let urls = reader_feed::table
			.select(reader_feed::url)
			.order(reader_feed::url.asc())
			.load::<String>(&mut conn)?;
		Ok(urls)
	}

	fn on_fetched(&self, url: &str, feed: model::Feed) -> Result<usize> {
		let title = feed.title.map(|text| text.content);
		let link = feed
			.links
			.iter()
			.find(|link| link.href != url)
			.map(|link| link.href.clone());
		let rows = feed
			.entries
			.into_iter()
			.map(|entry| CachedEntry::from_model(url, entry))
			.collect::<Result<Vec<_>>>()?;

		let mut conn = self.db_pool.get()?;
		conn.transaction::<_, Error, _>(|conn| {
			dsl::update(reader_feed::table.find(url))
				.set((
					reader_feed::title.eq(title),
					reader_feed::link.eq(link),
					reader_feed::last_updated.eq(OffsetDateTime::now_utc().unix_timestamp()),
					reader_feed::last_error.eq(None::<String>),
				))
				.execute(conn)?;

			for row in &rows {
				dsl::replace_into(reader_entry::table)
					.values(row)
					.execute(conn)?;
			}

			Ok(())
		})?;

		Ok(rows.len())
	}

	fn on_failed(&self, url: &str, err: &Error) -> Result<()> {
		let mut conn = self.db_pool.get()?;
		dsl::update(reader_feed::table.find(url))
			.set(reader_feed::last_error.eq(err.to_string()))
			.execute(&mut conn)?;
		Ok(())
	}
}

#[async_trait::async_trait]
impl FeedReader for CachedReader {
	fn feeds(&self) -> Result<Vec<ReaderFeed>> {
		let mut conn = self.db_pool.get()?;
		let feeds = reader_feed::table
			.select(CachedFeed::as_select())
			.order(reader_feed::url.asc())
			.load(&mut conn)?
			.into_iter()
			.map(|feed| ReaderFeed {
				url: feed.url,
				title: feed.title,
				link: feed.link,
			})
			.collect();
		Ok(feeds)
	}

	fn add_feed(&self, url: &str) -> Result<()> {
		let mut conn = self.db_pool.get()?;
		let stmt = dsl::insert_into(reader_feed::table).values(reader_feed::url.eq(url));

		match stmt.execute(&mut conn) {
			Ok(_) => Ok(()),
			Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
				Err(Error::FeedExists(url.to_owned()))
			}
			Err(err) => Err(err.into()),
		}
	}

	fn delete_feed(&self, url: &str) -> Result<()> {
		let mut conn = self.db_pool.get()?;
		let deleted = conn.transaction::<_, diesel::result::Error, _>(|conn| {
			dsl::delete(reader_entry::table.filter(reader_entry::feed_url.eq(url)))
				.execute(conn)?;
			dsl::delete(reader_feed::table.find(url)).execute(conn)
		})?;

		if deleted == 0 {
			return Err(Error::FeedNotFound(url.to_owned()));
		}
		Ok(())
	}

	async fn update_feeds(&self) -> Result<UpdateSummary> {
		let mut summary = UpdateSummary::default();

		for url in self.feed_urls()? {
			match fetch_feed(&self.client, &url).await {
				Ok(feed) => {
					let entries = self.on_fetched(&url, feed)?;
					tracing::debug!(url = %url, entries, "sucessfully fetched feed");
					summary.updated += 1;
				}
				Err(err) => {
					tracing::warn!(url = %url, err = %err, "could not fetch feed");
					self.on_failed(&url, &err)?;
					summary.failed += 1;
				}
			}
		}

		Ok(summary)
	}

	fn entries(&self, feed_url: &str, newer_than: Option<OffsetDateTime>) -> Result<Vec<ReaderEntry>> {
		let mut conn = self.db_pool.get()?;

		let mut query = reader_entry::table
			.filter(reader_entry::feed_url.eq(feed_url))
			.into_boxed();
		if let Some(cutoff) = newer_than {
			let cutoff = cutoff.unix_timestamp();
			query = query.filter(
				reader_entry::published.ge(cutoff).or(reader_entry::published
					.is_null()
					.and(reader_entry::updated.ge(cutoff))),
			);
		}

		query
			.select(CachedEntry::as_select())
			.order(reader_entry::published.desc())
			.load(&mut conn)?
			.into_iter()
			.map(CachedEntry::into_reader_entry)
			.collect()
	}

	fn supports_newer_than(&self) -> bool {
		true
	}
}
