use std::collections::{BTreeMap, HashMap};

use diesel::{
	dsl,
	prelude::*,
	sql_types::{BigInt, Integer},
};
use time::OffsetDateTime;

use super::{BatchOutcome, DomainCount, EntryFilter, EntryRepository, FeedCount, Result};
use crate::database::{
	PoolConnection, PooledConnection, from_unix,
	models::{EntryDocument, EntryRow},
	schema::entry,
	to_unix,
};

/// Shown in place of entries whose link had no usable host.
pub const NO_DOMAIN: &str = "(none)";

#[derive(Debug, Clone)]
pub struct SqliteEntries {
	db_pool: PoolConnection,
}

#[derive(Debug, QueryableByName)]
struct WeekdayCount {
	#[diesel(sql_type = Integer)]
	weekday: i32,
	#[diesel(sql_type = BigInt)]
	count: i64,
}

impl SqliteEntries {
	pub const fn new(db_pool: PoolConnection) -> Self {
		Self { db_pool }
	}

	fn conn(&self) -> Result<PooledConnection> {
		Ok(self.db_pool.get()?)
	}

	fn replace_with_conn(conn: &mut PooledConnection, doc: &EntryDocument) -> Result<()> {
		let row = EntryRow::from_document(doc)?;
		dsl::replace_into(entry::table).values(&row).execute(conn)?;
		Ok(())
	}

	fn grouped_by_feed(
		conn: &mut PooledConnection,
		since: Option<i64>,
	) -> diesel::QueryResult<Vec<(String, i64)>> {
		match since {
			Some(since) => entry::table
				.filter(entry::published.ge(since))
				.group_by(entry::feed_url)
				.select((entry::feed_url, dsl::count_star()))
				.load(conn),
			None => entry::table
				.group_by(entry::feed_url)
				.select((entry::feed_url, dsl::count_star()))
				.load(conn),
		}
	}
}

impl EntryRepository for SqliteEntries {
	fn upsert_batch(&self, docs: &[EntryDocument]) -> Result<BatchOutcome> {
		let mut conn = self.conn()?;
		let outcome = conn.transaction::<_, diesel::result::Error, _>(|conn| {
			let mut outcome = BatchOutcome::default();
			for doc in docs {
				match Self::replace_with_conn(conn, doc) {
					Ok(()) => outcome.written += 1,
					Err(err) => {
						tracing::warn!(key = %doc.key, feed = %doc.feed_url, err = %err, "could not write entry");
						outcome.failed += 1;
					}
				}
			}
			Ok(outcome)
		})?;
		Ok(outcome)
	}

	fn get(&self, key: &str) -> Result<Option<EntryDocument>> {
		let mut conn = self.conn()?;
		let row = entry::table
			.find(key)
			.select(EntryRow::as_select())
			.first(&mut conn)
			.optional()?;
		Ok(row.map(EntryRow::into_document).transpose()?)
	}

	fn find(&self, filter: &EntryFilter) -> Result<Vec<EntryDocument>> {
		let mut conn = self.conn()?;

		let mut query = entry::table.select(EntryRow::as_select()).into_boxed();
		if let Some(feed_url) = &filter.feed_url {
			query = query.filter(entry::feed_url.eq(feed_url));
		}
		if let Some(domain) = &filter.domain {
			query = query.filter(entry::domain.eq(domain));
		}
		if let Some(since) = filter.since {
			query = query.filter(entry::published.ge(to_unix(since)));
		}

		let limit = i64::try_from(filter.limit).unwrap_or(i64::MAX);
		let rows = query
			.order((entry::published.desc(), entry::id.asc()))
			.limit(limit)
			.load(&mut conn)?;

		Ok(rows
			.into_iter()
			.map(EntryRow::into_document)
			.collect::<serde_json::Result<_>>()?)
	}

	fn count(&self) -> Result<u64> {
		let mut conn = self.conn()?;
		let count = entry::table.count().get_result::<i64>(&mut conn)?;
		Ok(count.unsigned_abs())
	}

	fn count_since(&self, since: OffsetDateTime) -> Result<u64> {
		let mut conn = self.conn()?;
		let count = entry::table
			.filter(entry::published.ge(to_unix(since)))
			.count()
			.get_result::<i64>(&mut conn)?;
		Ok(count.unsigned_abs())
	}

	fn top_domains(&self, since: OffsetDateTime, limit: usize) -> Result<Vec<DomainCount>> {
		let mut conn = self.conn()?;
		let groups = entry::table
			.filter(entry::published.ge(to_unix(since)))
			.group_by(entry::domain)
			.select((entry::domain, dsl::count_star()))
			.load::<(Option<String>, i64)>(&mut conn)?;

		let mut domains = groups
			.into_iter()
			.map(|(domain, count)| DomainCount {
				domain: domain.unwrap_or_else(|| NO_DOMAIN.to_owned()),
				count: count.unsigned_abs(),
			})
			.collect::<Vec<_>>();
		domains.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.domain.cmp(&b.domain)));
		domains.truncate(limit);
		Ok(domains)
	}

	fn feed_counts(&self, since: OffsetDateTime) -> Result<Vec<FeedCount>> {
		let mut conn = self.conn()?;
		let totals = Self::grouped_by_feed(&mut conn, None)?;
		let recent = Self::grouped_by_feed(&mut conn, Some(to_unix(since)))?
			.into_iter()
			.collect::<HashMap<_, _>>();

		Ok(totals
			.into_iter()
			.map(|(feed_url, total)| FeedCount {
				recent: recent.get(&feed_url).copied().unwrap_or_default().unsigned_abs(),
				total: total.unsigned_abs(),
				feed_url,
			})
			.collect())
	}

	fn weekday_histogram(&self) -> Result<BTreeMap<u8, u64>> {
		let mut conn = self.conn()?;
		let counts = diesel::sql_query(
			"SELECT CAST(strftime('%w', published, 'unixepoch') AS INTEGER) + 1 AS weekday, \
			 COUNT(*) AS count \
			 FROM entry WHERE published IS NOT NULL GROUP BY weekday",
		)
		.load::<WeekdayCount>(&mut conn)?;

		let mut histogram = (1..=7).map(|day| (day, 0)).collect::<BTreeMap<u8, u64>>();
		for WeekdayCount { weekday, count } in counts {
			if let Ok(day) = u8::try_from(weekday) {
				histogram.insert(day, count.unsigned_abs());
			}
		}
		Ok(histogram)
	}

	fn published_range(&self) -> Result<Option<(OffsetDateTime, OffsetDateTime)>> {
		let mut conn = self.conn()?;
		let (earliest, latest) = entry::table
			.select((dsl::min(entry::published), dsl::max(entry::published)))
			.get_result::<(Option<i64>, Option<i64>)>(&mut conn)?;

		Ok(earliest
			.and_then(from_unix)
			.zip(latest.and_then(from_unix)))
	}
}
