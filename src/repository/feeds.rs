use diesel::{dsl, prelude::*, result::DatabaseErrorKind};

use super::{FeedRepository, Result, Upserted};
use crate::database::{
	PoolConnection, PooledConnection,
	models::{Feed, NewFeed},
	schema::feed,
};

#[derive(Debug, Clone)]
pub struct SqliteFeeds {
	db_pool: PoolConnection,
}

impl SqliteFeeds {
	pub const fn new(db_pool: PoolConnection) -> Self {
		Self { db_pool }
	}

	fn conn(&self) -> Result<PooledConnection> {
		Ok(self.db_pool.get()?)
	}

	fn upsert_metadata_with_conn(
		conn: &mut PooledConnection,
		url: &str,
		title: &str,
		site_url: &str,
	) -> diesel::QueryResult<Upserted> {
		let existing = feed::table
			.find(url)
			.select(Feed::as_select())
			.first(conn)
			.optional()?;

		match existing {
			None => {
				NewFeed {
					url: url.into(),
					title: title.into(),
					site_url: site_url.into(),
					enabled: true,
				}
				.insert_into(feed::table)
				.execute(conn)?;
				Ok(Upserted::Inserted)
			}
			Some(stored) if stored.title == title && stored.site_url == site_url => {
				Ok(Upserted::Unchanged)
			}
			Some(_) => {
				dsl::update(feed::table.find(url))
					.set((feed::title.eq(title), feed::site_url.eq(site_url)))
					.execute(conn)?;
				Ok(Upserted::Modified)
			}
		}
	}
}

impl FeedRepository for SqliteFeeds {
	fn list(&self, enabled: Option<bool>) -> Result<Vec<Feed>> {
		let mut conn = self.conn()?;
		let mut query = feed::table.select(Feed::as_select()).into_boxed();
		if let Some(enabled) = enabled {
			query = query.filter(feed::enabled.eq(enabled));
		}
		Ok(query.order(feed::url.asc()).load(&mut conn)?)
	}

	fn get(&self, url: &str) -> Result<Option<Feed>> {
		let mut conn = self.conn()?;
		Ok(feed::table
			.find(url)
			.select(Feed::as_select())
			.first(&mut conn)
			.optional()?)
	}

	fn insert(&self, new: &NewFeed<'_>) -> Result<bool> {
		let mut conn = self.conn()?;
		match new.insert_into(feed::table).execute(&mut conn) {
			Ok(1) => Ok(true),
			Ok(_)
			| Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => Ok(false),
			Err(err) => Err(err.into()),
		}
	}

	fn delete(&self, url: &str) -> Result<bool> {
		let mut conn = self.conn()?;
		let deleted = dsl::delete(feed::table.find(url)).execute(&mut conn)?;
		Ok(deleted > 0)
	}

	fn set_enabled(&self, url: &str, enabled: bool) -> Result<bool> {
		let mut conn = self.conn()?;
		let updated = dsl::update(feed::table.find(url))
			.set(feed::enabled.eq(enabled))
			.execute(&mut conn)?;
		Ok(updated > 0)
	}

	fn upsert_metadata(&self, url: &str, title: &str, site_url: &str) -> Result<Upserted> {
		let mut conn = self.conn()?;
		let upserted = conn.transaction(|conn| Self::upsert_metadata_with_conn(conn, url, title, site_url))?;
		Ok(upserted)
	}

	fn count(&self) -> Result<u64> {
		let mut conn = self.conn()?;
		let count = feed::table.count().get_result::<i64>(&mut conn)?;
		Ok(count.unsigned_abs())
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;
	use crate::database::open_store;

	fn feeds() -> SqliteFeeds {
		SqliteFeeds::new(open_store(":memory:").unwrap())
	}

	#[test]
	fn inserting_twice_keeps_the_first_record() {
		let repo = feeds();
		assert!(repo.insert(&NewFeed::from_url("http://a.com/feed")).unwrap());

		let mut again = NewFeed::from_url("http://a.com/feed");
		again.title = "Other".into();
		assert!(!repo.insert(&again).unwrap());

		let stored = repo.get("http://a.com/feed").unwrap().unwrap();
		assert_eq!(stored.title, "http://a.com/feed");
		assert_eq!(stored.site_url, "http://a.com/feed");
		assert!(stored.enabled);
	}

	#[test]
	fn list_filters_on_enabled_flag() {
		let repo = feeds();
		repo.insert(&NewFeed::from_url("http://b.com/feed")).unwrap();
		repo.insert(&NewFeed::from_url("http://a.com/feed")).unwrap();
		assert!(repo.set_enabled("http://b.com/feed", false).unwrap());
		assert!(!repo.set_enabled("http://missing.com/feed", false).unwrap());

		let all = repo.list(None).unwrap();
		assert_eq!(all[0].url, "http://a.com/feed");
		assert_eq!(all.len(), 2);

		let disabled = repo.list(Some(false)).unwrap();
		assert_eq!(disabled.len(), 1);
		assert_eq!(disabled[0].url, "http://b.com/feed");
		assert_eq!(repo.count().unwrap(), 2);
	}

	#[test]
	fn metadata_upsert_keeps_enabled_flag() {
		let repo = feeds();
		assert_eq!(
			repo.upsert_metadata("http://a.com/feed", "A", "http://a.com/").unwrap(),
			Upserted::Inserted
		);
		repo.set_enabled("http://a.com/feed", false).unwrap();

		assert_eq!(
			repo.upsert_metadata("http://a.com/feed", "A", "http://a.com/").unwrap(),
			Upserted::Unchanged
		);
		assert_eq!(
			repo.upsert_metadata("http://a.com/feed", "A blog", "http://a.com/").unwrap(),
			Upserted::Modified
		);

		let stored = repo.get("http://a.com/feed").unwrap().unwrap();
		assert_eq!(stored.title, "A blog");
		assert!(!stored.enabled);
	}

	#[test]
	fn delete_reports_missing_feeds() {
		let repo = feeds();
		repo.insert(&NewFeed::from_url("http://a.com/feed")).unwrap();
		assert!(repo.delete("http://a.com/feed").unwrap());
		assert!(!repo.delete("http://a.com/feed").unwrap());
	}
}
