use diesel::{dsl, prelude::*};

use super::{BlacklistRepository, Result};
use crate::{
	blacklist::{Blacklist, normalize_domain},
	database::{
		PoolConnection, PooledConnection,
		schema::{blacklist_domain, blacklist_feed},
	},
	normalize::normalize_url,
};

#[derive(Debug, Clone)]
pub struct SqliteBlacklist {
	db_pool: PoolConnection,
}

impl SqliteBlacklist {
	pub const fn new(db_pool: PoolConnection) -> Self {
		Self { db_pool }
	}

	fn conn(&self) -> Result<PooledConnection> {
		Ok(self.db_pool.get()?)
	}

	/// Adds every entry of `seed` that is not banned yet.
	pub fn seed(&self, seed: &Blacklist) -> Result<usize> {
		let mut conn = self.conn()?;
		let added = conn.transaction::<_, diesel::result::Error, _>(|conn| {
			let mut added = 0;
			for url in &seed.feeds {
				added += dsl::insert_or_ignore_into(blacklist_feed::table)
					.values(blacklist_feed::url.eq(url))
					.execute(conn)?;
			}
			for domain in &seed.domains {
				added += dsl::insert_or_ignore_into(blacklist_domain::table)
					.values(blacklist_domain::domain.eq(domain))
					.execute(conn)?;
			}
			Ok(added)
		})?;
		Ok(added)
	}
}

impl BlacklistRepository for SqliteBlacklist {
	fn load(&self) -> Result<Blacklist> {
		let mut conn = self.conn()?;
		let feeds = blacklist_feed::table
			.select(blacklist_feed::url)
			.load::<String>(&mut conn)?;
		let domains = blacklist_domain::table
			.select(blacklist_domain::domain)
			.load::<String>(&mut conn)?;
		Ok(Blacklist::new(feeds, domains))
	}

	fn add_feed(&self, url: &str) -> Result<bool> {
		let mut conn = self.conn()?;
		let added = dsl::insert_or_ignore_into(blacklist_feed::table)
			.values(blacklist_feed::url.eq(normalize_url(url)))
			.execute(&mut conn)?;
		Ok(added > 0)
	}

	fn add_domain(&self, domain: &str) -> Result<bool> {
		let mut conn = self.conn()?;
		let added = dsl::insert_or_ignore_into(blacklist_domain::table)
			.values(blacklist_domain::domain.eq(normalize_domain(domain)))
			.execute(&mut conn)?;
		Ok(added > 0)
	}

	fn remove_feed(&self, url: &str) -> Result<bool> {
		let mut conn = self.conn()?;
		let removed = dsl::delete(blacklist_feed::table.find(normalize_url(url))).execute(&mut conn)?;
		Ok(removed > 0)
	}

	fn remove_domain(&self, domain: &str) -> Result<bool> {
		let mut conn = self.conn()?;
		let removed =
			dsl::delete(blacklist_domain::table.find(normalize_domain(domain))).execute(&mut conn)?;
		Ok(removed > 0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::database::open_store;

	#[test]
	fn entries_are_stored_in_canonical_form() {
		let repo = SqliteBlacklist::new(open_store(":memory:").unwrap());
		assert!(repo.add_feed("HTTP://Bad.com:80/feed#x").unwrap());
		assert!(!repo.add_feed("http://bad.com/feed").unwrap());
		assert!(repo.add_domain("Spam.COM").unwrap());

		let blacklist = repo.load().unwrap();
		assert!(blacklist.feeds.contains("http://bad.com/feed"));
		assert!(blacklist.blocks("https://www.spam.com/rss"));

		assert!(repo.remove_domain("spam.com").unwrap());
		assert!(!repo.remove_domain("spam.com").unwrap());
		assert!(!repo.load().unwrap().blocks("https://www.spam.com/rss"));
	}

	#[test]
	fn seeding_skips_known_entries() {
		let repo = SqliteBlacklist::new(open_store(":memory:").unwrap());
		repo.add_domain("spam.com").unwrap();

		let seed = Blacklist::new(["http://bad.com/feed"], ["spam.com", "eggs.com"]);
		assert_eq!(repo.seed(&seed).unwrap(), 2);
		assert_eq!(repo.load().unwrap().len(), 3);
	}
}
