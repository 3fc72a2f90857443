use std::time::Duration;

use diesel::{
	connection::SimpleConnection,
	prelude::*,
	r2d2::{self, ConnectionManager, CustomizeConnection, Pool},
};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use eyre::{WrapErr, eyre};
use time::OffsetDateTime;

#[rustfmt::skip]
pub mod schema;
pub mod models;

pub type PoolConnection = r2d2::Pool<r2d2::ConnectionManager<SqliteConnection>>;
pub type PooledConnection = r2d2::PooledConnection<r2d2::ConnectionManager<SqliteConnection>>;

pub const STORE_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/store");

const MEMORY_DATABASE: &str = ":memory:";

#[derive(Debug, Clone, Copy)]
struct ConnectionOptions {
	busy_timeout: Duration,
}

impl CustomizeConnection<SqliteConnection, r2d2::Error> for ConnectionOptions {
	fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), r2d2::Error> {
		conn.batch_execute(&format!(
			"PRAGMA busy_timeout = {};",
			self.busy_timeout.as_millis()
		))
		.map_err(r2d2::Error::QueryError)
	}
}

/// Opens a pool on the given sqlite database and brings its schema up to date.
///
/// An in-memory database only lives as long as its connection, so `:memory:`
/// pools hold exactly one connection.
pub fn open_pool(database_url: &str, migrations: EmbeddedMigrations) -> eyre::Result<PoolConnection> {
	let manager = ConnectionManager::<SqliteConnection>::new(database_url);
	let mut builder = Pool::builder().connection_customizer(Box::new(ConnectionOptions {
		busy_timeout: Duration::from_secs(5),
	}));
	if database_url == MEMORY_DATABASE {
		builder = builder.max_size(1);
	}

	let pool = builder
		.build(manager)
		.wrap_err("could not build database connection pool")?;

	let mut conn = pool.get().wrap_err("could not obtain a connection handle")?;
	let applied = conn
		.run_pending_migrations(migrations)
		.map_err(|err| eyre!(err))
		.wrap_err("could not run database migrations")?;
	if !applied.is_empty() {
		tracing::info!(database = %database_url, count = applied.len(), "applied migrations");
	}

	Ok(pool)
}

/// Opens the mirror store.
pub fn open_store(database_url: &str) -> eyre::Result<PoolConnection> {
	open_pool(database_url, STORE_MIGRATIONS)
}

pub(crate) fn to_unix(dt: OffsetDateTime) -> i64 {
	dt.unix_timestamp()
}

pub(crate) fn from_unix(ts: i64) -> Option<OffsetDateTime> {
	OffsetDateTime::from_unix_timestamp(ts).ok()
}
