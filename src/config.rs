use std::{env::var, ops, path::PathBuf, sync::Arc, time::Duration};

use axum::extract::FromRequestParts;
use eyre::WrapErr;
use reqwest::Client;
use serde::Deserialize;

use crate::{
	blacklist::Blacklist,
	database::{PoolConnection, open_store},
	jobs::JobRegistry,
	reader::{CachedReader, FeedReader, http_client},
	repository::{SqliteBlacklist, SqliteEntries, SqliteFeeds},
	services::{CrawlerService, FeedService},
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
	pub server: ServerConfig,
	pub store: StoreConfig,
	pub reader: ReaderConfig,
	pub sources: SourcesConfig,
	pub blacklist: BlacklistConfig,
	pub discover: DiscoverConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
	pub port: u16,
	/// Origins allowed to call the api from a browser. Empty allows none.
	pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			port: 8000,
			cors_origins: Vec::new(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
	pub database_url: String,
}

impl Default for StoreConfig {
	fn default() -> Self {
		Self {
			database_url: "feedmirror.db".into(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
	pub database_url: String,
	pub timeout_secs: u64,
}

impl Default for ReaderConfig {
	fn default() -> Self {
		Self {
			database_url: "reader.db".into(),
			timeout_secs: 30,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
	/// TOML file listing `[[feeds]]` tables with an `url` and an optional `title`.
	pub feeds_file: Option<PathBuf>,
	pub opml_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BlacklistConfig {
	pub feeds: Vec<String>,
	pub domains: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DiscoverConfig {
	/// Pages scanned when discovery runs without an explicit url.
	pub targets: Vec<String>,
}

impl Config {
	pub fn load_file_from_env() -> eyre::Result<Self> {
		let config_path = var("FEEDMIRROR_CONFIG").unwrap_or_else(|_| "./config.toml".into());

		let config_content = std::fs::read_to_string(&config_path)
			.wrap_err_with(|| format!("could not read the config file at {config_path}"))?;
		let config = toml::from_str::<Self>(&config_content)
			.wrap_err("config file does not match the expect structure")?;

		Ok(config)
	}
}

pub struct Ressources {
	pub config: Config,
	pub feeds: SqliteFeeds,
	pub entries: SqliteEntries,
	pub blacklist: SqliteBlacklist,
	pub reader: Arc<dyn FeedReader>,
	pub http_client: Client,
	pub jobs: JobRegistry,
}

#[derive(Clone)]
pub struct RessourcesRef(Arc<Ressources>);

impl ops::Deref for RessourcesRef {
	type Target = Ressources;
	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl FromRequestParts<RessourcesRef> for RessourcesRef {
	type Rejection = ();
	async fn from_request_parts(
		_parts: &mut axum::http::request::Parts,
		state: &RessourcesRef,
	) -> Result<Self, Self::Rejection> {
		Ok(state.clone())
	}
}

impl Ressources {
	/// Opens both databases and seeds the configured blacklist.
	pub fn init(config: Config) -> eyre::Result<RessourcesRef> {
		let http_client = http_client(Duration::from_secs(config.reader.timeout_secs))?;
		let reader = CachedReader::setup(&config.reader.database_url, http_client.clone())?;
		let database_handle =
			open_store(&config.store.database_url).wrap_err("could not open the mirror store")?;

		Self::with_reader(config, database_handle, Arc::new(reader), http_client)
	}

	pub fn with_reader(
		config: Config,
		database_handle: PoolConnection,
		reader: Arc<dyn FeedReader>,
		http_client: Client,
	) -> eyre::Result<RessourcesRef> {
		let blacklist = SqliteBlacklist::new(database_handle.clone());
		let seed = Blacklist::new(&config.blacklist.feeds, &config.blacklist.domains);
		let seeded = blacklist
			.seed(&seed)
			.wrap_err("could not seed the blacklist")?;
		if seeded > 0 {
			tracing::info!(count = seeded, "seeded blacklist from config");
		}

		let ressources = Self {
			feeds: SqliteFeeds::new(database_handle.clone()),
			entries: SqliteEntries::new(database_handle),
			blacklist,
			reader,
			http_client,
			jobs: JobRegistry::default(),
			config,
		};

		Ok(RessourcesRef(Arc::new(ressources)))
	}
}

impl RessourcesRef {
	pub fn crawler(&self) -> CrawlerService<'_> {
		CrawlerService::new(
			&self.feeds,
			&self.entries,
			&self.blacklist,
			self.reader.as_ref(),
			&self.http_client,
		)
	}

	pub fn feed_service(&self) -> FeedService<'_> {
		FeedService::new(
			&self.feeds,
			&self.blacklist,
			&self.config.sources,
			&self.http_client,
		)
	}
}
