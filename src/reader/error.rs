pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("pool: {0}")]
	DbPool(#[from] diesel::r2d2::PoolError),

	#[error("query: {0}")]
	Query(#[from] diesel::result::Error),

	#[error("fetch: {0}")]
	Fetch(#[from] reqwest::Error),

	#[error("parse: {0}")]
	Parse(#[from] feed_rs::parser::ParseFeedError),

	#[error("document: {0}")]
	Document(#[from] serde_json::Error),

	#[error("feed is already registered: {0}")]
	FeedExists(String),

	#[error("feed is not registered: {0}")]
	FeedNotFound(String),
}
