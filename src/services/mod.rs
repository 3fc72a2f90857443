//! Operations shared by the http api and the command line.

mod crawler;
mod feeds;

pub use self::{
	crawler::{CrawlerService, InitSummary, MirrorFeedsSummary, ReaderSyncSummary, UpdateAllSummary},
	feeds::{DiscoverSummary, FeedService, FeedList, ImportSummary, SourcesSummary},
};
use crate::{mirror::MirrorError, opml::OpmlError, reader, repository::StoreError};

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
	#[error("not found: {0}")]
	NotFound(String),

	#[error("already exists: {0}")]
	AlreadyExists(String),

	#[error("blacklisted: {0}")]
	Blacklisted(String),

	#[error("invalid input: {0}")]
	InvalidInput(String),

	#[error("invalid OPML: {0}")]
	InvalidOpml(#[from] OpmlError),

	#[error("store: {0}")]
	Store(#[from] StoreError),

	#[error("reader: {0}")]
	Reader(#[from] reader::Error),

	#[error("sources: {0}")]
	Sources(eyre::Report),
}

impl From<MirrorError> for ServiceError {
	fn from(err: MirrorError) -> Self {
		match err {
			MirrorError::Reader(err) => Self::Reader(err),
			MirrorError::Store(err) => Self::Store(err),
		}
	}
}
