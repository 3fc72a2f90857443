use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;

use crate::{repository::StoreError, services::ServiceError};

pub type RouteResult<T> = Result<T, RouteError>;

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
	#[error("service: {0}")]
	Service(#[from] ServiceError),

	#[error("{0}")]
	User(String),

	#[error("not found: {0}")]
	NotFound(String),
}

impl From<StoreError> for RouteError {
	fn from(err: StoreError) -> Self {
		Self::Service(err.into())
	}
}

fn message(status: StatusCode, detail: impl ToString) -> axum::response::Response {
	(status, Json(json!({ "detail": detail.to_string() }))).into_response()
}

impl IntoResponse for RouteError {
	fn into_response(self) -> axum::response::Response {
		match self {
			Self::User(msg) => message(StatusCode::BAD_REQUEST, msg),
			Self::NotFound(msg) => message(StatusCode::NOT_FOUND, msg),
			Self::Service(
				err @ (ServiceError::InvalidInput(_)
				| ServiceError::InvalidOpml(_)
				| ServiceError::Blacklisted(_)),
			) => message(StatusCode::BAD_REQUEST, err),
			Self::Service(err @ ServiceError::NotFound(_)) => message(StatusCode::NOT_FOUND, err),
			Self::Service(err @ ServiceError::AlreadyExists(_)) => message(StatusCode::CONFLICT, err),
			Self::Service(err) => {
				tracing::error!(err = %err, "error at route boundary");
				message(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn service_errors_map_to_statuses() {
		let status = |err: ServiceError| RouteError::from(err).into_response().status();

		assert_eq!(status(ServiceError::NotFound("x".into())), StatusCode::NOT_FOUND);
		assert_eq!(status(ServiceError::AlreadyExists("x".into())), StatusCode::CONFLICT);
		assert_eq!(status(ServiceError::Blacklisted("x".into())), StatusCode::BAD_REQUEST);
		assert_eq!(
			status(ServiceError::Sources(eyre::eyre!("disk is gone"))),
			StatusCode::INTERNAL_SERVER_ERROR
		);
		assert_eq!(
			RouteError::User("bad date".into()).into_response().status(),
			StatusCode::BAD_REQUEST
		);
		assert_eq!(
			RouteError::NotFound("job".into()).into_response().status(),
			StatusCode::NOT_FOUND
		);
	}
}
