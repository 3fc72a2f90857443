use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::{
	Router,
	http::{HeaderName, HeaderValue, Method},
};
use eyre::WrapErr;
use tokio::{net::TcpListener, signal};
use tower_http::{
	cors::{AllowOrigin, Any, CorsLayer},
	request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
	trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

use crate::{api, config::RessourcesRef};

pub struct App {
	ressources: RessourcesRef,
}

impl App {
	pub const fn new(ressources: RessourcesRef) -> Self {
		Self { ressources }
	}
}

/// The api with its tracing, request id and cors layers.
pub fn router(ressources: RessourcesRef) -> Router {
	let x_request_id = HeaderName::from_static("x-request-id");

	let origins = ressources
		.config
		.server
		.cors_origins
		.iter()
		.filter_map(|origin| match HeaderValue::from_str(origin) {
			Ok(origin) => Some(origin),
			Err(err) => {
				tracing::warn!(origin = %origin, err = %err, "ignoring invalid cors origin");
				None
			}
		})
		.collect::<Vec<_>>();
	let cors = CorsLayer::new()
		.allow_origin(AllowOrigin::list(origins))
		.allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
		.allow_headers(Any);

	api::router()
		.layer(cors)
		.layer(PropagateRequestIdLayer::new(x_request_id.clone()))
		.layer(
			TraceLayer::new_for_http()
				.make_span_with(DefaultMakeSpan::new().include_headers(true))
				.on_response(DefaultOnResponse::new().include_headers(true)),
		)
		.layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
		.with_state(ressources)
}

impl App {
	pub async fn serve(self) -> eyre::Result<()> {
		let port = self.ressources.config.server.port;
		let app = router(self.ressources);

		let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
		let listener = TcpListener::bind(addr)
			.await
			.wrap_err_with(|| format!("could not bind to the specified interface: {addr:?}"))?;

		tracing::info!(%addr, "starting app router");
		axum::serve(listener, app)
			.with_graceful_shutdown(shutdown_signal())
			.await
			.wrap_err("could not serve app")?;

		tracing::info!("app router stopped");
		Ok(())
	}
}

async fn shutdown_signal() {
	let ctrl_c = async {
		signal::ctrl_c()
			.await
			.expect("failed to install Ctrl+C handler");
	};

	#[cfg(unix)]
	let terminate = async {
		signal::unix::signal(signal::unix::SignalKind::terminate())
			.expect("failed to install signal handler")
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		() = ctrl_c => {},
		() = terminate => {},
	}
}
