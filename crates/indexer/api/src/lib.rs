#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/evm-indexer/evm-indexer/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod error;
pub use error::ApiError;

mod routes;

use axum::{
    Router,
    http::{Method, header},
    routing::get,
};
use indexer_storage::StorageReader;
use std::{future::Future, io, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// State shared by the handlers.
#[derive(Debug, Clone)]
pub struct ApiState {
    storage: Arc<dyn StorageReader>,
}

impl ApiState {
    /// Creates the handler state.
    pub const fn new(storage: Arc<dyn StorageReader>) -> Self {
        Self { storage }
    }
}

/// Builds the API router.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([header::LINK])
        .max_age(Duration::from_secs(300));

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/blocks", get(routes::blocks::list_blocks))
        .route("/blocks/{number}", get(routes::blocks::get_block))
        .route("/txs", get(routes::txs::list_txs))
        .route("/txs/{hash}", get(routes::txs::get_tx))
        // Paths served by earlier releases.
        .route("/", get(routes::health::health_check))
        .route("/get-blocks", get(routes::blocks::list_blocks))
        .route("/get-block/{number}", get(routes::blocks::get_block))
        .route("/get-txs", get(routes::txs::list_txs))
        .route("/get-tx/{hash}", get(routes::txs::get_tx))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serves the API on `listener` until `shutdown` resolves, then waits for in-flight requests.
///
/// Callers bound the drain by racing the returned future against a timeout.
pub async fn serve<F>(listener: TcpListener, state: ApiState, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(target: "api", %addr, "Serving read API");
    }
    axum::serve(listener, router(state)).with_graceful_shutdown(shutdown).await
}
