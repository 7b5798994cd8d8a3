use std::future::Future;

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::net::ToSocketAddrs;

use crate::cgroup::TreeHandle;
use crate::metrics::PrometheusSink;

#[derive(Clone)]
struct AppState {
    tree: TreeHandle,
    metrics: PrometheusSink,
}

async fn export_metrics(State(state): State<AppState>) -> Response {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => {
            log::error!("Failed to encode metrics: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to encode metrics",
            )
                .into_response()
        }
    }
}

async fn export_cgroups(State(state): State<AppState>) -> Response {
    let tree = state.tree.clone();
    match tokio::task::spawn_blocking(move || tree.snapshot()).await {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(err) => {
            log::error!("Failed to snapshot cgroup tree: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to export cgroups",
            )
                .into_response()
        }
    }
}

pub struct ApiServer {
    router: axum::Router,
}

impl ApiServer {
    pub fn new(tree: TreeHandle, metrics: PrometheusSink) -> Self {
        let router = axum::Router::new()
            .route("/metrics", get(export_metrics))
            .route("/api/v1/cgroups", get(export_cgroups))
            .with_state(AppState { tree, metrics });
        Self { router }
    }

    /// Serves requests until `shutdown` completes.
    pub async fn listen(
        self,
        addr: impl ToSocketAddrs,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        log::info!("API listening on {}", listener.local_addr()?);
        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await
    }
}
