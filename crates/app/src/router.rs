use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, put},
    Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;

use inventory_storage::Database;

use crate::auth::{self, TokenValidator};
use crate::feed::FeedPublisher;
use crate::{telemetry, warehouses};

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    storage: Database,
    clock: Clock,
    token_validator: TokenValidator,
    feed: FeedPublisher,
    feed_heartbeat_secs: u64,
}

impl AppState {
    pub fn new(
        metrics: PrometheusHandle,
        storage: Database,
        jwt_secret: &[u8],
        feed_heartbeat_secs: u64,
    ) -> Self {
        let clock: Clock = Arc::new(Utc::now);
        let feed = FeedPublisher::new(storage.clone(), clock.clone());
        Self {
            metrics,
            storage,
            clock,
            token_validator: TokenValidator::new(jwt_secret),
            feed,
            feed_heartbeat_secs,
        }
    }

    #[cfg(test)]
    pub fn with_feed(mut self, feed: FeedPublisher) -> Self {
        self.feed = feed;
        self
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn token_validator(&self) -> &TokenValidator {
        &self.token_validator
    }

    pub fn feed(&self) -> &FeedPublisher {
        &self.feed
    }

    pub fn feed_heartbeat(&self) -> u64 {
        self.feed_heartbeat_secs
    }
}

pub fn app_router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/warehouses",
            get(warehouses::list).post(warehouses::create),
        )
        .route(
            "/warehouses/:id",
            put(warehouses::update).delete(warehouses::remove),
        )
        .route("/warehouses/:id/metrics", get(warehouses::metrics_snapshot))
        .route("/warehouses/:id/sse", get(warehouses::metrics_feed))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .nest("/api", api)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> Response {
    let body = telemetry::render_metrics(state.metrics());
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        Body::from(body),
    )
        .into_response()
}
