use std::{convert::Infallible, time::Duration};

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Extension, Json,
};
use metrics::counter;
use serde::Deserialize;
use serde_json::json;
use tokio_stream::{Stream, StreamExt};
use tracing::info;

use inventory_core::{MetricsSnapshot, Warehouse, WarehouseDraft};

use crate::auth::AuthUser;
use crate::problem::ProblemResponse;
use crate::router::AppState;
use crate::snapshot::build_metrics_snapshot;

#[derive(Debug, Deserialize)]
pub struct WarehouseRequest {
    #[serde(default, alias = "nombre")]
    name: Option<String>,
    #[serde(default, alias = "direccion")]
    address: Option<String>,
}

impl WarehouseRequest {
    fn into_draft(self) -> Result<WarehouseDraft, ProblemResponse> {
        WarehouseDraft::parse(self.name.as_deref(), self.address.as_deref())
            .map_err(|err| ProblemResponse::bad_request("invalid_warehouse", err.to_string()))
    }
}

/// `GET /api/warehouses`
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Warehouse>>, ProblemResponse> {
    let warehouses = state.storage().warehouses().list().await?;
    Ok(Json(warehouses))
}

/// `POST /api/warehouses` (admin only)
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Result<Json<WarehouseRequest>, JsonRejection>,
) -> Result<Response, ProblemResponse> {
    user.require_admin()?;
    let draft = parse_body(body)?.into_draft()?;

    let warehouse = state.storage().warehouses().insert(&draft).await?;
    info!(stage = "api", warehouse_id = warehouse.id, actor = %user.subject, "warehouse created");
    Ok((StatusCode::CREATED, Json(warehouse)).into_response())
}

/// `PUT /api/warehouses/:id` (admin only)
pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<WarehouseRequest>, JsonRejection>,
) -> Result<Json<Warehouse>, ProblemResponse> {
    user.require_admin()?;
    let id = parse_id(id)?;
    let draft = parse_body(body)?.into_draft()?;

    let warehouse = state.storage().warehouses().update(id, &draft).await?;
    info!(stage = "api", warehouse_id = id, actor = %user.subject, "warehouse updated");
    Ok(Json(warehouse))
}

/// `DELETE /api/warehouses/:id` (admin only)
pub async fn remove(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<serde_json::Value>, ProblemResponse> {
    user.require_admin()?;
    let id = parse_id(id)?;

    state.storage().warehouses().delete(id).await?;
    info!(stage = "api", warehouse_id = id, actor = %user.subject, "warehouse deleted");
    Ok(Json(json!({ "deleted": id })))
}

/// `GET /api/warehouses/:id/metrics`
pub async fn metrics_snapshot(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<MetricsSnapshot>, ProblemResponse> {
    let id = parse_id(id)?;

    match build_metrics_snapshot(state.storage(), id, state.now()).await {
        Ok(snapshot) => {
            counter!("warehouse_snapshot_requests_total", "result" => "ok").increment(1);
            Ok(Json(snapshot))
        }
        Err(err) => {
            counter!("warehouse_snapshot_requests_total", "result" => "error").increment(1);
            Err(err.into())
        }
    }
}

/// `GET /api/warehouses/:id/sse`
pub async fn metrics_feed(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ProblemResponse> {
    let id = parse_id(id)?;

    let stream = state.feed().subscribe(id).await;
    info!(
        stage = "api",
        warehouse_id = id,
        actor = %user.subject,
        active = state.feed().active_subscriptions(),
        "metrics feed opened"
    );

    let keep_alive = KeepAlive::new()
        .interval(Duration::from_secs(state.feed_heartbeat()))
        .text("heartbeat");

    Ok(Sse::new(stream.map(|message| Ok::<_, Infallible>(message.into_event()))).keep_alive(keep_alive))
}

fn parse_id(id: Result<Path<i64>, PathRejection>) -> Result<i64, ProblemResponse> {
    id.map(|Path(id)| id).map_err(|_| {
        ProblemResponse::bad_request("invalid_warehouse_id", "warehouse id must be an integer")
    })
}

fn parse_body(
    body: Result<Json<WarehouseRequest>, JsonRejection>,
) -> Result<WarehouseRequest, ProblemResponse> {
    body.map(|Json(request)| request)
        .map_err(|err| ProblemResponse::bad_request("invalid_body", err.body_text()))
}
