use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use inventory_storage::WarehouseError;

use crate::snapshot::SnapshotError;

#[derive(Debug, Serialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    problem_type: &'static str,
    title: &'static str,
    detail: String,
}

/// RFC 7807 error body returned by every API handler.
#[derive(Debug)]
pub struct ProblemResponse {
    status: StatusCode,
    body: ProblemDetails,
}

impl ProblemResponse {
    pub fn new<S: Into<String>>(status: StatusCode, problem_type: &'static str, detail: S) -> Self {
        Self {
            status,
            body: ProblemDetails {
                problem_type,
                title: status.canonical_reason().unwrap_or("error"),
                detail: detail.into(),
            },
        }
    }

    pub fn bad_request<S: Into<String>>(problem_type: &'static str, detail: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, problem_type, detail)
    }

    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "server error",
        )
    }
}

impl IntoResponse for ProblemResponse {
    fn into_response(self) -> Response {
        let mut response = Json(self.body).into_response();
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

impl From<WarehouseError> for ProblemResponse {
    fn from(err: WarehouseError) -> Self {
        match err {
            WarehouseError::NotFound => Self::new(
                StatusCode::NOT_FOUND,
                "warehouse_not_found",
                "warehouse not found",
            ),
            WarehouseError::DuplicateName => Self::new(
                StatusCode::CONFLICT,
                "duplicate_warehouse_name",
                "a warehouse with this name already exists",
            ),
            WarehouseError::Database(err) => {
                error!(stage = "storage", error = %err, "warehouse query failed");
                Self::internal()
            }
        }
    }
}

impl From<SnapshotError> for ProblemResponse {
    fn from(err: SnapshotError) -> Self {
        error!(stage = "api", error = %err, "failed to build warehouse metrics");
        Self::internal()
    }
}
