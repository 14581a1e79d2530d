//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tsoam_engine::{EngineError, ErrorClass};

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Engine(#[from] EngineError),
}

impl From<tsoam_core::Error> for ApiError {
  fn from(e: tsoam_core::Error) -> Self { Self::Engine(e.into()) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let ApiError::Engine(e) = &self;
    let class = e.class();
    let status = match (class, e) {
      (ErrorClass::Validation, _) => StatusCode::BAD_REQUEST,
      (ErrorClass::NotFound, _) => StatusCode::NOT_FOUND,
      (ErrorClass::Conflict, _) => StatusCode::CONFLICT,
      (_, EngineError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
      (ErrorClass::Transient | ErrorClass::Invariant, _) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
      tracing::error!(error = %e, "request failed");
    }
    (status, Json(json!({ "error": e.to_string(), "class": class }))).into_response()
  }
}
