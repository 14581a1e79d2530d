//! Handlers for `/visitors` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/visitors` | Newest visit first |
//! | `POST` | `/visitors` | Body: [`NewVisitor`]; returns 201 |

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tsoam_core::{
  person::{NewVisitor, Visitor},
  store::MemberStore,
};
use tsoam_engine::Engine;

use crate::error::ApiError;

/// `GET /visitors`
pub async fn list<S: MemberStore>(
  State(engine): State<Arc<Engine<S>>>,
) -> Result<Json<Vec<Visitor>>, ApiError> {
  Ok(Json(engine.registry.list_visitors().await?))
}

/// `POST /visitors`
pub async fn create<S: MemberStore>(
  State(engine): State<Arc<Engine<S>>>,
  Json(body): Json<NewVisitor>,
) -> Result<impl IntoResponse, ApiError> {
  let visitor = engine.registry.add_visitor(body).await?;
  Ok((StatusCode::CREATED, Json(visitor)))
}
