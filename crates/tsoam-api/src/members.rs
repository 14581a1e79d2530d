//! Handlers for `/members` endpoints (full members).
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/members` | Optional `?status=active\|inactive\|suspended\|excommunicated` |
//! | `GET`  | `/members/:member_id` | e.g. `TSOAM2026-001`; 404 if not found |
//! | `POST` | `/members/:member_id/status` | Body: [`StatusBody`] |
//! | `POST` | `/members/:member_id/warnings` | Body: [`WarningBody`]; returns 201 |
//! | `POST` | `/members/:member_id/cascade` | Re-run the probation purge after excommunication |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tsoam_core::{
  identifier::MemberId,
  person::FullMember,
  status::{MembershipStatus, StatusAction},
  store::MemberStore,
};
use tsoam_engine::Engine;

use crate::error::ApiError;

// ─── List / get ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub status: Option<MembershipStatus>,
}

/// `GET /members[?status=<status>]`
pub async fn list<S: MemberStore>(
  State(engine): State<Arc<Engine<S>>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<FullMember>>, ApiError> {
  Ok(Json(engine.registry.list_full_members(params.status).await?))
}

/// `GET /members/:member_id`
pub async fn get_one<S: MemberStore>(
  State(engine): State<Arc<Engine<S>>>,
  Path(member_id): Path<String>,
) -> Result<Json<FullMember>, ApiError> {
  let member_id: MemberId = member_id.parse()?;
  Ok(Json(engine.registry.get_full_member(member_id).await?))
}

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StatusBody {
  pub action:         StatusAction,
  pub reason:         String,
  /// Defaults to today.
  pub effective_date: Option<NaiveDate>,
}

/// `POST /members/:member_id/status`, body:
/// `{"action":"suspend","reason":"...","effective_date":"2026-03-01"}`
pub async fn change_status<S: MemberStore>(
  State(engine): State<Arc<Engine<S>>>,
  Path(member_id): Path<String>,
  Json(body): Json<StatusBody>,
) -> Result<Json<FullMember>, ApiError> {
  let member_id: MemberId = member_id.parse()?;
  let member = engine
    .lifecycle
    .change_status(member_id, body.action, &body.reason, body.effective_date)
    .await?;
  Ok(Json(member))
}

// ─── Warnings ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct WarningBody {
  pub reason:         String,
  pub effective_date: Option<NaiveDate>,
}

/// `POST /members/:member_id/warnings`
pub async fn warn<S: MemberStore>(
  State(engine): State<Arc<Engine<S>>>,
  Path(member_id): Path<String>,
  Json(body): Json<WarningBody>,
) -> Result<impl IntoResponse, ApiError> {
  let member_id: MemberId = member_id.parse()?;
  let member = engine
    .lifecycle
    .issue_warning(member_id, &body.reason, body.effective_date)
    .await?;
  Ok((StatusCode::CREATED, Json(member)))
}

// ─── Cascade ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct CascadeResponse {
  pub member_id: MemberId,
  pub purged:    usize,
}

/// `POST /members/:member_id/cascade`
pub async fn cascade<S: MemberStore>(
  State(engine): State<Arc<Engine<S>>>,
  Path(member_id): Path<String>,
) -> Result<Json<CascadeResponse>, ApiError> {
  let member_id: MemberId = member_id.parse()?;
  let purged = engine.lifecycle.complete_cascade(member_id).await?;
  Ok(Json(CascadeResponse { member_id, purged }))
}
