//! Handlers for `/new-members` and `/eligibility` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/new-members` | Optional `?include_inactive=true` |
//! | `POST` | `/new-members` | Body: [`NewMemberRegistration`]; returns 201 |
//! | `GET`  | `/new-members/:id` | 404 if not found |
//! | `POST` | `/new-members/:id/progress` | Body: [`ProgressUpdate`] |
//! | `POST` | `/new-members/:id/withdraw` | 409 if already inactive |
//! | `GET`  | `/new-members/:id/eligibility` | Progress toward transfer |
//! | `POST` | `/new-members/:id/transfer` | Body: `{"service_groups":[...]}` (optional); 201 on transfer |
//! | `GET`  | `/eligibility` | Progress for every active new member |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tsoam_core::{
  person::{NewMember, NewMemberRegistration, ProgressUpdate},
  store::MemberStore,
};
use tsoam_engine::{EligibilityReport, Engine, TransferOutcome};
use uuid::Uuid;

use crate::error::ApiError;

// ─── List / create / get ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  /// If `true`, also return transferred and withdrawn records.
  #[serde(default)]
  pub include_inactive: bool,
}

/// `GET /new-members[?include_inactive=true]`
pub async fn list<S: MemberStore>(
  State(engine): State<Arc<Engine<S>>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<NewMember>>, ApiError> {
  Ok(Json(engine.registry.list_new_members(params.include_inactive).await?))
}

/// `POST /new-members`
pub async fn create<S: MemberStore>(
  State(engine): State<Arc<Engine<S>>>,
  Json(body): Json<NewMemberRegistration>,
) -> Result<impl IntoResponse, ApiError> {
  let member = engine.registry.register_new_member(body).await?;
  Ok((StatusCode::CREATED, Json(member)))
}

/// `GET /new-members/:id`
pub async fn get_one<S: MemberStore>(
  State(engine): State<Arc<Engine<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<NewMember>, ApiError> {
  Ok(Json(engine.registry.get_new_member(id).await?))
}

// ─── Probation ───────────────────────────────────────────────────────────────

/// `POST /new-members/:id/progress`
pub async fn progress<S: MemberStore>(
  State(engine): State<Arc<Engine<S>>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ProgressUpdate>,
) -> Result<Json<NewMember>, ApiError> {
  Ok(Json(engine.registry.record_progress(id, body).await?))
}

/// `POST /new-members/:id/withdraw`
pub async fn withdraw<S: MemberStore>(
  State(engine): State<Arc<Engine<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<NewMember>, ApiError> {
  Ok(Json(engine.registry.withdraw_new_member(id).await?))
}

/// `GET /new-members/:id/eligibility`
pub async fn eligibility<S: MemberStore>(
  State(engine): State<Arc<Engine<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<EligibilityReport>, ApiError> {
  Ok(Json(engine.registry.eligibility(id).await?))
}

/// `GET /eligibility`
pub async fn report<S: MemberStore>(
  State(engine): State<Arc<Engine<S>>>,
) -> Result<Json<Vec<EligibilityReport>>, ApiError> {
  Ok(Json(engine.registry.eligibility_report().await?))
}

// ─── Transfer ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TransferBody {
  /// Empty keeps the groups chosen at registration.
  #[serde(default)]
  pub service_groups: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TransferResponse {
  #[serde(flatten)]
  pub outcome: TransferOutcome,
  pub message: String,
}

/// `POST /new-members/:id/transfer`
///
/// `AlreadyTransferred` and `NotEligible` are answers, not failures: both
/// come back as 200 with the outcome and a human-readable message.
pub async fn transfer<S: MemberStore>(
  State(engine): State<Arc<Engine<S>>>,
  Path(id): Path<Uuid>,
  body: Option<Json<TransferBody>>,
) -> Result<impl IntoResponse, ApiError> {
  let service_groups = body.map(|Json(b)| b.service_groups).unwrap_or_default();
  let outcome = engine.transfers.transfer(id, service_groups).await?;
  let status = match &outcome {
    TransferOutcome::Transferred { .. } => StatusCode::CREATED,
    _ => StatusCode::OK,
  };
  let message = outcome.message();
  Ok((status, Json(TransferResponse { outcome, message })))
}
