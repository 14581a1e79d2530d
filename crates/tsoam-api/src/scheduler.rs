//! Handlers for `/scheduler` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/scheduler` | Running flag and period |
//! | `POST` | `/scheduler/run` | Run a batch now; 409 if one is in progress |
//! | `GET`  | `/scheduler/last-run` | Most recent [`BatchSummary`]; 204 before the first run |

use std::sync::Arc;

use axum::{
  Json,
  extract::State,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Serialize;
use tsoam_core::store::MemberStore;
use tsoam_engine::{BatchSummary, Engine, TickOutcome};

#[derive(Debug, Serialize)]
pub struct SchedulerStatus {
  pub running:     bool,
  pub period_secs: u64,
}

/// `GET /scheduler`
pub async fn status<S: MemberStore + 'static>(
  State(engine): State<Arc<Engine<S>>>,
) -> Json<SchedulerStatus> {
  Json(SchedulerStatus {
    running:     engine.scheduler.is_running(),
    period_secs: engine.scheduler.period().as_secs(),
  })
}

/// `POST /scheduler/run`
pub async fn run<S: MemberStore + 'static>(State(engine): State<Arc<Engine<S>>>) -> Response {
  let outcome = engine.scheduler.tick().await;
  let status = match outcome {
    TickOutcome::Completed { .. } => StatusCode::OK,
    TickOutcome::TickSkipped => StatusCode::CONFLICT,
  };
  (status, Json(outcome)).into_response()
}

/// `GET /scheduler/last-run`
pub async fn last_run<S: MemberStore + 'static>(
  State(engine): State<Arc<Engine<S>>>,
) -> Result<Json<BatchSummary>, StatusCode> {
  engine.scheduler.last_summary().map(Json).ok_or(StatusCode::NO_CONTENT)
}
