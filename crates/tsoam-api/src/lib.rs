//! JSON REST API for the TSOAM membership engine.
//!
//! Exposes an axum [`Router`] backed by an [`Engine`] over any
//! [`MemberStore`]. Auth, TLS, and transport concerns are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", tsoam_api::api_router(engine.clone()))
//! ```

pub mod error;
pub mod members;
pub mod new_members;
pub mod scheduler;
pub mod visitors;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use tsoam_core::store::MemberStore;
use tsoam_engine::Engine;

pub use error::ApiError;

/// Build a fully-materialised API router for `engine`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(engine: Arc<Engine<S>>) -> Router<()>
where
  S: MemberStore + 'static,
{
  Router::new()
    // Visitors
    .route("/visitors", get(visitors::list::<S>).post(visitors::create::<S>))
    // New members
    .route("/new-members", get(new_members::list::<S>).post(new_members::create::<S>))
    .route("/new-members/{id}", get(new_members::get_one::<S>))
    .route("/new-members/{id}/progress", post(new_members::progress::<S>))
    .route("/new-members/{id}/withdraw", post(new_members::withdraw::<S>))
    .route("/new-members/{id}/eligibility", get(new_members::eligibility::<S>))
    .route("/new-members/{id}/transfer", post(new_members::transfer::<S>))
    .route("/eligibility", get(new_members::report::<S>))
    // Full members
    .route("/members", get(members::list::<S>))
    .route("/members/{member_id}", get(members::get_one::<S>))
    .route("/members/{member_id}/status", post(members::change_status::<S>))
    .route("/members/{member_id}/warnings", post(members::warn::<S>))
    .route("/members/{member_id}/cascade", post(members::cascade::<S>))
    // Scheduler
    .route("/scheduler", get(scheduler::status::<S>))
    .route("/scheduler/run", post(scheduler::run::<S>))
    .route("/scheduler/last-run", get(scheduler::last_run::<S>))
    .with_state(engine)
}
