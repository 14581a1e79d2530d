//! The `MemberStore` trait and the request types it consumes.
//!
//! The trait is implemented by storage backends (e.g. `tsoam-store-sqlite`).
//! The engine depends on this abstraction, not on any concrete backend. All
//! shared mutable state lives behind it; the two operations that must be
//! atomic (`transfer_new_member`, `set_member_status`) are committed by the
//! backend in a single transaction.

use std::{future::Future, time::Instant};

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::{
  Error,
  identifier::MemberId,
  person::{
    FullMember, Identity, NewMember, NewMemberRegistration, NewVisitor, ProgressUpdate, Visitor,
  },
  status::{MembershipStatus, Reason, StatusAction},
};

// ─── Request types ───────────────────────────────────────────────────────────

/// Input to [`MemberStore::transfer_new_member`].
#[derive(Debug, Clone)]
pub struct TransferRequest {
  pub new_member_id:  Uuid,
  pub service_groups: Vec<String>,
  /// Becomes the member's `membership_date`; its year scopes the identifiers.
  pub transferred_at: DateTime<Utc>,
  /// Once this instant has passed the backend rolls back instead of
  /// committing. Set to the caller's own give-up time so a call that was
  /// abandoned cannot land later.
  pub deadline:       Option<Instant>,
}

/// What the atomic transfer commit did.
#[derive(Debug, Clone)]
pub enum TransferCommit {
  Committed(FullMember),
  /// `is_active` was already `false` at commit time. Nothing was written.
  AlreadyTransferred,
}

/// Input to [`MemberStore::set_member_status`].
#[derive(Debug, Clone)]
pub struct StatusChange {
  pub member_id:      MemberId,
  pub action:         StatusAction,
  pub reason:         Reason,
  pub effective_date: NaiveDate,
  pub recorded_at:    DateTime<Utc>,
}

// ─── Error classification ────────────────────────────────────────────────────

/// Errors returned by a backend. Rule violations detected inside a commit are
/// surfaced through [`StoreError::domain`] so callers can tell them apart
/// from infrastructure failures.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  fn domain(&self) -> Option<&Error>;
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a membership record store.
///
/// All methods return `Send` futures so the trait can be used from spawned
/// tasks in multi-threaded runtimes.
pub trait MemberStore: Send + Sync {
  type Error: StoreError;

  // ── Visitors ──────────────────────────────────────────────────────────

  fn add_visitor(
    &self,
    input: NewVisitor,
  ) -> impl Future<Output = Result<Visitor, Self::Error>> + Send + '_;

  fn list_visitors(&self) -> impl Future<Output = Result<Vec<Visitor>, Self::Error>> + Send + '_;

  // ── New members ───────────────────────────────────────────────────────

  /// Persist a registration as an active new member. Input is assumed to
  /// have been validated.
  fn register_new_member(
    &self,
    input: NewMemberRegistration,
  ) -> impl Future<Output = Result<NewMember, Self::Error>> + Send + '_;

  fn get_new_member(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<NewMember>, Self::Error>> + Send + '_;

  fn list_new_members(
    &self,
    include_inactive: bool,
  ) -> impl Future<Output = Result<Vec<NewMember>, Self::Error>> + Send + '_;

  /// Every new member with `is_active = true`: the candidate set for
  /// automatic transfer.
  fn active_new_members(
    &self,
  ) -> impl Future<Output = Result<Vec<NewMember>, Self::Error>> + Send + '_;

  /// Mark probation milestones. Fails with [`Error::NewMemberInactive`] once
  /// the record has been transferred or withdrawn.
  fn record_progress(
    &self,
    id: Uuid,
    update: ProgressUpdate,
  ) -> impl Future<Output = Result<NewMember, Self::Error>> + Send + '_;

  /// Take an active record off probation without transferring it.
  fn withdraw_new_member(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<NewMember, Self::Error>> + Send + '_;

  // ── Transfer ──────────────────────────────────────────────────────────

  /// Atomically allocate identifiers, insert the full member, and flip the
  /// new member's `is_active` flag, conditioned on it still being `true`.
  ///
  /// Returns [`TransferCommit::AlreadyTransferred`] when the condition fails.
  /// Identifier exhaustion is reported as [`Error::IdentifierOverflow`] and
  /// leaves nothing written, as does a passed [`TransferRequest::deadline`].
  fn transfer_new_member(
    &self,
    request: TransferRequest,
  ) -> impl Future<Output = Result<TransferCommit, Self::Error>> + Send + '_;

  /// The full member created from new member `id`, if it was transferred.
  fn full_member_transferred_from(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<FullMember>, Self::Error>> + Send + '_;

  // ── Full members ──────────────────────────────────────────────────────

  fn get_full_member(
    &self,
    id: MemberId,
  ) -> impl Future<Output = Result<Option<FullMember>, Self::Error>> + Send + '_;

  fn list_full_members(
    &self,
    status: Option<MembershipStatus>,
  ) -> impl Future<Output = Result<Vec<FullMember>, Self::Error>> + Send + '_;

  /// Apply a status change and its disciplinary record together.
  ///
  /// Legality is re-checked against the committed status with
  /// [`crate::status::check_transition`]; violations come back as domain
  /// errors. Returns the member as committed.
  fn set_member_status(
    &self,
    change: StatusChange,
  ) -> impl Future<Output = Result<FullMember, Self::Error>> + Send + '_;

  /// Append a `Warning` record without changing status. Refused for
  /// excommunicated members.
  fn record_warning(
    &self,
    id: MemberId,
    reason: Reason,
    effective_date: NaiveDate,
    recorded_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<FullMember, Self::Error>> + Send + '_;

  /// Delete every new-member record belonging to `identity` or, when given,
  /// the record with id `transferred_from`. Idempotent; returns the number of
  /// records removed.
  fn excommunicate_cascade(
    &self,
    identity: Identity,
    transferred_from: Option<Uuid>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;
}
