//! Full-member standing and the transition table that governs it.
//!
//! Status changes are requested as a closed [`StatusAction`]; legality is
//! decided by [`check_transition`] from the `(current, requested)` pair.
//! `Excommunicated` is terminal.

use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, identifier::MemberId};

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
  Active,
  /// Soft, reversible lapse with no disciplinary implication.
  Inactive,
  Suspended,
  Excommunicated,
}

impl MembershipStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Active => "active",
      Self::Inactive => "inactive",
      Self::Suspended => "suspended",
      Self::Excommunicated => "excommunicated",
    }
  }

  pub fn is_terminal(self) -> bool { matches!(self, Self::Excommunicated) }
}

impl fmt::Display for MembershipStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for MembershipStatus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "active" => Ok(Self::Active),
      "inactive" => Ok(Self::Inactive),
      "suspended" => Ok(Self::Suspended),
      "excommunicated" => Ok(Self::Excommunicated),
      other => Err(Error::UnknownVariant { kind: "membership status", value: other.to_owned() }),
    }
  }
}

// ─── Requested actions ───────────────────────────────────────────────────────

/// What an operator asks to happen to a member's standing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusAction {
  Suspend,
  /// Return to `Active` from `Suspended` or `Inactive`.
  Reactivate,
  Deactivate,
  Excommunicate,
}

impl StatusAction {
  pub fn target(self) -> MembershipStatus {
    match self {
      Self::Suspend => MembershipStatus::Suspended,
      Self::Reactivate => MembershipStatus::Active,
      Self::Deactivate => MembershipStatus::Inactive,
      Self::Excommunicate => MembershipStatus::Excommunicated,
    }
  }
}

// ─── Disciplinary records ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisciplinaryKind {
  Warning,
  Suspension,
  Excommunication,
}

impl DisciplinaryKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Warning => "warning",
      Self::Suspension => "suspension",
      Self::Excommunication => "excommunication",
    }
  }
}

impl FromStr for DisciplinaryKind {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "warning" => Ok(Self::Warning),
      "suspension" => Ok(Self::Suspension),
      "excommunication" => Ok(Self::Excommunication),
      other => Err(Error::UnknownVariant { kind: "disciplinary kind", value: other.to_owned() }),
    }
  }
}

/// One entry in a member's append-only disciplinary history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisciplinaryRecord {
  pub record_id:      Uuid,
  pub kind:           DisciplinaryKind,
  pub reason:         String,
  pub effective_date: NaiveDate,
  /// Server-assigned; never changes after creation.
  pub recorded_at:    DateTime<Utc>,
}

/// A human-entered justification. Never blank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Reason(String);

impl Reason {
  pub fn new(raw: impl Into<String>) -> Result<Self> {
    let raw = raw.into();
    let trimmed = raw.trim();
    if trimmed.is_empty() {
      return Err(Error::Validation("a reason is required".into()));
    }
    Ok(Self(trimmed.to_owned()))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for Reason {
  type Error = Error;

  fn try_from(raw: String) -> Result<Self> { Self::new(raw) }
}

impl From<Reason> for String {
  fn from(r: Reason) -> Self { r.0 }
}

impl fmt::Display for Reason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

// ─── Transition table ────────────────────────────────────────────────────────

/// A permitted status change and the disciplinary record it must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
  pub from:   MembershipStatus,
  pub to:     MembershipStatus,
  pub record: Option<DisciplinaryKind>,
}

use DisciplinaryKind::{Excommunication, Suspension};
use MembershipStatus::{Active, Excommunicated, Inactive, Suspended};

/// Every legal `(from, to)` pair. Anything absent is an invalid transition.
const TRANSITIONS: &[(MembershipStatus, MembershipStatus, Option<DisciplinaryKind>)] = &[
  (Active,    Inactive,       None),
  (Active,    Suspended,      Some(Suspension)),
  (Active,    Excommunicated, Some(Excommunication)),
  (Inactive,  Active,         None),
  (Inactive,  Excommunicated, Some(Excommunication)),
  (Suspended, Active,         None),
  (Suspended, Excommunicated, Some(Excommunication)),
];

/// Decide whether `member_id` may move from `from` to `to`.
///
/// Any request against an excommunicated member fails with
/// [`Error::TerminalStateViolation`], including a same-state request.
pub fn check_transition(
  member_id: MemberId,
  from: MembershipStatus,
  to: MembershipStatus,
) -> Result<Transition> {
  if from.is_terminal() {
    return Err(Error::TerminalStateViolation(member_id));
  }
  TRANSITIONS
    .iter()
    .find(|(f, t, _)| *f == from && *t == to)
    .map(|&(from, to, record)| Transition { from, to, record })
    .ok_or(Error::InvalidTransition { from, to })
}
