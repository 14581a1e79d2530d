//! Error types for `tsoam-core`.
//!
//! These are rule violations, not infrastructure failures. Storage backends
//! wrap them so the engine can tell "the rules said no" apart from "the
//! database is down".

use thiserror::Error;
use uuid::Uuid;

use crate::{
  identifier::{IdentifierKind, MemberId},
  status::MembershipStatus,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
  #[error("validation failed: {0}")]
  Validation(String),

  #[error("new member not found: {0}")]
  NewMemberNotFound(Uuid),

  #[error("member not found: {0}")]
  MemberNotFound(MemberId),

  #[error("new member {0} is no longer on probation")]
  NewMemberInactive(Uuid),

  #[error("{kind} numbers for {year} are exhausted")]
  IdentifierOverflow { kind: IdentifierKind, year: i32 },

  #[error("malformed identifier: {0:?}")]
  MalformedIdentifier(String),

  #[error("member {0} is excommunicated; no further status change is permitted")]
  TerminalStateViolation(MemberId),

  #[error("cannot move a member from {from} to {to}")]
  InvalidTransition {
    from: MembershipStatus,
    to:   MembershipStatus,
  },

  #[error("unknown {kind} value: {value:?}")]
  UnknownVariant { kind: &'static str, value: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
