//! Error type for `tsoam-engine`.

use std::{future::Future, time::Duration};

use serde::Serialize;
use thiserror::Error;
use tsoam_core::{identifier::MemberId, store::StoreError};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum EngineError {
  /// A domain rule said no, either before or inside a store commit.
  #[error(transparent)]
  Domain(#[from] tsoam_core::Error),

  #[error("{operation} timed out after {after:?}")]
  Timeout {
    operation: &'static str,
    after:     Duration,
  },

  #[error("store failure: {0}")]
  Store(#[source] BoxError),

  #[error("member {0} is not excommunicated")]
  NotExcommunicated(MemberId),

  /// The status change committed but the probation records were not purged.
  /// Re-run with `complete_cascade`.
  #[error("member {member_id} is excommunicated but the probation cascade failed: {source}")]
  CascadeIncomplete {
    member_id: MemberId,
    source:    Box<EngineError>,
  },
}

/// Coarse grouping used for logging levels and HTTP status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
  Validation,
  NotFound,
  Conflict,
  Transient,
  Invariant,
}

impl EngineError {
  pub fn class(&self) -> ErrorClass {
    use tsoam_core::Error as D;
    match self {
      Self::Domain(e) => match e {
        D::Validation(_) | D::MalformedIdentifier(_) | D::UnknownVariant { .. } => {
          ErrorClass::Validation
        }
        D::NewMemberNotFound(_) | D::MemberNotFound(_) => ErrorClass::NotFound,
        D::NewMemberInactive(_) | D::TerminalStateViolation(_) | D::InvalidTransition { .. } => {
          ErrorClass::Conflict
        }
        D::IdentifierOverflow { .. } => ErrorClass::Invariant,
      },
      Self::NotExcommunicated(_) => ErrorClass::Conflict,
      Self::Timeout { .. } | Self::Store(_) | Self::CascadeIncomplete { .. } => {
        ErrorClass::Transient
      }
    }
  }

  pub fn validation(msg: impl Into<String>) -> Self {
    Self::Domain(tsoam_core::Error::Validation(msg.into()))
  }

  /// Keep domain errors raised inside a commit distinguishable from
  /// infrastructure failures.
  pub(crate) fn from_store<E: StoreError>(e: E) -> Self {
    match e.domain() {
      Some(domain) => Self::Domain(domain.clone()),
      None => Self::Store(Box::new(e)),
    }
  }
}

/// Await a store call, giving up after `limit`.
pub(crate) async fn bounded<T, E, F>(
  operation: &'static str,
  limit: Duration,
  fut: F,
) -> Result<T, EngineError>
where
  E: StoreError,
  F: Future<Output = Result<T, E>>,
{
  match tokio::time::timeout(limit, fut).await {
    Ok(Ok(value)) => Ok(value),
    Ok(Err(e)) => Err(EngineError::from_store(e)),
    Err(_) => Err(EngineError::Timeout { operation, after: limit }),
  }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
