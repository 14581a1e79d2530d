//! Error type for `tsoam-store-sqlite`.

use thiserror::Error;
use tsoam_core::store::StoreError;

#[derive(Debug, Error)]
pub enum Error {
  #[error("{0}")]
  Core(#[from] tsoam_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// The caller's deadline passed before the transaction could commit; it
  /// was rolled back.
  #[error("deadline passed before commit; rolled back")]
  DeadlineExceeded,
}

impl StoreError for Error {
  fn domain(&self) -> Option<&tsoam_core::Error> {
    match self {
      Error::Core(e) => Some(e),
      _ => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
