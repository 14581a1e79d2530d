//! Time source for eligibility checks and commit timestamps.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;

  /// The calendar date eligibility is evaluated against (UTC).
  fn today(&self) -> NaiveDate { self.now().date_naive() }
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> { Utc::now() }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
  at: RwLock<DateTime<Utc>>,
}

impl FixedClock {
  pub fn new(at: DateTime<Utc>) -> Self { Self { at: RwLock::new(at) } }

  pub fn set(&self, at: DateTime<Utc>) {
    *self.at.write().unwrap_or_else(PoisonError::into_inner) = at;
  }

  pub fn advance(&self, by: TimeDelta) {
    let mut at = self.at.write().unwrap_or_else(PoisonError::into_inner);
    *at += by;
  }
}

impl Clock for FixedClock {
  fn now(&self) -> DateTime<Utc> { *self.at.read().unwrap_or_else(PoisonError::into_inner) }
}
