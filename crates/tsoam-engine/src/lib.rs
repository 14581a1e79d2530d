//! The TSOAM membership progression engine.
//!
//! Composes four services over one [`MemberStore`]:
//!
//! - [`Registry`]: visitor and new-member intake, progress, reads.
//! - [`TransferCoordinator`]: idempotent new member → full member promotion.
//! - [`StatusManager`]: the full-member status lifecycle and discipline.
//! - [`AutoTransferScheduler`]: the periodic batch over all active new
//!   members.
//!
//! Every store call is bounded by [`EngineConfig::store_timeout`]. The
//! engine holds no locks of its own apart from the scheduler's overlap guard.

mod clock;
mod error;
mod lifecycle;
mod notify;
mod registry;
mod scheduler;
mod transfer;

use std::{future::Future, sync::Arc, time::Duration};

use tsoam_core::{person::normalize_service_groups, store::MemberStore};

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{BoxError, EngineError, ErrorClass, Result};
pub use lifecycle::StatusManager;
pub use notify::{DomainEvent, EventBus, Notifier, TransferSource};
pub use registry::{EligibilityReport, Registry};
pub use scheduler::{
  AutoTransferScheduler, BatchSummary, MemberFailure, TickOutcome, TransferredMember,
};
pub use transfer::{TransferCoordinator, TransferOutcome};

// ─── Config ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// Upper bound on every individual store call.
  pub store_timeout:          Duration,
  /// Time between scheduled auto-transfer runs.
  pub scheduler_period:       Duration,
  /// Assigned by the scheduler to members who chose no service group.
  pub default_service_groups: Vec<String>,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      store_timeout:          Duration::from_secs(10),
      scheduler_period:       Duration::from_secs(24 * 60 * 60),
      default_service_groups: Vec::new(),
    }
  }
}

// ─── Shared context ──────────────────────────────────────────────────────────

/// Collaborators shared by every service.
pub(crate) struct Context<S> {
  pub store:         Arc<S>,
  pub clock:         Arc<dyn Clock>,
  pub notifier:      Arc<dyn Notifier>,
  pub store_timeout: Duration,
}

impl<S: MemberStore> Context<S> {
  /// Run a store call under the configured timeout.
  pub async fn call<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
  where
    F: Future<Output = Result<T, S::Error>>,
  {
    error::bounded(operation, self.store_timeout, fut).await
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct Engine<S> {
  pub registry:  Registry<S>,
  pub transfers: TransferCoordinator<S>,
  pub lifecycle: StatusManager<S>,
  pub scheduler: Arc<AutoTransferScheduler<S>>,
}

impl<S: MemberStore + 'static> Engine<S> {
  pub fn new(
    store: Arc<S>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
  ) -> Result<Self> {
    if config.store_timeout.is_zero() {
      return Err(EngineError::validation("store timeout must be positive"));
    }
    if config.scheduler_period.is_zero() {
      return Err(EngineError::validation("scheduler period must be positive"));
    }
    let default_groups = normalize_service_groups(config.default_service_groups)?;

    let ctx = Arc::new(Context {
      store,
      clock,
      notifier,
      store_timeout: config.store_timeout,
    });
    let transfers = TransferCoordinator::new(ctx.clone());

    Ok(Self {
      registry: Registry::new(ctx.clone()),
      lifecycle: StatusManager::new(ctx.clone()),
      scheduler: Arc::new(AutoTransferScheduler::new(
        ctx,
        transfers.clone(),
        config.scheduler_period,
        default_groups,
      )),
      transfers,
    })
  }
}

#[cfg(test)]
mod tests;
