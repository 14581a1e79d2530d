//! Domain events and the notification seam.
//!
//! The engine announces what it did through a [`Notifier`]. Delivery is
//! fire-and-forget: a notifier must not block and cannot fail an operation.
//! [`EventBus`] fans events out over a `tokio::sync::broadcast` channel so
//! any number of consumers (log sink, UI refresh) can subscribe.

use serde::Serialize;
use tokio::sync::broadcast;
use tsoam_core::{
  identifier::{MemberId, TitheNumber},
  status::MembershipStatus,
};
use uuid::Uuid;

use crate::scheduler::BatchSummary;

/// Who asked for a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferSource {
  Operator,
  Scheduler,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
  MemberTransferred {
    new_member_id: Uuid,
    member_id:     MemberId,
    tithe_number:  TitheNumber,
    full_name:     String,
    source:        TransferSource,
  },
  StatusChanged {
    member_id: MemberId,
    from:      MembershipStatus,
    to:        MembershipStatus,
    reason:    String,
  },
  WarningIssued {
    member_id: MemberId,
    reason:    String,
  },
  ProbationPurged {
    member_id: MemberId,
    purged:    usize,
  },
  BatchCompleted {
    summary: BatchSummary,
  },
}

impl DomainEvent {
  pub fn event_type(&self) -> &'static str {
    match self {
      Self::MemberTransferred { .. } => "member.transferred",
      Self::StatusChanged { .. } => "member.status_changed",
      Self::WarningIssued { .. } => "member.warning_issued",
      Self::ProbationPurged { .. } => "new_member.purged",
      Self::BatchCompleted { .. } => "scheduler.batch_completed",
    }
  }

  /// One line suitable for a toast or an activity feed.
  pub fn message(&self) -> String {
    match self {
      Self::MemberTransferred { member_id, tithe_number, full_name, .. } => {
        format!("{full_name} is now a full member ({member_id}, tithe number {tithe_number})")
      }
      Self::StatusChanged { member_id, from, to, .. } => {
        format!("{member_id} moved from {from} to {to}")
      }
      Self::WarningIssued { member_id, reason } => format!("{member_id} warned: {reason}"),
      Self::ProbationPurged { member_id, purged } => {
        format!("removed {purged} probation record(s) linked to {member_id}")
      }
      Self::BatchCompleted { summary } => format!(
        "auto-transfer run: {} transferred, {} already transferred, {} not eligible, {} failed",
        summary.transferred.len(),
        summary.already_transferred,
        summary.not_eligible,
        summary.failed.len(),
      ),
    }
  }
}

/// Receives domain events from the engine.
pub trait Notifier: Send + Sync {
  fn notify(&self, event: &DomainEvent);
}

/// Broadcast fan-out of domain events.
#[derive(Debug, Clone)]
pub struct EventBus {
  tx: broadcast::Sender<DomainEvent>,
}

impl EventBus {
  pub fn new(capacity: usize) -> Self {
    let (tx, _) = broadcast::channel(capacity.max(1));
    Self { tx }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> { self.tx.subscribe() }
}

impl Default for EventBus {
  fn default() -> Self { Self::new(256) }
}

impl Notifier for EventBus {
  fn notify(&self, event: &DomainEvent) {
    // Err only means nobody is listening right now.
    let _ = self.tx.send(event.clone());
  }
}
