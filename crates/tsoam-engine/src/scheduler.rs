//! Periodic automatic transfer of every eligible new member.
//!
//! One timer, one batch at a time. A tick that comes due while a batch is
//! still running is skipped, not queued. Individual failures are recorded in
//! the [`BatchSummary`] and the batch moves on; nothing is retried within a
//! tick. Stopping lets the in-flight transfer finish and ends the batch
//! before the next member.

use std::{
  sync::{Arc, Mutex, PoisonError},
  time::Duration,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tsoam_core::{
  eligibility,
  identifier::{MemberId, TitheNumber},
  store::MemberStore,
};
use uuid::Uuid;

use crate::{
  Context, ErrorClass,
  notify::{DomainEvent, TransferSource},
  transfer::{TransferCoordinator, TransferOutcome},
};

// ─── Summary ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct TransferredMember {
  pub new_member_id: Uuid,
  pub member_id:     MemberId,
  pub tithe_number:  TitheNumber,
  pub full_name:     String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberFailure {
  pub new_member_id: Uuid,
  pub full_name:     String,
  pub class:         ErrorClass,
  pub reason:        String,
}

/// The result of one auto-transfer run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
  pub started_at:          DateTime<Utc>,
  pub finished_at:         DateTime<Utc>,
  /// Active new members returned by the store.
  pub considered:          usize,
  pub transferred:         Vec<TransferredMember>,
  pub already_transferred: usize,
  pub not_eligible:        usize,
  pub failed:              Vec<MemberFailure>,
  /// Set when the candidate query itself failed; nothing else was attempted.
  pub query_error:         Option<String>,
  /// Set when the scheduler was stopped part-way through.
  pub interrupted:         bool,
}

impl BatchSummary {
  fn begin(started_at: DateTime<Utc>) -> Self {
    Self {
      started_at,
      finished_at: started_at,
      considered: 0,
      transferred: Vec::new(),
      already_transferred: 0,
      not_eligible: 0,
      failed: Vec::new(),
      query_error: None,
      interrupted: false,
    }
  }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TickOutcome {
  Completed { summary: BatchSummary },
  /// Another batch was still running.
  TickSkipped,
}

// ─── Scheduler ───────────────────────────────────────────────────────────────

struct Running {
  token:  CancellationToken,
  handle: JoinHandle<()>,
}

pub struct AutoTransferScheduler<S> {
  ctx:            Arc<Context<S>>,
  transfers:      TransferCoordinator<S>,
  period:         Duration,
  default_groups: Vec<String>,
  /// Held for the duration of a batch.
  batch:          tokio::sync::Mutex<()>,
  running:        Mutex<Option<Running>>,
  last:           Mutex<Option<BatchSummary>>,
}

impl<S: MemberStore + 'static> AutoTransferScheduler<S> {
  pub(crate) fn new(
    ctx: Arc<Context<S>>,
    transfers: TransferCoordinator<S>,
    period: Duration,
    default_groups: Vec<String>,
  ) -> Self {
    Self {
      ctx,
      transfers,
      period,
      default_groups,
      batch: tokio::sync::Mutex::new(()),
      running: Mutex::new(None),
      last: Mutex::new(None),
    }
  }

  pub fn period(&self) -> Duration { self.period }

  /// Start the timer. The first run happens immediately. Returns `false` if
  /// the scheduler was already running.
  pub fn start(self: &Arc<Self>) -> bool {
    let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
    if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
      return false;
    }
    let token = CancellationToken::new();
    let handle = tokio::spawn(self.clone().run(token.clone()));
    *running = Some(Running { token, handle });
    true
  }

  /// Stop the timer and wait for the loop to exit. An in-flight transfer
  /// completes; the rest of the batch is abandoned.
  pub async fn stop(&self) {
    let running = self.running.lock().unwrap_or_else(PoisonError::into_inner).take();
    let Some(Running { token, handle }) = running else {
      return;
    };
    token.cancel();
    if let Err(e) = handle.await {
      tracing::warn!(error = %e, "auto-transfer scheduler task ended abnormally");
    }
  }

  pub fn is_running(&self) -> bool {
    self
      .running
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .as_ref()
      .is_some_and(|r| !r.handle.is_finished())
  }

  /// Run one batch now, unless one is already in progress.
  pub async fn tick(&self) -> TickOutcome {
    let token = self
      .running
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .as_ref()
      .map(|r| r.token.clone())
      .unwrap_or_default();
    self.tick_with(&token).await
  }

  /// Summary of the most recent completed batch.
  pub fn last_summary(&self) -> Option<BatchSummary> {
    self.last.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }

  async fn run(self: Arc<Self>, token: CancellationToken) {
    tracing::info!(period = ?self.period, "auto-transfer scheduler started");
    let mut interval = tokio::time::interval(self.period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
      tokio::select! {
        biased;
        _ = token.cancelled() => break,
        _ = interval.tick() => {
          self.tick_with(&token).await;
        }
      }
    }

    tracing::info!("auto-transfer scheduler stopped");
  }

  pub(crate) async fn tick_with(&self, cancel: &CancellationToken) -> TickOutcome {
    let Ok(_guard) = self.batch.try_lock() else {
      tracing::warn!("auto-transfer run still in progress; tick skipped");
      return TickOutcome::TickSkipped;
    };

    let summary = self.run_batch(cancel).await;
    tracing::info!(
      considered = summary.considered,
      transferred = summary.transferred.len(),
      already_transferred = summary.already_transferred,
      not_eligible = summary.not_eligible,
      failed = summary.failed.len(),
      interrupted = summary.interrupted,
      "auto-transfer run finished"
    );

    *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(summary.clone());
    self
      .ctx
      .notifier
      .notify(&DomainEvent::BatchCompleted { summary: summary.clone() });
    TickOutcome::Completed { summary }
  }

  async fn run_batch(&self, cancel: &CancellationToken) -> BatchSummary {
    let mut summary = BatchSummary::begin(self.ctx.clock.now());

    let candidates = match self
      .ctx
      .call("active_new_members", self.ctx.store.active_new_members())
      .await
    {
      Ok(candidates) => candidates,
      Err(e) => {
        tracing::warn!(error = %e, "could not load candidates for auto-transfer");
        summary.query_error = Some(e.to_string());
        summary.finished_at = self.ctx.clock.now();
        return summary;
      }
    };
    summary.considered = candidates.len();

    for member in candidates {
      if cancel.is_cancelled() {
        summary.interrupted = true;
        break;
      }

      let new_member_id = member.new_member_id;
      let verdict = eligibility::evaluate(&member, self.ctx.clock.today());
      if !verdict.eligible {
        tracing::debug!(%new_member_id, unmet = ?verdict.unmet, "skipping; not eligible");
        summary.not_eligible += 1;
        continue;
      }

      let groups = if member.service_groups.is_empty() {
        self.default_groups.clone()
      } else {
        member.service_groups.clone()
      };

      match self
        .transfers
        .transfer_as(new_member_id, groups, TransferSource::Scheduler)
        .await
      {
        Ok(TransferOutcome::Transferred { member: full }) => {
          summary.transferred.push(TransferredMember {
            new_member_id,
            member_id: full.member_id,
            tithe_number: full.tithe_number,
            full_name: full.identity.full_name,
          });
        }
        Ok(TransferOutcome::AlreadyTransferred { .. }) => summary.already_transferred += 1,
        Ok(TransferOutcome::NotEligible { .. }) => summary.not_eligible += 1,
        Err(e) => {
          tracing::warn!(%new_member_id, error = %e, "auto-transfer failed for member");
          summary.failed.push(MemberFailure {
            new_member_id,
            full_name: member.identity.full_name,
            class: e.class(),
            reason: e.to_string(),
          });
        }
      }
    }

    summary.finished_at = self.ctx.clock.now();
    summary
  }
}
