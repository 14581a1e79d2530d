//! Promotion of a new member to full membership.

use std::{sync::Arc, time::Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tsoam_core::{
  eligibility::{self, Criterion},
  person::{FullMember, normalize_service_groups},
  store::{MemberStore, TransferCommit, TransferRequest},
};
use uuid::Uuid;

use crate::{
  Context, EngineError, Result,
  notify::{DomainEvent, TransferSource},
};

/// What a transfer attempt amounted to. Only `Transferred` changed anything.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransferOutcome {
  Transferred { member: FullMember },
  AlreadyTransferred { new_member_id: Uuid },
  NotEligible {
    new_member_id: Uuid,
    missing:       Vec<Criterion>,
  },
}

impl TransferOutcome {
  pub fn message(&self) -> String {
    match self {
      Self::Transferred { member } => format!(
        "transferred to full membership as {} (tithe number {})",
        member.member_id, member.tithe_number
      ),
      Self::AlreadyTransferred { .. } => "already a full member".to_owned(),
      Self::NotEligible { missing, .. } => {
        let missing: Vec<&str> = missing.iter().map(|c| c.describe()).collect();
        format!("not yet qualified, missing: {}", missing.join(", "))
      }
    }
  }
}

/// Runs the read → evaluate → conditional commit sequence. Safe to call
/// concurrently for the same new member: exactly one caller gets
/// `Transferred`, the rest get `AlreadyTransferred`.
pub struct TransferCoordinator<S> {
  ctx: Arc<Context<S>>,
}

impl<S> Clone for TransferCoordinator<S> {
  fn clone(&self) -> Self { Self { ctx: self.ctx.clone() } }
}

impl<S: MemberStore> TransferCoordinator<S> {
  pub(crate) fn new(ctx: Arc<Context<S>>) -> Self { Self { ctx } }

  /// Operator-initiated transfer. An empty `service_groups` keeps the groups
  /// the new member chose at registration.
  pub async fn transfer(
    &self,
    new_member_id: Uuid,
    service_groups: Vec<String>,
  ) -> Result<TransferOutcome> {
    self
      .transfer_as(new_member_id, service_groups, TransferSource::Operator)
      .await
  }

  pub(crate) async fn transfer_as(
    &self,
    new_member_id: Uuid,
    service_groups: Vec<String>,
    source: TransferSource,
  ) -> Result<TransferOutcome> {
    let chosen = normalize_service_groups(service_groups)?;
    let store = &self.ctx.store;

    let member = self
      .ctx
      .call("get_new_member", store.get_new_member(new_member_id))
      .await?
      .ok_or(tsoam_core::Error::NewMemberNotFound(new_member_id))?;

    if !member.is_active {
      tracing::info!(%new_member_id, "new member already transferred");
      return Ok(TransferOutcome::AlreadyTransferred { new_member_id });
    }

    let now = self.ctx.clock.now();
    let verdict = eligibility::evaluate(&member, now.date_naive());
    if !verdict.eligible {
      tracing::debug!(%new_member_id, unmet = ?verdict.unmet, "not eligible for transfer");
      return Ok(TransferOutcome::NotEligible { new_member_id, missing: verdict.unmet });
    }

    let service_groups = if chosen.is_empty() { member.service_groups.clone() } else { chosen };
    let request = TransferRequest {
      new_member_id,
      service_groups,
      transferred_at: now,
      deadline: Some(Instant::now() + self.ctx.store_timeout),
    };

    let commit = match self
      .ctx
      .call("transfer_new_member", store.transfer_new_member(request))
      .await
    {
      Ok(commit) => commit,
      Err(timeout @ EngineError::Timeout { .. }) => {
        match self.reconcile(new_member_id, now).await {
          Some(commit) => commit,
          None => return Err(timeout),
        }
      }
      Err(e) => return Err(e),
    };

    match commit {
      TransferCommit::Committed(full) => {
        tracing::info!(
          %new_member_id,
          member_id = %full.member_id,
          tithe_number = %full.tithe_number,
          ?source,
          "new member transferred"
        );
        self.ctx.notifier.notify(&DomainEvent::MemberTransferred {
          new_member_id,
          member_id: full.member_id,
          tithe_number: full.tithe_number,
          full_name: full.identity.full_name.clone(),
          source,
        });
        Ok(TransferOutcome::Transferred { member: full })
      }
      TransferCommit::AlreadyTransferred => {
        tracing::info!(%new_member_id, "lost transfer race; already transferred");
        Ok(TransferOutcome::AlreadyTransferred { new_member_id })
      }
    }
  }

  /// Find out what a timed-out commit did. The store may still have landed
  /// it just before its deadline; a full member stamped with this attempt's
  /// `transferred_at` is ours. `None` when nothing can be confirmed.
  async fn reconcile(
    &self,
    new_member_id: Uuid,
    transferred_at: DateTime<Utc>,
  ) -> Option<TransferCommit> {
    let found = self
      .ctx
      .call(
        "full_member_transferred_from",
        self.ctx.store.full_member_transferred_from(new_member_id),
      )
      .await;
    match found {
      Ok(Some(full)) if full.membership_date == transferred_at => {
        tracing::info!(%new_member_id, "transfer committed after the caller timed out");
        Some(TransferCommit::Committed(full))
      }
      Ok(Some(_)) => Some(TransferCommit::AlreadyTransferred),
      Ok(None) => None,
      Err(e) => {
        tracing::warn!(%new_member_id, error = %e, "could not confirm timed-out transfer");
        None
      }
    }
  }
}
