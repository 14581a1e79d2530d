//! The full-member status lifecycle.
//!
//! Requests are checked against the transition table up front for a quick
//! answer, then re-checked by the store against the committed status. The
//! store's verdict is the one that counts.

use std::sync::Arc;

use chrono::NaiveDate;
use tsoam_core::{
  identifier::MemberId,
  person::FullMember,
  status::{self, MembershipStatus, Reason, StatusAction},
  store::{MemberStore, StatusChange},
};

use crate::{Context, EngineError, ErrorClass, Result, notify::DomainEvent};

pub struct StatusManager<S> {
  ctx: Arc<Context<S>>,
}

impl<S: MemberStore> StatusManager<S> {
  pub(crate) fn new(ctx: Arc<Context<S>>) -> Self { Self { ctx } }

  /// Apply `action` to a member. `effective_date` defaults to today and may
  /// not lie in the future.
  ///
  /// Excommunication also purges the member's probation records. If that
  /// purge fails after the status has been committed, the result is
  /// [`EngineError::CascadeIncomplete`]; call [`Self::complete_cascade`].
  pub async fn change_status(
    &self,
    member_id: MemberId,
    action: StatusAction,
    reason: &str,
    effective_date: Option<NaiveDate>,
  ) -> Result<FullMember> {
    let result = self.apply(member_id, action, reason, effective_date).await;
    if let Err(e) = &result {
      log_refusal(member_id, e);
    }
    result
  }

  pub async fn suspend(&self, member_id: MemberId, reason: &str) -> Result<FullMember> {
    self.change_status(member_id, StatusAction::Suspend, reason, None).await
  }

  pub async fn reactivate(&self, member_id: MemberId, reason: &str) -> Result<FullMember> {
    self.change_status(member_id, StatusAction::Reactivate, reason, None).await
  }

  pub async fn deactivate(&self, member_id: MemberId, reason: &str) -> Result<FullMember> {
    self.change_status(member_id, StatusAction::Deactivate, reason, None).await
  }

  pub async fn excommunicate(&self, member_id: MemberId, reason: &str) -> Result<FullMember> {
    self.change_status(member_id, StatusAction::Excommunicate, reason, None).await
  }

  async fn apply(
    &self,
    member_id: MemberId,
    action: StatusAction,
    reason: &str,
    effective_date: Option<NaiveDate>,
  ) -> Result<FullMember> {
    let reason = Reason::new(reason)?;
    let now = self.ctx.clock.now();
    let effective_date = self.effective_date(effective_date, now.date_naive())?;
    let store = &self.ctx.store;

    let current = self.load(member_id).await?;
    let from = current.membership_status;
    status::check_transition(member_id, from, action.target())?;

    let change = StatusChange {
      member_id,
      action,
      reason: reason.clone(),
      effective_date,
      recorded_at: now,
    };
    let updated = self
      .ctx
      .call("set_member_status", store.set_member_status(change))
      .await?;

    tracing::info!(
      %member_id,
      from = %from,
      to = %updated.membership_status,
      reason = %reason,
      "member status changed"
    );
    self.ctx.notifier.notify(&DomainEvent::StatusChanged {
      member_id,
      from,
      to: updated.membership_status,
      reason: reason.as_str().to_owned(),
    });

    if updated.membership_status == MembershipStatus::Excommunicated {
      self
        .purge(&updated)
        .await
        .map_err(|e| EngineError::CascadeIncomplete { member_id, source: Box::new(e) })?;
    }

    Ok(updated)
  }

  /// Append a warning without touching status.
  pub async fn issue_warning(
    &self,
    member_id: MemberId,
    reason: &str,
    effective_date: Option<NaiveDate>,
  ) -> Result<FullMember> {
    let result = self.warn(member_id, reason, effective_date).await;
    if let Err(e) = &result {
      log_refusal(member_id, e);
    }
    result
  }

  async fn warn(
    &self,
    member_id: MemberId,
    reason: &str,
    effective_date: Option<NaiveDate>,
  ) -> Result<FullMember> {
    let reason = Reason::new(reason)?;
    let now = self.ctx.clock.now();
    let effective_date = self.effective_date(effective_date, now.date_naive())?;
    let updated = self
      .ctx
      .call(
        "record_warning",
        self.ctx.store.record_warning(member_id, reason.clone(), effective_date, now),
      )
      .await?;

    tracing::info!(%member_id, reason = %reason, "warning issued");
    self.ctx.notifier.notify(&DomainEvent::WarningIssued {
      member_id,
      reason: reason.as_str().to_owned(),
    });
    Ok(updated)
  }

  /// Re-run the probation purge for an excommunicated member. Idempotent;
  /// returns how many records were removed this time.
  pub async fn complete_cascade(&self, member_id: MemberId) -> Result<usize> {
    let member = self.load(member_id).await?;
    if member.membership_status != MembershipStatus::Excommunicated {
      return Err(EngineError::NotExcommunicated(member_id));
    }
    self.purge(&member).await
  }

  async fn purge(&self, member: &FullMember) -> Result<usize> {
    let member_id = member.member_id;
    let purged = self
      .ctx
      .call(
        "excommunicate_cascade",
        self.ctx.store.excommunicate_cascade(
          member.identity.clone(),
          Some(member.transferred_from_new_member_id),
        ),
      )
      .await
      .inspect_err(|e| tracing::warn!(%member_id, error = %e, "probation cascade failed"))?;

    tracing::info!(%member_id, purged, "probation records purged");
    self.ctx.notifier.notify(&DomainEvent::ProbationPurged { member_id, purged });
    Ok(purged)
  }

  async fn load(&self, member_id: MemberId) -> Result<FullMember> {
    Ok(
      self
        .ctx
        .call("get_full_member", self.ctx.store.get_full_member(member_id))
        .await?
        .ok_or(tsoam_core::Error::MemberNotFound(member_id))?,
    )
  }

  fn effective_date(&self, requested: Option<NaiveDate>, today: NaiveDate) -> Result<NaiveDate> {
    match requested {
      Some(date) if date > today => {
        Err(EngineError::validation(format!("effective_date {date} is in the future")))
      }
      Some(date) => Ok(date),
      None => Ok(today),
    }
  }
}

/// Expected refusals are routine; anything else deserves a warning.
fn log_refusal(member_id: MemberId, e: &EngineError) {
  match e.class() {
    ErrorClass::Conflict | ErrorClass::Validation | ErrorClass::NotFound => {
      tracing::info!(%member_id, error = %e, "status request refused");
    }
    ErrorClass::Transient | ErrorClass::Invariant => {
      tracing::warn!(%member_id, error = %e, "status request failed");
    }
  }
}
