//! Intake and read operations: visitors, registrations, probation progress.
//!
//! Input is validated against today's date before the store sees it.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tsoam_core::{
  eligibility::{self, Eligibility},
  identifier::MemberId,
  person::{
    FullMember, NewMember, NewMemberRegistration, NewVisitor, ProgressUpdate, Visitor,
  },
  status::MembershipStatus,
  store::MemberStore,
};
use uuid::Uuid;

use crate::{Context, Result};

/// Probation progress for one new member.
#[derive(Debug, Clone, Serialize)]
pub struct EligibilityReport {
  pub new_member_id: Uuid,
  pub full_name:     String,
  pub visit_date:    NaiveDate,
  #[serde(flatten)]
  pub eligibility:   Eligibility,
}

impl EligibilityReport {
  fn of(member: &NewMember, today: NaiveDate) -> Self {
    Self {
      new_member_id: member.new_member_id,
      full_name:     member.identity.full_name.clone(),
      visit_date:    member.visit_date,
      eligibility:   eligibility::evaluate(member, today),
    }
  }
}

pub struct Registry<S> {
  ctx: Arc<Context<S>>,
}

impl<S: MemberStore> Registry<S> {
  pub(crate) fn new(ctx: Arc<Context<S>>) -> Self { Self { ctx } }

  // ── Visitors ──────────────────────────────────────────────────────────────

  pub async fn add_visitor(&self, input: NewVisitor) -> Result<Visitor> {
    input.validate(self.ctx.clock.today())?;
    let visitor = self.ctx.call("add_visitor", self.ctx.store.add_visitor(input)).await?;
    tracing::info!(visitor_id = %visitor.visitor_id, "visitor recorded");
    Ok(visitor)
  }

  pub async fn list_visitors(&self) -> Result<Vec<Visitor>> {
    self.ctx.call("list_visitors", self.ctx.store.list_visitors()).await
  }

  // ── New members ───────────────────────────────────────────────────────────

  pub async fn register_new_member(&self, mut input: NewMemberRegistration) -> Result<NewMember> {
    input.validate(self.ctx.clock.today())?;
    let member = self
      .ctx
      .call("register_new_member", self.ctx.store.register_new_member(input))
      .await?;
    tracing::info!(new_member_id = %member.new_member_id, "new member registered");
    Ok(member)
  }

  pub async fn get_new_member(&self, id: Uuid) -> Result<NewMember> {
    Ok(
      self
        .ctx
        .call("get_new_member", self.ctx.store.get_new_member(id))
        .await?
        .ok_or(tsoam_core::Error::NewMemberNotFound(id))?,
    )
  }

  pub async fn list_new_members(&self, include_inactive: bool) -> Result<Vec<NewMember>> {
    self
      .ctx
      .call("list_new_members", self.ctx.store.list_new_members(include_inactive))
      .await
  }

  pub async fn record_progress(&self, id: Uuid, update: ProgressUpdate) -> Result<NewMember> {
    update.validate(self.ctx.clock.today())?;
    let member = self
      .ctx
      .call("record_progress", self.ctx.store.record_progress(id, update))
      .await?;
    tracing::info!(
      new_member_id = %id,
      baptized = member.baptized,
      bible_study_completed = member.bible_study_completed,
      "probation progress recorded"
    );
    Ok(member)
  }

  pub async fn withdraw_new_member(&self, id: Uuid) -> Result<NewMember> {
    let member = self
      .ctx
      .call("withdraw_new_member", self.ctx.store.withdraw_new_member(id))
      .await?;
    tracing::info!(new_member_id = %id, "new member withdrawn from probation");
    Ok(member)
  }

  // ── Eligibility ───────────────────────────────────────────────────────────

  pub async fn eligibility(&self, id: Uuid) -> Result<EligibilityReport> {
    let member = self.get_new_member(id).await?;
    Ok(EligibilityReport::of(&member, self.ctx.clock.today()))
  }

  /// Progress for every active new member, soonest-eligible first.
  pub async fn eligibility_report(&self) -> Result<Vec<EligibilityReport>> {
    let today = self.ctx.clock.today();
    let members = self
      .ctx
      .call("active_new_members", self.ctx.store.active_new_members())
      .await?;
    let mut report: Vec<EligibilityReport> =
      members.iter().map(|m| EligibilityReport::of(m, today)).collect();
    report.sort_by_key(|r| (!r.eligibility.eligible, r.eligibility.days_remaining));
    Ok(report)
  }

  // ── Full members ──────────────────────────────────────────────────────────

  pub async fn get_full_member(&self, id: MemberId) -> Result<FullMember> {
    Ok(
      self
        .ctx
        .call("get_full_member", self.ctx.store.get_full_member(id))
        .await?
        .ok_or(tsoam_core::Error::MemberNotFound(id))?,
    )
  }

  pub async fn list_full_members(
    &self,
    status: Option<MembershipStatus>,
  ) -> Result<Vec<FullMember>> {
    self
      .ctx
      .call("list_full_members", self.ctx.store.list_full_members(status))
      .await
  }
}
