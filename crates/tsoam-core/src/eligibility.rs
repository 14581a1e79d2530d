//! The promotion rule for new members.
//!
//! A new member is eligible when the record is still active, at least
//! [`PROBATION_DAYS`] calendar days have passed since the visit date, and both
//! baptism and bible study are complete. There is no partial credit.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::person::NewMember;

/// Minimum probation, in whole calendar days.
pub const PROBATION_DAYS: i64 = 180;

/// A condition that must hold before transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
  /// The record was already transferred or withdrawn.
  Inactive,
  Tenure,
  Baptism,
  BibleStudy,
}

impl Criterion {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Inactive => "inactive",
      Self::Tenure => "tenure",
      Self::Baptism => "baptism",
      Self::BibleStudy => "bible_study",
    }
  }

  /// Short phrase for progress messages.
  pub fn describe(self) -> &'static str {
    match self {
      Self::Inactive => "record no longer active",
      Self::Tenure => "180 days of probation",
      Self::Baptism => "baptism",
      Self::BibleStudy => "bible study",
    }
  }
}

impl fmt::Display for Criterion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// The verdict for one new member on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
  pub eligible:       bool,
  /// Unmet criteria, in a fixed order: inactive, tenure, baptism, bible study.
  pub unmet:          Vec<Criterion>,
  /// Calendar days since the visit date; negative for a future visit date.
  pub days_served:    i64,
  pub days_remaining: i64,
}

/// Evaluate `member` as of `today`. Pure; call it as often as you like.
pub fn evaluate(member: &NewMember, today: NaiveDate) -> Eligibility {
  let days_served = (today - member.visit_date).num_days();
  let checks = [
    (Criterion::Inactive, member.is_active),
    (Criterion::Tenure, days_served >= PROBATION_DAYS),
    (Criterion::Baptism, member.baptized),
    (Criterion::BibleStudy, member.bible_study_completed),
  ];
  let unmet: Vec<Criterion> = checks
    .into_iter()
    .filter(|(_, met)| !met)
    .map(|(criterion, _)| criterion)
    .collect();

  Eligibility {
    eligible: unmet.is_empty(),
    unmet,
    days_served,
    days_remaining: (PROBATION_DAYS - days_served).max(0),
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Days, Utc};
  use uuid::Uuid;

  use super::*;
  use crate::person::{EmploymentStatus, Identity};

  fn today() -> NaiveDate { NaiveDate::from_ymd_opt(2026, 10, 16).unwrap() }

  fn member(days_ago: u64) -> NewMember {
    NewMember {
      new_member_id:            Uuid::new_v4(),
      identity:                 Identity { full_name: "Peter Otieno".into(), phone: "0711000111".into() },
      email:                    None,
      visit_date:               today() - Days::new(days_ago),
      baptized:                 true,
      baptism_date:             None,
      bible_study_completed:    true,
      bible_study_completed_on: None,
      employment_status:        EmploymentStatus::Student,
      prior_church:             None,
      service_groups:           vec![],
      is_active:                true,
      registered_at:            Utc::now(),
    }
  }

  #[test]
  fn two_hundred_days_with_milestones_is_eligible() {
    let verdict = evaluate(&member(200), today());
    assert!(verdict.eligible);
    assert!(verdict.unmet.is_empty());
    assert_eq!(verdict.days_remaining, 0);
  }

  #[test]
  fn one_hundred_days_misses_only_tenure() {
    let verdict = evaluate(&member(100), today());
    assert!(!verdict.eligible);
    assert_eq!(verdict.unmet, vec![Criterion::Tenure]);
    assert_eq!(verdict.days_remaining, 80);
  }

  #[test]
  fn boundary_is_inclusive() {
    assert!(evaluate(&member(180), today()).eligible);
    assert!(!evaluate(&member(179), today()).eligible);
  }

  #[test]
  fn every_condition_is_required() {
    let mut m = member(365);
    m.baptized = false;
    assert_eq!(evaluate(&m, today()).unmet, vec![Criterion::Baptism]);

    let mut m = member(365);
    m.bible_study_completed = false;
    assert_eq!(evaluate(&m, today()).unmet, vec![Criterion::BibleStudy]);

    let mut m = member(365);
    m.is_active = false;
    assert_eq!(evaluate(&m, today()).unmet, vec![Criterion::Inactive]);
  }

  #[test]
  fn unmet_criteria_are_listed_in_order() {
    let mut m = member(10);
    m.baptized = false;
    m.bible_study_completed = false;
    assert_eq!(
      evaluate(&m, today()).unmet,
      vec![Criterion::Tenure, Criterion::Baptism, Criterion::BibleStudy]
    );
  }
}
