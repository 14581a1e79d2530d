//! Person records along the membership track: visitors, new members on
//! probation, and full members.
//!
//! Inputs (`NewVisitor`, `NewMemberRegistration`, `ProgressUpdate`) carry
//! their own `validate` so callers can reject bad input before any store
//! interaction. Stored records are built by the store.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  identifier::{MemberId, TitheNumber},
  status::{DisciplinaryRecord, MembershipStatus},
};

// ─── Identity ────────────────────────────────────────────────────────────────

/// Who a person is, as far as matching records across the track goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
  pub full_name: String,
  pub phone:     String,
}

impl Identity {
  /// Case- and whitespace-insensitive name, digits-only phone.
  pub fn normalized(&self) -> (String, String) {
    let name = self
      .full_name
      .split_whitespace()
      .map(str::to_lowercase)
      .collect::<Vec<_>>()
      .join(" ");
    let phone = self.phone.chars().filter(char::is_ascii_digit).collect();
    (name, phone)
  }

  /// Whether two identities denote the same person.
  pub fn matches(&self, other: &Identity) -> bool { self.normalized() == other.normalized() }

  fn validate(&self) -> Result<()> {
    require("full_name", &self.full_name)?;
    require("phone", &self.phone)?;
    if !self.phone.chars().any(|c| c.is_ascii_digit()) {
      return Err(Error::Validation("phone must contain digits".into()));
    }
    Ok(())
  }
}

// ─── Visitor ─────────────────────────────────────────────────────────────────

/// A first-time contact. Never promoted; registering as a new member is a
/// separate act.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Visitor {
  pub visitor_id:      Uuid,
  #[serde(flatten)]
  pub identity:        Identity,
  pub email:           Option<String>,
  pub visit_date:      NaiveDate,
  pub purpose:         String,
  pub referral_source: Option<String>,
  pub prayer_request:  Option<String>,
  pub follow_up:       bool,
  pub recorded_at:     DateTime<Utc>,
}

/// Input to [`crate::store::MemberStore::add_visitor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVisitor {
  #[serde(flatten)]
  pub identity:        Identity,
  pub email:           Option<String>,
  pub visit_date:      NaiveDate,
  pub purpose:         String,
  pub referral_source: Option<String>,
  pub prayer_request:  Option<String>,
  #[serde(default)]
  pub follow_up:       bool,
}

impl NewVisitor {
  pub fn validate(&self, today: NaiveDate) -> Result<()> {
    self.identity.validate()?;
    require("purpose", &self.purpose)?;
    not_after_today("visit_date", self.visit_date, today)
  }
}

// ─── New member ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmploymentStatus {
  Employed,
  SelfEmployed,
  Unemployed,
  Student,
  Retired,
}

impl EmploymentStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Employed => "employed",
      Self::SelfEmployed => "self_employed",
      Self::Unemployed => "unemployed",
      Self::Student => "student",
      Self::Retired => "retired",
    }
  }
}

impl std::str::FromStr for EmploymentStatus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "employed" => Ok(Self::Employed),
      "self_employed" => Ok(Self::SelfEmployed),
      "unemployed" => Ok(Self::Unemployed),
      "student" => Ok(Self::Student),
      "retired" => Ok(Self::Retired),
      other => Err(Error::UnknownVariant { kind: "employment status", value: other.to_owned() }),
    }
  }
}

/// Where a new member worshipped before.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorChurch {
  pub name:               String,
  pub reason_for_leaving: Option<String>,
}

/// A person on probation, pending full membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMember {
  pub new_member_id:            Uuid,
  #[serde(flatten)]
  pub identity:                 Identity,
  pub email:                    Option<String>,
  /// Probation start.
  pub visit_date:               NaiveDate,
  pub baptized:                 bool,
  pub baptism_date:             Option<NaiveDate>,
  pub bible_study_completed:    bool,
  pub bible_study_completed_on: Option<NaiveDate>,
  pub employment_status:        EmploymentStatus,
  pub prior_church:             Option<PriorChurch>,
  pub service_groups:           Vec<String>,
  /// `false` once transferred or withdrawn. Never flips back.
  pub is_active:                bool,
  pub registered_at:            DateTime<Utc>,
}

/// Input to [`crate::store::MemberStore::register_new_member`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMemberRegistration {
  #[serde(flatten)]
  pub identity:                 Identity,
  pub email:                    Option<String>,
  pub visit_date:               NaiveDate,
  #[serde(default)]
  pub baptized:                 bool,
  pub baptism_date:             Option<NaiveDate>,
  #[serde(default)]
  pub bible_study_completed:    bool,
  pub bible_study_completed_on: Option<NaiveDate>,
  pub employment_status:        EmploymentStatus,
  pub prior_church:             Option<PriorChurch>,
  #[serde(default)]
  pub service_groups:           Vec<String>,
}

impl NewMemberRegistration {
  /// Check the registration and normalise its service groups in place.
  pub fn validate(&mut self, today: NaiveDate) -> Result<()> {
    self.identity.validate()?;
    not_after_today("visit_date", self.visit_date, today)?;
    milestone("baptism_date", self.baptized, self.baptism_date, today)?;
    milestone(
      "bible_study_completed_on",
      self.bible_study_completed,
      self.bible_study_completed_on,
      today,
    )?;
    if let Some(prior) = &self.prior_church {
      require("prior_church.name", &prior.name)?;
    }
    self.service_groups = normalize_service_groups(std::mem::take(&mut self.service_groups))?;
    Ok(())
  }
}

/// Milestones reached during probation. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressUpdate {
  pub baptism_date:             Option<NaiveDate>,
  pub bible_study_completed_on: Option<NaiveDate>,
}

impl ProgressUpdate {
  pub fn validate(&self, today: NaiveDate) -> Result<()> {
    if self.baptism_date.is_none() && self.bible_study_completed_on.is_none() {
      return Err(Error::Validation("no milestone given".into()));
    }
    if let Some(date) = self.baptism_date {
      not_after_today("baptism_date", date, today)?;
    }
    if let Some(date) = self.bible_study_completed_on {
      not_after_today("bible_study_completed_on", date, today)?;
    }
    Ok(())
  }
}

// ─── Full member ─────────────────────────────────────────────────────────────

/// A person with allocated identifiers and an ongoing standing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullMember {
  pub member_id:                      MemberId,
  pub tithe_number:                   TitheNumber,
  #[serde(flatten)]
  pub identity:                       Identity,
  pub email:                          Option<String>,
  pub membership_status:              MembershipStatus,
  /// Transfer timestamp.
  pub membership_date:                DateTime<Utc>,
  /// Lookup only; the new-member record may since have been purged.
  pub transferred_from_new_member_id: Uuid,
  pub service_groups:                 Vec<String>,
  pub disciplinary_records:           Vec<DisciplinaryRecord>,
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Trim, drop duplicates (keeping first occurrence), and reject blank names.
pub fn normalize_service_groups(groups: Vec<String>) -> Result<Vec<String>> {
  let mut out: Vec<String> = Vec::with_capacity(groups.len());
  for group in groups {
    let trimmed = group.trim();
    if trimmed.is_empty() {
      return Err(Error::Validation("service group names must not be blank".into()));
    }
    if !out.iter().any(|g| g.eq_ignore_ascii_case(trimmed)) {
      out.push(trimmed.to_owned());
    }
  }
  Ok(out)
}

fn require(field: &str, value: &str) -> Result<()> {
  if value.trim().is_empty() {
    return Err(Error::Validation(format!("{field} is required")));
  }
  Ok(())
}

fn not_after_today(field: &str, date: NaiveDate, today: NaiveDate) -> Result<()> {
  if date > today {
    return Err(Error::Validation(format!("{field} {date} is in the future")));
  }
  Ok(())
}

fn milestone(field: &str, reached: bool, date: Option<NaiveDate>, today: NaiveDate) -> Result<()> {
  match (reached, date) {
    (false, Some(_)) => Err(Error::Validation(format!("{field} given but milestone not reached"))),
    (_, Some(date)) => not_after_today(field, date, today),
    _ => Ok(()),
  }
}
