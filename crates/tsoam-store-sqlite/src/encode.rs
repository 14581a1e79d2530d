//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, calendar dates are `YYYY-MM-DD`, UUIDs are
//! hyphenated lowercase strings, and list/struct fields are compact JSON.
//! Row structs hold raw column values and are decoded outside the database
//! thread.

use chrono::{DateTime, NaiveDate, Utc};
use tsoam_core::{
  identifier::{MemberId, TitheNumber},
  person::{FullMember, Identity, NewMember, PriorChurch, Visitor},
  status::{DisciplinaryRecord, MembershipStatus},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

fn decode_opt_date(s: Option<String>) -> Result<Option<NaiveDate>> {
  s.as_deref().map(decode_date).transpose()
}

// ─── JSON columns ────────────────────────────────────────────────────────────

pub fn encode_groups(groups: &[String]) -> Result<String> { Ok(serde_json::to_string(groups)?) }

pub fn decode_groups(s: &str) -> Result<Vec<String>> { Ok(serde_json::from_str(s)?) }

pub fn encode_prior_church(p: Option<&PriorChurch>) -> Result<Option<String>> {
  p.map(serde_json::to_string).transpose().map_err(Error::from)
}

fn decode_prior_church(s: Option<String>) -> Result<Option<PriorChurch>> {
  s.as_deref()
    .map(serde_json::from_str)
    .transpose()
    .map_err(Error::from)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw columns of a `visitors` row.
pub struct RawVisitor {
  pub visitor_id:      String,
  pub full_name:       String,
  pub phone:           String,
  pub email:           Option<String>,
  pub visit_date:      String,
  pub purpose:         String,
  pub referral_source: Option<String>,
  pub prayer_request:  Option<String>,
  pub follow_up:       bool,
  pub recorded_at:     String,
}

impl RawVisitor {
  pub const COLUMNS: &'static str = "visitor_id, full_name, phone, email, visit_date, purpose,
     referral_source, prayer_request, follow_up, recorded_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      visitor_id:      row.get(0)?,
      full_name:       row.get(1)?,
      phone:           row.get(2)?,
      email:           row.get(3)?,
      visit_date:      row.get(4)?,
      purpose:         row.get(5)?,
      referral_source: row.get(6)?,
      prayer_request:  row.get(7)?,
      follow_up:       row.get(8)?,
      recorded_at:     row.get(9)?,
    })
  }

  pub fn into_visitor(self) -> Result<Visitor> {
    Ok(Visitor {
      visitor_id:      decode_uuid(&self.visitor_id)?,
      identity:        Identity { full_name: self.full_name, phone: self.phone },
      email:           self.email,
      visit_date:      decode_date(&self.visit_date)?,
      purpose:         self.purpose,
      referral_source: self.referral_source,
      prayer_request:  self.prayer_request,
      follow_up:       self.follow_up,
      recorded_at:     decode_dt(&self.recorded_at)?,
    })
  }
}

/// Raw columns of a `new_members` row.
pub struct RawNewMember {
  pub new_member_id:            String,
  pub full_name:                String,
  pub phone:                    String,
  pub email:                    Option<String>,
  pub visit_date:               String,
  pub baptized:                 bool,
  pub baptism_date:             Option<String>,
  pub bible_study_completed:    bool,
  pub bible_study_completed_on: Option<String>,
  pub employment_status:        String,
  pub prior_church:             Option<String>,
  pub service_groups:           String,
  pub is_active:                bool,
  pub registered_at:            String,
}

impl RawNewMember {
  pub const COLUMNS: &'static str = "new_member_id, full_name, phone, email, visit_date,
     baptized, baptism_date, bible_study_completed, bible_study_completed_on,
     employment_status, prior_church, service_groups, is_active, registered_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      new_member_id:            row.get(0)?,
      full_name:                row.get(1)?,
      phone:                    row.get(2)?,
      email:                    row.get(3)?,
      visit_date:               row.get(4)?,
      baptized:                 row.get(5)?,
      baptism_date:             row.get(6)?,
      bible_study_completed:    row.get(7)?,
      bible_study_completed_on: row.get(8)?,
      employment_status:        row.get(9)?,
      prior_church:             row.get(10)?,
      service_groups:           row.get(11)?,
      is_active:                row.get(12)?,
      registered_at:            row.get(13)?,
    })
  }

  pub fn into_new_member(self) -> Result<NewMember> {
    Ok(NewMember {
      new_member_id:            decode_uuid(&self.new_member_id)?,
      identity:                 Identity { full_name: self.full_name, phone: self.phone },
      email:                    self.email,
      visit_date:               decode_date(&self.visit_date)?,
      baptized:                 self.baptized,
      baptism_date:             decode_opt_date(self.baptism_date)?,
      bible_study_completed:    self.bible_study_completed,
      bible_study_completed_on: decode_opt_date(self.bible_study_completed_on)?,
      employment_status:        self.employment_status.parse()?,
      prior_church:             decode_prior_church(self.prior_church)?,
      service_groups:           decode_groups(&self.service_groups)?,
      is_active:                self.is_active,
      registered_at:            decode_dt(&self.registered_at)?,
    })
  }
}

/// Raw columns of a `full_members` row; disciplinary records are loaded
/// separately.
pub struct RawFullMember {
  pub member_id:         String,
  pub tithe_number:      String,
  pub full_name:         String,
  pub phone:             String,
  pub email:             Option<String>,
  pub membership_status: String,
  pub membership_date:   String,
  pub transferred_from:  String,
  pub service_groups:    String,
}

impl RawFullMember {
  pub const COLUMNS: &'static str = "member_id, tithe_number, full_name, phone, email,
     membership_status, membership_date, transferred_from, service_groups";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      member_id:         row.get(0)?,
      tithe_number:      row.get(1)?,
      full_name:         row.get(2)?,
      phone:             row.get(3)?,
      email:             row.get(4)?,
      membership_status: row.get(5)?,
      membership_date:   row.get(6)?,
      transferred_from:  row.get(7)?,
      service_groups:    row.get(8)?,
    })
  }

  pub fn into_full_member(self, records: Vec<RawDisciplinary>) -> Result<FullMember> {
    Ok(FullMember {
      member_id:                      self.member_id.parse::<MemberId>()?,
      tithe_number:                   self.tithe_number.parse::<TitheNumber>()?,
      identity:                       Identity { full_name: self.full_name, phone: self.phone },
      email:                          self.email,
      membership_status:              self.membership_status.parse::<MembershipStatus>()?,
      membership_date:                decode_dt(&self.membership_date)?,
      transferred_from_new_member_id: decode_uuid(&self.transferred_from)?,
      service_groups:                 decode_groups(&self.service_groups)?,
      disciplinary_records:           records
        .into_iter()
        .map(RawDisciplinary::into_record)
        .collect::<Result<_>>()?,
    })
  }
}

/// Raw columns of a `disciplinary_records` row.
pub struct RawDisciplinary {
  pub member_id:      String,
  pub record_id:      String,
  pub kind:           String,
  pub reason:         String,
  pub effective_date: String,
  pub recorded_at:    String,
}

impl RawDisciplinary {
  pub const COLUMNS: &'static str =
    "member_id, record_id, kind, reason, effective_date, recorded_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      member_id:      row.get(0)?,
      record_id:      row.get(1)?,
      kind:           row.get(2)?,
      reason:         row.get(3)?,
      effective_date: row.get(4)?,
      recorded_at:    row.get(5)?,
    })
  }

  pub fn into_record(self) -> Result<DisciplinaryRecord> {
    Ok(DisciplinaryRecord {
      record_id:      decode_uuid(&self.record_id)?,
      kind:           self.kind.parse()?,
      reason:         self.reason,
      effective_date: decode_date(&self.effective_date)?,
      recorded_at:    decode_dt(&self.recorded_at)?,
    })
  }
}
