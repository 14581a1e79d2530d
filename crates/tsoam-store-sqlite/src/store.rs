//! [`SqliteStore`]: the SQLite implementation of [`MemberStore`].

use std::{collections::HashMap, path::Path, time::Instant};

use chrono::{DateTime, Datelike as _, NaiveDate, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use tsoam_core::{
  identifier::{self, IdentifierKind, MemberId, TitheNumber},
  person::{
    FullMember, Identity, NewMember, NewMemberRegistration, NewVisitor, ProgressUpdate, Visitor,
  },
  status::{self, DisciplinaryKind, MembershipStatus, Reason},
  store::{MemberStore, StatusChange, TransferCommit, TransferRequest},
};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    RawDisciplinary, RawFullMember, RawNewMember, RawVisitor, encode_date, encode_dt,
    encode_groups, encode_prior_church, encode_uuid,
  },
  schema::SCHEMA,
};

/// The outcome of a closure run on the database thread.
///
/// Rule violations detected mid-transaction are returned as data so the
/// transaction is dropped (and rolled back) rather than committed.
enum Step<T> {
  Done(T),
  Rejected(tsoam_core::Error),
  Expired,
}

impl<T> Step<T> {
  fn into_result(self) -> Result<T> {
    match self {
      Step::Done(v) => Ok(v),
      Step::Rejected(e) => Err(Error::Core(e)),
      Step::Expired => Err(Error::DeadlineExceeded),
    }
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A membership store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, used by tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Set the last-issued sequence for `(year, kind)` directly.
  #[cfg(test)]
  pub(crate) async fn seed_counter(&self, year: i32, kind: IdentifierKind, last: u32) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO id_counters (year, kind, last_value) VALUES (?1, ?2, ?3)
           ON CONFLICT (year, kind) DO UPDATE SET last_value = excluded.last_value",
          rusqlite::params![year, kind.as_str(), last],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn load_new_member(&self, id: Uuid) -> Result<Option<NewMember>> {
    let id_str = encode_uuid(id);
    let raw: Option<RawNewMember> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {} FROM new_members WHERE new_member_id = ?1", RawNewMember::COLUMNS),
              rusqlite::params![id_str],
              RawNewMember::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawNewMember::into_new_member).transpose()
  }

  async fn load_new_members(&self, only_active: bool) -> Result<Vec<NewMember>> {
    let raws: Vec<RawNewMember> = self
      .conn
      .call(move |conn| {
        let filter = if only_active { "WHERE is_active = 1" } else { "" };
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM new_members {filter} ORDER BY visit_date, registered_at",
          RawNewMember::COLUMNS
        ))?;
        let rows = stmt
          .query_map([], RawNewMember::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawNewMember::into_new_member).collect()
  }

  /// Load full members matching every given filter, together with their
  /// disciplinary history.
  async fn load_full_members(
    &self,
    member_id: Option<MemberId>,
    status: Option<MembershipStatus>,
    transferred_from: Option<Uuid>,
  ) -> Result<Vec<FullMember>> {
    let id_str = member_id.map(|id| id.to_string());
    let status_str = status.map(MembershipStatus::as_str);
    let origin_str = transferred_from.map(encode_uuid);

    let (members, records): (Vec<RawFullMember>, Vec<RawDisciplinary>) = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM full_members
           WHERE (?1 IS NULL OR member_id = ?1)
             AND (?2 IS NULL OR membership_status = ?2)
             AND (?3 IS NULL OR transferred_from = ?3)
           ORDER BY membership_date, member_id",
          RawFullMember::COLUMNS
        ))?;
        let members = stmt
          .query_map(
            rusqlite::params![id_str, status_str, origin_str],
            RawFullMember::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM disciplinary_records
           WHERE member_id IN (
             SELECT member_id FROM full_members
             WHERE (?1 IS NULL OR member_id = ?1)
               AND (?2 IS NULL OR membership_status = ?2)
               AND (?3 IS NULL OR transferred_from = ?3)
           )
           ORDER BY recorded_at, rowid",
          RawDisciplinary::COLUMNS
        ))?;
        let records = stmt
          .query_map(
            rusqlite::params![id_str, status_str, origin_str],
            RawDisciplinary::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((members, records))
      })
      .await?;

    let mut by_member: HashMap<String, Vec<RawDisciplinary>> = HashMap::new();
    for record in records {
      by_member.entry(record.member_id.clone()).or_default().push(record);
    }

    members
      .into_iter()
      .map(|raw| {
        let own = by_member.remove(&raw.member_id).unwrap_or_default();
        raw.into_full_member(own)
      })
      .collect()
  }

  async fn load_full_member(&self, id: MemberId) -> Result<FullMember> {
    self
      .load_full_members(Some(id), None, None)
      .await?
      .pop()
      .ok_or(Error::Core(tsoam_core::Error::MemberNotFound(id)))
  }
}

/// Advance the `(year, kind)` counter and return the new sequence number.
///
/// Must run inside the transaction that spends the number; a rollback
/// returns it.
fn allocate(
  tx: &rusqlite::Transaction<'_>,
  year: i32,
  kind: IdentifierKind,
) -> rusqlite::Result<tsoam_core::Result<u16>> {
  let last: u32 = tx
    .query_row(
      "SELECT last_value FROM id_counters WHERE year = ?1 AND kind = ?2",
      rusqlite::params![year, kind.as_str()],
      |r| r.get(0),
    )
    .optional()?
    .unwrap_or(0);

  let next = match identifier::next_sequence(kind, year, last) {
    Ok(next) => next,
    Err(e) => return Ok(Err(e)),
  };

  tx.execute(
    "INSERT INTO id_counters (year, kind, last_value) VALUES (?1, ?2, ?3)
     ON CONFLICT (year, kind) DO UPDATE SET last_value = excluded.last_value",
    rusqlite::params![year, kind.as_str(), next],
  )?;
  Ok(Ok(next))
}

/// Read a member's committed status inside `tx`.
fn current_status(
  tx: &rusqlite::Transaction<'_>,
  member_id: MemberId,
) -> rusqlite::Result<tsoam_core::Result<MembershipStatus>> {
  let raw: Option<String> = tx
    .query_row(
      "SELECT membership_status FROM full_members WHERE member_id = ?1",
      rusqlite::params![member_id.to_string()],
      |r| r.get(0),
    )
    .optional()?;
  Ok(match raw {
    Some(s) => s.parse(),
    None => Err(tsoam_core::Error::MemberNotFound(member_id)),
  })
}

fn insert_disciplinary(
  tx: &rusqlite::Transaction<'_>,
  member_id: MemberId,
  kind: DisciplinaryKind,
  reason: &str,
  effective_date: NaiveDate,
  recorded_at: &str,
) -> rusqlite::Result<()> {
  tx.execute(
    "INSERT INTO disciplinary_records
       (record_id, member_id, kind, reason, effective_date, recorded_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    rusqlite::params![
      encode_uuid(Uuid::new_v4()),
      member_id.to_string(),
      kind.as_str(),
      reason,
      encode_date(effective_date),
      recorded_at,
    ],
  )?;
  Ok(())
}

// ─── MemberStore impl ────────────────────────────────────────────────────────

impl MemberStore for SqliteStore {
  type Error = Error;

  // ── Visitors ──────────────────────────────────────────────────────────────

  async fn add_visitor(&self, input: NewVisitor) -> Result<Visitor> {
    let visitor = Visitor {
      visitor_id:      Uuid::new_v4(),
      identity:        input.identity,
      email:           input.email,
      visit_date:      input.visit_date,
      purpose:         input.purpose,
      referral_source: input.referral_source,
      prayer_request:  input.prayer_request,
      follow_up:       input.follow_up,
      recorded_at:     Utc::now(),
    };

    let row = visitor.clone();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO visitors (
             visitor_id, full_name, phone, email, visit_date, purpose,
             referral_source, prayer_request, follow_up, recorded_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            encode_uuid(row.visitor_id),
            row.identity.full_name,
            row.identity.phone,
            row.email,
            encode_date(row.visit_date),
            row.purpose,
            row.referral_source,
            row.prayer_request,
            row.follow_up,
            encode_dt(row.recorded_at),
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(visitor)
  }

  async fn list_visitors(&self) -> Result<Vec<Visitor>> {
    let raws: Vec<RawVisitor> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM visitors ORDER BY visit_date DESC, recorded_at DESC",
          RawVisitor::COLUMNS
        ))?;
        let rows = stmt
          .query_map([], RawVisitor::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawVisitor::into_visitor).collect()
  }

  // ── New members ───────────────────────────────────────────────────────────

  async fn register_new_member(&self, input: NewMemberRegistration) -> Result<NewMember> {
    let member = NewMember {
      new_member_id:            Uuid::new_v4(),
      identity:                 input.identity,
      email:                    input.email,
      visit_date:               input.visit_date,
      baptized:                 input.baptized,
      baptism_date:             input.baptism_date,
      bible_study_completed:    input.bible_study_completed,
      bible_study_completed_on: input.bible_study_completed_on,
      employment_status:        input.employment_status,
      prior_church:             input.prior_church,
      service_groups:           input.service_groups,
      is_active:                true,
      registered_at:            Utc::now(),
    };

    let prior_church = encode_prior_church(member.prior_church.as_ref())?;
    let groups = encode_groups(&member.service_groups)?;
    let row = member.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO new_members (
             new_member_id, full_name, phone, email, visit_date,
             baptized, baptism_date, bible_study_completed, bible_study_completed_on,
             employment_status, prior_church, service_groups, is_active, registered_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 1, ?13)",
          rusqlite::params![
            encode_uuid(row.new_member_id),
            row.identity.full_name,
            row.identity.phone,
            row.email,
            encode_date(row.visit_date),
            row.baptized,
            row.baptism_date.map(encode_date),
            row.bible_study_completed,
            row.bible_study_completed_on.map(encode_date),
            row.employment_status.as_str(),
            prior_church,
            groups,
            encode_dt(row.registered_at),
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(member)
  }

  async fn get_new_member(&self, id: Uuid) -> Result<Option<NewMember>> {
    self.load_new_member(id).await
  }

  async fn list_new_members(&self, include_inactive: bool) -> Result<Vec<NewMember>> {
    self.load_new_members(!include_inactive).await
  }

  async fn active_new_members(&self) -> Result<Vec<NewMember>> { self.load_new_members(true).await }

  async fn record_progress(&self, id: Uuid, update: ProgressUpdate) -> Result<NewMember> {
    let id_str = encode_uuid(id);
    let baptism = update.baptism_date.map(encode_date);
    let study = update.bible_study_completed_on.map(encode_date);

    let step: Step<()> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let active: Option<bool> = tx
          .query_row(
            "SELECT is_active FROM new_members WHERE new_member_id = ?1",
            rusqlite::params![id_str],
            |r| r.get(0),
          )
          .optional()?;
        match active {
          None => return Ok(Step::Rejected(tsoam_core::Error::NewMemberNotFound(id))),
          Some(false) => return Ok(Step::Rejected(tsoam_core::Error::NewMemberInactive(id))),
          Some(true) => {}
        }
        if let Some(date) = baptism {
          tx.execute(
            "UPDATE new_members SET baptized = 1, baptism_date = ?2 WHERE new_member_id = ?1",
            rusqlite::params![id_str, date],
          )?;
        }
        if let Some(date) = study {
          tx.execute(
            "UPDATE new_members SET bible_study_completed = 1, bible_study_completed_on = ?2
             WHERE new_member_id = ?1",
            rusqlite::params![id_str, date],
          )?;
        }
        tx.commit()?;
        Ok(Step::Done(()))
      })
      .await?;
    step.into_result()?;

    self
      .load_new_member(id)
      .await?
      .ok_or(Error::Core(tsoam_core::Error::NewMemberNotFound(id)))
  }

  async fn withdraw_new_member(&self, id: Uuid) -> Result<NewMember> {
    let id_str = encode_uuid(id);

    let step: Step<()> = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE new_members SET is_active = 0 WHERE new_member_id = ?1 AND is_active = 1",
          rusqlite::params![id_str],
        )?;
        if changed == 1 {
          return Ok(Step::Done(()));
        }
        let exists = conn
          .query_row(
            "SELECT 1 FROM new_members WHERE new_member_id = ?1",
            rusqlite::params![id_str],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        Ok(Step::Rejected(if exists {
          tsoam_core::Error::NewMemberInactive(id)
        } else {
          tsoam_core::Error::NewMemberNotFound(id)
        }))
      })
      .await?;
    step.into_result()?;

    self
      .load_new_member(id)
      .await?
      .ok_or(Error::Core(tsoam_core::Error::NewMemberNotFound(id)))
  }

  // ── Transfer ──────────────────────────────────────────────────────────────

  async fn transfer_new_member(&self, request: TransferRequest) -> Result<TransferCommit> {
    let id = request.new_member_id;
    let id_str = encode_uuid(id);
    let year = request.transferred_at.year();
    let at_str = encode_dt(request.transferred_at);
    let groups = encode_groups(&request.service_groups)?;
    let deadline = request.deadline;

    let step: Step<Option<(RawNewMember, MemberId, TitheNumber)>> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let raw = tx
          .query_row(
            &format!("SELECT {} FROM new_members WHERE new_member_id = ?1", RawNewMember::COLUMNS),
            rusqlite::params![id_str],
            RawNewMember::from_row,
          )
          .optional()?;
        let Some(raw) = raw else {
          return Ok(Step::Rejected(tsoam_core::Error::NewMemberNotFound(id)));
        };

        // Optimistic check: only the caller that flips the flag may proceed.
        let flipped = tx.execute(
          "UPDATE new_members SET is_active = 0 WHERE new_member_id = ?1 AND is_active = 1",
          rusqlite::params![id_str],
        )?;
        if flipped != 1 {
          return Ok(Step::Done(None));
        }

        let member_seq = match allocate(&tx, year, IdentifierKind::Member)? {
          Ok(seq) => seq,
          Err(e) => return Ok(Step::Rejected(e)),
        };
        let tithe_seq = match allocate(&tx, year, IdentifierKind::Tithe)? {
          Ok(seq) => seq,
          Err(e) => return Ok(Step::Rejected(e)),
        };
        let ids = MemberId::new(year, member_seq)
          .and_then(|m| TitheNumber::new(year, tithe_seq).map(|t| (m, t)));
        let (member_id, tithe_number) = match ids {
          Ok(ids) => ids,
          Err(e) => return Ok(Step::Rejected(e)),
        };

        tx.execute(
          "INSERT INTO full_members (
             member_id, tithe_number, full_name, phone, email,
             membership_status, membership_date, transferred_from, service_groups
           ) VALUES (?1, ?2, ?3, ?4, ?5, 'active', ?6, ?7, ?8)",
          rusqlite::params![
            member_id.to_string(),
            tithe_number.to_string(),
            raw.full_name,
            raw.phone,
            raw.email,
            at_str,
            id_str,
            groups,
          ],
        )?;

        // The caller has already given up; landing now would be unreported.
        if deadline.is_some_and(|d| Instant::now() >= d) {
          return Ok(Step::Expired);
        }
        tx.commit()?;

        Ok(Step::Done(Some((raw, member_id, tithe_number))))
      })
      .await?;

    let Some((raw, member_id, tithe_number)) = step.into_result()? else {
      return Ok(TransferCommit::AlreadyTransferred);
    };

    let source = raw.into_new_member()?;
    tracing::debug!(
      new_member_id = %id,
      member_id = %member_id,
      tithe_number = %tithe_number,
      "transfer committed"
    );

    Ok(TransferCommit::Committed(FullMember {
      member_id,
      tithe_number,
      identity: source.identity,
      email: source.email,
      membership_status: MembershipStatus::Active,
      membership_date: request.transferred_at,
      transferred_from_new_member_id: id,
      service_groups: request.service_groups,
      disciplinary_records: Vec::new(),
    }))
  }

  // ── Full members ──────────────────────────────────────────────────────────

  async fn get_full_member(&self, id: MemberId) -> Result<Option<FullMember>> {
    Ok(self.load_full_members(Some(id), None, None).await?.pop())
  }

  async fn full_member_transferred_from(&self, id: Uuid) -> Result<Option<FullMember>> {
    Ok(self.load_full_members(None, None, Some(id)).await?.pop())
  }

  async fn list_full_members(&self, status: Option<MembershipStatus>) -> Result<Vec<FullMember>> {
    self.load_full_members(None, status, None).await
  }

  async fn set_member_status(&self, change: StatusChange) -> Result<FullMember> {
    let member_id = change.member_id;
    let target = change.action.target();
    let reason = change.reason.as_str().to_owned();
    let effective_date = change.effective_date;
    let at_str = encode_dt(change.recorded_at);

    let step: Step<()> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let from = match current_status(&tx, member_id)? {
          Ok(s) => s,
          Err(e) => return Ok(Step::Rejected(e)),
        };
        let transition = match status::check_transition(member_id, from, target) {
          Ok(t) => t,
          Err(e) => return Ok(Step::Rejected(e)),
        };

        tx.execute(
          "UPDATE full_members SET membership_status = ?2
           WHERE member_id = ?1 AND membership_status = ?3",
          rusqlite::params![member_id.to_string(), target.as_str(), from.as_str()],
        )?;
        if let Some(kind) = transition.record {
          insert_disciplinary(&tx, member_id, kind, &reason, effective_date, &at_str)?;
        }
        tx.commit()?;
        Ok(Step::Done(()))
      })
      .await?;
    step.into_result()?;

    self.load_full_member(member_id).await
  }

  async fn record_warning(
    &self,
    id: MemberId,
    reason: Reason,
    effective_date: NaiveDate,
    recorded_at: DateTime<Utc>,
  ) -> Result<FullMember> {
    let at_str = encode_dt(recorded_at);

    let step: Step<()> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        match current_status(&tx, id)? {
          Ok(s) if s.is_terminal() => {
            return Ok(Step::Rejected(tsoam_core::Error::TerminalStateViolation(id)));
          }
          Ok(_) => {}
          Err(e) => return Ok(Step::Rejected(e)),
        }
        insert_disciplinary(
          &tx,
          id,
          DisciplinaryKind::Warning,
          reason.as_str(),
          effective_date,
          &at_str,
        )?;
        tx.commit()?;
        Ok(Step::Done(()))
      })
      .await?;
    step.into_result()?;

    self.load_full_member(id).await
  }

  async fn excommunicate_cascade(
    &self,
    identity: Identity,
    transferred_from: Option<Uuid>,
  ) -> Result<usize> {
    let back_ref = transferred_from.map(encode_uuid);

    let purged = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let candidates: Vec<(String, String, String)> = {
          let mut stmt = tx.prepare("SELECT new_member_id, full_name, phone FROM new_members")?;
          stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut purged = 0;
        for (id, full_name, phone) in candidates {
          let same_person = identity.matches(&Identity { full_name, phone });
          if same_person || back_ref.as_deref() == Some(id.as_str()) {
            purged += tx.execute(
              "DELETE FROM new_members WHERE new_member_id = ?1",
              rusqlite::params![id],
            )?;
          }
        }
        tx.commit()?;
        Ok(purged)
      })
      .await?;

    Ok(purged)
  }
}
