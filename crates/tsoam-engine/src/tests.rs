//! Engine tests against an in-memory SQLite store, with a delegating wrapper
//! that can fail or stall chosen operations.

use std::{
  collections::HashSet,
  path::PathBuf,
  sync::{
    Arc, Mutex, mpsc,
    atomic::{AtomicBool, Ordering},
  },
  thread,
  time::Duration,
};

use chrono::{DateTime, Days, NaiveDate, TimeDelta, TimeZone as _, Utc};
use tokio::{
  sync::broadcast::{self, error::TryRecvError},
  task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tsoam_core::{
  eligibility::Criterion,
  identifier::MemberId,
  person::{
    EmploymentStatus, FullMember, Identity, NewMember, NewMemberRegistration, NewVisitor,
    ProgressUpdate, Visitor,
  },
  status::{DisciplinaryKind, MembershipStatus, Reason, StatusAction},
  store::{MemberStore, StatusChange, StoreError, TransferCommit, TransferRequest},
};
use tsoam_store_sqlite::SqliteStore;
use uuid::Uuid;

use crate::{
  Clock as _, DomainEvent, Engine, EngineConfig, EngineError, ErrorClass, EventBus, FixedClock,
  TickOutcome, TransferOutcome,
};

// ─── Fault-injecting store ───────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
enum FaultError {
  #[error(transparent)]
  Inner(#[from] tsoam_store_sqlite::Error),
  #[error("injected failure")]
  Injected,
}

impl StoreError for FaultError {
  fn domain(&self) -> Option<&tsoam_core::Error> {
    match self {
      Self::Inner(e) => e.domain(),
      Self::Injected => None,
    }
  }
}

#[derive(Default)]
struct Faults {
  fail_transfer:       HashSet<Uuid>,
  hang_transfer:       HashSet<Uuid>,
  /// Commit lands on a background task after the caller has given up.
  late_transfer:       HashSet<Uuid>,
  /// Another caller transfers these right after the candidate query.
  rival_after_query:   HashSet<Uuid>,
  /// Another caller transfers these just before our commit.
  rival_before_commit: HashSet<Uuid>,
}

type PendingCommit = JoinHandle<Result<TransferCommit, tsoam_store_sqlite::Error>>;

struct FaultyStore {
  inner:        SqliteStore,
  faults:       Mutex<Faults>,
  fail_cascade: AtomicBool,
  hang_for:     Duration,
  late_by:      Duration,
  /// Late commits still in flight. Reads wait for them, as they would queue
  /// behind them on a single database connection.
  pending:      Mutex<Vec<PendingCommit>>,
}

/// A competing operator transfer, distinguishable by its timestamp.
fn rival(new_member_id: Uuid) -> TransferRequest {
  TransferRequest {
    new_member_id,
    service_groups: vec!["Choir".into()],
    transferred_at: Utc.with_ymd_and_hms(2026, 10, 16, 7, 0, 0).unwrap(),
    deadline: None,
  }
}

impl FaultyStore {
  fn fail_transfer(&self, id: Uuid) { self.faults.lock().unwrap().fail_transfer.insert(id); }

  fn hang_transfer(&self, id: Uuid) { self.faults.lock().unwrap().hang_transfer.insert(id); }

  fn late_transfer(&self, id: Uuid) { self.faults.lock().unwrap().late_transfer.insert(id); }

  fn rival_after_query(&self, id: Uuid) {
    self.faults.lock().unwrap().rival_after_query.insert(id);
  }

  fn rival_before_commit(&self, id: Uuid) {
    self.faults.lock().unwrap().rival_before_commit.insert(id);
  }

  async fn settle(&self) {
    let pending = std::mem::take(&mut *self.pending.lock().unwrap());
    for handle in pending {
      let _ = handle.await;
    }
  }

  fn set_cascade_failing(&self, failing: bool) { self.fail_cascade.store(failing, Ordering::SeqCst); }
}

impl MemberStore for FaultyStore {
  type Error = FaultError;

  async fn add_visitor(&self, input: NewVisitor) -> Result<Visitor, FaultError> {
    Ok(self.inner.add_visitor(input).await?)
  }

  async fn list_visitors(&self) -> Result<Vec<Visitor>, FaultError> {
    Ok(self.inner.list_visitors().await?)
  }

  async fn register_new_member(
    &self,
    input: NewMemberRegistration,
  ) -> Result<NewMember, FaultError> {
    Ok(self.inner.register_new_member(input).await?)
  }

  async fn get_new_member(&self, id: Uuid) -> Result<Option<NewMember>, FaultError> {
    Ok(self.inner.get_new_member(id).await?)
  }

  async fn list_new_members(&self, include_inactive: bool) -> Result<Vec<NewMember>, FaultError> {
    Ok(self.inner.list_new_members(include_inactive).await?)
  }

  async fn active_new_members(&self) -> Result<Vec<NewMember>, FaultError> {
    let candidates = self.inner.active_new_members().await?;
    let rivals = std::mem::take(&mut self.faults.lock().unwrap().rival_after_query);
    for id in rivals {
      self.inner.transfer_new_member(rival(id)).await?;
    }
    Ok(candidates)
  }

  async fn record_progress(
    &self,
    id: Uuid,
    update: ProgressUpdate,
  ) -> Result<NewMember, FaultError> {
    Ok(self.inner.record_progress(id, update).await?)
  }

  async fn withdraw_new_member(&self, id: Uuid) -> Result<NewMember, FaultError> {
    Ok(self.inner.withdraw_new_member(id).await?)
  }

  async fn transfer_new_member(
    &self,
    request: TransferRequest,
  ) -> Result<TransferCommit, FaultError> {
    let id = request.new_member_id;
    let (fail, hang, late, rival_first) = {
      let mut faults = self.faults.lock().unwrap();
      (
        faults.fail_transfer.contains(&id),
        faults.hang_transfer.contains(&id),
        faults.late_transfer.remove(&id),
        faults.rival_before_commit.remove(&id),
      )
    };
    if rival_first {
      self.inner.transfer_new_member(rival(id)).await?;
    }
    if late {
      let inner = self.inner.clone();
      let late_by = self.late_by;
      // The store passed its deadline check just in time.
      let request = TransferRequest { deadline: None, ..request };
      self.pending.lock().unwrap().push(tokio::spawn(async move {
        tokio::time::sleep(late_by).await;
        inner.transfer_new_member(request).await
      }));
      tokio::time::sleep(self.hang_for).await;
      return Err(FaultError::Injected);
    }
    if hang {
      tokio::time::sleep(self.hang_for).await;
    }
    if fail {
      return Err(FaultError::Injected);
    }
    Ok(self.inner.transfer_new_member(request).await?)
  }

  async fn full_member_transferred_from(
    &self,
    id: Uuid,
  ) -> Result<Option<FullMember>, FaultError> {
    self.settle().await;
    Ok(self.inner.full_member_transferred_from(id).await?)
  }

  async fn get_full_member(&self, id: MemberId) -> Result<Option<FullMember>, FaultError> {
    Ok(self.inner.get_full_member(id).await?)
  }

  async fn list_full_members(
    &self,
    status: Option<MembershipStatus>,
  ) -> Result<Vec<FullMember>, FaultError> {
    Ok(self.inner.list_full_members(status).await?)
  }

  async fn set_member_status(&self, change: StatusChange) -> Result<FullMember, FaultError> {
    Ok(self.inner.set_member_status(change).await?)
  }

  async fn record_warning(
    &self,
    id: MemberId,
    reason: Reason,
    effective_date: NaiveDate,
    recorded_at: DateTime<Utc>,
  ) -> Result<FullMember, FaultError> {
    Ok(self.inner.record_warning(id, reason, effective_date, recorded_at).await?)
  }

  async fn excommunicate_cascade(
    &self,
    identity: Identity,
    transferred_from: Option<Uuid>,
  ) -> Result<usize, FaultError> {
    if self.fail_cascade.load(Ordering::SeqCst) {
      return Err(FaultError::Injected);
    }
    Ok(self.inner.excommunicate_cascade(identity, transferred_from).await?)
  }
}

// ─── Harness ─────────────────────────────────────────────────────────────────

struct Harness {
  engine: Engine<FaultyStore>,
  store:  Arc<FaultyStore>,
  clock:  Arc<FixedClock>,
  events: broadcast::Receiver<DomainEvent>,
}

fn today() -> NaiveDate { NaiveDate::from_ymd_opt(2026, 10, 16).unwrap() }

async fn harness() -> Harness {
  harness_with(EngineConfig {
    store_timeout: Duration::from_millis(200),
    ..EngineConfig::default()
  })
  .await
}

async fn harness_with(config: EngineConfig) -> Harness {
  let inner = SqliteStore::open_in_memory().await.expect("in-memory store");
  harness_on(inner, config).await
}

async fn harness_on(inner: SqliteStore, config: EngineConfig) -> Harness {
  let store = Arc::new(FaultyStore {
    inner,
    faults: Mutex::new(Faults::default()),
    fail_cascade: AtomicBool::new(false),
    hang_for: Duration::from_secs(5),
    late_by: Duration::from_millis(250),
    pending: Mutex::new(Vec::new()),
  });
  let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 10, 16, 8, 0, 0).unwrap()));
  let bus = EventBus::new(64);
  let events = bus.subscribe();
  let engine = Engine::new(store.clone(), config, clock.clone(), Arc::new(bus)).unwrap();
  Harness { engine, store, clock, events }
}

/// Hold the database write lock from a second connection for `hold`.
/// Returns once the lock is taken.
fn hold_write_lock(path: PathBuf, hold: Duration) -> thread::JoinHandle<()> {
  let (ready_tx, ready_rx) = mpsc::channel();
  let handle = thread::spawn(move || {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute_batch("BEGIN IMMEDIATE").unwrap();
    ready_tx.send(()).unwrap();
    thread::sleep(hold);
    conn.execute_batch("COMMIT").unwrap();
  });
  ready_rx.recv().unwrap();
  handle
}

fn registration(name: &str, days_ago: u64) -> NewMemberRegistration {
  let visit = today().checked_sub_days(Days::new(days_ago)).unwrap();
  NewMemberRegistration {
    identity:                 Identity { full_name: name.into(), phone: "0711 000 111".into() },
    email:                    None,
    visit_date:               visit,
    baptized:                 true,
    baptism_date:             Some(visit),
    bible_study_completed:    true,
    bible_study_completed_on: Some(visit),
    employment_status:        EmploymentStatus::Employed,
    prior_church:             None,
    service_groups:           vec!["Ushering".into()],
  }
}

impl Harness {
  async fn register(&self, name: &str, days_ago: u64) -> NewMember {
    self.engine.registry.register_new_member(registration(name, days_ago)).await.unwrap()
  }

  async fn full_member(&self, name: &str) -> FullMember {
    let nm = self.register(name, 200).await;
    match self.engine.transfers.transfer(nm.new_member_id, vec![]).await.unwrap() {
      TransferOutcome::Transferred { member } => member,
      other => panic!("unexpected outcome: {other:?}"),
    }
  }

  fn drain(&mut self) -> Vec<DomainEvent> {
    let mut out = Vec::new();
    loop {
      match self.events.try_recv() {
        Ok(e) => out.push(e),
        Err(TryRecvError::Empty | TryRecvError::Closed) => return out,
        Err(TryRecvError::Lagged(_)) => continue,
      }
    }
  }
}

// ─── Transfer ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn eligible_member_is_transferred_with_first_ids() {
  let mut h = harness().await;
  let nm = h.register("Grace Wanjiru", 200).await;

  let outcome = h.engine.transfers.transfer(nm.new_member_id, vec![]).await.unwrap();
  let TransferOutcome::Transferred { member } = &outcome else {
    panic!("expected transfer, got {outcome:?}");
  };
  assert_eq!(member.member_id.to_string(), "TSOAM2026-001");
  assert_eq!(member.tithe_number.to_string(), "T2026-001");
  assert_eq!(member.service_groups, vec!["Ushering".to_string()]);
  assert!(outcome.message().contains("TSOAM2026-001"));

  let source = h.engine.registry.get_new_member(nm.new_member_id).await.unwrap();
  assert!(!source.is_active);

  let events = h.drain();
  assert!(events.iter().any(|e| e.event_type() == "member.transferred"));
}

#[tokio::test]
async fn second_transfer_reports_already_transferred() {
  let mut h = harness().await;
  let nm = h.register("Twice", 200).await;
  h.engine.transfers.transfer(nm.new_member_id, vec![]).await.unwrap();
  h.drain();

  let outcome = h.engine.transfers.transfer(nm.new_member_id, vec![]).await.unwrap();
  assert!(matches!(outcome, TransferOutcome::AlreadyTransferred { .. }));
  assert_eq!(outcome.message(), "already a full member");
  assert!(h.drain().is_empty());
}

#[tokio::test]
async fn short_probation_is_not_eligible() {
  let h = harness().await;
  let nm = h.register("Early", 100).await;

  let outcome = h.engine.transfers.transfer(nm.new_member_id, vec![]).await.unwrap();
  let TransferOutcome::NotEligible { missing, .. } = &outcome else {
    panic!("expected not eligible, got {outcome:?}");
  };
  assert_eq!(missing, &vec![Criterion::Tenure]);
  assert!(outcome.message().starts_with("not yet qualified, missing:"));
  assert!(h.engine.registry.list_full_members(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn explicit_groups_override_registration() {
  let h = harness().await;
  let nm = h.register("Choir", 200).await;
  let outcome = h
    .engine
    .transfers
    .transfer(nm.new_member_id, vec![" Choir ".into(), "choir".into()])
    .await
    .unwrap();
  let TransferOutcome::Transferred { member } = outcome else {
    panic!("expected transfer");
  };
  assert_eq!(member.service_groups, vec!["Choir".to_string()]);
}

#[tokio::test]
async fn blank_group_is_rejected() {
  let h = harness().await;
  let nm = h.register("Blank", 200).await;
  let err = h
    .engine
    .transfers
    .transfer(nm.new_member_id, vec!["  ".into()])
    .await
    .unwrap_err();
  assert_eq!(err.class(), ErrorClass::Validation);
  assert!(h.engine.registry.get_new_member(nm.new_member_id).await.unwrap().is_active);
}

#[tokio::test]
async fn unknown_new_member_is_not_found() {
  let h = harness().await;
  let err = h.engine.transfers.transfer(Uuid::new_v4(), vec![]).await.unwrap_err();
  assert_eq!(err.class(), ErrorClass::NotFound);
}

#[tokio::test]
async fn concurrent_transfers_produce_one_member() {
  let h = harness().await;
  let nm = h.register("Racer", 200).await;

  let (a, b, c) = tokio::join!(
    h.engine.transfers.transfer(nm.new_member_id, vec![]),
    h.engine.transfers.transfer(nm.new_member_id, vec![]),
    h.engine.transfers.transfer(nm.new_member_id, vec![]),
  );
  let outcomes = [a.unwrap(), b.unwrap(), c.unwrap()];
  let transferred = outcomes
    .iter()
    .filter(|o| matches!(o, TransferOutcome::Transferred { .. }))
    .count();
  assert_eq!(transferred, 1);
  assert_eq!(h.engine.registry.list_full_members(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn stalled_store_times_out() {
  let h = harness().await;
  let nm = h.register("Slow", 200).await;
  h.store.hang_transfer(nm.new_member_id);

  let err = h.engine.transfers.transfer(nm.new_member_id, vec![]).await.unwrap_err();
  assert!(matches!(err, EngineError::Timeout { operation: "transfer_new_member", .. }));
  assert_eq!(err.class(), ErrorClass::Transient);
}

#[tokio::test]
async fn commit_landing_after_timeout_is_reported_as_transfer() {
  let mut h = harness().await;
  let nm = h.register("Late Commit", 200).await;
  h.store.late_transfer(nm.new_member_id);

  let outcome = h.engine.transfers.transfer(nm.new_member_id, vec![]).await.unwrap();
  let TransferOutcome::Transferred { member } = outcome else {
    panic!("unexpected outcome: {outcome:?}");
  };
  assert_eq!(member.transferred_from_new_member_id, nm.new_member_id);
  assert_eq!(member.member_id.sequence(), 1);

  let events = h.drain();
  assert_eq!(
    events
      .iter()
      .filter(|e| matches!(e, DomainEvent::MemberTransferred { .. }))
      .count(),
    1
  );
  assert_eq!(h.engine.registry.list_full_members(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn batch_blocked_by_another_writer_commits_nothing() {
  let path = std::env::temp_dir().join(format!("tsoam-engine-{}.db", Uuid::new_v4()));
  let inner = SqliteStore::open(&path).await.unwrap();
  let mut h = harness_on(inner, EngineConfig {
    store_timeout: Duration::from_millis(200),
    ..EngineConfig::default()
  })
  .await;
  let nm = h.register("Blocked", 200).await;

  let holder = hold_write_lock(path.clone(), Duration::from_millis(600));
  let TickOutcome::Completed { summary } = h.engine.scheduler.tick().await else {
    panic!("tick skipped");
  };
  assert!(summary.transferred.is_empty());
  assert_eq!(summary.failed.len(), 1);
  assert_eq!(summary.failed[0].class, ErrorClass::Transient);
  holder.join().unwrap();

  // Runs after the abandoned commit on the same connection.
  assert!(h.store.inner.list_full_members(None).await.unwrap().is_empty());
  assert!(h.store.inner.get_new_member(nm.new_member_id).await.unwrap().unwrap().is_active);
  assert!(
    !h.drain()
      .iter()
      .any(|e| matches!(e, DomainEvent::MemberTransferred { .. }))
  );

  let TickOutcome::Completed { summary } = h.engine.scheduler.tick().await else {
    panic!("tick skipped");
  };
  assert_eq!(summary.transferred.len(), 1);
  assert_eq!(summary.transferred[0].member_id.sequence(), 1);
  let _ = std::fs::remove_file(&path);
}

// ─── Registry ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn future_visit_date_is_rejected() {
  let h = harness().await;
  let mut reg = registration("Tomorrow", 0);
  reg.visit_date = today().succ_opt().unwrap();
  reg.baptism_date = None;
  reg.bible_study_completed_on = None;
  reg.baptized = false;
  reg.bible_study_completed = false;

  let err = h.engine.registry.register_new_member(reg).await.unwrap_err();
  assert_eq!(err.class(), ErrorClass::Validation);
}

#[tokio::test]
async fn progress_makes_member_eligible() {
  let h = harness().await;
  let mut reg = registration("Studying", 190);
  reg.bible_study_completed = false;
  reg.bible_study_completed_on = None;
  let nm = h.engine.registry.register_new_member(reg).await.unwrap();

  let report = h.engine.registry.eligibility(nm.new_member_id).await.unwrap();
  assert_eq!(report.eligibility.unmet, vec![Criterion::BibleStudy]);

  h.engine
    .registry
    .record_progress(nm.new_member_id, ProgressUpdate {
      baptism_date:             None,
      bible_study_completed_on: Some(today()),
    })
    .await
    .unwrap();
  let report = h.engine.registry.eligibility(nm.new_member_id).await.unwrap();
  assert!(report.eligibility.eligible);
}

#[tokio::test]
async fn eligibility_report_lists_eligible_first() {
  let h = harness().await;
  h.register("Waiting", 10).await;
  h.register("Ready", 200).await;

  let report = h.engine.registry.eligibility_report().await.unwrap();
  assert_eq!(report.len(), 2);
  assert_eq!(report[0].full_name, "Ready");
  assert_eq!(report[1].eligibility.days_remaining, 170);
}

#[tokio::test]
async fn withdrawn_member_cannot_be_transferred() {
  let h = harness().await;
  let nm = h.register("Leaving", 200).await;
  h.engine.registry.withdraw_new_member(nm.new_member_id).await.unwrap();

  let outcome = h.engine.transfers.transfer(nm.new_member_id, vec![]).await.unwrap();
  assert!(matches!(outcome, TransferOutcome::AlreadyTransferred { .. }));
  let err = h.engine.registry.withdraw_new_member(nm.new_member_id).await.unwrap_err();
  assert_eq!(err.class(), ErrorClass::Conflict);
}

// ─── Lifecycle ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn excommunication_purges_lingering_probation_record() {
  let mut h = harness().await;
  let member = h.full_member("Jane Doe").await;
  let lingering = h
    .engine
    .registry
    .register_new_member(registration("jane  DOE", 30))
    .await
    .unwrap();
  h.drain();

  let updated = h
    .engine
    .lifecycle
    .excommunicate(member.member_id, "doctrinal dispute")
    .await
    .unwrap();
  assert_eq!(updated.membership_status, MembershipStatus::Excommunicated);
  let record = updated.disciplinary_records.last().unwrap();
  assert_eq!(record.kind, DisciplinaryKind::Excommunication);
  assert_eq!(record.reason, "doctrinal dispute");

  let err = h.engine.registry.get_new_member(lingering.new_member_id).await.unwrap_err();
  assert_eq!(err.class(), ErrorClass::NotFound);

  let types: Vec<_> = h.drain().iter().map(|e| e.event_type()).collect();
  assert_eq!(types, vec!["member.status_changed", "new_member.purged"]);
}

#[tokio::test]
async fn excommunicated_member_cannot_change() {
  let h = harness().await;
  let member = h.full_member("Final").await;
  h.engine.lifecycle.excommunicate(member.member_id, "final").await.unwrap();

  let err = h.engine.lifecycle.reactivate(member.member_id, "appeal").await.unwrap_err();
  assert!(matches!(
    err,
    EngineError::Domain(tsoam_core::Error::TerminalStateViolation(id)) if id == member.member_id
  ));
  assert_eq!(err.class(), ErrorClass::Conflict);

  let err = h
    .engine
    .lifecycle
    .issue_warning(member.member_id, "late", None)
    .await
    .unwrap_err();
  assert_eq!(err.class(), ErrorClass::Conflict);
}

#[tokio::test]
async fn suspension_then_reactivation_keeps_history() {
  let h = harness().await;
  let member = h.full_member("Returning").await;

  h.engine.lifecycle.suspend(member.member_id, "absence").await.unwrap();
  let back = h.engine.lifecycle.reactivate(member.member_id, "restored").await.unwrap();
  assert_eq!(back.membership_status, MembershipStatus::Active);
  assert_eq!(back.disciplinary_records.len(), 1);
  assert_eq!(back.disciplinary_records[0].kind, DisciplinaryKind::Suspension);
}

#[tokio::test]
async fn inactive_member_cannot_be_suspended() {
  let h = harness().await;
  let member = h.full_member("Dormant").await;
  h.engine.lifecycle.deactivate(member.member_id, "moved away").await.unwrap();

  let err = h.engine.lifecycle.suspend(member.member_id, "absence").await.unwrap_err();
  assert!(matches!(err, EngineError::Domain(tsoam_core::Error::InvalidTransition { .. })));
}

#[tokio::test]
async fn blank_reason_and_future_date_are_rejected() {
  let h = harness().await;
  let member = h.full_member("Careful").await;

  let err = h.engine.lifecycle.suspend(member.member_id, "   ").await.unwrap_err();
  assert_eq!(err.class(), ErrorClass::Validation);

  let err = h
    .engine
    .lifecycle
    .change_status(member.member_id, StatusAction::Suspend, "absence", today().succ_opt())
    .await
    .unwrap_err();
  assert_eq!(err.class(), ErrorClass::Validation);

  let stored = h.engine.registry.get_full_member(member.member_id).await.unwrap();
  assert_eq!(stored.membership_status, MembershipStatus::Active);
}

#[tokio::test]
async fn warning_is_recorded_without_status_change() {
  let h = harness().await;
  let member = h.full_member("Warned").await;
  let updated = h
    .engine
    .lifecycle
    .issue_warning(member.member_id, "missed duty", None)
    .await
    .unwrap();
  assert_eq!(updated.membership_status, MembershipStatus::Active);
  assert_eq!(updated.disciplinary_records[0].kind, DisciplinaryKind::Warning);
  assert_eq!(updated.disciplinary_records[0].effective_date, today());
}

#[tokio::test]
async fn warning_is_stamped_with_the_engine_clock() {
  let h = harness().await;
  let member = h.full_member("Stamped").await;
  h.clock.advance(TimeDelta::hours(3));

  let updated = h
    .engine
    .lifecycle
    .issue_warning(member.member_id, "late again", None)
    .await
    .unwrap();
  assert_eq!(updated.disciplinary_records[0].recorded_at, h.clock.now());
}

#[tokio::test]
async fn failed_cascade_can_be_completed_later() {
  let h = harness().await;
  let member = h.full_member("Partial").await;
  let lingering = h.engine.registry.register_new_member(registration("Partial", 5)).await.unwrap();

  h.store.set_cascade_failing(true);
  let err = h
    .engine
    .lifecycle
    .excommunicate(member.member_id, "schism")
    .await
    .unwrap_err();
  assert!(matches!(err, EngineError::CascadeIncomplete { .. }));

  let stored = h.engine.registry.get_full_member(member.member_id).await.unwrap();
  assert_eq!(stored.membership_status, MembershipStatus::Excommunicated);
  assert!(h.engine.registry.get_new_member(lingering.new_member_id).await.is_ok());

  h.store.set_cascade_failing(false);
  let purged = h.engine.lifecycle.complete_cascade(member.member_id).await.unwrap();
  assert_eq!(purged, 2);
  assert_eq!(h.engine.lifecycle.complete_cascade(member.member_id).await.unwrap(), 0);
}

#[tokio::test]
async fn cascade_requires_excommunication() {
  let h = harness().await;
  let member = h.full_member("Fine").await;
  let err = h.engine.lifecycle.complete_cascade(member.member_id).await.unwrap_err();
  assert!(matches!(err, EngineError::NotExcommunicated(_)));
}

// ─── Scheduler ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn tick_transfers_eligible_and_continues_past_failures() {
  let mut h = harness().await;
  let ready = h.register("Ready", 200).await;
  h.register("Waiting", 20).await;
  let broken = h.register("Broken", 200).await;
  let slow = h.register("Slow", 200).await;
  h.store.fail_transfer(broken.new_member_id);
  h.store.hang_transfer(slow.new_member_id);

  let TickOutcome::Completed { summary } = h.engine.scheduler.tick().await else {
    panic!("tick skipped");
  };
  assert_eq!(summary.considered, 4);
  assert_eq!(summary.transferred.len(), 1);
  assert_eq!(summary.transferred[0].new_member_id, ready.new_member_id);
  assert_eq!(summary.not_eligible, 1);
  assert_eq!(summary.failed.len(), 2);
  assert!(summary.failed.iter().all(|f| f.class == ErrorClass::Transient));
  assert!(!summary.interrupted);

  let last = h.engine.scheduler.last_summary().unwrap();
  assert_eq!(last.transferred.len(), 1);
  assert!(h.drain().iter().any(|e| e.event_type() == "scheduler.batch_completed"));
}

#[tokio::test]
async fn batch_counts_members_transferred_by_someone_else() {
  let mut h = harness().await;
  let taken_early = h.register("Taken Early", 200).await;
  let taken_late = h.register("Taken Late", 200).await;
  let ours = h.register("Ours", 200).await;
  h.store.rival_after_query(taken_early.new_member_id);
  h.store.rival_before_commit(taken_late.new_member_id);

  let TickOutcome::Completed { summary } = h.engine.scheduler.tick().await else {
    panic!("tick skipped");
  };
  assert_eq!(summary.considered, 3);
  assert_eq!(summary.already_transferred, 2);
  assert_eq!(summary.transferred.len(), 1);
  assert_eq!(summary.transferred[0].new_member_id, ours.new_member_id);
  assert!(summary.failed.is_empty());

  assert_eq!(h.engine.registry.list_full_members(None).await.unwrap().len(), 3);
  let announced: Vec<Uuid> = h
    .drain()
    .into_iter()
    .filter_map(|e| match e {
      DomainEvent::MemberTransferred { new_member_id, .. } => Some(new_member_id),
      _ => None,
    })
    .collect();
  assert_eq!(announced, vec![ours.new_member_id]);
}

#[tokio::test]
async fn members_without_groups_get_the_default() {
  let h = harness_with(EngineConfig {
    store_timeout: Duration::from_millis(200),
    default_service_groups: vec!["Hospitality".into()],
    ..EngineConfig::default()
  })
  .await;
  let mut reg = registration("No Groups", 200);
  reg.service_groups.clear();
  let nm = h.engine.registry.register_new_member(reg).await.unwrap();

  h.engine.scheduler.tick().await;
  let members = h.engine.registry.list_full_members(None).await.unwrap();
  assert_eq!(members.len(), 1);
  assert_eq!(members[0].transferred_from_new_member_id, nm.new_member_id);
  assert_eq!(members[0].service_groups, vec!["Hospitality".to_string()]);
}

#[tokio::test]
async fn overlapping_tick_is_skipped() {
  let h = harness().await;
  let slow = h.register("Slow", 200).await;
  h.store.hang_transfer(slow.new_member_id);

  let (first, second) = tokio::join!(h.engine.scheduler.tick(), h.engine.scheduler.tick());
  let skipped = [&first, &second]
    .iter()
    .filter(|o| matches!(o, TickOutcome::TickSkipped))
    .count();
  assert_eq!(skipped, 1);
}

#[tokio::test]
async fn cancelled_batch_stops_between_members() {
  let h = harness().await;
  h.register("One", 200).await;
  h.register("Two", 200).await;

  let token = CancellationToken::new();
  token.cancel();
  let TickOutcome::Completed { summary } = h.engine.scheduler.tick_with(&token).await else {
    panic!("tick skipped");
  };
  assert!(summary.interrupted);
  assert!(summary.transferred.is_empty());
  assert_eq!(h.engine.registry.list_new_members(false).await.unwrap().len(), 2);
}

#[tokio::test]
async fn started_scheduler_runs_and_stops_cleanly() {
  let h = harness().await;
  h.register("Ready", 200).await;

  assert!(h.engine.scheduler.start());
  assert!(!h.engine.scheduler.start());

  let mut waited = Duration::ZERO;
  while h.engine.scheduler.last_summary().is_none() && waited < Duration::from_secs(5) {
    tokio::time::sleep(Duration::from_millis(20)).await;
    waited += Duration::from_millis(20);
  }
  h.engine.scheduler.stop().await;
  assert!(!h.engine.scheduler.is_running());

  let summary = h.engine.scheduler.last_summary().expect("a completed run");
  assert_eq!(summary.transferred.len(), 1);
}

#[tokio::test]
async fn transfers_follow_the_clock() {
  let h = harness().await;
  let nm = h.register("Patient", 170).await;
  assert!(matches!(
    h.engine.transfers.transfer(nm.new_member_id, vec![]).await.unwrap(),
    TransferOutcome::NotEligible { .. }
  ));

  h.clock.advance(TimeDelta::days(10));
  assert!(matches!(
    h.engine.transfers.transfer(nm.new_member_id, vec![]).await.unwrap(),
    TransferOutcome::Transferred { .. }
  ));
}

#[tokio::test]
async fn zero_period_is_rejected() {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let result = Engine::new(
    store,
    EngineConfig { scheduler_period: Duration::ZERO, ..EngineConfig::default() },
    Arc::new(FixedClock::new(Utc::now())),
    Arc::new(EventBus::default()),
  );
  assert!(matches!(result, Err(e) if e.class() == ErrorClass::Validation));
}
