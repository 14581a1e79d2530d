//! SQL schema for the TSOAM SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS visitors (
    visitor_id      TEXT PRIMARY KEY,
    full_name       TEXT NOT NULL,
    phone           TEXT NOT NULL,
    email           TEXT,
    visit_date      TEXT NOT NULL,   -- YYYY-MM-DD
    purpose         TEXT NOT NULL,
    referral_source TEXT,
    prayer_request  TEXT,
    follow_up       INTEGER NOT NULL DEFAULT 0,
    recorded_at     TEXT NOT NULL    -- RFC 3339 UTC; server-assigned
);

-- is_active flips 1 -> 0 exactly once (transfer or withdrawal).
CREATE TABLE IF NOT EXISTS new_members (
    new_member_id            TEXT PRIMARY KEY,
    full_name                TEXT NOT NULL,
    phone                    TEXT NOT NULL,
    email                    TEXT,
    visit_date               TEXT NOT NULL,
    baptized                 INTEGER NOT NULL DEFAULT 0,
    baptism_date             TEXT,
    bible_study_completed    INTEGER NOT NULL DEFAULT 0,
    bible_study_completed_on TEXT,
    employment_status        TEXT NOT NULL,
    prior_church             TEXT,            -- JSON-encoded PriorChurch or NULL
    service_groups           TEXT NOT NULL DEFAULT '[]',
    is_active                INTEGER NOT NULL DEFAULT 1,
    registered_at            TEXT NOT NULL
);

-- transferred_from is a lookup-only back-reference: the new member may be
-- purged later, so it is not a foreign key. UNIQUE enforces one full member
-- per new member.
CREATE TABLE IF NOT EXISTS full_members (
    member_id         TEXT PRIMARY KEY,
    tithe_number      TEXT NOT NULL UNIQUE,
    full_name         TEXT NOT NULL,
    phone             TEXT NOT NULL,
    email             TEXT,
    membership_status TEXT NOT NULL DEFAULT 'active',
    membership_date   TEXT NOT NULL,
    transferred_from  TEXT NOT NULL UNIQUE,
    service_groups    TEXT NOT NULL DEFAULT '[]'
);

-- Append-only. No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS disciplinary_records (
    record_id      TEXT PRIMARY KEY,
    member_id      TEXT NOT NULL REFERENCES full_members(member_id),
    kind           TEXT NOT NULL,   -- 'warning' | 'suspension' | 'excommunication'
    reason         TEXT NOT NULL,
    effective_date TEXT NOT NULL,
    recorded_at    TEXT NOT NULL
);

-- Last sequence handed out per (year, kind). Only advanced inside the
-- transfer transaction.
CREATE TABLE IF NOT EXISTS id_counters (
    year       INTEGER NOT NULL,
    kind       TEXT NOT NULL,     -- 'member' | 'tithe'
    last_value INTEGER NOT NULL,
    PRIMARY KEY (year, kind)
);

CREATE INDEX IF NOT EXISTS new_members_active_idx    ON new_members(is_active);
CREATE INDEX IF NOT EXISTS full_members_status_idx   ON full_members(membership_status);
CREATE INDEX IF NOT EXISTS disciplinary_member_idx   ON disciplinary_records(member_id);

PRAGMA user_version = 1;
";
