//! Year-scoped sequential identifiers.
//!
//! Every full member receives two identifiers at transfer time: a member id
//! (`TSOAM2026-001`) and a tithe number (`T2026-001`). Both are drawn from a
//! per-year, per-kind counter that the store advances inside the transfer
//! commit. This module owns the formatting, parsing, and the overflow rule;
//! it never touches the counter itself.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::{Error, Result};

/// Largest sequence number representable in the three-digit suffix.
pub const MAX_SEQUENCE: u16 = 999;

// ─── Kind ────────────────────────────────────────────────────────────────────

/// Which counter an identifier is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
  Member,
  Tithe,
}

impl IdentifierKind {
  pub fn prefix(self) -> &'static str {
    match self {
      Self::Member => "TSOAM",
      Self::Tithe => "T",
    }
  }

  /// Stable key used for the counter row in storage.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Member => "member",
      Self::Tithe => "tithe",
    }
  }
}

impl fmt::Display for IdentifierKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Member => f.write_str("member id"),
      Self::Tithe => f.write_str("tithe number"),
    }
  }
}

/// The sequence number that follows `last` for `kind` in `year`.
///
/// `last` is the counter's current value (`0` before the first allocation of
/// the year). Running past [`MAX_SEQUENCE`] is an error, never a wrap.
pub fn next_sequence(kind: IdentifierKind, year: i32, last: u32) -> Result<u16> {
  let next = last.saturating_add(1);
  u16::try_from(next)
    .ok()
    .filter(|n| *n <= MAX_SEQUENCE)
    .ok_or(Error::IdentifierOverflow { kind, year })
}

// ─── Identifier types ────────────────────────────────────────────────────────

macro_rules! year_scoped_id {
  ($(#[$meta:meta])* $name:ident, $kind:expr) => {
    $(#[$meta])*
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct $name {
      year:     i32,
      sequence: u16,
    }

    impl $name {
      pub const KIND: IdentifierKind = $kind;

      /// Build an identifier, rejecting sequence `0`, sequences above
      /// [`MAX_SEQUENCE`], and years that do not print as four digits.
      pub fn new(year: i32, sequence: u16) -> Result<Self> {
        if sequence > MAX_SEQUENCE {
          return Err(Error::IdentifierOverflow { kind: Self::KIND, year });
        }
        if sequence == 0 || !(1000..=9999).contains(&year) {
          return Err(Error::MalformedIdentifier(format!(
            "{}{year}-{sequence:03}",
            Self::KIND.prefix()
          )));
        }
        Ok(Self { year, sequence })
      }

      pub fn year(&self) -> i32 { self.year }

      pub fn sequence(&self) -> u16 { self.sequence }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}-{:03}", Self::KIND.prefix(), self.year, self.sequence)
      }
    }

    impl FromStr for $name {
      type Err = Error;

      fn from_str(s: &str) -> Result<Self> {
        let (year, sequence) = parse_parts(s, Self::KIND.prefix())
          .ok_or_else(|| Error::MalformedIdentifier(s.to_owned()))?;
        Self::new(year, sequence)
      }
    }

    impl Serialize for $name {
      fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
      }
    }

    impl<'de> Deserialize<'de> for $name {
      fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
      }
    }
  };
}

year_scoped_id!(
  /// A full member's primary identifier, e.g. `TSOAM2026-001`.
  MemberId,
  IdentifierKind::Member
);

year_scoped_id!(
  /// A full member's tithe-envelope number, e.g. `T2026-001`.
  TitheNumber,
  IdentifierKind::Tithe
);

/// Split `<prefix><yyyy>-<nnn>` into its numeric parts.
fn parse_parts(s: &str, prefix: &str) -> Option<(i32, u16)> {
  let rest = s.strip_prefix(prefix)?;
  let (year, sequence) = rest.split_once('-')?;
  let digits = |part: &str, len: usize| {
    part.len() == len && part.bytes().all(|b| b.is_ascii_digit())
  };
  if !digits(year, 4) || !digits(sequence, 3) {
    return None;
  }
  Some((year.parse().ok()?, sequence.parse().ok()?))
}
