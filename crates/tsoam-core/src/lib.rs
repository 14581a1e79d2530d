//! Core types and trait definitions for the TSOAM membership engine.
//!
//! This crate is deliberately free of async runtime, HTTP and database
//! dependencies. It holds the records, the eligibility rule, identifier
//! formatting, the status transition table, and the [`store::MemberStore`]
//! contract that storage backends implement.

pub mod eligibility;
pub mod error;
pub mod identifier;
pub mod person;
pub mod status;
pub mod store;

pub use error::{Error, Result};
