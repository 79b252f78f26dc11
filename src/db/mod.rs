//! Database module: entity models and SQL repositories.
//!
//! This module is split into two submodules:
//! - `model`: view models and write inputs returned/accepted by repositories.
//! - `repo`: SQL-only functions that map rows into entities.
//!
//! External modules should import from `swf_notice::db` — we re-export the
//! repository API and commonly used models for convenience.

pub mod model;
pub mod repo;

pub use model::{CheckinOutcome, NewEvent, PublishedNotice, RsvpHistoryRow};
pub use repo::*;
