//! Database view models and write inputs used by repositories.
//!
//! Keep these structs focused on the data moved by queries. Business logic
//! should live in higher layers.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Input for creating or updating an event (calendar fields only; the
/// active flag is managed separately).
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub id: String,
    pub title: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub place: Option<String>,
    pub fee: Option<i64>,
    pub memo: Option<String>,
}

/// Published slice used by the public renderer: live fields only, joined
/// with the owning event for the heading label. Draft fields are never
/// selected here.
#[derive(Debug, Clone)]
pub struct PublishedNotice {
    pub status: String,
    pub message: Option<String>,
    pub event_title: Option<String>,
    pub event_starts_at: Option<DateTime<Utc>>,
}

/// Result of a check-in attempt against an existing reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckinOutcome {
    CheckedIn,
    AlreadyCheckedIn,
    NotJoining,
}

/// One row of a user's attendance history, joined with the event.
#[derive(Debug, Clone, Serialize)]
pub struct RsvpHistoryRow {
    pub event_id: String,
    pub title: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub place: Option<String>,
    pub fee: Option<i64>,
    pub memo: Option<String>,
    pub status: String,
    pub comment: Option<String>,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}
