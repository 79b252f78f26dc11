//! Notice workflow engine.
//!
//! Owns the confirm (save draft) and publish transitions over the per-event
//! notice record, and assembles the public page from the published fields
//! only. The capability guard runs before every transition; each transition
//! is one transaction, and two racing confirms for the same event resolve
//! last-write-wins at the store.

use crate::auth::{AuthError, AuthPolicy};
use crate::db::{self, Pool};
use crate::model::{Caller, EventNotice, NoticeStatus};
use crate::render::{format_event_label, render_notice_html};
use chrono::Utc;
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Error)]
pub enum NoticeError {
    #[error("sign-in required")]
    Unauthenticated,
    #[error("not authorized to edit notices")]
    PermissionDenied,
    #[error("invalid request: {0}")]
    Validation(&'static str),
    #[error("no notice exists for event {0}")]
    NotFound(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<AuthError> for NoticeError {
    fn from(err: AuthError) -> NoticeError {
        match err {
            AuthError::Unauthenticated => NoticeError::Unauthenticated,
            AuthError::PermissionDenied => NoticeError::PermissionDenied,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfirmRequest<'a> {
    pub event_id: &'a str,
    pub status: &'a str,
    pub message: &'a str,
}

/// Trim the input; blank collapses to absence, never stored as `""`.
pub fn normalize_message(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Save a draft for the event, creating the notice on first use. On an
/// already-published notice only the draft fields move; the live page is
/// untouched until `publish`.
#[instrument(skip_all, fields(event_id = req.event_id))]
pub async fn confirm(
    pool: &Pool,
    policy: &AuthPolicy,
    caller: Option<&Caller>,
    req: ConfirmRequest<'_>,
) -> Result<EventNotice, NoticeError> {
    let editor = policy.require_notice_editor(caller)?;

    let event_id = req.event_id.trim();
    if event_id.is_empty() {
        return Err(NoticeError::Validation("event_id required"));
    }
    let status = NoticeStatus::parse_status(req.status)
        .ok_or(NoticeError::Validation("unknown status"))?;
    let message = normalize_message(req.message);

    let notice = db::confirm_notice(
        pool,
        event_id,
        status,
        message.as_deref(),
        &editor,
        Utc::now(),
    )
    .await?;
    info!(event_id, status = status.as_str(), "notice draft saved");
    Ok(notice)
}

/// Promote the pending draft of the event's notice to the live fields.
#[instrument(skip_all, fields(event_id = event_id))]
pub async fn publish(
    pool: &Pool,
    policy: &AuthPolicy,
    caller: Option<&Caller>,
    event_id: &str,
) -> Result<EventNotice, NoticeError> {
    let editor = policy.require_notice_editor(caller)?;

    let event_id = event_id.trim();
    if event_id.is_empty() {
        return Err(NoticeError::Validation("event_id required"));
    }

    let notice = db::publish_notice(pool, event_id, &editor, Utc::now())
        .await?
        .ok_or_else(|| NoticeError::NotFound(event_id.to_string()))?;
    info!(event_id, "notice published");
    Ok(notice)
}

/// Render the public page from the most recently published notice. No
/// auth: this is the document embedded on the public site. With nothing
/// published the page renders as Hidden.
#[instrument(skip_all)]
pub async fn public_notice_html(pool: &Pool) -> Result<String, NoticeError> {
    let Some(live) = db::latest_published_notice(pool).await? else {
        return Ok(render_notice_html(NoticeStatus::Hidden, None, None));
    };

    let status = NoticeStatus::from_stored(&live.status);
    let label = match live.event_title.as_deref() {
        Some(title) => format_event_label(live.event_starts_at, title),
        None => String::new(),
    };
    let label = if label.is_empty() { None } else { Some(label) };
    Ok(render_notice_html(status, label.as_deref(), live.message.as_deref()))
}
