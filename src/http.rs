//! HTTP surface.
//!
//! The login proxy in front of this service terminates social login and
//! forwards the resolved identity as `x-auth-line-user-id` /
//! `x-auth-email` headers; absent headers mean an unauthenticated caller.
//! The public notice endpoint requires no identity, disables downstream
//! caching, and permits framing from anywhere since the document is
//! embedded on a third-party page.

use crate::auth::{AuthError, AuthPolicy};
use crate::db::{self, CheckinOutcome, NewEvent, Pool};
use crate::model::{Caller, Identity, RsvpStatus};
use crate::notice::{self, ConfirmRequest, NoticeError};
use axum::extract::{Form, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub policy: Arc<AuthPolicy>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/api/public/event-notice", get(public_notice))
        .route("/api/events", get(list_events))
        .route("/api/admin/events", post(upsert_event))
        .route("/api/admin/events/activate", post(activate_event))
        .route("/api/admin/notice/confirm", post(confirm_notice))
        .route("/api/admin/notice/publish", post(publish_notice))
        .route("/api/admin/checkin", post(admin_checkin))
        .route("/api/me/rsvp", post(submit_rsvp))
        .route("/api/me/reservation", get(my_reservation))
        .route("/api/me/checkin", post(self_checkin))
        .route("/api/me/history", get(my_history))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Error)]
enum ApiError {
    #[error("unauthorized")]
    Unauthenticated,
    #[error("forbidden")]
    Forbidden,
    #[error("{0}")]
    BadRequest(&'static str),
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> ApiError {
        match err {
            AuthError::Unauthenticated => ApiError::Unauthenticated,
            AuthError::PermissionDenied => ApiError::Forbidden,
        }
    }
}

impl From<NoticeError> for ApiError {
    fn from(err: NoticeError) -> ApiError {
        match err {
            NoticeError::Unauthenticated => ApiError::Unauthenticated,
            NoticeError::PermissionDenied => ApiError::Forbidden,
            NoticeError::Validation(msg) => ApiError::BadRequest(msg),
            NoticeError::NotFound(id) => ApiError::NotFound(id),
            NoticeError::Storage(err) => ApiError::Internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(err) => {
                error!(?err, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = match &self {
            ApiError::Internal(_) => "server_error".to_string(),
            other => other.to_string(),
        };
        (status, Json(json!({ "ok": false, "error": message }))).into_response()
    }
}

fn caller_from_headers(headers: &HeaderMap) -> Option<Caller> {
    let mut identities = Vec::new();
    if let Some(id) = headers
        .get("x-auth-line-user-id")
        .and_then(|v| v.to_str().ok())
    {
        identities.push(Identity::Line {
            user_id: id.to_string(),
        });
    }
    if let Some(email) = headers.get("x-auth-email").and_then(|v| v.to_str().ok()) {
        identities.push(Identity::Google {
            email: email.to_string(),
        });
    }
    Caller::resolve(&identities)
}

fn require_user(headers: &HeaderMap) -> Result<(Caller, String), ApiError> {
    let caller = caller_from_headers(headers).ok_or(ApiError::Unauthenticated)?;
    let user_ref = caller
        .handle()
        .map(str::to_string)
        .ok_or(ApiError::Unauthenticated)?;
    Ok((caller, user_ref))
}

async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    sqlx::query("SELECT 1")
        .execute(&state.pool)
        .await
        .map_err(anyhow::Error::from)?;
    Ok(Json(json!({ "ok": true })))
}

// ---------------------------------------------------------------------------
// Public

async fn public_notice(State(state): State<AppState>) -> Result<Response, ApiError> {
    let html = notice::public_notice_html(&state.pool)
        .await
        .map_err(ApiError::from)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (
                header::CACHE_CONTROL,
                "no-store, no-cache, must-revalidate, max-age=0",
            ),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
            (header::CONTENT_SECURITY_POLICY, "frame-ancestors *;"),
        ],
        html,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    #[serde(default = "default_days")]
    days: i64,
}

fn default_days() -> i64 {
    14
}

async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let days = query.days.clamp(0, 366);
    let events = db::upcoming_events(&state.pool, days).await?;
    Ok(Json(json!({ "ok": true, "events": events })))
}

// ---------------------------------------------------------------------------
// Notice administration

#[derive(Debug, Deserialize)]
struct ConfirmForm {
    event_id: String,
    status: String,
    #[serde(default)]
    message: String,
}

async fn confirm_notice(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<ConfirmForm>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let caller = caller_from_headers(&headers);
    let notice = notice::confirm(
        &state.pool,
        &state.policy,
        caller.as_ref(),
        ConfirmRequest {
            event_id: &form.event_id,
            status: &form.status,
            message: &form.message,
        },
    )
    .await?;
    Ok(Json(json!({ "ok": true, "notice": notice })))
}

#[derive(Debug, Deserialize)]
struct PublishForm {
    event_id: String,
}

async fn publish_notice(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<PublishForm>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let caller = caller_from_headers(&headers);
    let notice = notice::publish(&state.pool, &state.policy, caller.as_ref(), &form.event_id).await?;
    Ok(Json(json!({ "ok": true, "notice": notice })))
}

// ---------------------------------------------------------------------------
// Event administration

#[derive(Debug, Deserialize)]
struct EventForm {
    #[serde(default)]
    id: Option<String>,
    title: String,
    #[serde(default)]
    starts_at: Option<String>,
    #[serde(default)]
    ends_at: Option<String>,
    #[serde(default)]
    place: Option<String>,
    #[serde(default)]
    fee: Option<i64>,
    #[serde(default)]
    memo: Option<String>,
}

fn parse_timestamp(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|_| ApiError::BadRequest("timestamps must be RFC 3339")),
    }
}

async fn upsert_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<EventForm>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .policy
        .require_admin(caller_from_headers(&headers).as_ref())?;
    if form.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title required"));
    }
    let id = form
        .id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let event = NewEvent {
        id: id.clone(),
        title: form.title.trim().to_string(),
        starts_at: parse_timestamp(form.starts_at.as_deref())?,
        ends_at: parse_timestamp(form.ends_at.as_deref())?,
        place: form.place.filter(|s| !s.trim().is_empty()),
        fee: form.fee,
        memo: form.memo.filter(|s| !s.trim().is_empty()),
    };
    db::upsert_event(&state.pool, &event, Utc::now()).await?;
    Ok(Json(json!({ "ok": true, "id": id })))
}

#[derive(Debug, Deserialize)]
struct ActivateForm {
    event_id: String,
}

async fn activate_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<ActivateForm>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .policy
        .require_admin(caller_from_headers(&headers).as_ref())?;
    let activated = db::activate_event(&state.pool, &form.event_id, Utc::now()).await?;
    if !activated {
        return Err(ApiError::NotFound(form.event_id));
    }
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
struct AdminCheckinForm {
    event_id: String,
    user_ref: String,
}

async fn admin_checkin(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<AdminCheckinForm>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .policy
        .require_admin(caller_from_headers(&headers).as_ref())?;
    checkin_response(&state.pool, &form.event_id, &form.user_ref).await
}

// ---------------------------------------------------------------------------
// Attendee endpoints

#[derive(Debug, Deserialize)]
struct RsvpForm {
    event_id: String,
    status: String,
    #[serde(default)]
    comment: String,
}

async fn submit_rsvp(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<RsvpForm>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (_, user_ref) = require_user(&headers)?;
    let status = RsvpStatus::parse_status(&form.status)
        .ok_or(ApiError::BadRequest("status must be join or absent"))?;
    let comment = notice::normalize_message(&form.comment);

    let rsvp = db::upsert_rsvp(
        &state.pool,
        form.event_id.trim(),
        &user_ref,
        status,
        comment.as_deref(),
        Utc::now(),
    )
    .await?
    .ok_or_else(|| ApiError::NotFound(form.event_id.clone()))?;
    Ok(Json(json!({ "ok": true, "rsvp": rsvp })))
}

/// The caller's reservation for the currently active event. Both fields
/// are null when no event is active; `rsvp` alone is null when the caller
/// has not answered yet.
async fn my_reservation(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (_, user_ref) = require_user(&headers)?;
    let Some(event) = db::active_event(&state.pool).await? else {
        return Ok(Json(json!({ "ok": true, "event": null, "rsvp": null })));
    };
    let rsvp = db::current_rsvp(&state.pool, &event.id, &user_ref).await?;
    Ok(Json(json!({ "ok": true, "event": event, "rsvp": rsvp })))
}

#[derive(Debug, Deserialize)]
struct CheckinForm {
    event_id: String,
}

async fn self_checkin(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<CheckinForm>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (_, user_ref) = require_user(&headers)?;
    checkin_response(&state.pool, &form.event_id, &user_ref).await
}

async fn checkin_response(
    pool: &Pool,
    event_id: &str,
    user_ref: &str,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = db::check_in(pool, event_id, user_ref, Utc::now())
        .await?
        .ok_or_else(|| ApiError::NotFound(event_id.to_string()))?;
    match outcome {
        CheckinOutcome::CheckedIn => Ok(Json(json!({ "ok": true, "already": false }))),
        CheckinOutcome::AlreadyCheckedIn => Ok(Json(json!({ "ok": true, "already": true }))),
        CheckinOutcome::NotJoining => Err(ApiError::BadRequest("reservation is not a join")),
    }
}

async fn my_history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (_, user_ref) = require_user(&headers)?;
    let history = db::rsvp_history(&state.pool, &user_ref).await?;
    Ok(Json(json!({ "ok": true, "history": history })))
}
