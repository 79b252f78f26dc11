use super::model::{CheckinOutcome, NewEvent, PublishedNotice, RsvpHistoryRow};
use crate::model::{Event, EventNotice, NoticeStatus, Rsvp, RsvpStatus};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;").execute(&pool).await?;
    sqlx::query("PRAGMA synchronous=FULL;").execute(&pool).await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the
/// parent directory exists. Leaves in-memory URLs untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match path_part.strip_prefix("~/") {
        Some(rest) => match std::env::var("HOME") {
            Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
            Err(_) => path_part.to_string(),
        },
        None => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Events

fn event_from_row(row: &SqliteRow) -> Event {
    Event {
        id: row.get("id"),
        title: row.get("title"),
        starts_at: row.get("starts_at"),
        ends_at: row.get("ends_at"),
        place: row.get("place"),
        fee: row.get("fee"),
        memo: row.get("memo"),
        is_active: row.get("is_active"),
        updated_at: row.get("updated_at"),
    }
}

#[instrument(skip_all)]
pub async fn upsert_event(pool: &Pool, event: &NewEvent, now: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        "INSERT INTO events (id, title, starts_at, ends_at, place, fee, memo, is_active, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?) \
         ON CONFLICT(id) DO UPDATE SET \
           title = excluded.title, starts_at = excluded.starts_at, ends_at = excluded.ends_at, \
           place = excluded.place, fee = excluded.fee, memo = excluded.memo, \
           updated_at = excluded.updated_at",
    )
    .bind(&event.id)
    .bind(&event.title)
    .bind(event.starts_at)
    .bind(event.ends_at)
    .bind(&event.place)
    .bind(event.fee)
    .bind(&event.memo)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn find_event(pool: &Pool, id: &str) -> Result<Option<Event>> {
    let row = sqlx::query("SELECT * FROM events WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| event_from_row(&r)))
}

/// The active event plus anything starting within the next `days` days,
/// active first, then by start time.
#[instrument(skip_all)]
pub async fn upcoming_events(pool: &Pool, days: i64) -> Result<Vec<Event>> {
    let rows = sqlx::query(
        "SELECT * FROM events \
         WHERE is_active = 1 \
            OR (starts_at IS NOT NULL \
                AND datetime(starts_at) >= datetime('now') \
                AND datetime(starts_at) <= datetime('now', ? || ' days')) \
         ORDER BY is_active DESC, datetime(starts_at) ASC",
    )
    .bind(days)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(event_from_row).collect())
}

/// The currently active event, if any (earliest start wins if legacy data
/// has several flagged).
#[instrument(skip_all)]
pub async fn active_event(pool: &Pool) -> Result<Option<Event>> {
    let row = sqlx::query(
        "SELECT * FROM events WHERE is_active = 1 ORDER BY datetime(starts_at) ASC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| event_from_row(&r)))
}

/// Make exactly one event active. Returns false when the event is unknown.
#[instrument(skip_all)]
pub async fn activate_event(pool: &Pool, id: &str, now: DateTime<Utc>) -> Result<bool> {
    let mut tx = pool.begin().await?;
    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM events WHERE id = ?")
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
    if exists == 0 {
        return Ok(false);
    }
    sqlx::query("UPDATE events SET is_active = 0, updated_at = ? WHERE is_active = 1")
        .bind(now)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE events SET is_active = 1, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(true)
}

// ---------------------------------------------------------------------------
// Notices

fn notice_from_row(row: &SqliteRow) -> EventNotice {
    EventNotice {
        event_id: row.get("event_id"),
        status: row.get("status"),
        message: row.get("message"),
        draft_status: row.get("draft_status"),
        draft_message: row.get("draft_message"),
        is_published: row.get("is_published"),
        published_at: row.get("published_at"),
        updated_by: row.get("updated_by"),
        updated_at: row.get("updated_at"),
    }
}

#[instrument(skip_all)]
pub async fn find_notice(pool: &Pool, event_id: &str) -> Result<Option<EventNotice>> {
    let row = sqlx::query("SELECT * FROM event_notices WHERE event_id = ?")
        .bind(event_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| notice_from_row(&r)))
}

/// Save a draft. Branches on the record's current state:
/// - no record: create it with the input mirrored into live and draft fields;
/// - unpublished: overwrite live and draft fields identically, keep
///   `is_published = 0` and clear `published_at`;
/// - published: touch only the draft fields so the live page is unchanged
///   until the next publish.
#[instrument(skip_all)]
pub async fn confirm_notice(
    pool: &Pool,
    event_id: &str,
    status: NoticeStatus,
    message: Option<&str>,
    editor: &str,
    now: DateTime<Utc>,
) -> Result<EventNotice> {
    let mut tx = pool.begin().await?;
    let existing = sqlx::query("SELECT * FROM event_notices WHERE event_id = ?")
        .bind(event_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(|r| notice_from_row(&r));

    match existing {
        None => {
            sqlx::query(
                "INSERT INTO event_notices \
                 (event_id, status, message, draft_status, draft_message, is_published, published_at, updated_by, updated_at) \
                 VALUES (?, ?, ?, ?, ?, 0, NULL, ?, ?)",
            )
            .bind(event_id)
            .bind(status.as_str())
            .bind(message)
            .bind(status.as_str())
            .bind(message)
            .bind(editor)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        Some(notice) if notice.is_published => {
            sqlx::query(
                "UPDATE event_notices SET draft_status = ?, draft_message = ?, updated_by = ?, updated_at = ? \
                 WHERE event_id = ?",
            )
            .bind(status.as_str())
            .bind(message)
            .bind(editor)
            .bind(now)
            .bind(event_id)
            .execute(&mut *tx)
            .await?;
        }
        Some(_) => {
            sqlx::query(
                "UPDATE event_notices SET \
                   status = ?, message = ?, draft_status = ?, draft_message = ?, \
                   is_published = 0, published_at = NULL, updated_by = ?, updated_at = ? \
                 WHERE event_id = ?",
            )
            .bind(status.as_str())
            .bind(message)
            .bind(status.as_str())
            .bind(message)
            .bind(editor)
            .bind(now)
            .bind(event_id)
            .execute(&mut *tx)
            .await?;
        }
    }

    let row = sqlx::query("SELECT * FROM event_notices WHERE event_id = ?")
        .bind(event_id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(notice_from_row(&row))
}

/// Promote the pending draft to the live fields and clear it. Presence of
/// `draft_status` marks a pending edit; with no draft the live fields are
/// kept as-is (defensive, should not occur in practice). Returns `None`
/// when no notice exists for the event.
#[instrument(skip_all)]
pub async fn publish_notice(
    pool: &Pool,
    event_id: &str,
    editor: &str,
    now: DateTime<Utc>,
) -> Result<Option<EventNotice>> {
    let mut tx = pool.begin().await?;
    let existing = sqlx::query("SELECT * FROM event_notices WHERE event_id = ?")
        .bind(event_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(|r| notice_from_row(&r));

    let Some(notice) = existing else {
        return Ok(None);
    };

    let (new_status, new_message) = match notice.draft_status {
        Some(draft_status) => (draft_status, notice.draft_message),
        None => (notice.status, notice.message),
    };

    sqlx::query(
        "UPDATE event_notices SET \
           status = ?, message = ?, draft_status = NULL, draft_message = NULL, \
           is_published = 1, published_at = ?, updated_by = ?, updated_at = ? \
         WHERE event_id = ?",
    )
    .bind(&new_status)
    .bind(&new_message)
    .bind(now)
    .bind(editor)
    .bind(now)
    .bind(event_id)
    .execute(&mut *tx)
    .await?;

    let row = sqlx::query("SELECT * FROM event_notices WHERE event_id = ?")
        .bind(event_id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(Some(notice_from_row(&row)))
}

/// The notice currently live on the public page: most recently published
/// wins, ties broken by most recent update. Only published fields are
/// selected; drafts cannot leak through this query.
#[instrument(skip_all)]
pub async fn latest_published_notice(pool: &Pool) -> Result<Option<PublishedNotice>> {
    let row = sqlx::query(
        "SELECT n.status, n.message, e.title AS event_title, e.starts_at AS event_starts_at \
         FROM event_notices n \
         LEFT JOIN events e ON e.id = n.event_id \
         WHERE n.is_published = 1 \
         ORDER BY datetime(n.published_at) DESC, datetime(n.updated_at) DESC \
         LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| PublishedNotice {
        status: r.get("status"),
        message: r.get("message"),
        event_title: r.get("event_title"),
        event_starts_at: r.get("event_starts_at"),
    }))
}

// ---------------------------------------------------------------------------
// RSVPs

fn rsvp_from_row(row: &SqliteRow) -> Rsvp {
    Rsvp {
        id: row.get("id"),
        event_id: row.get("event_id"),
        user_ref: row.get("user_ref"),
        status: row.get("status"),
        comment: row.get("comment"),
        checked_in_at: row.get("checked_in_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Record or update attendance intent. A check-in stamp only makes sense
/// on a `join`, so flipping the intent away clears it. Returns `None`
/// when the event does not exist.
#[instrument(skip_all)]
pub async fn upsert_rsvp(
    pool: &Pool,
    event_id: &str,
    user_ref: &str,
    status: RsvpStatus,
    comment: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Option<Rsvp>> {
    let mut tx = pool.begin().await?;
    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM events WHERE id = ?")
        .bind(event_id)
        .fetch_one(&mut *tx)
        .await?;
    if exists == 0 {
        return Ok(None);
    }

    sqlx::query(
        "INSERT INTO rsvps (id, event_id, user_ref, status, comment, checked_in_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, NULL, ?) \
         ON CONFLICT(event_id, user_ref) DO UPDATE SET \
           status = excluded.status, comment = excluded.comment, \
           checked_in_at = CASE WHEN excluded.status = 'join' THEN checked_in_at ELSE NULL END, \
           updated_at = excluded.updated_at",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(event_id)
    .bind(user_ref)
    .bind(status.as_str())
    .bind(comment)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let row = sqlx::query("SELECT * FROM rsvps WHERE event_id = ? AND user_ref = ?")
        .bind(event_id)
        .bind(user_ref)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(Some(rsvp_from_row(&row)))
}

#[instrument(skip_all)]
pub async fn current_rsvp(pool: &Pool, event_id: &str, user_ref: &str) -> Result<Option<Rsvp>> {
    let row = sqlx::query("SELECT * FROM rsvps WHERE event_id = ? AND user_ref = ?")
        .bind(event_id)
        .bind(user_ref)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| rsvp_from_row(&r)))
}

/// Stamp `checked_in_at` on an existing `join` reservation. Idempotent:
/// repeating the call reports `AlreadyCheckedIn` without rewriting the
/// original stamp. Returns `None` when no reservation exists.
#[instrument(skip_all)]
pub async fn check_in(
    pool: &Pool,
    event_id: &str,
    user_ref: &str,
    now: DateTime<Utc>,
) -> Result<Option<CheckinOutcome>> {
    let mut tx = pool.begin().await?;
    let row = sqlx::query("SELECT * FROM rsvps WHERE event_id = ? AND user_ref = ?")
        .bind(event_id)
        .bind(user_ref)
        .fetch_optional(&mut *tx)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let rsvp = rsvp_from_row(&row);

    if rsvp.checked_in_at.is_some() {
        return Ok(Some(CheckinOutcome::AlreadyCheckedIn));
    }
    if RsvpStatus::parse_status(&rsvp.status) != Some(RsvpStatus::Join) {
        return Ok(Some(CheckinOutcome::NotJoining));
    }

    sqlx::query("UPDATE rsvps SET checked_in_at = ?, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(now)
        .bind(&rsvp.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(Some(CheckinOutcome::CheckedIn))
}

#[instrument(skip_all)]
pub async fn rsvp_history(pool: &Pool, user_ref: &str) -> Result<Vec<RsvpHistoryRow>> {
    let rows = sqlx::query(
        "SELECT r.event_id, e.title, e.starts_at, e.place, e.fee, e.memo, \
                r.status, r.comment, r.checked_in_at, r.updated_at \
         FROM rsvps r \
         LEFT JOIN events e ON e.id = r.event_id \
         WHERE r.user_ref = ? \
         ORDER BY datetime(r.updated_at) DESC",
    )
    .bind(user_ref)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .iter()
        .map(|r| RsvpHistoryRow {
            event_id: r.get("event_id"),
            title: r.get("title"),
            starts_at: r.get("starts_at"),
            place: r.get("place"),
            fee: r.get("fee"),
            memo: r.get("memo"),
            status: r.get("status"),
            comment: r.get("comment"),
            checked_in_at: r.get("checked_in_at"),
            updated_at: r.get("updated_at"),
        })
        .collect())
}
