use chrono::{Duration, Utc};
use swf_notice::auth::AuthPolicy;
use swf_notice::config::AuthConfig;
use swf_notice::db::{self, NewEvent};
use swf_notice::model::{Caller, Identity};
use swf_notice::notice::{self, ConfirmRequest, NoticeError};

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

async fn seed_event(pool: &sqlx::SqlitePool, id: &str, title: &str) {
    let event = NewEvent {
        id: id.to_string(),
        title: title.to_string(),
        starts_at: Some(Utc::now() + Duration::days(1)),
        ends_at: None,
        place: None,
        fee: None,
        memo: None,
    };
    db::upsert_event(pool, &event, Utc::now()).await.unwrap();
}

fn editor_policy(line_ids: &str) -> AuthPolicy {
    AuthPolicy::from_config(&AuthConfig {
        notice_editor_user_ids: line_ids.into(),
        ..Default::default()
    })
}

fn line_caller(id: &str) -> Caller {
    Caller::resolve(&[Identity::Line {
        user_id: id.into(),
    }])
    .unwrap()
}

fn confirm_req<'a>(event_id: &'a str, status: &'a str, message: &'a str) -> ConfirmRequest<'a> {
    ConfirmRequest {
        event_id,
        status,
        message,
    }
}

#[tokio::test]
async fn confirm_creates_an_unpublished_draft() {
    let pool = setup_pool().await;
    let policy = editor_policy("U123");
    let caller = line_caller("U123");
    seed_event(&pool, "ev1", "朝市").await;

    let notice = notice::confirm(
        &pool,
        &policy,
        Some(&caller),
        confirm_req("ev1", "開催", "  hello  "),
    )
    .await
    .unwrap();

    assert_eq!(notice.status, "開催");
    assert_eq!(notice.message.as_deref(), Some("hello"));
    assert_eq!(notice.draft_status.as_deref(), Some("開催"));
    assert_eq!(notice.draft_message.as_deref(), Some("hello"));
    assert!(!notice.is_published);
    assert!(notice.published_at.is_none());
    assert_eq!(notice.updated_by, "U123");
}

#[tokio::test]
async fn confirm_is_idempotent() {
    let pool = setup_pool().await;
    let policy = editor_policy("U123");
    let caller = line_caller("U123");
    seed_event(&pool, "ev1", "朝市").await;

    let first = notice::confirm(&pool, &policy, Some(&caller), confirm_req("ev1", "開催", "msg"))
        .await
        .unwrap();
    let second = notice::confirm(&pool, &policy, Some(&caller), confirm_req("ev1", "開催", "msg"))
        .await
        .unwrap();

    assert_eq!(first.status, second.status);
    assert_eq!(first.message, second.message);
    assert_eq!(first.draft_status, second.draft_status);
    assert_eq!(first.draft_message, second.draft_message);
    assert_eq!(first.is_published, second.is_published);
    assert_eq!(first.published_at, second.published_at);
}

#[tokio::test]
async fn publish_then_render_round_trip() {
    let pool = setup_pool().await;
    let policy = editor_policy("U123");
    let caller = line_caller("U123");
    seed_event(&pool, "ev1", "朝市").await;

    notice::confirm(&pool, &policy, Some(&caller), confirm_req("ev1", "開催", "rain check"))
        .await
        .unwrap();
    let published = notice::publish(&pool, &policy, Some(&caller), "ev1")
        .await
        .unwrap();

    assert!(published.is_published);
    assert!(published.published_at.is_some());
    assert!(published.draft_status.is_none());
    assert!(published.draft_message.is_none());

    let html = notice::public_notice_html(&pool).await.unwrap();
    assert!(html.contains("朝市"));
    assert!(html.contains("rain check"));
    assert!(html.contains("【本日：イベント開催します】"));
}

#[tokio::test]
async fn draft_edits_do_not_leak_to_public_page() {
    let pool = setup_pool().await;
    let policy = editor_policy("U123");
    let caller = line_caller("U123");
    seed_event(&pool, "ev1", "朝市").await;

    notice::confirm(&pool, &policy, Some(&caller), confirm_req("ev1", "開催", "live text"))
        .await
        .unwrap();
    notice::publish(&pool, &policy, Some(&caller), "ev1")
        .await
        .unwrap();
    let before = notice::public_notice_html(&pool).await.unwrap();

    // Stage an edit without publishing it.
    let staged = notice::confirm(
        &pool,
        &policy,
        Some(&caller),
        confirm_req("ev1", "中止", "draft only text"),
    )
    .await
    .unwrap();
    assert!(staged.is_published);
    assert_eq!(staged.status, "開催");
    assert_eq!(staged.message.as_deref(), Some("live text"));
    assert_eq!(staged.draft_status.as_deref(), Some("中止"));
    assert_eq!(staged.draft_message.as_deref(), Some("draft only text"));

    let after = notice::public_notice_html(&pool).await.unwrap();
    assert_eq!(before, after);
    assert!(!after.contains("draft only text"));

    // Publishing promotes the staged edit.
    notice::publish(&pool, &policy, Some(&caller), "ev1")
        .await
        .unwrap();
    let html = notice::public_notice_html(&pool).await.unwrap();
    assert!(html.contains("draft only text"));
    assert!(html.contains("【本日：イベント中止します】"));
    assert!(!html.contains("live text"));
}

#[tokio::test]
async fn staged_blank_message_clears_live_message_on_publish() {
    let pool = setup_pool().await;
    let policy = editor_policy("U123");
    let caller = line_caller("U123");
    seed_event(&pool, "ev1", "朝市").await;

    notice::confirm(&pool, &policy, Some(&caller), confirm_req("ev1", "開催", "old text"))
        .await
        .unwrap();
    notice::publish(&pool, &policy, Some(&caller), "ev1")
        .await
        .unwrap();

    let staged = notice::confirm(&pool, &policy, Some(&caller), confirm_req("ev1", "開催", "   "))
        .await
        .unwrap();
    assert_eq!(staged.draft_status.as_deref(), Some("開催"));
    assert!(staged.draft_message.is_none());

    let published = notice::publish(&pool, &policy, Some(&caller), "ev1")
        .await
        .unwrap();
    assert!(published.message.is_none());
}

#[tokio::test]
async fn publish_without_notice_is_not_found() {
    let pool = setup_pool().await;
    let policy = editor_policy("U123");
    let caller = line_caller("U123");

    let err = notice::publish(&pool, &policy, Some(&caller), "ev1")
        .await
        .unwrap_err();
    assert!(matches!(err, NoticeError::NotFound(id) if id == "ev1"));
}

#[tokio::test]
async fn validation_rejects_bad_input() {
    let pool = setup_pool().await;
    let policy = editor_policy("U123");
    let caller = line_caller("U123");

    let err = notice::confirm(&pool, &policy, Some(&caller), confirm_req("", "開催", "msg"))
        .await
        .unwrap_err();
    assert!(matches!(err, NoticeError::Validation(_)));

    let err = notice::confirm(
        &pool,
        &policy,
        Some(&caller),
        confirm_req("ev1", "メッセージのみ", "msg"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, NoticeError::Validation(_)));

    // Nothing was written by the rejected transitions.
    assert!(db::find_notice(&pool, "ev1").await.unwrap().is_none());
}

#[tokio::test]
async fn auth_failures_fail_closed() {
    let pool = setup_pool().await;

    // No caller at all.
    let policy = editor_policy("U123");
    let err = notice::confirm(&pool, &policy, None, confirm_req("ev1", "開催", "msg"))
        .await
        .unwrap_err();
    assert!(matches!(err, NoticeError::Unauthenticated));

    // Caller not on any list.
    let outsider = line_caller("U999");
    let err = notice::confirm(&pool, &policy, Some(&outsider), confirm_req("ev1", "開催", "msg"))
        .await
        .unwrap_err();
    assert!(matches!(err, NoticeError::PermissionDenied));

    // Empty allow-lists deny even the would-be editor.
    let empty = AuthPolicy::from_config(&AuthConfig::default());
    let caller = line_caller("U123");
    let err = notice::publish(&pool, &empty, Some(&caller), "ev1")
        .await
        .unwrap_err();
    assert!(matches!(err, NoticeError::PermissionDenied));
}

#[tokio::test]
async fn cancellation_scenario_trims_and_styles() {
    let pool = setup_pool().await;
    let policy = editor_policy("U123");
    let caller = line_caller("U123");
    seed_event(&pool, "ev1", "朝市").await;

    let notice = notice::confirm(
        &pool,
        &policy,
        Some(&caller),
        confirm_req("ev1", "中止", "  heavy rain  "),
    )
    .await
    .unwrap();
    assert_eq!(notice.draft_message.as_deref(), Some("heavy rain"));

    notice::publish(&pool, &policy, Some(&caller), "ev1")
        .await
        .unwrap();
    let html = notice::public_notice_html(&pool).await.unwrap();
    assert!(html.contains("【本日：イベント中止します】"));
    assert!(html.contains("heavy rain"));
    assert!(html.contains("朝市"));
}

#[tokio::test]
async fn nothing_published_renders_hidden_document() {
    let pool = setup_pool().await;
    let html = notice::public_notice_html(&pool).await.unwrap();
    assert!(!html.contains("class=\"box\""));
    assert!(html.contains("<body></body>"));
}

#[tokio::test]
async fn escaped_title_never_renders_raw_markup() {
    let pool = setup_pool().await;
    let policy = editor_policy("U123");
    let caller = line_caller("U123");
    seed_event(&pool, "ev1", "<script>alert(1)</script>").await;

    notice::confirm(&pool, &policy, Some(&caller), confirm_req("ev1", "開催", "ok"))
        .await
        .unwrap();
    notice::publish(&pool, &policy, Some(&caller), "ev1")
        .await
        .unwrap();

    let html = notice::public_notice_html(&pool).await.unwrap();
    assert!(html.contains("&lt;script&gt;"));
    assert!(!html.contains("<script>"));
}
