use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical notice status vocabulary. Stored and transmitted as the
/// Japanese tags; anything else found in old rows is legacy data and
/// normalizes to `Initial` at render time (see [`NoticeStatus::from_stored`]).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NoticeStatus {
    Initial,
    Open,
    Cancelled,
    Announcement,
    Hidden,
}

impl NoticeStatus {
    pub const ALL: [NoticeStatus; 5] = [
        NoticeStatus::Initial,
        NoticeStatus::Open,
        NoticeStatus::Cancelled,
        NoticeStatus::Announcement,
        NoticeStatus::Hidden,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeStatus::Initial => "初期設定",
            NoticeStatus::Open => "開催",
            NoticeStatus::Cancelled => "中止",
            NoticeStatus::Announcement => "お知らせ",
            NoticeStatus::Hidden => "非表示",
        }
    }

    /// Strict parse of the canonical tags. Used to validate `confirm` input.
    pub fn parse_status(s: &str) -> Option<NoticeStatus> {
        match s {
            "初期設定" => Some(NoticeStatus::Initial),
            "開催" => Some(NoticeStatus::Open),
            "中止" => Some(NoticeStatus::Cancelled),
            "お知らせ" => Some(NoticeStatus::Announcement),
            "非表示" => Some(NoticeStatus::Hidden),
            _ => None,
        }
    }

    /// Lenient read of persisted data: unknown tags fall back to `Initial`
    /// so the public page never breaks on legacy rows.
    pub fn from_stored(s: &str) -> NoticeStatus {
        Self::parse_status(s).unwrap_or(NoticeStatus::Initial)
    }
}

/// One login identity as forwarded by the auth proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Line { user_id: String },
    Google { email: String },
}

/// Resolved caller: the union of the identities present on a request,
/// normalized (ids trimmed, emails lowercased).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    pub line_user_id: Option<String>,
    pub email: Option<String>,
}

impl Caller {
    /// Merge provider identities into a normalized caller. Returns `None`
    /// when no usable identity is present (treated as unauthenticated).
    pub fn resolve(identities: &[Identity]) -> Option<Caller> {
        let mut caller = Caller::default();
        for identity in identities {
            match identity {
                Identity::Line { user_id } => {
                    let id = user_id.trim();
                    if !id.is_empty() {
                        caller.line_user_id = Some(id.to_string());
                    }
                }
                Identity::Google { email } => {
                    let email = email.trim().to_lowercase();
                    if !email.is_empty() {
                        caller.email = Some(email);
                    }
                }
            }
        }
        if caller.line_user_id.is_none() && caller.email.is_none() {
            None
        } else {
            Some(caller)
        }
    }

    /// Stable identifier recorded as `updated_by`: LINE id when present,
    /// otherwise the normalized email.
    pub fn handle(&self) -> Option<&str> {
        self.line_user_id.as_deref().or(self.email.as_deref())
    }
}

/// Attendance intent for one (event, user) pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RsvpStatus {
    Join,
    Absent,
}

impl RsvpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RsvpStatus::Join => "join",
            RsvpStatus::Absent => "absent",
        }
    }

    pub fn parse_status(s: &str) -> Option<RsvpStatus> {
        match s {
            "join" => Some(RsvpStatus::Join),
            "absent" => Some(RsvpStatus::Absent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub place: Option<String>,
    pub fee: Option<i64>,
    pub memo: Option<String>,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

/// The notice record owned by the workflow engine. `status`/`message` are
/// live on the public page; the draft fields hold a pending edit. `status`
/// stays a raw string here so legacy rows survive reads; conversion to the
/// enum happens at the rendering boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventNotice {
    pub event_id: String,
    pub status: String,
    pub message: Option<String>,
    pub draft_status: Option<String>,
    pub draft_message: Option<String>,
    pub is_published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rsvp {
    pub id: String,
    pub event_id: String,
    pub user_ref: String,
    pub status: String,
    pub comment: Option<String>,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for status in NoticeStatus::ALL {
            assert_eq!(NoticeStatus::parse_status(status.as_str()), Some(status));
        }
        assert_eq!(NoticeStatus::parse_status("メッセージのみ"), None);
    }

    #[test]
    fn legacy_status_falls_back_to_initial() {
        assert_eq!(NoticeStatus::from_stored("その他"), NoticeStatus::Initial);
        assert_eq!(NoticeStatus::from_stored("開催"), NoticeStatus::Open);
    }

    #[test]
    fn caller_resolution_normalizes() {
        let caller = Caller::resolve(&[
            Identity::Line {
                user_id: " U123 ".into(),
            },
            Identity::Google {
                email: " Alice@Example.COM ".into(),
            },
        ])
        .unwrap();
        assert_eq!(caller.line_user_id.as_deref(), Some("U123"));
        assert_eq!(caller.email.as_deref(), Some("alice@example.com"));
        assert_eq!(caller.handle(), Some("U123"));
    }

    #[test]
    fn blank_identities_resolve_to_none() {
        assert_eq!(
            Caller::resolve(&[Identity::Line {
                user_id: "   ".into()
            }]),
            None
        );
        assert_eq!(Caller::resolve(&[]), None);
    }
}
