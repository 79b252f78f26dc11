//! Public notice page renderer.
//!
//! Pure string building over the five-tag status set: no I/O, no shared
//! state, safe to call concurrently. Every user-supplied value passes
//! through [`SafeHtml`] before it reaches the markup; line breaks are
//! substituted after escaping so `<br>` survives.

use crate::model::NoticeStatus;
use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use std::fmt;

/// Shown for the Initial status; user text is appended on a new line when
/// non-blank.
pub const FIXED_INITIAL_MESSAGE: &str = "中止の場合は、当日の朝８時までに掲示します";

/// HTML-escaped text. The only way to construct one is through escaping,
/// so raw user input cannot reach the markup by type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SafeHtml(String);

impl SafeHtml {
    pub fn escape(raw: &str) -> SafeHtml {
        let mut out = String::with_capacity(raw.len());
        for ch in raw.chars() {
            match ch {
                '&' => out.push_str("&amp;"),
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                '"' => out.push_str("&quot;"),
                '\'' => out.push_str("&#39;"),
                _ => out.push(ch),
            }
        }
        SafeHtml(out)
    }

    /// Escape, then turn newlines into `<br>`. Order matters: escaping
    /// first keeps the inserted tags intact.
    pub fn escape_multiline(raw: &str) -> SafeHtml {
        SafeHtml(Self::escape(raw).0.replace('\n', "<br>"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SafeHtml {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-status display rule table. This is the behavioral contract of the
/// public page; change it only together with the tests below.
struct DisplayRule {
    show_event_title: bool,
    show_message: bool,
    prepend_fixed_message: bool,
    show_user_message: bool,
}

fn display_rule(status: NoticeStatus) -> DisplayRule {
    match status {
        NoticeStatus::Open | NoticeStatus::Cancelled => DisplayRule {
            show_event_title: true,
            show_message: true,
            prepend_fixed_message: false,
            show_user_message: true,
        },
        NoticeStatus::Initial => DisplayRule {
            show_event_title: false,
            show_message: true,
            prepend_fixed_message: true,
            show_user_message: true,
        },
        NoticeStatus::Announcement => DisplayRule {
            show_event_title: false,
            show_message: true,
            prepend_fixed_message: false,
            show_user_message: true,
        },
        NoticeStatus::Hidden => DisplayRule {
            show_event_title: false,
            show_message: false,
            prepend_fixed_message: false,
            show_user_message: false,
        },
    }
}

/// Static presentation tuple per status (colors are used verbatim in the
/// inline stylesheet).
struct StatusStyle {
    bg: &'static str,
    fg: &'static str,
    border: &'static str,
    label: &'static str,
}

fn status_style(status: NoticeStatus) -> StatusStyle {
    match status {
        NoticeStatus::Open => StatusStyle {
            bg: "#e6f4ea",
            fg: "#1e4620",
            border: "#34a853",
            label: "【本日：イベント開催します】",
        },
        NoticeStatus::Cancelled => StatusStyle {
            bg: "#fce8e6",
            fg: "#a50e0e",
            border: "#ea4335",
            label: "【本日：イベント中止します】",
        },
        NoticeStatus::Initial => StatusStyle {
            bg: "#f3f4f6",
            fg: "#111827",
            border: "#9ca3af",
            label: "【開催情報】",
        },
        NoticeStatus::Announcement => StatusStyle {
            bg: "#fff7ed",
            fg: "#7c2d12",
            border: "#fb923c",
            label: "【お知らせ】",
        },
        NoticeStatus::Hidden => StatusStyle {
            bg: "#ffffff",
            fg: "#111827",
            border: "#ffffff",
            label: "",
        },
    }
}

const HIDDEN_DOC: &str =
    "<!doctype html><html><head><meta charset=\"utf-8\"></head><body></body></html>";

/// Render the public notice document for a published status. Total over
/// the status enum; callers reading stored data should go through
/// [`NoticeStatus::from_stored`] so unknown tags land on Initial.
pub fn render_notice_html(
    status: NoticeStatus,
    event_title: Option<&str>,
    message: Option<&str>,
) -> String {
    if status == NoticeStatus::Hidden {
        return HIDDEN_DOC.to_string();
    }

    let rule = display_rule(status);
    let style = status_style(status);

    let user_message = if rule.show_user_message {
        message.unwrap_or("")
    } else {
        ""
    };

    let merged_message = if !rule.show_message {
        String::new()
    } else if rule.prepend_fixed_message {
        let trimmed = user_message.trim();
        if trimmed.is_empty() {
            FIXED_INITIAL_MESSAGE.to_string()
        } else {
            format!("{FIXED_INITIAL_MESSAGE}\n{trimmed}")
        }
    } else {
        user_message.to_string()
    };

    let safe_title = match event_title {
        Some(title) if rule.show_event_title && !title.is_empty() => SafeHtml::escape(title),
        _ => SafeHtml::default(),
    };
    let safe_message = if merged_message.is_empty() {
        SafeHtml::default()
    } else {
        SafeHtml::escape_multiline(&merged_message)
    };
    let safe_label = SafeHtml::escape(style.label);

    let title_block = if safe_title.is_empty() {
        String::new()
    } else {
        format!("      <div class=\"event\">{safe_title}</div>\n")
    };
    let message_block = if safe_message.is_empty() {
        String::new()
    } else {
        format!("      <div class=\"msg\">{safe_message}</div>\n")
    };

    format!(
        r#"<!doctype html>
<html lang="ja">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>開催通知</title>
  <style>
    body {{ margin:0; padding:0; font-family: system-ui, -apple-system, "Segoe UI", Roboto, "Noto Sans JP", sans-serif; }}
    .wrap {{ padding: 10px; }}
    .box {{
      border-left: 6px solid {border};
      background: {bg};
      color: {fg};
      padding: 10px 12px;
      border-radius: 8px;
      line-height: 1.4;
    }}
    .status {{ font-weight: 800; font-size: 18px; margin-bottom: 6px; }}
    .event  {{ font-weight: 700; font-size: 16px; margin-bottom: 6px; }}
    .msg    {{ font-size: 16px; }}
  </style>
</head>
<body>
  <div class="wrap">
    <div class="box">
      <div class="status">{safe_label}</div>
{title_block}{message_block}    </div>
  </div>
</body>
</html>
"#,
        border = style.border,
        bg = style.bg,
        fg = style.fg,
    )
}

/// Format an event heading as `MM/DD(曜) title` in JST. Falls back to the
/// bare title when no start time is known.
pub fn format_event_label(starts_at: Option<DateTime<Utc>>, title: &str) -> String {
    let Some(at) = starts_at else {
        return title.to_string();
    };
    // Shift into JST (+09:00, no DST) and read the calendar fields.
    let jst = at + Duration::hours(9);
    let weekday = match jst.weekday() {
        Weekday::Mon => "月",
        Weekday::Tue => "火",
        Weekday::Wed => "水",
        Weekday::Thu => "木",
        Weekday::Fri => "金",
        Weekday::Sat => "土",
        Weekday::Sun => "日",
    };
    format!("{:02}/{:02}({}) {}", jst.month(), jst.day(), weekday, title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn hidden_renders_minimal_document() {
        let html = render_notice_html(
            NoticeStatus::Hidden,
            Some("<b>title</b>"),
            Some("should never appear"),
        );
        assert_eq!(html, HIDDEN_DOC);
        assert!(!html.contains("title"));
        assert!(!html.contains("appear"));
    }

    #[test]
    fn open_shows_title_and_message() {
        let html = render_notice_html(NoticeStatus::Open, Some("08/30(土) 朝市"), Some("rain check"));
        assert!(html.contains("【本日：イベント開催します】"));
        assert!(html.contains("08/30(土) 朝市"));
        assert!(html.contains("rain check"));
        assert!(html.contains("#34a853"));
    }

    #[test]
    fn cancelled_uses_cancel_styling() {
        let html = render_notice_html(NoticeStatus::Cancelled, Some("朝市"), Some("heavy rain"));
        assert!(html.contains("【本日：イベント中止します】"));
        assert!(html.contains("#ea4335"));
        assert!(html.contains("heavy rain"));
        assert!(html.contains("朝市"));
    }

    #[test]
    fn announcement_hides_title() {
        let html = render_notice_html(NoticeStatus::Announcement, Some("朝市"), Some("notice text"));
        assert!(html.contains("【お知らせ】"));
        assert!(html.contains("notice text"));
        assert!(!html.contains("朝市"));
    }

    #[test]
    fn initial_blank_message_is_exactly_the_fixed_text() {
        let html = render_notice_html(NoticeStatus::Initial, Some("朝市"), Some("   "));
        assert!(html.contains(FIXED_INITIAL_MESSAGE));
        assert!(!html.contains("<br>"));
        assert!(!html.contains("朝市"));
    }

    #[test]
    fn initial_appends_user_message_after_line_break() {
        let html = render_notice_html(NoticeStatus::Initial, None, Some("追記です"));
        let expected = format!("{FIXED_INITIAL_MESSAGE}<br>追記です");
        assert!(html.contains(&expected));
    }

    #[test]
    fn titles_and_messages_are_escaped() {
        let html = render_notice_html(
            NoticeStatus::Open,
            Some("<script>alert(1)</script>"),
            Some("a & b \"quoted\""),
        );
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("a &amp; b &quot;quoted&quot;"));
    }

    #[test]
    fn newlines_become_breaks_after_escaping() {
        let html = render_notice_html(NoticeStatus::Open, None, Some("line1\n<line2>"));
        assert!(html.contains("line1<br>&lt;line2&gt;"));
    }

    #[test]
    fn safe_html_escapes_all_five_characters() {
        let safe = SafeHtml::escape("&<>\"'");
        assert_eq!(safe.as_str(), "&amp;&lt;&gt;&quot;&#39;");
    }

    #[test]
    fn event_label_in_jst() {
        // 2026-08-28T22:00:00Z is 08/29 (Saturday) 07:00 in JST.
        let at = Utc.with_ymd_and_hms(2026, 8, 28, 22, 0, 0).unwrap();
        assert_eq!(format_event_label(Some(at), "朝市"), "08/29(土) 朝市");
        assert_eq!(format_event_label(None, "朝市"), "朝市");
    }
}
