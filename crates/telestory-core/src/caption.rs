//! Captions attached to archived and relayed media.

use chrono::DateTime;

use crate::i18n::{Language, Text, render};
use crate::model::User;

/// Telegram rejects media captions longer than this many characters.
pub const MAX_CAPTION_CHARS: usize = 1024;

/// `YYYY-MM-DD HH:MM UTC` for a unix timestamp; empty when out of range.
pub fn format_timestamp(unix_secs: i64) -> String {
    DateTime::from_timestamp(unix_secs, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_default()
}

/// Caption for the archive copy: who asked, for whom, and when the story was posted.
pub fn archive_caption(user: &User, input: &str, timestamp: i64, caption: &str) -> String {
    let text = format!(
        "📥 Requested by: {} (@{})\n📍 Target: {}\n📅 Story Date: {}\n\n{}",
        user.display_name(),
        user.username,
        input,
        format_timestamp(timestamp),
        caption,
    );
    clamp(text)
}

/// Caption for the requester's copy.
pub fn requester_caption(language: Option<Language>, input: &str, timestamp: i64, caption: &str) -> String {
    let body = if caption.is_empty() {
        render(language, Text::StoryFrom, &[("input", &input)])
    } else {
        caption.to_owned()
    };
    clamp(format!("{body}\n\n📅 {}", format_timestamp(timestamp)))
}

fn clamp(text: String) -> String {
    match text.char_indices().nth(MAX_CAPTION_CHARS) {
        Some((cut, _)) => text[..cut].to_owned(),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::model::Role;

    fn user() -> User {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        User {
            id: 9,
            first_name: "Jane".to_owned(),
            last_name: "Doe".to_owned(),
            username: "jdoe".to_owned(),
            language: None,
            is_telegram_premium: false,
            premium_expires_at: None,
            role: Role::User,
            created_at: t,
            updated_at: t,
            last_active_at: None,
        }
    }

    #[test]
    fn timestamp_is_formatted_in_utc() {
        assert_eq!(format_timestamp(1_700_000_000), "2023-11-14 22:13 UTC");
        assert_eq!(format_timestamp(0), "1970-01-01 00:00 UTC");
    }

    #[test]
    fn archive_caption_layout() {
        let caption = archive_caption(&user(), "@alice", 1_700_000_000, "hello");
        assert_eq!(
            caption,
            "📥 Requested by: Jane Doe (@jdoe)\n📍 Target: @alice\n📅 Story Date: 2023-11-14 22:13 UTC\n\nhello"
        );
    }

    #[test]
    fn requester_caption_falls_back_when_empty() {
        assert_eq!(
            requester_caption(None, "@alice", 1_700_000_000, "sunset"),
            "sunset\n\n📅 2023-11-14 22:13 UTC"
        );
        assert_eq!(
            requester_caption(Some(Language::En), "@alice", 1_700_000_000, ""),
            "Story from @alice\n\n📅 2023-11-14 22:13 UTC"
        );
    }

    #[test]
    fn long_captions_are_clamped_on_char_boundaries() {
        let long = "ж".repeat(2000);
        let caption = requester_caption(None, "@a", 0, &long);
        assert_eq!(caption.chars().count(), MAX_CAPTION_CHARS);
        assert!(caption.chars().all(|c| c == 'ж'));
    }
}
