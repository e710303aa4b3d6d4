//! Pure helpers that derive display metadata for sessions.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::types::{ChatMessage, Role, SessionListing};

/// Maximum summary length, in characters, before truncation.
pub const SUMMARY_MAX_CHARS: usize = 40;

/// Appended to truncated summaries.
pub const ELLIPSIS: &str = "...";

/// Summary used when a session has neither a user message nor a title.
pub const UNTITLED_SUMMARY: &str = "New chat";

/// Summary for a session: the first user message, truncated, else the title,
/// else [`UNTITLED_SUMMARY`]. Never empty.
#[must_use]
pub fn derive_summary(title: &str, messages: &[ChatMessage]) -> String {
    let first_user = messages
        .iter()
        .find(|m| m.role == Role::User && !m.content.trim().is_empty());

    match first_user {
        Some(message) => truncate(message.content.trim()),
        None if !title.trim().is_empty() => title.trim().to_string(),
        None => UNTITLED_SUMMARY.to_string(),
    }
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(SUMMARY_MAX_CHARS) {
        Some((cut, _)) => format!("{}{ELLIPSIS}", &text[..cut]),
        None => text.to_string(),
    }
}

/// Anything with an insertion time.
pub trait Dated {
    /// Insertion time.
    fn created_at(&self) -> DateTime<Utc>;
}

impl Dated for SessionListing {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Display bucket for a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecencyBucket {
    /// Same UTC calendar day and less than a day old.
    Today,
    /// Less than 7 days old.
    PastWeek,
    /// Less than 30 days old.
    PastMonth,
    /// Everything else.
    Older,
}

impl RecencyBucket {
    /// Bucket for an item created at `created_at`, seen from `now`.
    #[must_use]
    pub fn classify(created_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let age = now - created_at;
        if created_at.date_naive() == now.date_naive() && age < Duration::days(1) {
            Self::Today
        } else if age < Duration::days(7) {
            Self::PastWeek
        } else if age < Duration::days(30) {
            Self::PastMonth
        } else {
            Self::Older
        }
    }
}

/// Sessions partitioned by recency; input order is kept within each bucket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecencyGroups<T> {
    /// Created today.
    pub today: Vec<T>,
    /// Created within the last week.
    pub past_week: Vec<T>,
    /// Created within the last month.
    pub past_month: Vec<T>,
    /// Older.
    pub older: Vec<T>,
}

impl<T> Default for RecencyGroups<T> {
    fn default() -> Self {
        Self {
            today: Vec::new(),
            past_week: Vec::new(),
            past_month: Vec::new(),
            older: Vec::new(),
        }
    }
}

/// Partition `sessions` into recency buckets in a single pass.
#[must_use]
pub fn group_by_recency<T, I>(sessions: I, now: DateTime<Utc>) -> RecencyGroups<T>
where
    T: Dated,
    I: IntoIterator<Item = T>,
{
    let mut groups = RecencyGroups::default();
    for session in sessions {
        let bucket = match RecencyBucket::classify(session.created_at(), now) {
            RecencyBucket::Today => &mut groups.today,
            RecencyBucket::PastWeek => &mut groups.past_week,
            RecencyBucket::PastMonth => &mut groups.past_month,
            RecencyBucket::Older => &mut groups.older,
        };
        bucket.push(session);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    use crate::sessions::ids::SessionId;

    fn message(role: Role, content: &str) -> ChatMessage {
        ChatMessage {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }

    fn listing(created_at: DateTime<Utc>) -> SessionListing {
        SessionListing {
            id: SessionId::new(),
            summary: String::new(),
            created_at,
            is_favourite: false,
        }
    }

    #[test]
    fn test_summary_truncates_long_first_user_message() {
        let content = "a".repeat(50);
        let messages = vec![
            message(Role::Assistant, "Hi! Who are we shopping for?"),
            message(Role::User, &content),
        ];

        let summary = derive_summary("Ignored title", &messages);
        assert_eq!(summary, format!("{}...", "a".repeat(40)));
    }

    #[test]
    fn test_summary_keeps_short_message_and_counts_chars() {
        let messages = vec![message(Role::User, "Cadeau pour ma sœur 🎁")];
        assert_eq!(derive_summary("t", &messages), "Cadeau pour ma sœur 🎁");

        let exactly_forty = "é".repeat(40);
        assert_eq!(derive_summary("t", &[message(Role::User, &exactly_forty)]), exactly_forty);

        let forty_one = "é".repeat(41);
        assert_eq!(
            derive_summary("t", &[message(Role::User, &forty_one)]),
            format!("{}...", "é".repeat(40))
        );
    }

    #[test]
    fn test_summary_falls_back_to_title() {
        let messages = vec![message(Role::Assistant, "Hello there")];
        assert_eq!(derive_summary("Birthday ideas", &messages), "Birthday ideas");
        assert_eq!(derive_summary("  ", &messages), UNTITLED_SUMMARY);
        assert_eq!(derive_summary("", &[]), UNTITLED_SUMMARY);
    }

    #[test]
    fn test_group_by_recency_thresholds() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        let sessions = vec![
            listing(now),
            listing(now - Duration::days(2)),
            listing(now - Duration::days(10)),
            listing(now - Duration::days(40)),
        ];

        let groups = group_by_recency(sessions.clone(), now);
        assert_eq!(groups.today, vec![sessions[0].clone()]);
        assert_eq!(groups.past_week, vec![sessions[1].clone()]);
        assert_eq!(groups.past_month, vec![sessions[2].clone()]);
        assert_eq!(groups.older, vec![sessions[3].clone()]);
    }

    #[test]
    fn test_yesterday_late_evening_is_not_today() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 0, 30, 0).unwrap();
        let yesterday = now - Duration::hours(2);
        assert_eq!(RecencyBucket::classify(yesterday, now), RecencyBucket::PastWeek);
        assert_eq!(RecencyBucket::classify(now - Duration::minutes(10), now), RecencyBucket::Today);
    }

    #[test]
    fn test_boundaries_are_exclusive() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        assert_eq!(RecencyBucket::classify(now - Duration::days(7), now), RecencyBucket::PastMonth);
        assert_eq!(RecencyBucket::classify(now - Duration::days(30), now), RecencyBucket::Older);
    }

    #[test]
    fn test_group_preserves_input_order_within_bucket() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        let newer = listing(now - Duration::days(3));
        let older = listing(now - Duration::days(5));

        let groups = group_by_recency(vec![newer.clone(), older.clone()], now);
        assert_eq!(groups.past_week, vec![newer, older]);
        assert!(groups.today.is_empty());
    }
}
