//! Day grouping and the small date/name helpers chat rows are rendered with.

use chrono::{DateTime, Datelike, Local, NaiveDate, Timelike, Utc};

use crate::api::models::{ChatMessage, Conversation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDirection {
    Left,
    Right,
}

impl MessageDirection {
    pub fn of(message: &ChatMessage) -> Self {
        if message.sent_by_me {
            MessageDirection::Right
        } else {
            MessageDirection::Left
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageGroup<'a> {
    pub label: String,
    pub messages: Vec<&'a ChatMessage>,
}

fn short_date(day: NaiveDate) -> String {
    day.format("%b %-d").to_string()
}

fn is_yesterday(day: NaiveDate, today: NaiveDate) -> bool {
    today.pred_opt() == Some(day)
}

/// `"Today"`, `"Yesterday"`, or a short date such as `"Mar 4"`.
pub fn day_label(ts: DateTime<Utc>, now: DateTime<Local>) -> String {
    let day = ts.with_timezone(&Local).date_naive();
    let today = now.date_naive();
    if day == today {
        "Today".to_string()
    } else if is_yesterday(day, today) {
        "Yesterday".to_string()
    } else {
        short_date(day)
    }
}

/// Conversation-row timestamp: the time for today's messages, otherwise
/// the same labels as [`day_label`].
pub fn relative_label(ts: DateTime<Utc>, now: DateTime<Local>) -> String {
    let local = ts.with_timezone(&Local);
    if local.date_naive() == now.date_naive() {
        time_to_string(local, true)
    } else {
        day_label(ts, now)
    }
}

/// Groups messages by day label, keeping groups in first-appearance order
/// and messages in list order.
pub fn group_by_day(messages: &[ChatMessage], now: DateTime<Local>) -> Vec<MessageGroup<'_>> {
    let mut groups: Vec<MessageGroup<'_>> = Vec::new();
    for message in messages {
        let label = day_label(message.created_at, now);
        match groups.iter_mut().find(|g| g.label == label) {
            Some(group) => group.messages.push(message),
            None => groups.push(MessageGroup {
                label,
                messages: vec![message],
            }),
        }
    }
    groups
}

/// 12-hour clock, e.g. `"3:05pm"` or `"3:05 pm"` with `space`.
pub fn time_to_string(time: DateTime<Local>, space: bool) -> String {
    let mut hr = time.hour();
    let mut ampm = "am";
    if hr > 12 {
        hr -= 12;
        ampm = "pm";
    }
    if hr == 12 {
        ampm = "pm";
    }
    let sep = if space { " " } else { "" };
    format!("{}:{:02}{}{}", hr, time.minute(), sep, ampm)
}

/// `M-D-YYYY`.
pub fn date_to_string(date: DateTime<Local>) -> String {
    format!("{}-{}-{}", date.month(), date.day(), date.year())
}

pub fn report_time_to_full_string(date: DateTime<Local>, new_line: bool) -> String {
    let nl = if new_line { "\n" } else { "" };
    format!("{}{} at {}", date_to_string(date), nl, time_to_string(date, false))
}

pub fn initials(name: &str) -> String {
    name.split(' ').filter_map(|word| word.chars().next()).collect()
}

pub fn last_message_time(conversation: &Conversation, now: DateTime<Local>) -> Option<String> {
    conversation
        .last_message()
        .map(|m| relative_label(m.created_at, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::UserData;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, 0).earliest().unwrap()
    }

    fn message(at: DateTime<Local>, content: &str) -> ChatMessage {
        ChatMessage {
            created_at: at.with_timezone(&Utc),
            content: content.to_string(),
            sender: UserData::reference("2", "Ann"),
            sent_by_me: false,
            read: false,
        }
    }

    #[test]
    fn labels_today_yesterday_and_older_days() {
        let now = local(2024, 3, 6, 12, 0);
        assert_eq!(day_label(local(2024, 3, 6, 8, 30).with_timezone(&Utc), now), "Today");
        assert_eq!(day_label(local(2024, 3, 5, 23, 10).with_timezone(&Utc), now), "Yesterday");
        assert_eq!(day_label(local(2024, 3, 4, 15, 5).with_timezone(&Utc), now), "Mar 4");
        assert_eq!(day_label(local(2024, 3, 1, 9, 0).with_timezone(&Utc), local(2024, 3, 2, 9, 0)), "Yesterday");
    }

    #[test]
    fn groups_keep_first_appearance_order() {
        let now = local(2024, 3, 6, 12, 0);
        let messages = vec![
            message(local(2024, 3, 4, 10, 0), "a"),
            message(local(2024, 3, 4, 11, 0), "b"),
            message(now - Duration::days(1), "c"),
            message(local(2024, 3, 6, 9, 0), "d"),
        ];

        let groups = group_by_day(&messages, now);
        let summary: Vec<(String, Vec<&str>)> = groups
            .iter()
            .map(|g| (g.label.clone(), g.messages.iter().map(|m| m.content.as_str()).collect()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Mar 4".to_string(), vec!["a", "b"]),
                ("Yesterday".to_string(), vec!["c"]),
                ("Today".to_string(), vec!["d"]),
            ]
        );
    }

    #[test]
    fn formats_clock_and_dates() {
        assert_eq!(time_to_string(local(2024, 3, 4, 15, 5), true), "3:05 pm");
        assert_eq!(time_to_string(local(2024, 3, 4, 12, 30), false), "12:30pm");
        assert_eq!(time_to_string(local(2024, 3, 4, 9, 0), false), "9:00am");
        assert_eq!(date_to_string(local(2024, 3, 4, 9, 0)), "3-4-2024");
        assert_eq!(
            report_time_to_full_string(local(2024, 3, 4, 9, 0), true),
            "3-4-2024\n at 9:00am"
        );
        assert_eq!(relative_label(local(2024, 3, 4, 15, 5).with_timezone(&Utc), local(2024, 3, 4, 18, 0)), "3:05 pm");
    }

    #[test]
    fn initials_and_direction() {
        assert_eq!(initials("Ann Marie Sailor"), "AMS");
        assert_eq!(initials("Bob  Jones"), "BJ");
        let mut m = message(local(2024, 3, 4, 9, 0), "x");
        assert_eq!(MessageDirection::of(&m), MessageDirection::Left);
        m.sent_by_me = true;
        assert_eq!(MessageDirection::of(&m), MessageDirection::Right);
    }
}
