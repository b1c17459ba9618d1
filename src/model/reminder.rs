use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a recurring reminder advances after each firing.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceKind {
    Daily,
    /// "every N days" / "alternate days".
    Days,
    Weekly,
}

impl RecurrenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceKind::Daily => "daily",
            RecurrenceKind::Days => "days",
            RecurrenceKind::Weekly => "weekly",
        }
    }

    /// Stored rows may carry recurrence text written by older versions or
    /// by hand. Anything unrecognized falls back to daily so a recurring
    /// reminder never stalls at fire time.
    pub fn from_str_lossy(value: &str) -> Self {
        match value {
            "daily" => RecurrenceKind::Daily,
            "days" => RecurrenceKind::Days,
            "weekly" => RecurrenceKind::Weekly,
            _ => RecurrenceKind::Daily,
        }
    }

    pub fn default_interval(&self) -> u32 {
        match self {
            RecurrenceKind::Daily => 1,
            RecurrenceKind::Days => 2,
            RecurrenceKind::Weekly => 7,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recurrence {
    pub kind: RecurrenceKind,
    /// Days between firings. Always >= 1; weekly ignores it and advances
    /// a full 7 days.
    pub interval: u32,
}

impl std::fmt::Display for Recurrence {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self.kind {
            RecurrenceKind::Daily => f.write_str("daily"),
            RecurrenceKind::Days => {
                write!(f, "every {} days", self.interval)
            },
            RecurrenceKind::Weekly => f.write_str("weekly"),
        }
    }
}

/// Who gets pinged when the reminder fires.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Mention {
    #[default]
    Everyone,
    User,
    None,
}

impl Mention {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mention::Everyone => "everyone",
            Mention::User => "user",
            Mention::None => "none",
        }
    }

    pub fn from_str_lossy(value: &str) -> Self {
        match value {
            "everyone" => Mention::Everyone,
            "user" => Mention::User,
            "none" => Mention::None,
            _ => Mention::Everyone,
        }
    }
}

/// A persisted reminder. Trigger and creation instants are always UTC;
/// rows are never physically removed, deletion flips `active` off.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub id: i64,
    pub owner_id: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub message: String,
    pub remind_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub active: bool,
    pub sent: bool,
    pub recurrence: Option<Recurrence>,
    /// The free-text expression the trigger was parsed from, kept for
    /// audit and redisplay.
    pub pattern: Option<String>,
    pub mention: Mention,
}

impl Reminder {
    pub fn is_recurring(&self) -> bool {
        self.recurrence.is_some()
    }
}

/// Input to [`ReminderStore::add`](crate::database::ReminderStore::add);
/// the store assigns the id and creation instant.
#[derive(Debug, Clone)]
pub struct NewReminder {
    pub owner_id: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub message: String,
    pub remind_at: DateTime<Utc>,
    pub recurrence: Option<Recurrence>,
    pub pattern: Option<String>,
    pub mention: Mention,
}
