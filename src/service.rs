use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::info;

use crate::database::ReminderStore;
use crate::error::{Error, Result};
use crate::model::reminder::{Mention, NewReminder, Recurrence, Reminder};
use crate::parser::TimeParser;
use crate::timezone::{self, ZoneToken};

/// How many reminders an owner listing returns at most.
const OWNER_LIST_LIMIT: u32 = 10;

/// What the front-end gets back after creating a reminder: enough to
/// render a confirmation without touching the store again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderSummary {
    pub id: i64,
    pub remind_at: DateTime<Utc>,
    /// The trigger rendered as wall-clock time in the display zone.
    pub local_time: NaiveDateTime,
    pub zone: ZoneToken,
    pub time_until: String,
    pub recurrence: Option<Recurrence>,
}

#[derive(Debug, Clone)]
pub struct CreateReminder {
    pub owner_id: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
    /// Free-text time expression, e.g. "daily at 9am IST".
    pub time_text: String,
    pub message: String,
    pub mention: Mention,
}

/// Inbound boundary for the command handlers: create, list, delete. Owns
/// the parser and the display zone; the store is shared with the
/// scheduler.
pub struct ReminderService {
    store: Arc<ReminderStore>,
    parser: TimeParser,
}

impl ReminderService {
    pub fn new(
        store: Arc<ReminderStore>,
        default_zone: ZoneToken,
    ) -> Self {
        Self { store, parser: TimeParser::new(default_zone) }
    }

    pub async fn create_reminder(
        &self,
        request: CreateReminder,
    ) -> Result<ReminderSummary> {
        if request.message.trim().is_empty() {
            return Err(Error::Validation(
                "reminder message must not be empty".to_owned(),
            ));
        }

        // Truncated to whole seconds so the countdown below agrees with
        // the parser's own second-precision reference.
        let now = {
            use chrono::Timelike;
            let now = Utc::now();
            now.with_nanosecond(0).unwrap_or(now)
        };
        let parsed = self.parser.parse(&request.time_text, now)?;
        // The parser can hand back "now" itself for degenerate inputs;
        // the trigger must be strictly in the future.
        if parsed.when <= now {
            return Err(Error::Validation(
                "that time has already passed".to_owned(),
            ));
        }

        let id = self
            .store
            .add(NewReminder {
                owner_id: request.owner_id.clone(),
                channel_id: request.channel_id,
                guild_id: request.guild_id,
                message: request.message,
                remind_at: parsed.when,
                recurrence: parsed.recurrence,
                pattern: Some(parsed.pattern),
                mention: request.mention,
            })
            .await?;

        let zone = self.parser.default_zone();
        info!(
            "created reminder {id} for {} at {} ({})",
            request.owner_id, parsed.when, zone
        );
        Ok(ReminderSummary {
            id,
            remind_at: parsed.when,
            local_time: timezone::from_utc(parsed.when, zone),
            zone,
            time_until: format_time_until(now, parsed.when),
            recurrence: parsed.recurrence,
        })
    }

    pub async fn list_owner_reminders(
        &self,
        owner_id: &str,
    ) -> Result<Vec<Reminder>> {
        self.store.list_for_owner(owner_id, OWNER_LIST_LIMIT).await
    }

    pub async fn delete_reminder(
        &self,
        id: i64,
        owner_id: &str,
    ) -> Result<bool> {
        self.store.soft_delete(id, owner_id).await
    }

    pub async fn list_all_active(&self) -> Result<Vec<Reminder>> {
        self.store.list_all_active().await
    }
}

/// Human-readable countdown for confirmations and listings.
pub fn format_time_until(
    now: DateTime<Utc>,
    target: DateTime<Utc>,
) -> String {
    if target <= now {
        return "now".to_owned();
    }
    let delta = target - now;
    let days = delta.num_days();
    let hours = delta.num_hours() % 24;
    let minutes = delta.num_minutes() % 60;

    fn plural(n: i64) -> &'static str {
        if n == 1 {
            ""
        } else {
            "s"
        }
    }

    if days > 0 {
        format!(
            "{days} day{}, {hours} hour{}",
            plural(days),
            plural(hours)
        )
    } else if hours > 0 {
        format!(
            "{hours} hour{}, {minutes} minute{}",
            plural(hours),
            plural(minutes)
        )
    } else {
        format!("{minutes} minute{}", plural(minutes))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::model::reminder::RecurrenceKind;

    async fn service() -> ReminderService {
        let store =
            Arc::new(ReminderStore::open(":memory:").await.unwrap());
        ReminderService::new(store, ZoneToken::UTC)
    }

    fn request(
        time_text: &str,
        message: &str,
    ) -> CreateReminder {
        CreateReminder {
            owner_id: "u1".to_owned(),
            channel_id: "c1".to_owned(),
            guild_id: None,
            time_text: time_text.to_owned(),
            message: message.to_owned(),
            mention: Mention::Everyone,
        }
    }

    #[tokio::test]
    async fn creates_a_one_shot_from_a_relative_expression() {
        let service = service().await;
        let before = Utc::now();
        let summary = service
            .create_reminder(request("in 2 hours", "check the oven"))
            .await
            .unwrap();

        assert!(summary.id > 0);
        assert!(summary.recurrence.is_none());
        let expected = before + Duration::hours(2);
        let drift = (summary.remind_at - expected).num_seconds().abs();
        assert!(drift <= 2, "drift was {drift}s");
        assert_eq!(summary.time_until, "2 hours, 0 minutes");

        let listed = service.list_owner_reminders("u1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].pattern.as_deref(), Some("in 2 hours"));
    }

    #[tokio::test]
    async fn creates_a_recurring_reminder() {
        let service = service().await;
        let summary = service
            .create_reminder(request("daily at 9am", "stand-up"))
            .await
            .unwrap();
        assert_eq!(
            summary.recurrence.map(|r| r.kind),
            Some(RecurrenceKind::Daily)
        );
    }

    #[tokio::test]
    async fn rejects_empty_messages() {
        let service = service().await;
        let result =
            service.create_reminder(request("in 1 hour", "  ")).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn unresolved_expressions_surface_as_parse_errors() {
        let service = service().await;
        let result = service
            .create_reminder(request("sometime soonish", "hi"))
            .await;
        match result {
            Err(Error::Parse(failure)) => {
                assert_eq!(failure.input, "sometime soonish");
            },
            other => panic!("expected parse failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_round_trip() {
        let service = service().await;
        let summary = service
            .create_reminder(request("in 1 hour", "hi"))
            .await
            .unwrap();
        assert!(service.delete_reminder(summary.id, "u1").await.unwrap());
        assert!(service.list_owner_reminders("u1").await.unwrap().is_empty());
        assert!(!service.delete_reminder(summary.id, "u1").await.unwrap());
    }

    #[test]
    fn countdown_formatting() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap();
        assert_eq!(format_time_until(now, now), "now");
        assert_eq!(
            format_time_until(now, now + Duration::minutes(5)),
            "5 minutes"
        );
        assert_eq!(
            format_time_until(
                now,
                now + Duration::hours(3) + Duration::minutes(1)
            ),
            "3 hours, 1 minute"
        );
        assert_eq!(
            format_time_until(
                now,
                now + Duration::days(2) + Duration::hours(1)
            ),
            "2 days, 1 hour"
        );
    }
}
