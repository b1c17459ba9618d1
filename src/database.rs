use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{de::from_row, params, Builder, Connection};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::model::reminder::{
    Mention, NewReminder, Recurrence, RecurrenceKind, Reminder,
};

/// Base schema. Matches the layout the original deployments wrote, so an
/// existing reminder file opens as-is.
const INIT_SQL: &str = r#"CREATE TABLE IF NOT EXISTS reminders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    channel_id TEXT NOT NULL,
    guild_id TEXT,
    message TEXT NOT NULL,
    reminder_time TEXT NOT NULL,
    created_at TEXT NOT NULL,
    is_active INTEGER DEFAULT 1,
    is_sent INTEGER DEFAULT 0,
    is_recurring INTEGER DEFAULT 0,
    recurrence_type TEXT DEFAULT NULL,
    recurrence_interval INTEGER DEFAULT NULL,
    original_time_pattern TEXT DEFAULT NULL,
    mention TEXT DEFAULT 'everyone'
)"#;

/// Additive upgrades for stores created before these columns existed.
/// Each step fails harmlessly once the column is present.
const UPGRADE_SQL: &[&str] = &[
    "ALTER TABLE reminders ADD COLUMN is_recurring INTEGER DEFAULT 0",
    "ALTER TABLE reminders ADD COLUMN recurrence_type TEXT DEFAULT NULL",
    "ALTER TABLE reminders ADD COLUMN recurrence_interval INTEGER DEFAULT NULL",
    "ALTER TABLE reminders ADD COLUMN original_time_pattern TEXT DEFAULT NULL",
    "ALTER TABLE reminders ADD COLUMN mention TEXT DEFAULT 'everyone'",
];

/// Raw row image; conversion into [`Reminder`] is total, defaulting any
/// unknown enum text so old or hand-edited rows still load.
#[derive(Deserialize)]
struct ReminderRow {
    id: i64,
    user_id: String,
    channel_id: String,
    guild_id: Option<String>,
    message: String,
    reminder_time: DateTime<Utc>,
    created_at: DateTime<Utc>,
    is_active: i64,
    is_sent: i64,
    is_recurring: i64,
    recurrence_type: Option<String>,
    recurrence_interval: Option<i64>,
    original_time_pattern: Option<String>,
    mention: Option<String>,
}

impl From<ReminderRow> for Reminder {
    fn from(row: ReminderRow) -> Self {
        let recurrence = if row.is_recurring != 0 {
            let kind = row
                .recurrence_type
                .as_deref()
                .map(RecurrenceKind::from_str_lossy)
                .unwrap_or(RecurrenceKind::Daily);
            let interval = row
                .recurrence_interval
                .and_then(|i| u32::try_from(i).ok())
                .filter(|i| *i >= 1)
                .unwrap_or_else(|| kind.default_interval());
            Some(Recurrence { kind, interval })
        } else {
            None
        };
        Reminder {
            id: row.id,
            owner_id: row.user_id,
            channel_id: row.channel_id,
            guild_id: row.guild_id,
            message: row.message,
            remind_at: row.reminder_time,
            created_at: row.created_at,
            active: row.is_active != 0,
            sent: row.is_sent != 0,
            recurrence,
            pattern: row.original_time_pattern,
            mention: row
                .mention
                .as_deref()
                .map(Mention::from_str_lossy)
                .unwrap_or_default(),
        }
    }
}

fn fmt_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Durable reminder storage over a local libsql file. One instance owns
/// the connection; callers share it behind an Arc. Single-record updates
/// are single statements, so a concurrent due-set read never observes a
/// reminder mid-update.
pub struct ReminderStore {
    conn: Connection,
}

impl ReminderStore {
    /// Opens (creating if needed) the store at `path` and applies schema
    /// upgrades. A file that fails basic initialization is treated as
    /// corrupt: it is discarded and recreated empty instead of failing
    /// every subsequent operation.
    pub async fn open(path: &str) -> Result<Self> {
        match Self::try_open(path).await {
            Ok(store) => Ok(store),
            Err(why) => {
                warn!(
                    "reminder store at {path} failed to open ({why}); \
                     discarding and reinitializing"
                );
                if path != ":memory:" && Path::new(path).exists() {
                    std::fs::remove_file(path)?;
                }
                let store = Self::try_open(path).await?;
                info!("reminder store at {path} reinitialized empty");
                Ok(store)
            },
        }
    }

    async fn try_open(path: &str) -> Result<Self> {
        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;
        migrate(&conn).await?;
        Ok(Self { conn })
    }

    /// Persists a new reminder and returns its store-assigned id. On any
    /// storage error the caller must assume nothing was persisted.
    pub async fn add(
        &self,
        reminder: NewReminder,
    ) -> Result<i64> {
        if reminder.message.trim().is_empty() {
            return Err(Error::Validation(
                "reminder message must not be empty".to_owned(),
            ));
        }
        let (is_recurring, kind, interval) = match reminder.recurrence {
            Some(rec) => {
                (1i64, Some(rec.kind.as_str()), Some(i64::from(rec.interval)))
            },
            None => (0, None, None),
        };
        self.conn
            .execute(
                r#"INSERT INTO reminders (
        user_id, channel_id, guild_id, message, reminder_time, created_at,
        is_recurring, recurrence_type, recurrence_interval,
        original_time_pattern, mention
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
                params![
                    reminder.owner_id,
                    reminder.channel_id,
                    reminder.guild_id,
                    reminder.message,
                    fmt_instant(reminder.remind_at),
                    fmt_instant(Utc::now()),
                    is_recurring,
                    kind,
                    interval,
                    reminder.pattern,
                    reminder.mention.as_str(),
                ],
            )
            .await?;
        let id = self.conn.last_insert_rowid();
        info!("added reminder {id}");
        Ok(id)
    }

    /// Active, unsent reminders due at or before `now`, earliest first,
    /// ties broken by id for determinism.
    pub async fn due_before(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reminder>> {
        self.fetch(
            r#"SELECT * FROM reminders
    WHERE is_active = 1 AND is_sent = 0 AND reminder_time <= ?
    ORDER BY reminder_time ASC, id ASC"#,
            params![fmt_instant(now)],
        )
        .await
    }

    /// Idempotent; a no-op for inactive or already-sent reminders.
    pub async fn mark_sent(
        &self,
        id: i64,
    ) -> Result {
        self.conn
            .execute(
                "UPDATE reminders SET is_sent = 1 WHERE id = ? AND is_active = 1",
                params![id],
            )
            .await?;
        Ok(())
    }

    /// Advances a recurring reminder and re-arms it in one statement, so
    /// no reader can see the new trigger with the sent flag still set.
    pub async fn reschedule(
        &self,
        id: i64,
        next: DateTime<Utc>,
    ) -> Result {
        self.conn
            .execute(
                r#"UPDATE reminders SET reminder_time = ?, is_sent = 0
    WHERE id = ? AND is_active = 1"#,
                params![fmt_instant(next), id],
            )
            .await?;
        Ok(())
    }

    pub async fn list_for_owner(
        &self,
        owner_id: &str,
        limit: u32,
    ) -> Result<Vec<Reminder>> {
        self.fetch(
            r#"SELECT * FROM reminders
    WHERE user_id = ? AND is_active = 1 AND is_sent = 0
    ORDER BY reminder_time ASC, id ASC
    LIMIT ?"#,
            params![owner_id, i64::from(limit)],
        )
        .await
    }

    /// Every active, unsent reminder system-wide; privileged read.
    pub async fn list_all_active(&self) -> Result<Vec<Reminder>> {
        self.fetch(
            r#"SELECT * FROM reminders
    WHERE is_active = 1 AND is_sent = 0
    ORDER BY reminder_time ASC, id ASC"#,
            (),
        )
        .await
    }

    /// Soft delete: flips `active` off, keeping the row for audit. Only
    /// the owner's own active reminders are affected; returns whether a
    /// row changed.
    pub async fn soft_delete(
        &self,
        id: i64,
        owner_id: &str,
    ) -> Result<bool> {
        let affected = self
            .conn
            .execute(
                r#"UPDATE reminders SET is_active = 0
    WHERE id = ? AND user_id = ? AND is_active = 1"#,
                params![id, owner_id],
            )
            .await?;
        Ok(affected > 0)
    }

    async fn fetch(
        &self,
        sql: &str,
        args: impl libsql::params::IntoParams,
    ) -> Result<Vec<Reminder>> {
        let mut rows = self.conn.query(sql, args).await?;
        let mut out = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            out.push(from_row::<ReminderRow>(&row)?.into());
        }
        Ok(out)
    }
}

async fn migrate(conn: &Connection) -> Result {
    conn.execute(INIT_SQL, ()).await?;
    for ddl in UPGRADE_SQL {
        if let Err(why) = conn.execute(ddl, ()).await {
            // Column already present on stores created at this version.
            debug!("skipping schema upgrade step: {why}");
        }
    }
    Ok(())
}
