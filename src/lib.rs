//! Natural-language reminder core: parses free-text time expressions
//! ("daily at 9am IST", "in 30 minutes", "tomorrow 3pm EST") into
//! absolute UTC instants, persists the resulting reminders, and drives
//! their delivery through a periodic scheduler that re-arms recurring
//! ones.
//!
//! Message rendering and platform dispatch live outside this crate; the
//! [`scheduler::Deliver`] trait is the only contact point with the
//! front-end, and [`service::ReminderService`] is the inbound command
//! boundary.
//!
//! Exactly one [`scheduler::Scheduler`] may run per store file. There is
//! no cross-process coordination; a second instance would deliver every
//! due reminder twice.

pub mod config;
pub mod database;
pub mod error;
pub mod model;
pub mod parser;
pub mod recurrence;
pub mod scheduler;
pub mod service;
pub mod timezone;

pub use config::Config;
pub use database::ReminderStore;
pub use error::{DeliveryError, Error, Result};
pub use model::reminder::{
    Mention, NewReminder, Recurrence, RecurrenceKind, Reminder,
};
pub use parser::{ParseFailure, ParsedTime, TimeParser, SUPPORTED_PATTERNS};
pub use scheduler::{Deliver, Scheduler};
pub use service::{CreateReminder, ReminderService, ReminderSummary};
pub use timezone::ZoneToken;
