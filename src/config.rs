use std::time::Duration;

use tracing::warn;

use crate::timezone::{self, ZoneToken};

const DEFAULT_DB_PATH: &str = "reminders.db";
const DEFAULT_POLL_SECS: u64 = 60;

/// Process configuration, read once at startup. Every knob has a
/// default, so a bare environment works out of the box.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the libsql reminder store.
    pub database_path: String,
    /// Zone used when an expression carries no timezone token.
    pub default_timezone: ZoneToken,
    /// Scheduler tick period; bounds delivery latency.
    pub poll_interval: Duration,
}

impl Config {
    /// Loads configuration from the environment (and a `.env` file when
    /// present). `DEFAULT_TIMEZONE` accepts any abbreviation from the
    /// timezone table; when unset, the host zone is probed with an IST
    /// fallback.
    pub fn from_env() -> Self {
        drop(dotenvy::dotenv());

        let database_path = std::env::var("DATABASE_PATH")
            .unwrap_or_else(|_| DEFAULT_DB_PATH.to_owned());

        let default_timezone = match std::env::var("DEFAULT_TIMEZONE") {
            Ok(raw) => match ZoneToken::resolve(&raw) {
                Some(zone) => zone,
                None => {
                    warn!(
                        "DEFAULT_TIMEZONE=\"{raw}\" is not a known \
                         abbreviation, probing the host instead"
                    );
                    timezone::detect_default(ZoneToken::IST)
                },
            },
            Err(_) => timezone::detect_default(ZoneToken::IST),
        };

        let poll_interval = std::env::var("POLL_INTERVAL_SECS")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_POLL_SECS));

        Self { database_path, default_timezone, poll_interval }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_environment() {
        // Only asserts the invariants that hold regardless of the host
        // environment this test runs in.
        let config = Config::from_env();
        assert!(!config.database_path.is_empty());
        assert!(config.poll_interval >= Duration::from_secs(1));
        assert!(ZoneToken::resolve(config.default_timezone.abbr()).is_some());
    }
}
