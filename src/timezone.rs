use std::process::Command;

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::debug;

/// Abbreviation vocabulary accepted in time expressions. Lowercase
/// canonical form, mapped 1:1 to an IANA zone.
const ZONES: &[(&str, Tz)] = &[
    ("utc", Tz::UTC),
    ("gmt", Tz::GMT),
    ("est", Tz::US__Eastern),
    ("cst", Tz::US__Central),
    ("mst", Tz::US__Mountain),
    ("pst", Tz::US__Pacific),
    ("ist", Tz::Asia__Kolkata),
    ("cet", Tz::CET),
    ("jst", Tz::Asia__Tokyo),
    ("aest", Tz::Australia__Sydney),
    ("bst", Tz::Europe__London),
];

/// Maps the zone names a host is likely configured with back to the
/// closest abbreviation, for default-zone detection.
const SYSTEM_ZONES: &[(&str, &str)] = &[
    ("UTC", "utc"),
    ("GMT", "utc"),
    ("Etc/UTC", "utc"),
    ("US/Eastern", "est"),
    ("America/New_York", "est"),
    ("US/Central", "cst"),
    ("America/Chicago", "cst"),
    ("US/Mountain", "mst"),
    ("America/Denver", "mst"),
    ("US/Pacific", "pst"),
    ("America/Los_Angeles", "pst"),
    ("Asia/Kolkata", "ist"),
    ("Asia/Calcutta", "ist"),
    ("CET", "cet"),
    ("Europe/Berlin", "cet"),
    ("Europe/Paris", "cet"),
    ("Asia/Tokyo", "jst"),
    ("Australia/Sydney", "aest"),
    ("Europe/London", "bst"),
];

/// A validated timezone abbreviation. Can only be constructed through
/// [`ZoneToken::resolve`] or the named constants, so a token always has a
/// zone behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneToken {
    abbr: &'static str,
    tz: Tz,
}

impl ZoneToken {
    pub const UTC: ZoneToken = ZoneToken { abbr: "utc", tz: Tz::UTC };
    pub const IST: ZoneToken =
        ZoneToken { abbr: "ist", tz: Tz::Asia__Kolkata };

    /// Case-insensitive lookup in the abbreviation table.
    pub fn resolve(token: &str) -> Option<ZoneToken> {
        let token = token.trim().to_ascii_lowercase();
        ZONES
            .iter()
            .find(|(abbr, _)| *abbr == token)
            .map(|(abbr, tz)| ZoneToken { abbr, tz: *tz })
    }

    pub fn abbr(&self) -> &'static str {
        self.abbr
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }
}

impl std::fmt::Display for ZoneToken {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(self.abbr)
    }
}

/// Queries the host for its configured zone and maps it to the closest
/// abbreviation. Best-effort: any failure along the way (binary missing,
/// odd output, zone outside the table) returns `fallback`.
pub fn detect_default(fallback: ZoneToken) -> ZoneToken {
    let Some(system_zone) = timedatectl_zone() else {
        debug!(
            fallback = fallback.abbr,
            "timezone probe failed, using fallback"
        );
        return fallback;
    };

    let mapped = SYSTEM_ZONES
        .iter()
        .find(|(name, _)| *name == system_zone)
        .and_then(|(_, abbr)| ZoneToken::resolve(abbr));
    match mapped {
        Some(token) => {
            debug!(zone = %system_zone, abbr = token.abbr, "detected system timezone");
            token
        },
        None => {
            debug!(
                zone = %system_zone,
                fallback = fallback.abbr,
                "system timezone not in abbreviation table, using fallback"
            );
            fallback
        },
    }
}

fn timedatectl_zone() -> Option<String> {
    let output = Command::new("timedatectl")
        .args(["show", "--property=Timezone"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8(output.stdout).ok()?;
    stdout
        .trim()
        .strip_prefix("Timezone=")
        .map(|zone| zone.to_owned())
}

/// Interprets a timezone-naive timestamp as wall-clock time in the
/// token's zone and converts it to UTC for storage.
pub fn to_utc(
    local: NaiveDateTime,
    zone: ZoneToken,
) -> DateTime<Utc> {
    match zone.tz().from_local_datetime(&local) {
        LocalResult::Single(instant) => instant.with_timezone(&Utc),
        // Fall-back transition: the wall clock occurs twice, take the
        // earlier instant.
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        // Spring-forward gap: the wall clock never occurs, take the same
        // offset one hour later.
        LocalResult::None => {
            let shifted = local + Duration::hours(1);
            match zone.tz().from_local_datetime(&shifted) {
                LocalResult::Single(instant)
                | LocalResult::Ambiguous(instant, _) => {
                    instant.with_timezone(&Utc)
                },
                LocalResult::None => Utc.from_utc_datetime(&local),
            }
        },
    }
}

/// Inverse of [`to_utc`]; display only.
pub fn from_utc(
    utc: DateTime<Utc>,
    zone: ZoneToken,
) -> NaiveDateTime {
    utc.with_timezone(&zone.tz()).naive_local()
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Timelike, Utc};

    use super::*;

    fn local(
        y: i32,
        mo: u32,
        d: u32,
        h: u32,
        mi: u32,
    ) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn resolve_is_case_insensitive() {
        assert_eq!(ZoneToken::resolve("IST"), ZoneToken::resolve("ist"));
        assert_eq!(ZoneToken::resolve(" Utc ").unwrap().abbr(), "utc");
    }

    #[test]
    fn resolve_rejects_unknown_tokens() {
        assert!(ZoneToken::resolve("pdt").is_none());
        assert!(ZoneToken::resolve("").is_none());
    }

    #[test]
    fn ist_round_trips() {
        let zone = ZoneToken::resolve("ist").unwrap();
        let wall = local(2024, 3, 10, 12, 0);
        assert_eq!(from_utc(to_utc(wall, zone), zone), wall);
    }

    #[test]
    fn eastern_offset_follows_daylight_saving() {
        let zone = ZoneToken::resolve("est").unwrap();
        // Winter: UTC-5.
        let winter = to_utc(local(2024, 1, 15, 9, 0), zone);
        assert_eq!(winter, Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap());
        // Summer: UTC-4.
        let summer = to_utc(local(2024, 7, 15, 9, 0), zone);
        assert_eq!(summer, Utc.with_ymd_and_hms(2024, 7, 15, 13, 0, 0).unwrap());
    }

    #[test]
    fn spring_forward_gap_falls_forward() {
        // 02:30 on 2024-03-10 does not exist in US/Eastern.
        let zone = ZoneToken::resolve("est").unwrap();
        let instant = to_utc(local(2024, 3, 10, 2, 30), zone);
        assert_eq!(from_utc(instant, zone).hour(), 3);
    }

    #[test]
    fn detect_default_always_yields_a_table_entry() {
        let token = detect_default(ZoneToken::IST);
        assert!(ZoneToken::resolve(token.abbr()).is_some());
    }
}
