use chrono::{
    DateTime, Datelike, Duration, NaiveDateTime, NaiveTime, Timelike, Utc,
};
use lazy_static::lazy_static;
use regex::Regex;

use crate::model::reminder::{Recurrence, RecurrenceKind};
use crate::timezone::{self, ZoneToken};

/// Help text front-ends show when an expression cannot be resolved.
pub const SUPPORTED_PATTERNS: &str = "\
Simple times:
  5 minutes | 2 hours | 1 day | in 30 minutes
  today at 8:50 pm | today at 20:30
  tomorrow 3pm | tomorrow at 15:30
  2024-12-25 15:30 | 12/25/2024 15:30 | Dec 25 3:30 pm | 15:30
Recurring:
  daily at 9am | daily at 21:30
  every 2 days at 8pm | alternate days at 10am
  weekly at 15:30 | every week at 9am
Timezones: UTC, GMT, EST, CST, MST, PST, IST, CET, JST, AEST, BST";

lazy_static! {
    static ref TZ_RE: Regex = Regex::new(
        r"\b(utc|gmt|est|cst|mst|pst|ist|cet|jst|aest|bst)\b"
    )
    .expect("timezone regex");
    static ref DAILY_RE: Regex = Regex::new(
        r"^daily\s+at\s+([0-9]{1,2}):?([0-9]{2})?\s*(am|pm)?"
    )
    .expect("daily regex");
    static ref EVERY_DAYS_RE: Regex = Regex::new(
        r"^(?:every\s+(\d+)\s+days?|alternate\s+days?)\s+at\s+([0-9]{1,2}):?([0-9]{2})?\s*(am|pm)?"
    )
    .expect("every-days regex");
    static ref WEEKLY_RE: Regex = Regex::new(
        r"^(?:weekly|every\s+week)\s+at\s+([0-9]{1,2}):?([0-9]{2})?\s*(am|pm)?"
    )
    .expect("weekly regex");
    static ref TODAY_RE: Regex = Regex::new(
        r"^today\s+at\s+([0-9]{1,2}):?([0-9]{2})?\s*(am|pm)?"
    )
    .expect("today regex");
    static ref RELATIVE_RE: Regex = Regex::new(
        r"^(?:in\s+)?(\d+)\s*(minute|min|hour|hr|day|week|month)s?"
    )
    .expect("relative regex");
    static ref TOMORROW_TIME_RE: Regex = Regex::new(
        r"(?:at\s+)?([0-9]{1,2}):?([0-9]{2})?\s*(am|pm)?"
    )
    .expect("tomorrow-time regex");
}

/// Full datetimes tried in order for the absolute branch.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %I:%M %p",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M %p",
];

/// Month-name formats with no year; the current year is assumed. Parsed
/// with a year prefix because chrono cannot build a date without one.
const YEARLESS_FORMATS: &[&str] = &["%Y %B %d %H:%M", "%Y %B %d %I:%M %p"];

/// Bare clock times; today's date is assumed, rolling to tomorrow once
/// the time has passed.
const TIME_FORMATS: &[&str] = &["%H:%M", "%I:%M %p"];

/// The ephemeral result of resolving a time expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTime {
    /// The first (or only) trigger instant, in UTC.
    pub when: DateTime<Utc>,
    pub recurrence: Option<Recurrence>,
    /// Echo of the original input, for audit and redisplay.
    pub pattern: String,
}

/// Terminal, non-retryable failure to resolve an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub input: String,
}

impl std::fmt::Display for ParseFailure {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(
            f,
            "could not resolve \"{}\" to a future time (unrecognized \
             format, or the time has already passed today)",
            self.input
        )
    }
}

impl std::error::Error for ParseFailure {}

/// Outcome of a single grammar pattern.
enum MatchResult {
    /// The pattern does not apply; try the next one.
    Miss,
    /// The pattern applies; wall-clock instant in the effective zone.
    Hit(NaiveDateTime, Option<Recurrence>),
    /// The pattern applies but the expression cannot resolve, e.g.
    /// "today at" a time that has passed. No later pattern is tried.
    Dead,
}

type Matcher = fn(&str, NaiveDateTime) -> MatchResult;

/// Precedence is deliberate: recurrence first, then date-fixed "today",
/// relative durations, "tomorrow", and finally fixed formats.
const MATCHERS: &[Matcher] = &[
    match_daily,
    match_every_days,
    match_weekly,
    match_today_at,
    match_relative,
    match_tomorrow,
    match_absolute,
];

/// Resolves free-text time expressions against an injected reference
/// instant. Stateless apart from the default zone, so one parser serves
/// every request.
#[derive(Debug, Clone, Copy)]
pub struct TimeParser {
    default_zone: ZoneToken,
}

impl TimeParser {
    pub fn new(default_zone: ZoneToken) -> Self {
        Self { default_zone }
    }

    pub fn default_zone(&self) -> ZoneToken {
        self.default_zone
    }

    /// Resolves `text` relative to `now_utc`. The winning pattern's
    /// instant is interpreted in the effective zone (explicit token, or
    /// the parser default) and returned in UTC.
    pub fn parse(
        &self,
        text: &str,
        now_utc: DateTime<Utc>,
    ) -> Result<ParsedTime, ParseFailure> {
        let original = text.trim().to_owned();
        let lowered = original.to_lowercase();

        let (stripped, zone) = extract_zone(&lowered);
        let zone = zone.unwrap_or(self.default_zone);

        // All "has this passed" comparisons happen on the wall clock of
        // the effective zone.
        let now_utc = now_utc.with_nanosecond(0).unwrap_or(now_utc);
        let now = timezone::from_utc(now_utc, zone);

        for matcher in MATCHERS {
            match matcher(&stripped, now) {
                MatchResult::Miss => continue,
                MatchResult::Hit(local, recurrence) => {
                    return Ok(ParsedTime {
                        when: timezone::to_utc(local, zone),
                        recurrence,
                        pattern: original,
                    });
                },
                MatchResult::Dead => break,
            }
        }
        Err(ParseFailure { input: original })
    }
}

/// Pulls a timezone abbreviation out of the expression, if present, and
/// removes it. Expects lowercased input.
fn extract_zone(text: &str) -> (String, Option<ZoneToken>) {
    let Some(found) = TZ_RE.find(text) else {
        return (text.to_owned(), None);
    };
    let zone = ZoneToken::resolve(found.as_str());
    let stripped = TZ_RE.replace_all(text, "").trim().to_owned();
    (stripped, zone)
}

/// 12-hour normalization: "pm" adds 12 unless the hour is 12, "12am" is
/// midnight. Out-of-range fields yield None.
fn clock_time(
    hour: &str,
    minute: Option<&str>,
    period: Option<&str>,
) -> Option<NaiveTime> {
    let mut hour: u32 = hour.parse().ok()?;
    let minute: u32 = match minute {
        Some(m) => m.parse().ok()?,
        None => 0,
    };
    match period {
        Some("pm") if hour != 12 => hour += 12,
        Some("am") if hour == 12 => hour = 0,
        _ => {},
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn captured_clock_time(
    caps: &regex::Captures<'_>,
    first_group: usize,
) -> Option<NaiveTime> {
    clock_time(
        caps.get(first_group)?.as_str(),
        caps.get(first_group + 1).map(|m| m.as_str()),
        caps.get(first_group + 2).map(|m| m.as_str()),
    )
}

fn match_daily(
    text: &str,
    now: NaiveDateTime,
) -> MatchResult {
    let Some(caps) = DAILY_RE.captures(text) else {
        return MatchResult::Miss;
    };
    let Some(time) = captured_clock_time(&caps, 1) else {
        return MatchResult::Miss;
    };
    let mut target = now.date().and_time(time);
    if target <= now {
        target += Duration::days(1);
    }
    MatchResult::Hit(
        target,
        Some(Recurrence { kind: RecurrenceKind::Daily, interval: 1 }),
    )
}

fn match_every_days(
    text: &str,
    now: NaiveDateTime,
) -> MatchResult {
    let Some(caps) = EVERY_DAYS_RE.captures(text) else {
        return MatchResult::Miss;
    };
    // "alternate days" carries no numeric group and means every 2 days.
    let interval: u32 = match caps.get(1) {
        Some(n) => match n.as_str().parse() {
            Ok(n) if n >= 1 => n,
            _ => return MatchResult::Miss,
        },
        None => 2,
    };
    let Some(time) = captured_clock_time(&caps, 2) else {
        return MatchResult::Miss;
    };
    let mut target = now.date().and_time(time);
    if target <= now {
        target += Duration::days(i64::from(interval));
    }
    MatchResult::Hit(
        target,
        Some(Recurrence { kind: RecurrenceKind::Days, interval }),
    )
}

fn match_weekly(
    text: &str,
    now: NaiveDateTime,
) -> MatchResult {
    let Some(caps) = WEEKLY_RE.captures(text) else {
        return MatchResult::Miss;
    };
    let Some(time) = captured_clock_time(&caps, 1) else {
        return MatchResult::Miss;
    };
    // Weekly means "this clock time, next week cycle": a full 7 days out
    // even when the time has not passed today.
    let target = now.date().and_time(time) + Duration::days(7);
    MatchResult::Hit(
        target,
        Some(Recurrence { kind: RecurrenceKind::Weekly, interval: 7 }),
    )
}

fn match_today_at(
    text: &str,
    now: NaiveDateTime,
) -> MatchResult {
    let Some(caps) = TODAY_RE.captures(text) else {
        return MatchResult::Miss;
    };
    let Some(time) = captured_clock_time(&caps, 1) else {
        return MatchResult::Miss;
    };
    let target = now.date().and_time(time);
    // Date-fixed: a "today at" time that has passed never rolls over.
    if target <= now {
        return MatchResult::Dead;
    }
    MatchResult::Hit(target, None)
}

fn match_relative(
    text: &str,
    now: NaiveDateTime,
) -> MatchResult {
    let Some(caps) = RELATIVE_RE.captures(text) else {
        return MatchResult::Miss;
    };
    let Ok(amount) = caps[1].parse::<i64>() else {
        return MatchResult::Miss;
    };
    let delta = match &caps[2] {
        "minute" | "min" => Duration::minutes(amount),
        "hour" | "hr" => Duration::hours(amount),
        "day" => Duration::days(amount),
        "week" => Duration::weeks(amount),
        // Months are a fixed 30-day approximation, calendar lengths are
        // not consulted.
        "month" => Duration::days(amount * 30),
        _ => return MatchResult::Miss,
    };
    MatchResult::Hit(now + delta, None)
}

fn match_tomorrow(
    text: &str,
    now: NaiveDateTime,
) -> MatchResult {
    if !text.contains("tomorrow") {
        return MatchResult::Miss;
    }
    let tomorrow = now + Duration::days(1);
    let time = TOMORROW_TIME_RE
        .captures(text)
        .and_then(|caps| captured_clock_time(&caps, 1));
    match time {
        Some(time) => MatchResult::Hit(tomorrow.date().and_time(time), None),
        // No time of day given: same clock time as now, tomorrow.
        None => MatchResult::Hit(tomorrow, None),
    }
}

fn match_absolute(
    text: &str,
    now: NaiveDateTime,
) -> MatchResult {
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return MatchResult::Hit(parsed, None);
        }
    }

    let with_year = format!("{} {}", now.year(), text);
    for format in YEARLESS_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(&with_year, format)
        {
            return MatchResult::Hit(parsed, None);
        }
    }

    for format in TIME_FORMATS {
        if let Ok(time) = NaiveTime::parse_from_str(text, format) {
            let mut target = now
                .date()
                .and_time(time.with_second(0).unwrap_or(time));
            if target <= now {
                target += Duration::days(1);
            }
            return MatchResult::Hit(target, None);
        }
    }

    MatchResult::Miss
}
