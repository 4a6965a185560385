//! Expiry resolution for entitlements.
//!
//! Upstream records carry expiry information in two shapes: a direct
//! `expiry_date` string in mixed formats (with or without an offset, with or
//! without a time of day), or a free-text instruction snippet like
//! "Offer expires January 5th, 2024 by 11:59 PM PST". Either way the output
//! is a UTC RFC 3339 timestamp with millisecond precision, a bare date when
//! the source gave no time of day, or an empty string when no date can be
//! determined. Resolution never fails.
//!
//! Strings without an explicit offset are interpreted in a configurable
//! default zone (the storefront's own), and conversion to UTC goes through
//! the tz database so DST transitions are handled correctly: an ambiguous
//! wall time resolves to its first occurrence, a wall time skipped by a DST
//! gap is shifted forward an hour.

use std::sync::OnceLock;

use chrono::offset::LocalResult;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;

use crate::html;

/// Timezone phrases accepted in instruction text, checked in order by
/// substring match. Full names come before abbreviations.
const TZ_ALIASES: &[(&str, Tz)] = &[
    // names
    ("Pacific Time", chrono_tz::America::Los_Angeles),
    ("Pacific Standard Time", chrono_tz::America::Los_Angeles),
    ("Pacific Daylight Time", chrono_tz::America::Los_Angeles),
    ("Mountain Time", chrono_tz::America::Denver),
    ("Mountain Standard Time", chrono_tz::America::Denver),
    ("Mountain Daylight Time", chrono_tz::America::Denver),
    ("Central Time", chrono_tz::America::Chicago),
    ("Central Standard Time", chrono_tz::America::Chicago),
    ("Central Daylight Time", chrono_tz::America::Chicago),
    ("Eastern Time", chrono_tz::America::New_York),
    ("Eastern Standard Time", chrono_tz::America::New_York),
    ("Eastern Daylight Time", chrono_tz::America::New_York),
    // abbrevs
    ("PT", chrono_tz::America::Los_Angeles),
    ("PST", chrono_tz::America::Los_Angeles),
    ("PDT", chrono_tz::America::Los_Angeles),
    ("MT", chrono_tz::America::Denver),
    ("MST", chrono_tz::America::Denver),
    ("MDT", chrono_tz::America::Denver),
    ("CT", chrono_tz::America::Chicago),
    ("CST", chrono_tz::America::Chicago),
    ("CDT", chrono_tz::America::Chicago),
    ("ET", chrono_tz::America::New_York),
    ("EST", chrono_tz::America::New_York),
    ("EDT", chrono_tz::America::New_York),
];

fn offset_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[zZ]$|[+-]\d{2}:?\d{2}$").expect("static regex"))
}

fn text_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(January|February|March|April|May|June|July|August|September|October|November|December)\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})(?:\s+(?:by|at)\s+([^.;]+))?",
        )
        .expect("static regex")
    })
}

fn text_time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d{1,2})(?::(\d{2}))?(?::(\d{2}))?\s*(AM|PM)\s*(.*)").expect("static regex")
    })
}

fn month_number(name: &str) -> Option<u32> {
    let n = match name.to_lowercase().as_str() {
        "january" => 1,
        "february" => 2,
        "march" => 3,
        "april" => 4,
        "may" => 5,
        "june" => 6,
        "july" => 7,
        "august" => 8,
        "september" => 9,
        "october" => 10,
        "november" => 11,
        "december" => 12,
        _ => return None,
    };
    Some(n)
}

/// Resolves raw expiry fields into canonical UTC timestamps.
#[derive(Debug, Clone, Copy)]
pub struct ExpiryResolver {
    default_tz: Tz,
}

impl ExpiryResolver {
    /// Create a resolver interpreting offset-less times in `default_tz`.
    #[must_use]
    pub const fn new(default_tz: Tz) -> Self {
        Self { default_tz }
    }

    /// Resolve an entitlement's expiry from its direct field or instruction
    /// markup. Returns an empty string when no date can be determined.
    #[must_use]
    pub fn resolve(&self, expiry_date: Option<&str>, instructions_html: Option<&str>) -> String {
        if let Some(direct) = expiry_date.map(str::trim).filter(|s| !s.is_empty()) {
            return self.normalize_direct(direct);
        }

        let Some(markup) = instructions_html.map(str::trim).filter(|s| !s.is_empty()) else {
            return String::new();
        };
        self.parse_from_text(&html::strip_to_text(markup))
    }

    /// Normalize a direct expiry string.
    fn normalize_direct(&self, s: &str) -> String {
        // Already carries a UTC marker or explicit offset
        if offset_marker_re().is_match(s)
            && let Some(utc) = parse_with_offset(s)
        {
            return iso_millis(utc);
        }

        // Bare YYYY-MM-DD means end-of-day in the default zone
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or_default();
            if let Some(utc) = self.local_to_utc(NaiveDateTime::new(date, end_of_day)) {
                return iso_millis(utc);
            }
        }

        // Bare date-time without offset, interpreted in the default zone
        if let Some(naive) = parse_bare_datetime(s)
            && let Some(utc) = self.local_to_utc(naive)
        {
            return iso_millis(utc);
        }

        // Last resort: generic parsing, empty on failure
        parse_best_effort(s).map_or_else(String::new, iso_millis)
    }

    /// Search plain instruction text for `<Month> <Day>[suffix], <Year>
    /// [by|at <time> [timezone]]`.
    fn parse_from_text(&self, text: &str) -> String {
        let Some(caps) = text_date_re().captures(text) else {
            return String::new();
        };

        let month = caps
            .get(1)
            .and_then(|m| month_number(m.as_str()))
            .unwrap_or(1);
        let day = caps
            .get(2)
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .unwrap_or(1);
        let year = caps
            .get(3)
            .and_then(|m| m.as_str().parse::<i32>().ok())
            .unwrap_or(1970);
        let date_only = format!("{year:04}-{month:02}-{day:02}");

        // No time provided: return the date alone, precision is not invented
        let Some(tail) = caps.get(4).map(|m| m.as_str().trim()) else {
            return date_only;
        };
        let Some(time_caps) = text_time_re().captures(tail) else {
            return date_only;
        };

        let mut hour = time_caps
            .get(1)
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .unwrap_or(0);
        let minute = time_caps
            .get(2)
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .unwrap_or(0);
        let second = time_caps
            .get(3)
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .unwrap_or(0);
        let is_pm = time_caps
            .get(4)
            .is_some_and(|m| m.as_str().eq_ignore_ascii_case("pm"));

        if hour == 12 {
            hour = if is_pm { 12 } else { 0 };
        } else if is_pm {
            hour += 12;
        }

        let tz = self.pick_timezone(time_caps.get(5).map_or("", |m| m.as_str()));

        let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
            return String::new();
        };
        let Some(time) = NaiveTime::from_hms_opt(hour, minute, second) else {
            return String::new();
        };
        match local_to_utc_in(tz, NaiveDateTime::new(date, time)) {
            Some(utc) => iso_millis(utc),
            None => String::new(),
        }
    }

    /// Resolve a timezone phrase against the alias table, falling back to the
    /// default zone when absent or unrecognized.
    fn pick_timezone(&self, phrase: &str) -> Tz {
        let cleaned = phrase.replace(['(', ')'], " ");
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            return self.default_tz;
        }
        TZ_ALIASES
            .iter()
            .find(|(needle, _)| cleaned.contains(needle))
            .map_or(self.default_tz, |(_, tz)| *tz)
    }

    fn local_to_utc(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        local_to_utc_in(self.default_tz, naive)
    }
}

/// Map a wall-clock time in `tz` to the UTC instant it names.
///
/// Ambiguous times (fall-back hour) resolve to their first occurrence; times
/// inside a DST gap are shifted forward an hour to the first valid wall time.
fn local_to_utc_in(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    let local = match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(first, _) => first,
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()?,
    };
    Some(local.with_timezone(&Utc))
}

fn parse_with_offset(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z"))
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%z"))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_bare_datetime(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

fn parse_best_effort(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn iso_millis(utc: DateTime<Utc>) -> String {
    utc.to_rfc3339_opts(SecondsFormat::Millis, true)
}
