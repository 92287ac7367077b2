//! Publication-date normalization.
//!
//! Sources hand over timestamps, ISO strings, `DD-MM-YYYY` dates, Spanish or English
//! month names and relative phrases ("hace 2 días", "3 hours ago"). Everything resolves to
//! one UTC instant. Values that cannot be parsed fall back to the run instant and are marked
//! as estimated so downstream stages can tell a fresh posting from a guessed one.

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::Bucket;

/// Epoch values above this are read as milliseconds rather than seconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Upper bound on "N units ago" so absurd inputs cannot overflow the duration math.
const MAX_RELATIVE_AMOUNT: i64 = 10_000;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M",
];

// Day-first before month-first: the Spanish-language sources write DD/MM.
const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%Y/%m/%d", "%d.%m.%Y"];

static NOW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:now|just now|just posted|today|posted today|hoy|ahora|reci[eé]n publicado|publicado hoy)$",
    )
    .unwrap()
});
static YESTERDAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:yesterday|posted yesterday|ayer|publicado ayer)$").unwrap());
static AGO_EN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:posted\s+|active\s+)?(\d+|an?|one)\+?\s*(minutes?|mins?|hours?|hrs?|h|days?|d|weeks?|w|months?)\s+ago$",
    )
    .unwrap()
});
static AGO_ES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:publicado\s+)?hace\s+(?:m[aá]s\s+de\s+)?(\d+|un|una|uno)\+?\s*(minutos?|min|horas?|h|d[ií]as?|semanas?|mes(?:es)?)$",
    )
    .unwrap()
});
static DAY_MONTH_YEAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})\s+(?:de\s+)?([a-záéíóúñ]+)\.?,?\s+(?:de\s+|del\s+)?(\d{4})$").unwrap()
});
static MONTH_DAY_YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-z]+)\.?\s+(\d{1,2}),?\s+(\d{4})$").unwrap());

/// What to do with a posting whose publication date cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnparseableDatePolicy {
    /// Use the run instant and mark the date as estimated.
    #[default]
    AssumeNow,
    /// Discard the posting before any filtering.
    Drop,
}

impl FromStr for UnparseableDatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "now" | "assume_now" => Ok(UnparseableDatePolicy::AssumeNow),
            "drop" => Ok(UnparseableDatePolicy::Drop),
            other => Err(format!("unknown unparseable-date policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedDate {
    pub instant: DateTime<Utc>,
    pub estimated: bool,
}

/// Resolves heterogeneous date values in a fixed local offset.
#[derive(Debug, Clone, Copy)]
pub struct DateNormalizer {
    offset: FixedOffset,
}

impl DateNormalizer {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn from_utc_offset_hours(hours: i32) -> Option<Self> {
        FixedOffset::east_opt(hours.checked_mul(3600)?).map(Self::new)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Resolve a raw value, falling back to `now` (estimated) when it cannot be parsed.
    pub fn normalize(&self, value: Option<&JsonValue>, now: DateTime<Utc>) -> ParsedDate {
        match value.and_then(|v| self.parse(v, now)) {
            Some(instant) => ParsedDate {
                instant,
                estimated: false,
            },
            None => ParsedDate {
                instant: now,
                estimated: true,
            },
        }
    }

    pub fn parse(&self, value: &JsonValue, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match value {
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    from_epoch(i)
                } else {
                    n.as_f64().and_then(from_epoch_f64)
                }
            }
            JsonValue::String(s) => self.parse_str(s, now),
            _ => None,
        }
    }

    pub fn parse_str(&self, input: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return None;
        }

        if trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return trimmed.parse::<i64>().ok().and_then(from_epoch);
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%z") {
            return Some(dt.with_timezone(&Utc));
        }

        for format in NAIVE_DATETIME_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
                return self.local_to_utc(naive);
            }
        }
        for format in NAIVE_DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
                return self.date_at_current_time(date, now);
            }
        }

        let lower = trimmed.to_lowercase();
        self.parse_relative(&lower, now)
            .or_else(|| self.parse_textual(&lower, now))
    }

    fn parse_relative(&self, lower: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if NOW_RE.is_match(lower) {
            return Some(now);
        }
        if YESTERDAY_RE.is_match(lower) {
            return Some(now - Duration::days(1));
        }
        let caps = AGO_EN_RE
            .captures(lower)
            .or_else(|| AGO_ES_RE.captures(lower))?;
        let amount = match &caps[1] {
            "a" | "an" | "one" | "un" | "una" | "uno" => 1,
            digits => digits.parse::<i64>().ok()?.min(MAX_RELATIVE_AMOUNT),
        };
        let unit = &caps[2];
        let span = if unit.starts_with("min") {
            Duration::minutes(amount)
        } else if unit.starts_with('h') {
            Duration::hours(amount)
        } else if unit.starts_with('d') {
            Duration::days(amount)
        } else if unit.starts_with('w') || unit.starts_with("sem") {
            Duration::weeks(amount)
        } else {
            Duration::days(30 * amount)
        };
        Some(now - span)
    }

    fn parse_textual(&self, lower: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let (day, month, year) = if let Some(caps) = DAY_MONTH_YEAR_RE.captures(lower) {
            (
                caps[1].parse::<u32>().ok()?,
                month_from_name(&caps[2])?,
                caps[3].parse::<i32>().ok()?,
            )
        } else if let Some(caps) = MONTH_DAY_YEAR_RE.captures(lower) {
            (
                caps[2].parse::<u32>().ok()?,
                month_from_name(&caps[1])?,
                caps[3].parse::<i32>().ok()?,
            )
        } else {
            return None;
        };
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        self.date_at_current_time(date, now)
    }

    fn local_to_utc(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        self.offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Date-only values carry the run's local time of day, never later than `now`.
    fn date_at_current_time(&self, date: NaiveDate, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let time: NaiveTime = now.with_timezone(&self.offset).time();
        let resolved = self.local_to_utc(date.and_time(time))?;
        Some(resolved.min(now))
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    /// Accepted postings published on the run's local day go to the current bucket.
    pub fn bucket(&self, published_at: DateTime<Utc>, run_time: DateTime<Utc>) -> Bucket {
        if self.local_date(published_at) == self.local_date(run_time) {
            Bucket::Current
        } else {
            Bucket::Previous
        }
    }
}

/// A window reaching past the representable range makes nothing stale.
pub fn is_older_than(published_at: DateTime<Utc>, max_age: Duration, now: DateTime<Utc>) -> bool {
    now.checked_sub_signed(max_age)
        .is_some_and(|cutoff| published_at < cutoff)
}

fn from_epoch(value: i64) -> Option<DateTime<Utc>> {
    if value.abs() > EPOCH_MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(value)
    } else {
        DateTime::from_timestamp(value, 0)
    }
}

fn from_epoch_f64(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }
    if value.abs() > EPOCH_MILLIS_THRESHOLD as f64 {
        return DateTime::from_timestamp_millis(value as i64);
    }
    let secs = value.trunc() as i64;
    let nanos = ((value - value.trunc()) * 1e9).round().clamp(0.0, 999_999_999.0) as u32;
    DateTime::from_timestamp(secs, nanos)
}

fn month_from_name(name: &str) -> Option<u32> {
    let month = match name {
        "enero" | "ene" | "january" | "jan" => 1,
        "febrero" | "feb" | "february" => 2,
        "marzo" | "mar" | "march" => 3,
        "abril" | "abr" | "april" | "apr" => 4,
        "mayo" | "may" => 5,
        "junio" | "jun" | "june" => 6,
        "julio" | "jul" | "july" => 7,
        "agosto" | "ago" | "august" | "aug" => 8,
        "septiembre" | "setiembre" | "sep" | "sept" | "set" | "september" => 9,
        "octubre" | "oct" | "october" => 10,
        "noviembre" | "nov" | "november" => 11,
        "diciembre" | "dic" | "december" | "dec" => 12,
        _ => return None,
    };
    Some(month)
}
