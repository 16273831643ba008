//! Timestamp parsing and relative time rendering

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::IdfmError;

/// Source of the current instant
pub trait Clock: Send + Sync + fmt::Debug {
    /// The current instant
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at a given instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Parse a timestamp as sent by the realtime service
///
/// Accepts RFC 3339 (`2026-03-01T08:30:00.000Z`), naive date-times taken as
/// UTC and bare dates at midnight UTC.
#[must_use]
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Whether a string parses as a calendar date/time
#[must_use]
pub fn is_valid_timestamp(value: &str) -> bool {
    parse_timestamp(value).is_some()
}

/// Whole minutes from `now` to `target`, rounding half away from zero
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn minutes_until(target: DateTime<Utc>, now: DateTime<Utc>) -> Result<i64, IdfmError> {
    let millis = (target - now).num_milliseconds();
    let minutes = (millis as f64 / 60_000.0).round();
    if !minutes.is_finite() {
        return Err(IdfmError::Formatting(format!(
            "cannot compute minutes between {now} and {target}"
        )));
    }
    Ok(minutes as i64)
}

/// Short relative phrases in minute units
struct MinutePhrases {
    future: fn(i64) -> String,
    past: fn(i64) -> String,
}

fn phrases_for(locale: &str) -> Result<MinutePhrases, IdfmError> {
    let language = locale
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_lowercase();

    if language.is_empty() || !language.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(IdfmError::Formatting(format!("invalid locale: {locale:?}")));
    }

    let phrases = match language.as_str() {
        "fr" => MinutePhrases {
            future: |n| format!("dans {n} min"),
            past: |n| format!("il y a {n} min"),
        },
        "de" => MinutePhrases {
            future: |n| format!("in {n} Min."),
            past: |n| format!("vor {n} Min."),
        },
        "es" => MinutePhrases {
            future: |n| format!("dentro de {n} min"),
            past: |n| format!("hace {n} min"),
        },
        "it" => MinutePhrases {
            future: |n| format!("tra {n} min"),
            past: |n| format!("{n} min fa"),
        },
        _ => MinutePhrases {
            future: |n| format!("in {n} min."),
            past: |n| format!("{n} min. ago"),
        },
    };

    Ok(phrases)
}

/// Render `target` relative to `now` ("dans 4 min", "4 min. ago")
///
/// Unknown languages fall back to English phrasing.
///
/// # Errors
///
/// Returns [`IdfmError::Formatting`] for a malformed locale tag or an
/// uncomputable difference.
pub fn format_relative(
    target: DateTime<Utc>,
    now: DateTime<Utc>,
    locale: &str,
) -> Result<String, IdfmError> {
    let phrases = phrases_for(locale)?;
    let minutes = minutes_until(target, now)?;

    if minutes < 0 {
        Ok((phrases.past)(minutes.saturating_neg()))
    } else {
        Ok((phrases.future)(minutes))
    }
}

/// Relative phrase for a timestamp string, or the string itself if it is
/// not a timestamp (e.g. a departure status such as "cancelled")
///
/// # Errors
///
/// Returns [`IdfmError::Formatting`] when a valid timestamp cannot be rendered.
pub fn to_relative_or_raw(
    value: &str,
    now: DateTime<Utc>,
    locale: &str,
) -> Result<String, IdfmError> {
    match parse_timestamp(value) {
        Some(target) => format_relative(target, now, locale),
        None => Ok(value.to_string()),
    }
}
