// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Value typing for task parameters and schedules.
//!
//! A qualifier checks that a value meets certain criteria, converts it to a
//! canonical form, and renders it as a platform-independent ASCII string.
//! Task names are built from those renderings (see [`format_name`]), which is
//! what makes names stable across hosts and runs: the same parameters always
//! produce byte-identical names.
//!
//! Durations follow a restricted ISO 8601 form `P[nW][nD][T[nH][nM][nS]]` —
//! weeks are allowed, years and months are not, negatives are rejected. The
//! canonical rendering is always in seconds (`PT90S`), so equal durations
//! written differently still compare equal by name.

use chrono::{TimeZone, Timelike, Utc};
use std::time::Duration;

use crate::errors::{Error, Result};

fn unqualified(value: impl std::fmt::Display, reason: &str) -> Error {
    Error::ValueQualification {
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// A value check/canonicalize/stringify step.
pub trait Qualifier {
    type Value;

    /// Qualify the value: validate it and produce its canonical form along
    /// with a representation that distinguishes different values.
    fn qualify(&self, value: Self::Value) -> Result<(Self::Value, String)>;
}

/// Booleans, rendered as `true`/`false`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Boolean;

impl Qualifier for Boolean {
    type Value = bool;

    fn qualify(&self, value: bool) -> Result<(bool, String)> {
        Ok((value, value.to_string()))
    }
}

/// Integers, rendered in decimal.
#[derive(Debug, Default, Clone, Copy)]
pub struct Integer;

impl Qualifier for Integer {
    type Value = i64;

    fn qualify(&self, value: i64) -> Result<(i64, String)> {
        Ok((value, format!("{value}")))
    }
}

/// ASCII-only strings, rendered quoted.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ascii;

impl Qualifier for Ascii {
    type Value = String;

    fn qualify(&self, value: String) -> Result<(String, String)> {
        if !value.is_ascii() {
            return Err(unqualified(&value, "not an ASCII string"));
        }
        let representation = format!("{value:?}");
        Ok((value, representation))
    }
}

/// UTC instants, rendered in ISO 8601 (`2020-01-01T06:30:00Z`); sub-second
/// precision shows up only when present.
#[derive(Debug, Default, Clone, Copy)]
pub struct DateTime;

impl DateTime {
    /// Parse an ISO 8601 date-time. The time zone is preserved by converting
    /// to UTC.
    pub fn parse(text: &str) -> Result<chrono::DateTime<Utc>> {
        chrono::DateTime::parse_from_rfc3339(text)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(|error| unqualified(text, &format!("not in ISO 8601 format: {error}")))
    }

    pub fn represent(value: &chrono::DateTime<Utc>) -> String {
        if value.nanosecond() == 0 {
            value.format("%Y-%m-%dT%H:%M:%SZ").to_string()
        } else {
            value.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
        }
    }
}

impl Qualifier for DateTime {
    type Value = chrono::DateTime<Utc>;

    fn qualify(
        &self,
        value: chrono::DateTime<Utc>,
    ) -> Result<(chrono::DateTime<Utc>, String)> {
        let representation = Self::represent(&value);
        Ok((value, representation))
    }
}

/// Calendar dates, rendered in ISO 8601 (`2020-01-01`).
#[derive(Debug, Default, Clone, Copy)]
pub struct Date;

impl Date {
    pub fn parse(text: &str) -> Result<chrono::NaiveDate> {
        chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map_err(|error| unqualified(text, &format!("not in ISO 8601 format: {error}")))
    }
}

impl Qualifier for Date {
    type Value = chrono::NaiveDate;

    fn qualify(&self, value: chrono::NaiveDate) -> Result<(chrono::NaiveDate, String)> {
        let representation = value.format("%Y-%m-%d").to_string();
        Ok((value, representation))
    }
}

/// Non-negative durations in restricted ISO 8601.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimeDelta;

impl TimeDelta {
    /// Parse a duration of the form `P[nW][nD][T[nH][nM][nS]]`.
    ///
    /// Weeks are allowed; years and months are not. Fractions are accepted
    /// in any position.
    pub fn parse(text: &str) -> Result<Duration> {
        let bad = || unqualified(text, "not in ISO 8601 duration format");
        let rest = text.strip_prefix('P').ok_or_else(bad)?;
        let (date_part, time_part) = match rest.split_once('T') {
            Some((date_part, time_part)) => (date_part, Some(time_part)),
            None => (rest, None),
        };
        let mut seconds = 0f64;
        let mut parse_measures = |segment: &str, units: &[(char, f64)]| -> Result<()> {
            let mut cursor = segment;
            let mut unit_index = 0;
            while !cursor.is_empty() {
                let digits: String = cursor
                    .chars()
                    .take_while(|symbol| symbol.is_ascii_digit() || *symbol == '.')
                    .collect();
                if digits.is_empty() {
                    return Err(bad());
                }
                let designator = cursor.chars().nth(digits.len()).ok_or_else(bad)?;
                let position = units[unit_index..]
                    .iter()
                    .position(|(unit, _)| *unit == designator)
                    .ok_or_else(bad)?;
                let magnitude: f64 = digits.parse().map_err(|_| bad())?;
                seconds += magnitude * units[unit_index + position].1;
                unit_index += position + 1;
                cursor = &cursor[digits.len() + 1..];
            }
            Ok(())
        };
        parse_measures(date_part, &[('W', 604_800.0), ('D', 86_400.0)])?;
        if let Some(time_part) = time_part {
            if time_part.is_empty() {
                return Err(bad());
            }
            parse_measures(time_part, &[('H', 3_600.0), ('M', 60.0), ('S', 1.0)])?;
        }
        Ok(Duration::from_secs_f64(seconds))
    }

    pub fn represent(value: &Duration) -> String {
        if value.subsec_nanos() == 0 {
            format!("PT{}S", value.as_secs())
        } else {
            format!("PT{:.6}S", value.as_secs_f64())
        }
    }
}

impl Qualifier for TimeDelta {
    type Value = Duration;

    fn qualify(&self, value: Duration) -> Result<(Duration, String)> {
        let representation = Self::represent(&value);
        Ok((value, representation))
    }
}

/// A date-time qualifier that quantizes its input.
///
/// Rounds instants down to the start of the containing interval. The
/// interval grid is anchored at the Unix epoch shifted by `offset`; the
/// default offset of four days aligns the grid to the first Monday after
/// the epoch.
#[derive(Debug, Clone, Copy)]
pub struct DiscreteDateTime {
    pub interval: Duration,
    pub offset: Duration,
}

impl DiscreteDateTime {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            offset: Duration::from_secs(4 * 86_400),
        }
    }

    pub fn with_offset(interval: Duration, offset: Duration) -> Self {
        Self { interval, offset }
    }

    /// Round the instant down to the nearest interval boundary.
    pub fn quantize(&self, value: chrono::DateTime<Utc>) -> chrono::DateTime<Utc> {
        let start = Utc.timestamp_opt(self.offset.as_secs() as i64, 0).unwrap();
        let span = value.signed_duration_since(start);
        let interval = self.interval.as_secs_f64();
        let count = (span.num_milliseconds() as f64 / 1000.0 / interval).floor() as i64;
        start + chrono::Duration::milliseconds((count as f64 * interval * 1000.0) as i64)
    }
}

impl Qualifier for DiscreteDateTime {
    type Value = chrono::DateTime<Utc>;

    fn qualify(
        &self,
        value: chrono::DateTime<Utc>,
    ) -> Result<(chrono::DateTime<Utc>, String)> {
        DateTime.qualify(self.quantize(value))
    }
}

/// Build a parameterized name: `ClassName(key=value, …)` with the keys in
/// sorted order.
pub fn format_name(class_name: &str, parameters: &[(&str, String)]) -> String {
    let mut parameters: Vec<&(&str, String)> = parameters.iter().collect();
    parameters.sort_by_key(|(key, _)| *key);
    let arguments: Vec<String> = parameters
        .iter()
        .map(|(key, representation)| format!("{key}={representation}"))
        .collect();
    format!("{}({})", class_name, arguments.join(", "))
}

/// Render an unordered collection the way set parameters are rendered:
/// sorted, comma-separated, in curly brackets.
pub fn represent_set<T: AsRef<str>>(representations: &[T]) -> String {
    let mut sorted: Vec<&str> = representations.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();
    format!("{{{}}}", sorted.join(", "))
}

/// Render an ordered collection: comma-separated, in square brackets.
pub fn represent_list<T: AsRef<str>>(representations: &[T]) -> String {
    let items: Vec<&str> = representations.iter().map(AsRef::as_ref).collect();
    format!("[{}]", items.join(", "))
}

/// Render a mapping: `{key: value, …}` sorted by the rendered pair.
pub fn represent_mapping<T: AsRef<str>, U: AsRef<str>>(pairs: &[(T, U)]) -> String {
    let mut rendered: Vec<String> = pairs
        .iter()
        .map(|(key, value)| format!("{}: {}", key.as_ref(), value.as_ref()))
        .collect();
    rendered.sort_unstable();
    format!("{{{}}}", rendered.join(", "))
}
