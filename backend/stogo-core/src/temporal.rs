// src/temporal.rs
//! Date and time normalization.
//!
//! Timekeeping extracts deliver dates and times as structured date-time
//! values, spreadsheet serial day-counts, or free text in several layouts.
//! Every stage downstream works on the canonical values produced here:
//! `YYYYMMDD` keys for matching, `M/D/YY` and `HH:MM` for human-facing output.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Timelike, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;

use crate::records::FieldValue;

/// Serial day-counts are only recognized strictly inside this range.
const SERIAL_MAX: f64 = 1_000_000.0;
const MINUTES_PER_DAY: f64 = 1440.0;

static SERIAL_EPOCH: Lazy<NaiveDate> =
    Lazy::new(|| NaiveDate::from_ymd_opt(1899, 12, 30).expect("valid serial epoch"));

static MDY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4}|\d{2})(?:[\sT].*)?$").expect("valid M/D/Y pattern")
});
static ISO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})(?:[\sT].*)?$").expect("valid ISO date pattern")
});
static COMPACT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})(\d{2})(\d{2})$").expect("valid compact date pattern"));
static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[\sT])(\d{1,2}):(\d{2})(?::(\d{2}))?(?:\.\d+)?\s*([AaPp][Mm])?\s*$")
        .expect("valid time pattern")
});
static NUMERIC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(?:\.\d+)?$").expect("valid numeric pattern"));

// --- Canonical Values ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedDate(NaiveDate);

impl NormalizedDate {
    pub fn new(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn from_naive(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn naive(&self) -> NaiveDate {
        self.0
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    pub fn weekday(&self) -> Weekday {
        self.0.weekday()
    }

    /// Internal matching key, `YYYYMMDD`.
    pub fn key(&self) -> String {
        self.0.format("%Y%m%d").to_string()
    }

    /// Payroll output form, `M/D/YY` without zero padding on month and day.
    pub fn display(&self) -> String {
        format!(
            "{}/{}/{:02}",
            self.month(),
            self.day(),
            self.year().rem_euclid(100)
        )
    }

    pub fn iso(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    /// Sunday that starts the Sunday–Saturday week containing this date.
    pub fn week_start(&self) -> Self {
        let offset = self.0.weekday().num_days_from_sunday();
        Self(self.0 - Duration::days(i64::from(offset)))
    }

    /// Saturday that ends the Sunday–Saturday week containing this date.
    pub fn week_end(&self) -> Self {
        Self(self.week_start().0 + Duration::days(6))
    }
}

impl fmt::Display for NormalizedDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl Serialize for NormalizedDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.iso())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedTime {
    hour: u32,
    minute: u32,
}

impl NormalizedTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    /// Zero-padded `HH:MM`.
    pub fn display(&self) -> String {
        format!("{:02}:{:02}", self.hour, self.minute)
    }

    fn from_naive(time: NaiveTime) -> Self {
        Self {
            hour: time.hour(),
            minute: time.minute(),
        }
    }
}

impl fmt::Display for NormalizedTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// Result of date normalization. Unrecognized input is carried through as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateField {
    Known(NormalizedDate),
    Unrecognized(String),
}

impl DateField {
    pub fn date(&self) -> Option<NormalizedDate> {
        match self {
            DateField::Known(d) => Some(*d),
            DateField::Unrecognized(_) => None,
        }
    }

    pub fn key(&self) -> String {
        match self {
            DateField::Known(d) => d.key(),
            DateField::Unrecognized(raw) => raw.clone(),
        }
    }

    pub fn display(&self) -> String {
        match self {
            DateField::Known(d) => d.display(),
            DateField::Unrecognized(raw) => raw.clone(),
        }
    }

    pub fn iso(&self) -> String {
        match self {
            DateField::Known(d) => d.iso(),
            DateField::Unrecognized(raw) => raw.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeField {
    Known(NormalizedTime),
    Unrecognized(String),
}

impl TimeField {
    pub fn time(&self) -> Option<NormalizedTime> {
        match self {
            TimeField::Known(t) => Some(*t),
            TimeField::Unrecognized(_) => None,
        }
    }

    pub fn display(&self) -> String {
        match self {
            TimeField::Known(t) => t.display(),
            TimeField::Unrecognized(raw) => raw.clone(),
        }
    }
}

// --- Normalization ---

pub fn normalize_date(value: &FieldValue) -> DateField {
    let parsed = match value {
        FieldValue::DateTime(dt) => Some(dt.date()),
        FieldValue::Number(n) => serial_date(*n),
        FieldValue::Text(s) => parse_date_text(s.trim()),
        FieldValue::Empty | FieldValue::Bool(_) => None,
    };
    match parsed {
        Some(date) => DateField::Known(NormalizedDate(date)),
        None => DateField::Unrecognized(value.as_text().into_owned()),
    }
}

pub fn normalize_time(value: &FieldValue) -> TimeField {
    let parsed = match value {
        FieldValue::DateTime(dt) => Some(NormalizedTime::from_naive(dt.time())),
        FieldValue::Number(n) => serial_time(*n),
        FieldValue::Text(s) => parse_time_text(s.trim()),
        FieldValue::Empty | FieldValue::Bool(_) => None,
    };
    match parsed {
        Some(time) => TimeField::Known(time),
        None => TimeField::Unrecognized(value.as_text().into_owned()),
    }
}

/// Splits a combined date-time value (e.g. a shift's `start_date_time`).
pub fn normalize_date_time(value: &FieldValue) -> (DateField, TimeField) {
    (normalize_date(value), normalize_time(value))
}

fn serial_date(serial: f64) -> Option<NaiveDate> {
    if !(serial > 0.0 && serial < SERIAL_MAX) {
        return None;
    }
    let days = serial_minutes(serial).div_euclid(1440);
    SERIAL_EPOCH.checked_add_signed(Duration::days(days))
}

fn serial_time(serial: f64) -> Option<NormalizedTime> {
    if !(serial >= 0.0 && serial < SERIAL_MAX) {
        return None;
    }
    let minutes = serial_minutes(serial).rem_euclid(1440) as u32;
    NormalizedTime::new(minutes / 60, minutes % 60)
}

/// Whole minutes since the epoch. Date and time both derive from this so a
/// value that rounds up to midnight rolls over to the next day.
fn serial_minutes(serial: f64) -> i64 {
    (serial * MINUTES_PER_DAY).round() as i64
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    if text.is_empty() {
        return None;
    }
    if let Some(caps) = COMPACT_RE.captures(text) {
        return ymd(&caps[1], &caps[2], &caps[3]);
    }
    if NUMERIC_RE.is_match(text) {
        return text.parse::<f64>().ok().and_then(serial_date);
    }
    if let Some(caps) = MDY_RE.captures(text) {
        let year = if caps[3].len() == 2 {
            format!("20{}", &caps[3])
        } else {
            caps[3].to_string()
        };
        return ymd(&year, &caps[1], &caps[2]);
    }
    if let Some(caps) = ISO_RE.captures(text) {
        return ymd(&caps[1], &caps[2], &caps[3]);
    }
    None
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

fn parse_time_text(text: &str) -> Option<NormalizedTime> {
    if text.is_empty() {
        return None;
    }
    if NUMERIC_RE.is_match(text) {
        return text.parse::<f64>().ok().and_then(serial_time);
    }
    let caps = TIME_RE.captures(text)?;
    let mut hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;
    if let Some(meridiem) = caps.get(4) {
        if hour == 0 || hour > 12 {
            return None;
        }
        let pm = meridiem.as_str().eq_ignore_ascii_case("pm");
        hour = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, true) => h + 12,
            (h, false) => h,
        };
    }
    NormalizedTime::new(hour, minute)
}
