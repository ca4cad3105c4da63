// src/records.rs
//! Pre-parsed input rows and the typed per-stage input structs built from them.
//!
//! File decoding happens outside the pipeline; everything here starts from
//! string-keyed rows whose column names are part of the external contract.

use chrono::NaiveDateTime;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;

/// One cell of a pre-parsed row.
///
/// Deserialization is untagged: `null` becomes `Empty`, JSON numbers become
/// `Number`, ISO date-time strings become `DateTime` and every other string is
/// kept as `Text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    DateTime(NaiveDateTime),
    Text(String),
}

pub type Row = HashMap<String, FieldValue>;

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Empty => true,
            FieldValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// String form of the value, trimmed. Whole numbers render without a
    /// fractional part so numeric ids survive a JSON round trip.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            FieldValue::Empty => Cow::Borrowed(""),
            FieldValue::Bool(b) => Cow::Owned(b.to_string()),
            FieldValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    Cow::Owned(format!("{}", *n as i64))
                } else {
                    Cow::Owned(n.to_string())
                }
            }
            FieldValue::DateTime(dt) => Cow::Owned(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
            FieldValue::Text(s) => Cow::Borrowed(s.trim()),
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            FieldValue::Number(n) => Decimal::from_f64(*n).map(|d| d.round_dp(4).normalize()),
            FieldValue::Text(s) => {
                let cleaned = s.trim().replace(',', "");
                if cleaned.is_empty() {
                    return None;
                }
                Decimal::from_str(&cleaned).ok()
            }
            _ => None,
        }
    }

    /// Lunch-answer style flag: `Yes`, `Y`, `True`, `1` (any case).
    pub fn is_affirmative(&self) -> bool {
        match self {
            FieldValue::Bool(b) => *b,
            FieldValue::Number(n) => *n == 1.0,
            FieldValue::Text(s) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "yes" | "y" | "true" | "1"
            ),
            _ => false,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        if value.trim().is_empty() {
            FieldValue::Empty
        } else {
            FieldValue::Text(value.to_string())
        }
    }
}

/// Cost-center codes arrive both zero-padded and bare; `"0009343"` and
/// `"9343"` are the same code. An all-zero code collapses to `"0"`.
pub fn strip_leading_zeros(code: &str) -> &str {
    let trimmed = code.trim();
    let stripped = trimmed.trim_start_matches('0');
    if stripped.is_empty() && !trimmed.is_empty() {
        "0"
    } else {
        stripped
    }
}

// --- Column Names ---

pub mod columns {
    // Timecard extract
    pub const EMPLOYEE_ID: &str = "EmployeeID";
    pub const FIRST_NAME: &str = "FirstName";
    pub const LAST_NAME: &str = "LastName";
    pub const IN_CLOCKING_GUID: &str = "In-Clocking GUID";
    pub const HOURS: &str = "Hours";
    pub const PAYCODE: &str = "Paycode";
    pub const IN_CLOCKING_DATE: &str = "In-Clocking Date";
    pub const IN_CLOCKING_TIME: &str = "In-Clocking Time";
    pub const OUT_CLOCKING_DATE: &str = "Out-Clocking Date";
    pub const OUT_CLOCKING_TIME: &str = "Out-Clocking Time";
    pub const LUNCH_ANSWER: &str = "UserShiftAnswer-OutClocking";
    pub const COMPANY: &str = "Company";
    pub const COMPANY_DESCRIPTION: &str = "Company Description";
    pub const COST_CENTER: &str = "Cost Center";
    pub const COST_CENTER_DESCRIPTION: &str = "Cost Center Description";

    // Employee crosswalk
    pub const EEID: &str = "EEID";
    pub const EMPLOYEE_NUMBER: &str = "Employee Number";
    pub const ACTIVE: &str = "Active";

    // Facility crosswalk
    pub const STOGO_CODE: &str = "Stogo Code";
    pub const TNAA: &str = "TNAA";

    // Shift schedule
    pub const PERSON_ID: &str = "Person ID";
    pub const PERSON_NAME: &str = "Person Name";
    pub const START_DATE_TIME: &str = "start_date_time";
    pub const SHIFT_ID: &str = "Shift ID";

    // Invoice history (invoice detail vocabulary)
    pub const EMPLOYEE_NAME: &str = "Employee Name";
    pub const SHIFT_DATE: &str = "Shift Date";
    pub const PAY_TYPE: &str = "Pay Type";
}

fn cell<'a>(row: &'a Row, column: &str) -> &'a FieldValue {
    static EMPTY: FieldValue = FieldValue::Empty;
    row.get(column).unwrap_or(&EMPTY)
}

fn cell_text(row: &Row, column: &str) -> String {
    cell(row, column).as_text().into_owned()
}

// --- Typed Inputs ---

#[derive(Debug, Clone, Default)]
pub struct RawTimecard {
    pub employee_id: String,
    pub first_name: String,
    pub last_name: String,
    pub timecard_id: String,
    pub hours: FieldValue,
    pub pay_code: String,
    pub clock_in_date: FieldValue,
    pub clock_in_time: FieldValue,
    pub clock_out_date: FieldValue,
    pub clock_out_time: FieldValue,
    pub lunch_answer: FieldValue,
    pub company: String,
    pub company_description: String,
    pub cost_center: String,
    pub cost_center_description: String,
}

impl RawTimecard {
    pub fn from_row(row: &Row) -> Self {
        Self {
            employee_id: cell_text(row, columns::EMPLOYEE_ID),
            first_name: cell_text(row, columns::FIRST_NAME),
            last_name: cell_text(row, columns::LAST_NAME),
            timecard_id: cell_text(row, columns::IN_CLOCKING_GUID),
            hours: cell(row, columns::HOURS).clone(),
            pay_code: cell_text(row, columns::PAYCODE),
            clock_in_date: cell(row, columns::IN_CLOCKING_DATE).clone(),
            clock_in_time: cell(row, columns::IN_CLOCKING_TIME).clone(),
            clock_out_date: cell(row, columns::OUT_CLOCKING_DATE).clone(),
            clock_out_time: cell(row, columns::OUT_CLOCKING_TIME).clone(),
            lunch_answer: cell(row, columns::LUNCH_ANSWER).clone(),
            company: cell_text(row, columns::COMPANY),
            company_description: cell_text(row, columns::COMPANY_DESCRIPTION),
            cost_center: cell_text(row, columns::COST_CENTER),
            cost_center_description: cell_text(row, columns::COST_CENTER_DESCRIPTION),
        }
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrosswalkEntry {
    pub external_id: String,
    pub internal_id: String,
    pub active: bool,
}

impl CrosswalkEntry {
    pub fn from_row(row: &Row) -> Self {
        let mut internal_id = cell_text(row, columns::EMPLOYEE_NUMBER);
        if internal_id.is_empty() {
            // Some exports name the column "Lookup Employee Number" or
            // "Lookup <System> Employee Number".
            let mut lookup_columns: Vec<&String> = row
                .keys()
                .filter(|k| k.starts_with("Lookup") && k.ends_with(columns::EMPLOYEE_NUMBER))
                .collect();
            lookup_columns.sort();
            internal_id = lookup_columns
                .into_iter()
                .map(|k| cell_text(row, k))
                .find(|v| !v.is_empty())
                .unwrap_or_default();
        }

        let active = match cell(row, columns::ACTIVE) {
            FieldValue::Empty => true,
            FieldValue::Bool(b) => *b,
            other => !matches!(
                other.as_text().to_ascii_lowercase().as_str(),
                "n" | "no" | "false" | "0" | "inactive"
            ),
        };

        Self {
            external_id: cell_text(row, columns::EEID),
            internal_id,
            active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacilityCrosswalkEntry {
    pub facility_code: String,
    pub facility_id: String,
}

impl FacilityCrosswalkEntry {
    pub fn from_row(row: &Row) -> Self {
        Self {
            facility_code: cell_text(row, columns::STOGO_CODE),
            facility_id: cell_text(row, columns::TNAA),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShiftRecord {
    pub person_id: String,
    pub person_name: String,
    pub start: FieldValue,
    pub shift_id: String,
}

impl ShiftRecord {
    pub fn from_row(row: &Row) -> Self {
        Self {
            person_id: cell_text(row, columns::PERSON_ID),
            person_name: cell_text(row, columns::PERSON_NAME),
            start: cell(row, columns::START_DATE_TIME).clone(),
            shift_id: cell_text(row, columns::SHIFT_ID),
        }
    }
}

/// A line from a previously generated invoice, used only for deduplication.
#[derive(Debug, Clone)]
pub struct InvoiceHistoryRecord {
    pub employee_name: String,
    pub shift_date: FieldValue,
    pub hours: FieldValue,
    pub pay_type: String,
}

impl InvoiceHistoryRecord {
    pub fn from_row(row: &Row) -> Self {
        Self {
            employee_name: cell_text(row, columns::EMPLOYEE_NAME),
            shift_date: cell(row, columns::SHIFT_DATE).clone(),
            hours: cell(row, columns::HOURS).clone(),
            pay_type: cell_text(row, columns::PAY_TYPE),
        }
    }
}
