// src/payroll.rs
//! Timecard → payroll transformer.
//!
//! Each timecard row moves through explicit stage structs:
//! `RawTimecard` → `ResolvedTimecard` → `RatedTimecard` → `PayrollOutputRecord`.
//! Rows are dropped or passed through individually; a run never aborts on
//! malformed data and reports what it did in `PayrollSummary`.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::PayrollConfig;
use crate::crosswalk::{
    strip_id_prefix, EmployeeCrosswalk, FacilityCrosswalk, FacilityResolution,
};
use crate::incentives::{decide_rate, IncentiveContext, RateDecision, ShiftType};
use crate::records::{
    strip_leading_zeros, CrosswalkEntry, FacilityCrosswalkEntry, FieldValue, RawTimecard, Row,
    ShiftRecord,
};
use crate::shift_matching::{ShiftIndex, ShiftMatch};
use crate::temporal::{normalize_date, normalize_time, DateField, NormalizedDate, TimeField};

/// Output column order of the payroll file.
pub const PAYROLL_COLUMNS: [&str; 21] = [
    "Stogo EID",
    "Pay Code",
    "Pay Hours",
    "Pay Rate",
    "Blank",
    "Lookup TNAA",
    "Adjusted Pay Rate Date Start",
    "Adjusted Pay Rate Date End",
    "Timecard ID",
    "Meta Info",
    "Lookup Shift ID",
    "Lookup Person Name",
    "In-Clocking Date",
    "In-Clocking Time",
    "Out-Clocking Date",
    "Out-Clocking Time",
    "Approver",
    "Company",
    "Company Description",
    "Cost Center",
    "Cost Center Description",
];

// --- Inputs ---

#[derive(Debug, Clone, Deserialize)]
pub struct PayrollInputs {
    pub timecards: Vec<Row>,
    #[serde(default)]
    pub crosswalk: Vec<Row>,
    #[serde(default)]
    pub facilities: Vec<Row>,
    #[serde(default)]
    pub shifts: Vec<Row>,
    /// Any date inside the Sunday–Saturday week selected for this run.
    pub pay_period_start: NaiveDate,
}

// --- Stage Structs ---

#[derive(Debug, Clone)]
pub struct ResolvedTimecard {
    pub raw: RawTimecard,
    pub employee_id: String,
    pub facility: FacilityResolution,
    pub clock_in_date: DateField,
    pub clock_in_time: TimeField,
    pub clock_out_date: DateField,
    pub clock_out_time: TimeField,
    pub pay_hours: Decimal,
    pub shift: Option<ShiftMatch>,
}

#[derive(Debug, Clone)]
pub struct RatedTimecard {
    pub resolved: ResolvedTimecard,
    pub rate: RateDecision,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayrollOutputRecord {
    #[serde(rename = "Stogo EID")]
    pub stogo_eid: String,
    #[serde(rename = "Pay Code")]
    pub pay_code: String,
    #[serde(rename = "Pay Hours")]
    pub pay_hours: Decimal,
    #[serde(rename = "Pay Rate")]
    pub pay_rate: Decimal,
    #[serde(rename = "Blank")]
    pub blank: String,
    #[serde(rename = "Lookup TNAA")]
    pub lookup_tnaa: String,
    #[serde(rename = "Adjusted Pay Rate Date Start")]
    pub adjusted_start: String,
    #[serde(rename = "Adjusted Pay Rate Date End")]
    pub adjusted_end: String,
    #[serde(rename = "Timecard ID")]
    pub timecard_id: String,
    #[serde(rename = "Meta Info")]
    pub meta_info: String,
    #[serde(rename = "Lookup Shift ID")]
    pub lookup_shift_id: String,
    #[serde(rename = "Lookup Person Name")]
    pub lookup_person_name: String,
    #[serde(rename = "In-Clocking Date")]
    pub in_date: String,
    #[serde(rename = "In-Clocking Time")]
    pub in_time: String,
    #[serde(rename = "Out-Clocking Date")]
    pub out_date: String,
    #[serde(rename = "Out-Clocking Time")]
    pub out_time: String,
    #[serde(rename = "Approver")]
    pub approver: String,
    #[serde(rename = "Company")]
    pub company: String,
    #[serde(rename = "Company Description")]
    pub company_description: String,
    #[serde(rename = "Cost Center")]
    pub cost_center: String,
    #[serde(rename = "Cost Center Description")]
    pub cost_center_description: String,

    // Not exported to the payroll file
    #[serde(rename = "hasIncentive")]
    pub has_incentive: bool,
    #[serde(rename = "isOutsidePayPeriod")]
    pub is_outside_pay_period: bool,
    #[serde(rename = "employeeName")]
    pub employee_name: String,
    #[serde(rename = "incentiveDescription")]
    pub incentive_description: String,
}

impl PayrollOutputRecord {
    /// Values in `PAYROLL_COLUMNS` order.
    pub fn export_row(&self) -> Vec<String> {
        vec![
            self.stogo_eid.clone(),
            self.pay_code.clone(),
            self.pay_hours.to_string(),
            self.pay_rate.to_string(),
            self.blank.clone(),
            self.lookup_tnaa.clone(),
            self.adjusted_start.clone(),
            self.adjusted_end.clone(),
            self.timecard_id.clone(),
            self.meta_info.clone(),
            self.lookup_shift_id.clone(),
            self.lookup_person_name.clone(),
            self.in_date.clone(),
            self.in_time.clone(),
            self.out_date.clone(),
            self.out_time.clone(),
            self.approver.clone(),
            self.company.clone(),
            self.company_description.clone(),
            self.cost_center.clone(),
            self.cost_center_description.clone(),
        ]
    }

    /// Rebuilds a record from a previously exported payroll file row.
    /// Columns that do not parse as numbers read as zero.
    pub fn from_row(row: &Row) -> Self {
        let text = |column: &str| -> String {
            row.get(column)
                .map(|v| v.as_text().into_owned())
                .unwrap_or_default()
        };
        let number = |column: &str| -> Decimal {
            row.get(column)
                .and_then(FieldValue::as_decimal)
                .unwrap_or_default()
        };
        let flag = |column: &str| row.get(column).is_some_and(FieldValue::is_affirmative);

        Self {
            stogo_eid: text("Stogo EID"),
            pay_code: text("Pay Code"),
            pay_hours: number("Pay Hours"),
            pay_rate: number("Pay Rate"),
            blank: text("Blank"),
            lookup_tnaa: text("Lookup TNAA"),
            adjusted_start: text("Adjusted Pay Rate Date Start"),
            adjusted_end: text("Adjusted Pay Rate Date End"),
            timecard_id: text("Timecard ID"),
            meta_info: text("Meta Info"),
            lookup_shift_id: text("Lookup Shift ID"),
            lookup_person_name: text("Lookup Person Name"),
            in_date: text("In-Clocking Date"),
            in_time: text("In-Clocking Time"),
            out_date: text("Out-Clocking Date"),
            out_time: text("Out-Clocking Time"),
            approver: text("Approver"),
            company: text("Company"),
            company_description: text("Company Description"),
            cost_center: text("Cost Center"),
            cost_center_description: text("Cost Center Description"),
            has_incentive: flag("hasIncentive"),
            is_outside_pay_period: flag("isOutsidePayPeriod"),
            employee_name: text("employeeName"),
            incentive_description: text("incentiveDescription"),
        }
    }
}

// --- Run Results ---

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PayrollSummary {
    pub input_rows: usize,
    pub emitted: usize,
    pub unresolved_employee: usize,
    pub unparseable_hours: usize,
    /// Timecard ids whose lunch deduction exceeded the raw hours.
    pub negative_pay_hours: Vec<String>,
    pub unmatched_shifts: usize,
    pub facility_fallbacks: usize,
    pub incentives_applied: usize,
    pub outside_pay_period: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayrollRun {
    pub records: Vec<PayrollOutputRecord>,
    pub summary: PayrollSummary,
}

/// Pay hours for one punch pair. The deduction applies only when the lunch
/// answer is affirmative; no clamping is done here.
pub fn pay_hours(raw_hours: Decimal, lunch_taken: bool, lunch_deduction: Decimal) -> Decimal {
    if lunch_taken {
        raw_hours - lunch_deduction
    } else {
        raw_hours
    }
}

// --- Transformer ---

pub struct PayrollTransformer {
    config: PayrollConfig,
}

impl PayrollTransformer {
    pub fn new(config: PayrollConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PayrollConfig {
        &self.config
    }

    pub fn run(&self, inputs: &PayrollInputs) -> PayrollRun {
        let crosswalk_entries: Vec<CrosswalkEntry> =
            inputs.crosswalk.iter().map(CrosswalkEntry::from_row).collect();
        let facility_entries: Vec<FacilityCrosswalkEntry> = inputs
            .facilities
            .iter()
            .map(FacilityCrosswalkEntry::from_row)
            .collect();
        let shift_records: Vec<ShiftRecord> =
            inputs.shifts.iter().map(ShiftRecord::from_row).collect();

        let employees = EmployeeCrosswalk::from_entries(&crosswalk_entries);
        let facilities = FacilityCrosswalk::from_entries(&facility_entries);
        let shifts = ShiftIndex::build(&shift_records);
        let selected_week = NormalizedDate::from_naive(inputs.pay_period_start).week_start();

        let mut summary = PayrollSummary {
            input_rows: inputs.timecards.len(),
            ..Default::default()
        };
        let mut records = Vec::with_capacity(inputs.timecards.len());

        for row in &inputs.timecards {
            let raw = RawTimecard::from_row(row);
            let Some(resolved) = self.resolve(raw, &employees, &facilities, &shifts, &mut summary)
            else {
                continue;
            };
            let rated = self.rate(resolved);
            let record = self.assemble(&rated, selected_week);

            if record.has_incentive {
                summary.incentives_applied += 1;
            }
            if record.is_outside_pay_period {
                summary.outside_pay_period += 1;
            }
            records.push(record);
        }
        summary.emitted = records.len();

        info!(
            "Payroll run complete: {} of {} rows emitted ({} unresolved employee ids, {} unparseable hours, {} negative pay hours, {} without shift, {} incentives, {} outside pay period)",
            summary.emitted,
            summary.input_rows,
            summary.unresolved_employee,
            summary.unparseable_hours,
            summary.negative_pay_hours.len(),
            summary.unmatched_shifts,
            summary.incentives_applied,
            summary.outside_pay_period
        );

        PayrollRun { records, summary }
    }

    /// Identifier, temporal and shift resolution. `None` means the row is
    /// filtered out of the payroll file.
    fn resolve(
        &self,
        raw: RawTimecard,
        employees: &EmployeeCrosswalk,
        facilities: &FacilityCrosswalk,
        shifts: &ShiftIndex,
        summary: &mut PayrollSummary,
    ) -> Option<ResolvedTimecard> {
        let employee_id = employees.resolve(&raw.employee_id);
        if employee_id.is_empty() {
            debug!(
                "Dropping timecard {}: EmployeeID={} not in crosswalk",
                raw.timecard_id, raw.employee_id
            );
            summary.unresolved_employee += 1;
            return None;
        }
        if strip_id_prefix(&employee_id, &self.config.id_prefix).trim().is_empty() {
            warn!(
                "Dropping timecard {}: internal id '{}' is only the '{}' prefix",
                raw.timecard_id, employee_id, self.config.id_prefix
            );
            summary.unresolved_employee += 1;
            return None;
        }

        let Some(raw_hours) = raw.hours.as_decimal() else {
            warn!(
                "Dropping timecard {}: Hours value '{}' is not a number",
                raw.timecard_id,
                raw.hours.as_text()
            );
            summary.unparseable_hours += 1;
            return None;
        };
        let pay_hours = pay_hours(
            raw_hours,
            raw.lunch_answer.is_affirmative(),
            self.config.lunch_deduction,
        );
        if pay_hours < Decimal::ZERO {
            warn!(
                "Negative pay hours for timecard {} (Emp={}): {} raw hours, {} after lunch deduction",
                raw.timecard_id, employee_id, raw_hours, pay_hours
            );
            summary.negative_pay_hours.push(raw.timecard_id.clone());
        }

        let facility = facilities.resolve(&raw.company);
        if facility.is_fallback() {
            summary.facility_fallbacks += 1;
        }

        let clock_in_date = normalize_date(&raw.clock_in_date);
        let shift = shifts.find(&employee_id, &clock_in_date.key(), &self.config.id_prefix);
        if shift.is_none() {
            debug!(
                "No scheduled shift for Emp={} on {}",
                employee_id,
                clock_in_date.display()
            );
            summary.unmatched_shifts += 1;
        }

        Some(ResolvedTimecard {
            clock_in_time: normalize_time(&raw.clock_in_time),
            clock_out_date: normalize_date(&raw.clock_out_date),
            clock_out_time: normalize_time(&raw.clock_out_time),
            clock_in_date,
            employee_id,
            facility,
            pay_hours,
            shift,
            raw,
        })
    }

    fn rate(&self, resolved: ResolvedTimecard) -> RatedTimecard {
        let shift_type = ShiftType::classify(&resolved.clock_in_date, &resolved.clock_out_date);
        let shift_date = resolved.clock_in_date.date();
        let ctx = IncentiveContext {
            facility_code: &resolved.raw.company,
            cost_center: &resolved.raw.cost_center,
            shift_type,
            weekday: shift_date.map(|d| d.weekday()),
            start_hour: resolved.clock_in_time.time().map(|t| t.hour()),
            end_hour: resolved.clock_out_time.time().map(|t| t.hour()),
        };
        let rate = decide_rate(
            &self.config.rates,
            &self.config.incentives,
            shift_date,
            &ctx,
        );
        RatedTimecard { resolved, rate }
    }

    fn assemble(
        &self,
        rated: &RatedTimecard,
        selected_week: NormalizedDate,
    ) -> PayrollOutputRecord {
        let resolved = &rated.resolved;
        let raw = &resolved.raw;

        let natural_week = resolved.clock_in_date.date().map(|d| d.week_start());
        let (is_outside_pay_period, adjusted_start, adjusted_end) = match natural_week {
            Some(week_start) if week_start != selected_week => {
                (true, week_start.display(), week_start.week_end().display())
            }
            _ => (false, String::new(), String::new()),
        };

        let (lookup_shift_id, lookup_person_name) = resolved
            .shift
            .as_ref()
            .map(|m| (m.shift_id.clone(), m.person_name.clone()))
            .unwrap_or_default();
        let employee_name = if lookup_person_name.is_empty() {
            raw.display_name()
        } else {
            lookup_person_name.clone()
        };

        PayrollOutputRecord {
            stogo_eid: strip_id_prefix(&resolved.employee_id, &self.config.id_prefix).to_string(),
            pay_code: rated.rate.pay_code.clone(),
            pay_hours: two_places(resolved.pay_hours),
            pay_rate: two_places(rated.rate.pay_rate),
            blank: String::new(),
            lookup_tnaa: resolved.facility.facility_id().to_string(),
            adjusted_start,
            adjusted_end,
            timecard_id: raw.timecard_id.clone(),
            meta_info: String::new(),
            lookup_shift_id,
            lookup_person_name,
            in_date: resolved.clock_in_date.display(),
            in_time: resolved.clock_in_time.display(),
            out_date: resolved.clock_out_date.display(),
            out_time: resolved.clock_out_time.display(),
            approver: self.config.approver.clone(),
            company: raw.company.clone(),
            company_description: raw.company_description.clone(),
            cost_center: strip_leading_zeros(&raw.cost_center).to_string(),
            cost_center_description: raw.cost_center_description.clone(),
            has_incentive: rated.rate.incentive.is_some(),
            is_outside_pay_period,
            employee_name,
            incentive_description: rated
                .rate
                .incentive
                .as_ref()
                .map(|a| a.description.clone())
                .unwrap_or_default(),
        }
    }
}

/// Money and hours columns are always written with two decimal places.
fn two_places(value: Decimal) -> Decimal {
    let mut value = value.round_dp(2);
    value.rescale(2);
    value
}
