// src/invoice.rs
//! Payroll → invoice transformer.
//!
//! Consumes finalized payroll records from one or more periods, drops what has
//! already been billed, prices the rest and splits them into the main and
//! secondary ("micro") facility groups. Each group is projected into the
//! internal detail file, the external fee-system feed and the productivity
//! ledger import.

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

use crate::config::InvoiceConfig;
use crate::payroll::PayrollOutputRecord;
use crate::records::{FieldValue, InvoiceHistoryRecord, Row};
use crate::temporal::{normalize_date, DateField};

// --- Configuration Types ---

/// Flat per-hour flex fee keyed by canonical facility id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub default_rate: Decimal,
    #[serde(default)]
    pub rates: HashMap<String, Decimal>,
}

impl FeeSchedule {
    pub fn rate_for(&self, facility_id: &str) -> Decimal {
        self.rates
            .get(facility_id.trim())
            .copied()
            .unwrap_or(self.default_rate)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceNumbering {
    pub main_prefix: String,
    pub secondary_prefix: String,
    pub next_main: u32,
    pub next_secondary: u32,
}

impl Default for InvoiceNumbering {
    fn default() -> Self {
        Self {
            main_prefix: "INV".to_string(),
            secondary_prefix: "MIC".to_string(),
            next_main: 1,
            next_secondary: 1,
        }
    }
}

/// `{prefix}-{YYYYMMDD}-{sequence:04}`
pub fn format_invoice_number(prefix: &str, invoice_date: NaiveDate, sequence: u32) -> String {
    format!("{}-{}-{:04}", prefix, invoice_date.format("%Y%m%d"), sequence)
}

/// Rounds to cents, midpoint away from zero, always carrying two places.
pub fn cents(value: Decimal) -> Decimal {
    let mut value = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    value.rescale(2);
    value
}

// --- Deduplication ---

/// Identity of a billed shift. Name and pay type compare case-insensitively,
/// the date compares on its canonical key and hours compare by value, so
/// `12` and `12.00` are the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub employee_name: String,
    pub shift_date_key: String,
    pub hours: String,
    pub pay_type: String,
}

impl DedupKey {
    pub fn new(
        employee_name: &str,
        shift_date: &FieldValue,
        hours: &FieldValue,
        pay_type: &str,
    ) -> Self {
        let hours = match hours.as_decimal() {
            Some(h) => h.normalize().to_string(),
            None => hours.as_text().to_ascii_lowercase(),
        };
        Self {
            employee_name: employee_name.trim().to_lowercase(),
            shift_date_key: normalize_date(shift_date).key(),
            hours,
            pay_type: pay_type.trim().to_lowercase(),
        }
    }

    pub fn from_history(record: &InvoiceHistoryRecord) -> Self {
        Self::new(
            &record.employee_name,
            &record.shift_date,
            &record.hours,
            &record.pay_type,
        )
    }

    pub fn from_payroll(record: &PayrollOutputRecord) -> Self {
        Self::new(
            billing_name(record),
            &FieldValue::text(record.in_date.as_str()),
            &FieldValue::text(record.pay_hours.to_string()),
            &record.pay_code,
        )
    }
}

/// Identity of a record within one invoice batch. Resubmitted periods repeat
/// the same timecard; records without one fall back to the employee id key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum BatchKey {
    Timecard(String),
    Shift(DedupKey),
}

impl BatchKey {
    fn from_payroll(record: &PayrollOutputRecord) -> Self {
        let timecard = record.timecard_id.trim();
        if !timecard.is_empty() {
            return BatchKey::Timecard(timecard.to_string());
        }
        BatchKey::Shift(DedupKey::new(
            &record.stogo_eid,
            &FieldValue::text(record.in_date.as_str()),
            &FieldValue::text(record.pay_hours.to_string()),
            &record.pay_code,
        ))
    }
}

/// Name a payroll record is billed under: the carried display name, else the
/// scheduled person name.
fn billing_name(record: &PayrollOutputRecord) -> &str {
    if record.employee_name.trim().is_empty() {
        record.lookup_person_name.trim()
    } else {
        record.employee_name.trim()
    }
}

// --- Inputs / Lines ---

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceInputs {
    /// Payroll records per period, in submission order.
    pub periods: Vec<Vec<PayrollOutputRecord>>,
    /// Rows of previously generated invoice detail files.
    #[serde(default)]
    pub history: Vec<Row>,
    pub invoice_date: NaiveDate,
}

/// One priced, billable shift.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceLine {
    pub employee_name: String,
    pub employee_id: String,
    pub facility_id: String,
    pub facility_name: String,
    pub cost_center: String,
    pub cost_center_description: String,
    pub shift_id: String,
    pub shift_date: String,
    pub shift_start: String,
    pub shift_end: String,
    pub hours: Decimal,
    pub pay_type: String,
    pub pay_rate: Decimal,
    pub staff_pay: Decimal,
    pub fee_rate: Decimal,
    pub flex_fee: Decimal,
    pub shift_total: Decimal,
    pub has_incentive: bool,
    pub timecard_id: String,
}

impl InvoiceLine {
    fn price(record: &PayrollOutputRecord, fees: &FeeSchedule) -> Self {
        let hours = record.pay_hours;
        let fee_rate = fees.rate_for(&record.lookup_tnaa);
        let staff_pay = cents(hours * record.pay_rate);
        let flex_fee = cents(hours * fee_rate);
        let shift_date = match normalize_date(&FieldValue::text(record.in_date.as_str())) {
            DateField::Known(date) => date.iso(),
            DateField::Unrecognized(raw) => raw,
        };

        Self {
            employee_name: billing_name(record).to_string(),
            employee_id: record.stogo_eid.clone(),
            facility_id: record.lookup_tnaa.clone(),
            facility_name: record.company_description.clone(),
            cost_center: record.cost_center.clone(),
            cost_center_description: record.cost_center_description.clone(),
            shift_id: record.lookup_shift_id.clone(),
            shift_date,
            shift_start: join_date_time(&record.in_date, &record.in_time),
            shift_end: join_date_time(&record.out_date, &record.out_time),
            hours,
            pay_type: record.pay_code.clone(),
            pay_rate: record.pay_rate,
            staff_pay,
            fee_rate,
            flex_fee,
            shift_total: staff_pay + flex_fee,
            has_incentive: record.has_incentive,
            timecard_id: record.timecard_id.clone(),
        }
    }
}

fn join_date_time(date: &str, time: &str) -> String {
    format!("{} {}", date, time).trim().to_string()
}

// --- Output Projections ---

pub const INVOICE_DETAIL_COLUMNS: [&str; 20] = [
    "Invoice Number",
    "Invoice Date",
    "Employee Name",
    "Employee ID",
    "Facility ID",
    "Facility",
    "Cost Center",
    "Cost Center Description",
    "Shift ID",
    "Shift Date",
    "Shift Start",
    "Shift End",
    "Hours",
    "Pay Type",
    "Pay Rate",
    "Total Staff Pay",
    "Flex Fee Rate",
    "Total Flex Fee",
    "Total Shift Fee",
    "Incentive",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceDetailRecord {
    #[serde(rename = "Invoice Number")]
    pub invoice_number: String,
    #[serde(rename = "Invoice Date")]
    pub invoice_date: String,
    #[serde(rename = "Employee Name")]
    pub employee_name: String,
    #[serde(rename = "Employee ID")]
    pub employee_id: String,
    #[serde(rename = "Facility ID")]
    pub facility_id: String,
    #[serde(rename = "Facility")]
    pub facility_name: String,
    #[serde(rename = "Cost Center")]
    pub cost_center: String,
    #[serde(rename = "Cost Center Description")]
    pub cost_center_description: String,
    #[serde(rename = "Shift ID")]
    pub shift_id: String,
    #[serde(rename = "Shift Date")]
    pub shift_date: String,
    #[serde(rename = "Shift Start")]
    pub shift_start: String,
    #[serde(rename = "Shift End")]
    pub shift_end: String,
    #[serde(rename = "Hours")]
    pub hours: Decimal,
    #[serde(rename = "Pay Type")]
    pub pay_type: String,
    #[serde(rename = "Pay Rate")]
    pub pay_rate: Decimal,
    #[serde(rename = "Total Staff Pay")]
    pub total_staff_pay: Decimal,
    #[serde(rename = "Flex Fee Rate")]
    pub fee_rate: Decimal,
    #[serde(rename = "Total Flex Fee")]
    pub total_flex_fee: Decimal,
    #[serde(rename = "Total Shift Fee")]
    pub total_shift_fee: Decimal,
    #[serde(rename = "Incentive")]
    pub incentive: String,
}

impl InvoiceDetailRecord {
    fn project(line: &InvoiceLine, invoice_number: &str, invoice_date: NaiveDate) -> Self {
        Self {
            invoice_number: invoice_number.to_string(),
            invoice_date: invoice_date.format("%Y-%m-%d").to_string(),
            employee_name: line.employee_name.clone(),
            employee_id: line.employee_id.clone(),
            facility_id: line.facility_id.clone(),
            facility_name: line.facility_name.clone(),
            cost_center: line.cost_center.clone(),
            cost_center_description: line.cost_center_description.clone(),
            shift_id: line.shift_id.clone(),
            shift_date: line.shift_date.clone(),
            shift_start: line.shift_start.clone(),
            shift_end: line.shift_end.clone(),
            hours: line.hours,
            pay_type: line.pay_type.clone(),
            pay_rate: line.pay_rate,
            total_staff_pay: line.staff_pay,
            fee_rate: line.fee_rate,
            total_flex_fee: line.flex_fee,
            total_shift_fee: line.shift_total,
            incentive: if line.has_incentive { "Yes" } else { "No" }.to_string(),
        }
    }

    pub fn export_row(&self) -> Vec<String> {
        vec![
            self.invoice_number.clone(),
            self.invoice_date.clone(),
            self.employee_name.clone(),
            self.employee_id.clone(),
            self.facility_id.clone(),
            self.facility_name.clone(),
            self.cost_center.clone(),
            self.cost_center_description.clone(),
            self.shift_id.clone(),
            self.shift_date.clone(),
            self.shift_start.clone(),
            self.shift_end.clone(),
            self.hours.to_string(),
            self.pay_type.clone(),
            self.pay_rate.to_string(),
            self.total_staff_pay.to_string(),
            self.fee_rate.to_string(),
            self.total_flex_fee.to_string(),
            self.total_shift_fee.to_string(),
            self.incentive.clone(),
        ]
    }
}

pub const INVOICE_FEED_COLUMNS: [&str; 15] = [
    "invoice_number",
    "invoice_date",
    "line_number",
    "worker_id",
    "worker_name",
    "location_id",
    "shift_id",
    "shift_date",
    "start_time",
    "end_time",
    "item_code",
    "quantity",
    "unit_price",
    "fee_amount",
    "line_total",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceFeedRecord {
    pub invoice_number: String,
    pub invoice_date: String,
    pub line_number: usize,
    pub worker_id: String,
    pub worker_name: String,
    pub location_id: String,
    pub shift_id: String,
    pub shift_date: String,
    pub start_time: String,
    pub end_time: String,
    pub item_code: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub fee_amount: Decimal,
    pub line_total: Decimal,
}

impl InvoiceFeedRecord {
    fn project(
        line: &InvoiceLine,
        line_number: usize,
        invoice_number: &str,
        invoice_date: NaiveDate,
    ) -> Self {
        Self {
            invoice_number: invoice_number.to_string(),
            invoice_date: invoice_date.format("%Y-%m-%d").to_string(),
            line_number,
            worker_id: line.employee_id.clone(),
            worker_name: line.employee_name.clone(),
            location_id: line.facility_id.clone(),
            shift_id: line.shift_id.clone(),
            shift_date: line.shift_date.clone(),
            start_time: line.shift_start.clone(),
            end_time: line.shift_end.clone(),
            item_code: line.pay_type.clone(),
            quantity: line.hours,
            unit_price: line.pay_rate,
            fee_amount: line.flex_fee,
            line_total: line.shift_total,
        }
    }

    pub fn export_row(&self) -> Vec<String> {
        vec![
            self.invoice_number.clone(),
            self.invoice_date.clone(),
            self.line_number.to_string(),
            self.worker_id.clone(),
            self.worker_name.clone(),
            self.location_id.clone(),
            self.shift_id.clone(),
            self.shift_date.clone(),
            self.start_time.clone(),
            self.end_time.clone(),
            self.item_code.clone(),
            self.quantity.to_string(),
            self.unit_price.to_string(),
            self.fee_amount.to_string(),
            self.line_total.to_string(),
        ]
    }
}

pub const PRODUCTIVITY_COLUMNS: [&str; 8] = [
    "Invoice Number",
    "Facility ID",
    "Cost Center",
    "Cost Center Description",
    "Pay Type",
    "Shifts",
    "Hours",
    "Amount",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductivityRecord {
    #[serde(rename = "Invoice Number")]
    pub invoice_number: String,
    #[serde(rename = "Facility ID")]
    pub facility_id: String,
    #[serde(rename = "Cost Center")]
    pub cost_center: String,
    #[serde(rename = "Cost Center Description")]
    pub cost_center_description: String,
    #[serde(rename = "Pay Type")]
    pub pay_type: String,
    #[serde(rename = "Shifts")]
    pub shifts: usize,
    #[serde(rename = "Hours")]
    pub hours: Decimal,
    #[serde(rename = "Amount")]
    pub amount: Decimal,
}

impl ProductivityRecord {
    /// Hours and billed amount per (facility, cost center, pay type), ordered
    /// by that key.
    fn aggregate(lines: &[InvoiceLine], invoice_number: &str) -> Vec<Self> {
        let mut buckets: BTreeMap<(String, String, String), ProductivityRecord> = BTreeMap::new();
        for line in lines {
            let key = (
                line.facility_id.clone(),
                line.cost_center.clone(),
                line.pay_type.clone(),
            );
            let bucket = buckets.entry(key).or_insert_with(|| ProductivityRecord {
                invoice_number: invoice_number.to_string(),
                facility_id: line.facility_id.clone(),
                cost_center: line.cost_center.clone(),
                cost_center_description: line.cost_center_description.clone(),
                pay_type: line.pay_type.clone(),
                shifts: 0,
                hours: Decimal::ZERO,
                amount: Decimal::ZERO,
            });
            bucket.shifts += 1;
            bucket.hours += line.hours;
            bucket.amount += line.shift_total;
        }
        buckets
            .into_values()
            .map(|mut record| {
                record.hours = cents(record.hours);
                record.amount = cents(record.amount);
                record
            })
            .collect()
    }

    pub fn export_row(&self) -> Vec<String> {
        vec![
            self.invoice_number.clone(),
            self.facility_id.clone(),
            self.cost_center.clone(),
            self.cost_center_description.clone(),
            self.pay_type.clone(),
            self.shifts.to_string(),
            self.hours.to_string(),
            self.amount.to_string(),
        ]
    }
}

// --- Groups & Run Results ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InvoiceGroupKind {
    Main,
    Secondary,
}

impl InvoiceGroupKind {
    /// File-name stem used when a group is written to disk.
    pub fn label(&self) -> &'static str {
        match self {
            InvoiceGroupKind::Main => "main",
            InvoiceGroupKind::Secondary => "micro",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceGroup {
    pub kind: InvoiceGroupKind,
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub lines: Vec<InvoiceLine>,
    pub details: Vec<InvoiceDetailRecord>,
    pub feed: Vec<InvoiceFeedRecord>,
    pub productivity: Vec<ProductivityRecord>,
    pub total_amount: Decimal,
}

impl InvoiceGroup {
    fn build(
        kind: InvoiceGroupKind,
        invoice_number: String,
        invoice_date: NaiveDate,
        lines: Vec<InvoiceLine>,
    ) -> Self {
        let details = lines
            .iter()
            .map(|l| InvoiceDetailRecord::project(l, &invoice_number, invoice_date))
            .collect();
        let feed = lines
            .iter()
            .enumerate()
            .map(|(i, l)| InvoiceFeedRecord::project(l, i + 1, &invoice_number, invoice_date))
            .collect();
        let productivity = ProductivityRecord::aggregate(&lines, &invoice_number);
        let total_amount = cents(lines.iter().map(|l| l.shift_total).sum());

        Self {
            kind,
            invoice_number,
            invoice_date,
            lines,
            details,
            feed,
            productivity,
            total_amount,
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InvoiceSummary {
    pub input_records: usize,
    pub already_invoiced: usize,
    pub duplicates_in_batch: usize,
    pub surviving: usize,
    pub main_count: usize,
    pub secondary_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceRun {
    pub main: InvoiceGroup,
    pub secondary: InvoiceGroup,
    pub summary: InvoiceSummary,
    pub next_main_sequence: u32,
    pub next_secondary_sequence: u32,
}

// --- Transformer ---

pub struct InvoiceTransformer {
    config: InvoiceConfig,
}

impl InvoiceTransformer {
    pub fn new(config: InvoiceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InvoiceConfig {
        &self.config
    }

    pub fn is_secondary(&self, facility_id: &str) -> bool {
        self.config
            .secondary_facility_ids
            .contains(facility_id.trim())
    }

    pub fn run(&self, inputs: &InvoiceInputs) -> InvoiceRun {
        let billed: HashSet<DedupKey> = inputs
            .history
            .iter()
            .map(|row| DedupKey::from_history(&InvoiceHistoryRecord::from_row(row)))
            .collect();
        debug!("Loaded {} previously invoiced shift keys", billed.len());

        let mut summary = InvoiceSummary::default();
        let mut seen: HashSet<BatchKey> = HashSet::new();
        let mut main_lines = Vec::new();
        let mut secondary_lines = Vec::new();

        for record in inputs.periods.iter().flatten() {
            summary.input_records += 1;
            let key = DedupKey::from_payroll(record);
            if billed.contains(&key) {
                debug!(
                    "Skipping already invoiced shift: {} on {} ({} h, {})",
                    key.employee_name, key.shift_date_key, key.hours, key.pay_type
                );
                summary.already_invoiced += 1;
                continue;
            }
            if !seen.insert(BatchKey::from_payroll(record)) {
                debug!("Skipping repeated timecard {} in batch", record.timecard_id);
                summary.duplicates_in_batch += 1;
                continue;
            }

            let line = InvoiceLine::price(record, &self.config.fees);
            if self.is_secondary(&line.facility_id) {
                secondary_lines.push(line);
            } else {
                main_lines.push(line);
            }
        }

        let numbering = &self.config.numbering;
        let main = InvoiceGroup::build(
            InvoiceGroupKind::Main,
            format_invoice_number(
                &numbering.main_prefix,
                inputs.invoice_date,
                numbering.next_main,
            ),
            inputs.invoice_date,
            main_lines,
        );
        let secondary = InvoiceGroup::build(
            InvoiceGroupKind::Secondary,
            format_invoice_number(
                &numbering.secondary_prefix,
                inputs.invoice_date,
                numbering.next_secondary,
            ),
            inputs.invoice_date,
            secondary_lines,
        );

        summary.main_count = main.len();
        summary.secondary_count = secondary.len();
        summary.surviving = summary.main_count + summary.secondary_count;

        info!(
            "Invoice run complete: {} of {} records billed ({} already invoiced, {} duplicates in batch); {} main on {} ({}), {} secondary on {} ({})",
            summary.surviving,
            summary.input_records,
            summary.already_invoiced,
            summary.duplicates_in_batch,
            summary.main_count,
            main.invoice_number,
            main.total_amount,
            summary.secondary_count,
            secondary.invoice_number,
            secondary.total_amount
        );

        InvoiceRun {
            main,
            secondary,
            summary,
            next_main_sequence: numbering.next_main.saturating_add(1),
            next_secondary_sequence: numbering.next_secondary.saturating_add(1),
        }
    }
}
