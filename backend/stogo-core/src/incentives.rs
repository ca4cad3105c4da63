// src/incentives.rs
//! Shift classification, base pay rates, and the ordered incentive rules.
//!
//! Rules are evaluated strictly in the order supplied by configuration and
//! the first matching rule is the only one applied.

use chrono::{NaiveDate, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::records::strip_leading_zeros;
use crate::temporal::{DateField, NormalizedDate};

// --- Shift Classification ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShiftType {
    Day,
    Night,
}

impl ShiftType {
    /// A shift is Night exactly when it clocks out on a different calendar
    /// date than it clocked in.
    pub fn classify(clock_in: &DateField, clock_out: &DateField) -> Self {
        if clock_in.key() != clock_out.key() {
            ShiftType::Night
        } else {
            ShiftType::Day
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateEntry {
    pub rate: Decimal,
    pub pay_code: String,
}

/// Two-entry base rate lookup, configured per network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    pub day: RateEntry,
    pub night: RateEntry,
}

impl RateTable {
    pub fn entry(&self, shift_type: ShiftType) -> &RateEntry {
        match shift_type {
            ShiftType::Day => &self.day,
            ShiftType::Night => &self.night,
        }
    }
}

// --- Incentive Rules ---

/// Hour-of-day window, inclusive at both ends. `end < start` denotes a window
/// that wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "HourBounds")]
pub struct HourRange {
    pub start: u32,
    pub end: u32,
}

#[derive(Deserialize)]
struct HourBounds {
    start: u32,
    end: u32,
}

impl TryFrom<HourBounds> for HourRange {
    type Error = String;

    fn try_from(bounds: HourBounds) -> Result<Self, Self::Error> {
        if bounds.start > 23 || bounds.end > 23 {
            return Err(format!(
                "hour window {{start: {}, end: {}}} must use hours 0-23",
                bounds.start, bounds.end
            ));
        }
        Ok(HourRange {
            start: bounds.start,
            end: bounds.end,
        })
    }
}

impl HourRange {
    pub fn wraps(&self) -> bool {
        self.end < self.start
    }

    pub fn contains(&self, hour: u32) -> bool {
        if self.wraps() {
            hour >= self.start || hour <= self.end
        } else {
            self.start <= hour && hour <= self.end
        }
    }

    /// Treats both the window and the shift as arcs on the 24-hour clock: they
    /// overlap when the window holds either shift endpoint, or the shift's own
    /// arc holds the window's start.
    pub fn overlaps_shift(&self, start_hour: u32, end_hour: u32) -> bool {
        let shift = HourRange {
            start: start_hour,
            end: end_hour,
        };
        self.contains(start_hour) || self.contains(end_hour) || shift.contains(self.start)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncentiveRule {
    pub facility_code: String,
    pub cost_centers: Vec<String>,
    #[serde(default)]
    pub days: Option<Vec<Weekday>>,
    #[serde(default)]
    pub shift_type: Option<ShiftType>,
    #[serde(default)]
    pub hours: Option<HourRange>,
    pub amount: Decimal,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncentivePolicy {
    #[serde(default)]
    pub enabled: bool,
    /// Last shift date (inclusive) that may earn an incentive.
    #[serde(default)]
    pub expires_on: Option<NaiveDate>,
    #[serde(default)]
    pub rules: Vec<IncentiveRule>,
}

impl IncentivePolicy {
    pub fn applies_on(&self, shift_date: Option<NormalizedDate>) -> bool {
        if !self.enabled || self.rules.is_empty() {
            return false;
        }
        match (shift_date, self.expires_on) {
            (_, None) => shift_date.is_some(),
            (Some(date), Some(expiry)) => date.naive() <= expiry,
            (None, Some(_)) => false,
        }
    }
}

/// What a rule is matched against, derived from one timecard.
#[derive(Debug, Clone)]
pub struct IncentiveContext<'a> {
    pub facility_code: &'a str,
    pub cost_center: &'a str,
    pub shift_type: ShiftType,
    pub weekday: Option<Weekday>,
    pub start_hour: Option<u32>,
    pub end_hour: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncentiveAward {
    pub rule_index: usize,
    pub amount: Decimal,
    pub description: String,
}

impl IncentiveRule {
    pub fn matches(&self, ctx: &IncentiveContext<'_>) -> bool {
        if self.facility_code.trim() != ctx.facility_code.trim() {
            return false;
        }
        let cost_center = strip_leading_zeros(ctx.cost_center);
        if !self
            .cost_centers
            .iter()
            .any(|cc| strip_leading_zeros(cc) == cost_center)
        {
            return false;
        }
        if let Some(required) = self.shift_type {
            if required != ctx.shift_type {
                return false;
            }
        }
        if let Some(days) = &self.days {
            match ctx.weekday {
                Some(weekday) if days.contains(&weekday) => {}
                _ => return false,
            }
        }
        if let Some(window) = &self.hours {
            match (ctx.start_hour, ctx.end_hour) {
                (Some(start), Some(end)) if window.overlaps_shift(start, end) => {}
                _ => return false,
            }
        }
        true
    }
}

/// First matching rule wins; the order of `rules` is part of the contract.
pub fn evaluate_incentives(
    rules: &[IncentiveRule],
    ctx: &IncentiveContext<'_>,
) -> Option<IncentiveAward> {
    rules
        .iter()
        .enumerate()
        .find(|(_, rule)| rule.matches(ctx))
        .map(|(rule_index, rule)| IncentiveAward {
            rule_index,
            amount: rule.amount,
            description: rule.description.clone(),
        })
}

// --- Rate Decision ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateDecision {
    pub shift_type: ShiftType,
    pub pay_code: String,
    pub base_rate: Decimal,
    pub incentive: Option<IncentiveAward>,
    pub pay_rate: Decimal,
}

pub fn decide_rate(
    rates: &RateTable,
    policy: &IncentivePolicy,
    shift_date: Option<NormalizedDate>,
    ctx: &IncentiveContext<'_>,
) -> RateDecision {
    let entry = rates.entry(ctx.shift_type);
    let incentive = if policy.applies_on(shift_date) {
        evaluate_incentives(&policy.rules, ctx)
    } else {
        None
    };
    if let Some(award) = &incentive {
        debug!(
            "Incentive rule #{} ('{}') matched facility={} cost_center={}",
            award.rule_index, award.description, ctx.facility_code, ctx.cost_center
        );
    }
    let pay_rate = entry.rate + incentive.as_ref().map_or(Decimal::ZERO, |a| a.amount);
    RateDecision {
        shift_type: ctx.shift_type,
        pay_code: entry.pay_code.clone(),
        base_rate: entry.rate,
        incentive,
        pay_rate,
    }
}
