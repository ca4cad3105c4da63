// src/shift_matching.rs
//! Correlates timecard punches with the externally supplied shift schedule.

use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::crosswalk::strip_id_prefix;
use crate::records::ShiftRecord;
use crate::temporal::normalize_date;

/// Identifier equivalence rules, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchRule {
    Exact,
    PrefixStripped,
    PrefixAddedToEmployee,
    PrefixAddedToPerson,
}

const RULE_ORDER: [MatchRule; 4] = [
    MatchRule::Exact,
    MatchRule::PrefixStripped,
    MatchRule::PrefixAddedToEmployee,
    MatchRule::PrefixAddedToPerson,
];

impl MatchRule {
    fn matches(self, employee_id: &str, person_id: &str, prefix: &str) -> bool {
        match self {
            MatchRule::Exact => employee_id == person_id,
            MatchRule::PrefixStripped => {
                strip_id_prefix(employee_id, prefix) == strip_id_prefix(person_id, prefix)
            }
            MatchRule::PrefixAddedToEmployee => {
                format!("{}{}", prefix, employee_id).eq_ignore_ascii_case(person_id)
            }
            MatchRule::PrefixAddedToPerson => {
                format!("{}{}", prefix, person_id).eq_ignore_ascii_case(employee_id)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftMatch {
    pub shift_id: String,
    pub person_name: String,
    pub rule: MatchRule,
}

#[derive(Debug, Clone)]
struct IndexedShift {
    person_id: String,
    person_name: String,
    shift_id: String,
}

/// Shift schedule bucketed by canonical start-date key.
#[derive(Debug, Clone, Default)]
pub struct ShiftIndex {
    by_date: HashMap<String, Vec<IndexedShift>>,
}

impl ShiftIndex {
    pub fn build(shifts: &[ShiftRecord]) -> Self {
        let mut by_date: HashMap<String, Vec<IndexedShift>> = HashMap::new();
        for shift in shifts {
            let person_id = shift.person_id.trim();
            if person_id.is_empty() {
                continue;
            }
            by_date
                .entry(normalize_date(&shift.start).key())
                .or_default()
                .push(IndexedShift {
                    person_id: person_id.to_string(),
                    person_name: shift.person_name.trim().to_string(),
                    shift_id: shift.shift_id.trim().to_string(),
                });
        }
        debug!(
            "Shift index built: {} shifts across {} dates",
            shifts.len(),
            by_date.len()
        );
        Self { by_date }
    }

    /// Finds the shift for `employee_id` starting on `date_key`. Rules are tried
    /// in order across the whole day's shifts before moving to the next rule.
    pub fn find(&self, employee_id: &str, date_key: &str, prefix: &str) -> Option<ShiftMatch> {
        let employee_id = employee_id.trim();
        if employee_id.is_empty() {
            return None;
        }
        let candidates = self.by_date.get(date_key)?;

        for rule in RULE_ORDER {
            if rule != MatchRule::Exact && prefix.is_empty() {
                break;
            }
            if let Some(shift) = candidates
                .iter()
                .find(|s| rule.matches(employee_id, &s.person_id, prefix))
            {
                return Some(ShiftMatch {
                    shift_id: shift.shift_id.clone(),
                    person_name: shift.person_name.clone(),
                    rule,
                });
            }
        }
        None
    }
}
