// src/crosswalk.rs
//! Employee and facility identifier resolution.

use std::collections::HashMap;
use tracing::{debug, warn};

use crate::records::{CrosswalkEntry, FacilityCrosswalkEntry};

/// External employee id → internal employee id, built once per run.
#[derive(Debug, Clone, Default)]
pub struct EmployeeCrosswalk {
    by_external_id: HashMap<String, String>,
}

impl EmployeeCrosswalk {
    pub fn from_entries(entries: &[CrosswalkEntry]) -> Self {
        let mut by_external_id = HashMap::with_capacity(entries.len());
        let mut inactive = 0usize;

        for entry in entries {
            if !entry.active {
                inactive += 1;
                continue;
            }
            let external_id = entry.external_id.trim();
            let internal_id = entry.internal_id.trim();
            if external_id.is_empty() || internal_id.is_empty() {
                continue;
            }
            match by_external_id.get(external_id) {
                Some(existing) if existing != internal_id => {
                    warn!(
                        "Duplicate crosswalk entry for EEID={}: keeping {}, ignoring {}",
                        external_id, existing, internal_id
                    );
                }
                Some(_) => {}
                None => {
                    by_external_id.insert(external_id.to_string(), internal_id.to_string());
                }
            }
        }

        debug!(
            "Employee crosswalk built: {} mappings, {} inactive entries skipped",
            by_external_id.len(),
            inactive
        );
        Self { by_external_id }
    }

    /// Exact match on the external id. An unmatched id resolves to an empty
    /// string; callers filter on that.
    pub fn resolve(&self, external_id: &str) -> String {
        self.by_external_id
            .get(external_id.trim())
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_external_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_external_id.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FacilityResolution {
    Mapped(String),
    /// No crosswalk entry; the raw company code stands in as the facility id.
    Fallback(String),
}

impl FacilityResolution {
    pub fn facility_id(&self) -> &str {
        match self {
            FacilityResolution::Mapped(id) | FacilityResolution::Fallback(id) => id,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, FacilityResolution::Fallback(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct FacilityCrosswalk {
    by_code: HashMap<String, String>,
}

impl FacilityCrosswalk {
    pub fn from_entries(entries: &[FacilityCrosswalkEntry]) -> Self {
        let by_code = entries
            .iter()
            .filter(|e| !e.facility_code.trim().is_empty() && !e.facility_id.trim().is_empty())
            .fold(HashMap::new(), |mut map, e| {
                map.entry(e.facility_code.trim().to_string())
                    .or_insert_with(|| e.facility_id.trim().to_string());
                map
            });
        Self { by_code }
    }

    pub fn resolve(&self, company_code: &str) -> FacilityResolution {
        let code = company_code.trim();
        match self.by_code.get(code) {
            Some(id) => FacilityResolution::Mapped(id.clone()),
            None => FacilityResolution::Fallback(code.to_string()),
        }
    }
}

// --- Prefix Helpers ---

/// Strips a leading facility-type prefix (case-insensitive). Ids without the
/// prefix, or an empty prefix, come back unchanged.
pub fn strip_id_prefix<'a>(id: &'a str, prefix: &str) -> &'a str {
    if prefix.is_empty() {
        return id;
    }
    match id.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => &id[prefix.len()..],
        _ => id,
    }
}

pub fn has_id_prefix(id: &str, prefix: &str) -> bool {
    !prefix.is_empty() && strip_id_prefix(id, prefix).len() != id.len()
}
