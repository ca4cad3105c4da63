// src/config.rs
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::incentives::{IncentivePolicy, RateTable};
use crate::invoice::{FeeSchedule, InvoiceNumbering};
use crate::{io_context, AppError};

pub const DEFAULT_CACHE_DIR: &str = "./rule_cache";
pub const DEFAULT_CACHE_DURATION_SECS: u64 = 15 * 60;
pub const DEFAULT_LUNCH_DEDUCTION: Decimal = dec!(0.5);

// --- Process Configuration ---

/// Process-level settings, read from `STOGO_*` environment variables
/// (a `.env` file is honoured).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    pub rule_store_url: Option<String>,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_cache_duration")]
    pub cache_duration_secs: u64,
    /// Local network configuration used when no rule store is configured.
    pub network_config: Option<PathBuf>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_DIR)
}

fn default_cache_duration() -> u64 {
    DEFAULT_CACHE_DURATION_SECS
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv::dotenv().ok();
        envy::prefixed("STOGO_")
            .from_env::<AppConfig>()
            .map_err(|e| AppError::Config(format!("Invalid STOGO_* environment: {}", e)))
    }

    /// TLS is only enabled when both halves of the key pair are configured.
    pub fn tls_paths(&self) -> Option<(&Path, &Path)> {
        match (&self.cert_path, &self.key_path) {
            (Some(cert), Some(key)) => Some((cert.as_path(), key.as_path())),
            _ => None,
        }
    }
}

// --- Pipeline Configuration ---

/// Everything one network's transform runs need. Each run receives its own
/// copy; nothing here is shared process state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub network: String,
    pub payroll: PayrollConfig,
    pub invoice: InvoiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayrollConfig {
    #[serde(default = "default_lunch_deduction")]
    pub lunch_deduction: Decimal,
    pub rates: RateTable,
    #[serde(default)]
    pub incentives: IncentivePolicy,
    /// Two-letter facility-type prefix carried by internal person ids.
    #[serde(default)]
    pub id_prefix: String,
    #[serde(default)]
    pub approver: String,
}

fn default_lunch_deduction() -> Decimal {
    DEFAULT_LUNCH_DEDUCTION
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceConfig {
    pub fees: FeeSchedule,
    /// Canonical facility ids invoiced as the separate secondary ("micro") batch.
    #[serde(default)]
    pub secondary_facility_ids: HashSet<String>,
    #[serde(default)]
    pub numbering: InvoiceNumbering,
}

pub fn load_network_config<P: AsRef<Path>>(path: P) -> Result<NetworkConfig, AppError> {
    let path_ref = path.as_ref();
    debug!("Attempting to load network configuration from: {:?}", path_ref);
    let contents = fs::read_to_string(path_ref)
        .map_err(|e| io_context(e, format!("Failed to read config file {:?}", path_ref)))?;
    let config: NetworkConfig = serde_json::from_str(&contents).map_err(|e| {
        AppError::Config(format!(
            "Failed to parse network config {:?}: {}",
            path_ref, e
        ))
    })?;
    info!(
        "Loaded configuration for network '{}' ({} incentive rules, {} fee overrides)",
        config.network,
        config.payroll.incentives.rules.len(),
        config.invoice.fees.rates.len()
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incentives::ShiftType;

    const SAMPLE: &str = r#"{
        "network": "cedar",
        "payroll": {
            "rates": {
                "day": { "rate": "58", "pay_code": "Day Rate" },
                "night": { "rate": "63", "pay_code": "Night Rate" }
            },
            "incentives": {
                "enabled": true,
                "expires_on": "2025-12-31",
                "rules": [{
                    "facility_code": "100402",
                    "cost_centers": ["9343"],
                    "shift_type": "Night",
                    "hours": { "start": 19, "end": 7 },
                    "amount": "10",
                    "description": "Cedar Crest night incentive"
                }]
            },
            "id_prefix": "BH"
        },
        "invoice": {
            "fees": { "default_rate": "8.50", "rates": { "TN-CC": "9.25" } },
            "secondary_facility_ids": ["TN-MH1"]
        }
    }"#;

    #[test]
    fn test_parse_network_config_with_defaults() {
        let config: NetworkConfig = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(config.network, "cedar");
        assert_eq!(config.payroll.lunch_deduction, dec!(0.5));
        assert_eq!(config.payroll.rates.night.rate, dec!(63));
        assert_eq!(config.payroll.approver, "");

        let rule = &config.payroll.incentives.rules[0];
        assert_eq!(rule.shift_type, Some(ShiftType::Night));
        assert!(rule.days.is_none());
        assert_eq!(rule.amount, dec!(10));

        assert_eq!(config.invoice.fees.rate_for("TN-CC"), dec!(9.25));
        assert_eq!(config.invoice.fees.rate_for("TN-XX"), dec!(8.50));
        assert!(config.invoice.secondary_facility_ids.contains("TN-MH1"));
        assert_eq!(config.invoice.numbering.next_main, 1);
    }

    #[test]
    fn test_example_config_file_loads() {
        let config = load_network_config(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/config/network.example.json"
        ))
        .unwrap();
        let weekend = &config.payroll.incentives.rules[1];
        assert_eq!(
            weekend.days,
            Some(vec![chrono::Weekday::Sat, chrono::Weekday::Sun])
        );
        assert_eq!(config.invoice.numbering.secondary_prefix, "MIC");
    }

    #[test]
    fn test_out_of_range_incentive_hours_rejected() {
        let misconfigured = SAMPLE.replace(r#""end": 7"#, r#""end": 24"#);
        let result: Result<NetworkConfig, _> = serde_json::from_str(&misconfigured);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_network_config_missing_file() {
        let result = load_network_config("./definitely_missing_network_config.json");
        assert!(matches!(result, Err(AppError::Io { .. })));
    }

    #[test]
    fn test_tls_requires_both_paths() {
        let mut config = AppConfig {
            host: default_host(),
            port: default_port(),
            cert_path: Some(PathBuf::from("cert.pem")),
            key_path: None,
            rule_store_url: None,
            cache_dir: default_cache_dir(),
            cache_duration_secs: default_cache_duration(),
            network_config: None,
        };
        assert!(config.tls_paths().is_none());
        config.key_path = Some(PathBuf::from("key.pem"));
        assert!(config.tls_paths().is_some());
    }
}
