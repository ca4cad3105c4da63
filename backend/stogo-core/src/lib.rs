// src/lib.rs
//! Timecard-to-payroll and payroll-to-invoice transformation pipeline.
//!
//! Every transform is an in-memory, single-pass batch over pre-parsed rows.
//! External data (crosswalks, shift schedules, rule configuration, invoicing
//! history) is loaded by the caller before a run and treated as read-only.

use axum::http::StatusCode as AxumStatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

pub mod config;
pub mod crosswalk;
pub mod csv_io;
pub mod incentives;
pub mod invoice;
pub mod payroll;
pub mod records;
pub mod rule_store;
pub mod server;
pub mod shift_matching;
pub mod temporal;

#[cfg(test)]
mod payroll_tests;

pub use config::{AppConfig, InvoiceConfig, NetworkConfig, PayrollConfig};
pub use invoice::{InvoiceInputs, InvoiceRun, InvoiceTransformer};
pub use payroll::{PayrollInputs, PayrollOutputRecord, PayrollRun, PayrollTransformer};
pub use records::{FieldValue, Row};
pub use rule_store::{HttpRuleStore, RuleStore, RuleStoreError, StaticRuleStore};

// --- Error Handling ---

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON processing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Rule store error: {0}")]
    RuleStore(#[from] RuleStoreError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),
}

// Helper to create context-aware IO errors
pub(crate) fn io_context<E: Into<std::io::Error>, S: Into<String>>(
    source: E,
    context: S,
) -> AppError {
    AppError::Io {
        source: source.into(),
        context: context.into(),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("Error occurred: {:?}", self);
        let (status_code, error_message) = match &self {
            AppError::BadRequest(msg) => (AxumStatusCode::BAD_REQUEST, msg.clone()),
            AppError::Json(e) => (
                AxumStatusCode::BAD_REQUEST,
                format!("Malformed JSON payload: {}", e),
            ),
            AppError::RuleStore(RuleStoreError::NotFound { client, category }) => (
                AxumStatusCode::NOT_FOUND,
                format!("No '{}' rules configured for client '{}'", category, client),
            ),
            AppError::RuleStore(_) => (
                AxumStatusCode::BAD_GATEWAY,
                "Rule configuration store request failed.".to_string(),
            ),
            AppError::Config(_) => (
                AxumStatusCode::INTERNAL_SERVER_ERROR,
                "Server configuration error.".to_string(),
            ),
            AppError::Io { .. } | AppError::Csv(_) | AppError::TlsConfig(_) => (
                AxumStatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error. Check logs.".to_string(),
            ),
        };

        (status_code, Json(json!({ "error": error_message }))).into_response()
    }
}
