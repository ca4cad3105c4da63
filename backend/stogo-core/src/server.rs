// src/server.rs
//! HTTP surface: one independent transform run per request.

use axum::{extract::State, routing::get, routing::post, Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::{load_network_config as load_config_file, AppConfig, NetworkConfig};
use crate::invoice::{InvoiceInputs, InvoiceRun, InvoiceTransformer};
use crate::payroll::{PayrollInputs, PayrollRun, PayrollTransformer};
use crate::rule_store::{
    load_network_config, HttpRuleStore, HttpRuleStoreConfig, RuleStore, StaticRuleStore,
};
use crate::{io_context, AppError, InvoiceConfig, PayrollConfig};

// --- Shared Application State ---

#[derive(Clone, Default)]
pub struct AppState {
    rule_store: Option<Arc<dyn RuleStore>>,
}

impl AppState {
    pub fn new(rule_store: Option<Arc<dyn RuleStore>>) -> Self {
        Self { rule_store }
    }

    /// Remote rule store when a URL is configured, otherwise the local
    /// network config file if one is given.
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        if let Some(url) = &config.rule_store_url {
            let store = HttpRuleStore::new(HttpRuleStoreConfig {
                base_url: url.clone(),
                cache_dir: config.cache_dir.clone(),
                cache_duration_secs: config.cache_duration_secs,
            })?;
            info!("Using rule store at {}", url);
            return Ok(Self::new(Some(Arc::new(store))));
        }
        if let Some(path) = &config.network_config {
            let network = load_config_file(path)?;
            info!(
                "Serving rules for '{}' from {}",
                network.network,
                path.display()
            );
            return Ok(Self::new(Some(Arc::new(StaticRuleStore::from_network_config(
                &network,
            )?))));
        }
        info!("No rule store configured; requests must carry inline configuration");
        Ok(Self::default())
    }

    async fn network_config(&self, client: &str) -> Result<NetworkConfig, AppError> {
        let store = self.rule_store.as_ref().ok_or_else(|| {
            AppError::BadRequest(format!(
                "No rule store configured to resolve client '{}'; send an inline config",
                client
            ))
        })?;
        Ok(load_network_config(store.as_ref(), client).await?)
    }
}

// --- Request Bodies ---

#[derive(Debug, Deserialize)]
pub struct PayrollRequest {
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub config: Option<PayrollConfig>,
    pub inputs: PayrollInputs,
}

#[derive(Debug, Deserialize)]
pub struct InvoiceRequest {
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub config: Option<InvoiceConfig>,
    pub inputs: InvoiceInputs,
}

// --- Routes ---

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/payroll/generate", post(handle_generate_payroll))
        .route("/invoice/generate", post(handle_generate_invoice));

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn handle_generate_payroll(
    State(state): State<AppState>,
    Json(request): Json<PayrollRequest>,
) -> Result<Json<PayrollRun>, AppError> {
    let config = match (request.config, request.client.as_deref()) {
        (Some(config), _) => config,
        (None, Some(client)) => state.network_config(client).await?.payroll,
        (None, None) => {
            return Err(AppError::BadRequest(
                "Request must include either 'config' or 'client'".to_string(),
            ))
        }
    };
    info!(
        "Generating payroll for {} timecard rows (pay period containing {})",
        request.inputs.timecards.len(),
        request.inputs.pay_period_start
    );
    Ok(Json(PayrollTransformer::new(config).run(&request.inputs)))
}

async fn handle_generate_invoice(
    State(state): State<AppState>,
    Json(request): Json<InvoiceRequest>,
) -> Result<Json<InvoiceRun>, AppError> {
    let config = match (request.config, request.client.as_deref()) {
        (Some(config), _) => config,
        (None, Some(client)) => state.network_config(client).await?.invoice,
        (None, None) => {
            return Err(AppError::BadRequest(
                "Request must include either 'config' or 'client'".to_string(),
            ))
        }
    };
    info!(
        "Generating invoices from {} payroll periods dated {}",
        request.inputs.periods.len(),
        request.inputs.invoice_date
    );
    Ok(Json(InvoiceTransformer::new(config).run(&request.inputs)))
}

// --- Server ---

pub async fn run_server(config: &AppConfig, state: AppState) -> Result<(), AppError> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| AppError::Config(format!("Invalid listen address: {}", e)))?;
    let app = build_router(state);

    match config.tls_paths() {
        Some((cert_path, key_path)) => {
            let tls_config = RustlsConfig::from_pem_file(cert_path, key_path)
                .await
                .map_err(|e| {
                    let err_msg = format!("Failed to load TLS cert/key: {}", e);
                    error!("{}", err_msg);
                    AppError::TlsConfig(err_msg)
                })?;
            info!("Starting server on https://{}", addr);
            axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await
                .map_err(|e| io_context(e, "HTTPS server terminated"))
        }
        None => {
            info!("Starting server on http://{}", addr);
            axum_server::bind(addr)
                .serve(app.into_make_service())
                .await
                .map_err(|e| io_context(e, "HTTP server terminated"))
        }
    }
}
