// src/rule_store.rs
//! Per-client rule configuration, fetched from the external configuration
//! store and cached on disk.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::{InvoiceConfig, NetworkConfig, PayrollConfig};

pub const PAYROLL_CATEGORY: &str = "payroll";
pub const INVOICE_CATEGORY: &str = "invoice";

// --- Error Type ---

#[derive(Error, Debug)]
pub enum RuleStoreError {
    #[error("HTTP request failed")]
    Request(#[from] reqwest::Error),

    #[error("JSON processing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    #[error("URL parsing error")]
    UrlParse(#[from] url::ParseError),

    #[error("No '{category}' rules found for client '{client}'")]
    NotFound { client: String, category: String },

    #[error("Rule store API error: Status={status}, Message='{message}'")]
    Api { status: StatusCode, message: String },

    #[error("Invalid '{category}' rules for client '{client}': {message}")]
    InvalidRules {
        client: String,
        category: String,
        message: String,
    },

    #[error("System time error: {0}")]
    Time(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

fn io_context<E: Into<std::io::Error>, S: Into<String>>(source: E, context: S) -> RuleStoreError {
    RuleStoreError::Io {
        source: source.into(),
        context: context.into(),
    }
}

// --- Store Interface ---

#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Raw rule document for one client and category.
    async fn fetch_rules(&self, client: &str, category: &str) -> Result<Value, RuleStoreError>;
}

/// Assembles a client's `NetworkConfig` from its `payroll` and `invoice`
/// rule documents.
pub async fn load_network_config(
    store: &dyn RuleStore,
    client: &str,
) -> Result<NetworkConfig, RuleStoreError> {
    let payroll: PayrollConfig = parse_rules(
        client,
        PAYROLL_CATEGORY,
        store.fetch_rules(client, PAYROLL_CATEGORY).await?,
    )?;
    let invoice: InvoiceConfig = parse_rules(
        client,
        INVOICE_CATEGORY,
        store.fetch_rules(client, INVOICE_CATEGORY).await?,
    )?;
    info!(
        "Loaded rule configuration for client '{}' ({} incentive rules)",
        client,
        payroll.incentives.rules.len()
    );
    Ok(NetworkConfig {
        network: client.to_string(),
        payroll,
        invoice,
    })
}

fn parse_rules<T: serde::de::DeserializeOwned>(
    client: &str,
    category: &str,
    document: Value,
) -> Result<T, RuleStoreError> {
    serde_json::from_value(document).map_err(|e| RuleStoreError::InvalidRules {
        client: client.to_string(),
        category: category.to_string(),
        message: e.to_string(),
    })
}

// --- In-Memory Store ---

/// Fixed rule documents, used for file-based operation and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticRuleStore {
    documents: HashMap<(String, String), Value>,
}

impl StaticRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(mut self, client: &str, category: &str, document: Value) -> Self {
        self.documents
            .insert((client.to_string(), category.to_string()), document);
        self
    }

    pub fn from_network_config(config: &NetworkConfig) -> Result<Self, RuleStoreError> {
        Ok(Self::new()
            .with_rules(
                &config.network,
                PAYROLL_CATEGORY,
                serde_json::to_value(&config.payroll)?,
            )
            .with_rules(
                &config.network,
                INVOICE_CATEGORY,
                serde_json::to_value(&config.invoice)?,
            ))
    }
}

#[async_trait]
impl RuleStore for StaticRuleStore {
    async fn fetch_rules(&self, client: &str, category: &str) -> Result<Value, RuleStoreError> {
        self.documents
            .get(&(client.to_string(), category.to_string()))
            .cloned()
            .ok_or_else(|| RuleStoreError::NotFound {
                client: client.to_string(),
                category: category.to_string(),
            })
    }
}

// --- HTTP Store ---

#[derive(Clone, Debug)]
pub struct HttpRuleStoreConfig {
    pub base_url: String,
    pub cache_dir: PathBuf,
    pub cache_duration_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheMetadata {
    last_updated_unix_secs: u64,
    client: String,
    category: String,
}

impl CacheMetadata {
    fn new(client: &str, category: &str) -> Result<Self, RuleStoreError> {
        Ok(Self {
            last_updated_unix_secs: unix_now()?,
            client: client.to_string(),
            category: category.to_string(),
        })
    }

    fn is_stale(&self, max_age_secs: u64) -> Result<bool, RuleStoreError> {
        let cache_age = unix_now()?.saturating_sub(self.last_updated_unix_secs);
        Ok(cache_age > max_age_secs)
    }
}

fn unix_now() -> Result<u64, RuleStoreError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| RuleStoreError::Time(format!("System clock before UNIX epoch: {}", e)))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedRules {
    metadata: CacheMetadata,
    data: Value,
}

/// Rule store client for `GET {base}/clients/{client}/rules/{category}`.
#[derive(Clone)]
pub struct HttpRuleStore {
    config: HttpRuleStoreConfig,
    base_url: Url,
    http_client: Client,
}

impl HttpRuleStore {
    pub fn new(config: HttpRuleStoreConfig) -> Result<Self, RuleStoreError> {
        let base_url = Url::parse(&config.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(RuleStoreError::Config(format!(
                "Rule store URL '{}' cannot be used as a base URL",
                config.base_url
            )));
        }
        let http_client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        if !config.cache_dir.exists() {
            fs::create_dir_all(&config.cache_dir).map_err(|e| {
                io_context(
                    e,
                    format!("Failed to create cache directory: {:?}", config.cache_dir),
                )
            })?;
        }

        Ok(Self {
            config,
            base_url,
            http_client,
        })
    }

    pub fn rules_url(&self, client: &str, category: &str) -> Result<Url, RuleStoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RuleStoreError::Config("Rule store URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["clients", client, "rules", category]);
        Ok(url)
    }

    // --- Cache ---

    pub fn generate_cache_key(&self, client: &str, category: &str) -> String {
        let safe = |s: &str| s.replace(|c: char| !c.is_ascii_alphanumeric(), "_");
        let raw = format!("rules__{}__{}", client, category);
        let mut key = format!("rules__{}__{}", safe(client), safe(category));

        // Keys are ASCII from here on. Names that lost characters get the
        // hash suffix too, so `café` and `caf_` stay distinct.
        const MAX_KEY_LEN: usize = 100;
        if key.len() > MAX_KEY_LEN || key != raw {
            use sha2::{Digest, Sha256};
            let mut hasher = Sha256::new();
            hasher.update(raw.as_bytes());
            let hash = hasher.finalize();
            key.truncate(MAX_KEY_LEN / 2);
            key = format!("{}_{}", key, hex::encode(&hash[..8]));
        }
        key
    }

    pub fn cache_file_path(&self, cache_key: &str) -> PathBuf {
        self.config.cache_dir.join(format!("{}.json", cache_key))
    }

    fn save_to_cache(
        &self,
        client: &str,
        category: &str,
        data: &Value,
    ) -> Result<(), RuleStoreError> {
        let cache_key = self.generate_cache_key(client, category);
        let cache_path = self.cache_file_path(&cache_key);

        if let Some(parent) = cache_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                io_context(e, format!("Failed to create cache directory: {:?}", parent))
            })?;
        }

        let cached = CachedRules {
            metadata: CacheMetadata::new(client, category)?,
            data: data.clone(),
        };
        let json_string = serde_json::to_string_pretty(&cached)?;

        let mut file = File::create(&cache_path)
            .map_err(|e| io_context(e, format!("Failed to create cache file: {:?}", cache_path)))?;
        file.write_all(json_string.as_bytes()).map_err(|e| {
            io_context(e, format!("Failed to write to cache file: {:?}", cache_path))
        })?;

        debug!("Saved rules to cache for key: {}", cache_key);
        Ok(())
    }

    fn load_from_cache(
        &self,
        client: &str,
        category: &str,
    ) -> Result<Option<Value>, RuleStoreError> {
        let cache_key = self.generate_cache_key(client, category);
        let cache_path = self.cache_file_path(&cache_key);

        if !cache_path.exists() {
            debug!("Cache miss (file not found) for key: {}", cache_key);
            return Ok(None);
        }

        let json_string = fs::read_to_string(&cache_path)
            .map_err(|e| io_context(e, format!("Failed to read cache file: {:?}", cache_path)))?;

        let cached: CachedRules = match serde_json::from_str(&json_string) {
            Ok(data) => data,
            Err(e) => {
                warn!(
                    "Failed to deserialize cache file {:?}: {}. Removing corrupt cache file.",
                    cache_path, e
                );
                if let Err(remove_err) = fs::remove_file(&cache_path) {
                    error!(
                        "Failed to remove corrupt cache file {:?}: {}",
                        cache_path, remove_err
                    );
                }
                return Ok(None);
            }
        };

        if cached.metadata.is_stale(self.config.cache_duration_secs)? {
            debug!("Cache stale for key: {}", cache_key);
            return Ok(None);
        }

        debug!("Cache hit for key: {}", cache_key);
        Ok(Some(cached.data))
    }

    pub fn clear_cache(&self) -> Result<(), RuleStoreError> {
        let cache_dir = &self.config.cache_dir;
        if !cache_dir.exists() {
            return Ok(());
        }
        info!("Clearing rule cache in directory: {:?}", cache_dir);
        let entries = fs::read_dir(cache_dir).map_err(|e| {
            io_context(e, format!("Failed to read cache directory: {:?}", cache_dir))
        })?;
        for entry_result in entries {
            let entry = entry_result.map_err(|e| io_context(e, "Failed to read directory entry"))?;
            let path = entry.path();
            if is_cache_file(&path) {
                fs::remove_file(&path).map_err(|e| {
                    io_context(e, format!("Failed to remove cache file: {:?}", path))
                })?;
            }
        }
        Ok(())
    }

    // --- Remote ---

    async fn fetch_remote(&self, client: &str, category: &str) -> Result<Value, RuleStoreError> {
        let url = self.rules_url(client, category)?;
        debug!("Fetching '{}' rules for client '{}' from {}", category, client, url);

        let resp = self
            .http_client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = resp.status();
        info!("Rule store responded for {}: Status={}", url, status);

        if status == StatusCode::NOT_FOUND {
            return Err(RuleStoreError::NotFound {
                client: client.to_string(),
                category: category.to_string(),
            });
        }
        if !status.is_success() {
            let message = resp
                .text()
                .await
                .unwrap_or_else(|e| format!("Failed to read error body: {}", e));
            error!("Rule store error response: Status={}, Body='{}'", status, message);
            return Err(RuleStoreError::Api { status, message });
        }

        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn is_cache_file(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|ext| ext == "json")
}

#[async_trait]
impl RuleStore for HttpRuleStore {
    async fn fetch_rules(&self, client: &str, category: &str) -> Result<Value, RuleStoreError> {
        match self.load_from_cache(client, category) {
            Ok(Some(cached)) => return Ok(cached),
            Ok(None) => {}
            Err(e) => {
                warn!(
                    "Failed to load '{}' rules for '{}' from cache: {}. Fetching from store.",
                    category, client, e
                );
            }
        }

        let document = self.fetch_remote(client, category).await?;

        if let Err(e) = self.save_to_cache(client, category, &document) {
            error!(
                "Failed to save '{}' rules for '{}' to cache: {}",
                category, client, e
            );
        }
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path as AxumPath, extract::State, routing::get, Json, Router};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn payroll_rules() -> Value {
        json!({
            "rates": {
                "day": { "rate": "58", "pay_code": "Day Rate" },
                "night": { "rate": "63", "pay_code": "Night Rate" }
            },
            "id_prefix": "BH"
        })
    }

    fn invoice_rules() -> Value {
        json!({ "fees": { "default_rate": "8.50" } })
    }

    fn temp_cache_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("stogo_rule_cache_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn create_test_store(base_url: &str, name: &str) -> HttpRuleStore {
        HttpRuleStore::new(HttpRuleStoreConfig {
            base_url: base_url.to_string(),
            cache_dir: temp_cache_dir(name),
            cache_duration_secs: 900,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_static_store_assembles_network_config() {
        let store = StaticRuleStore::new()
            .with_rules("cedar", PAYROLL_CATEGORY, payroll_rules())
            .with_rules("cedar", INVOICE_CATEGORY, invoice_rules());

        let config = load_network_config(&store, "cedar").await.unwrap();
        assert_eq!(config.network, "cedar");
        assert_eq!(config.payroll.id_prefix, "BH");
        assert!(config.invoice.secondary_facility_ids.is_empty());
    }

    #[tokio::test]
    async fn test_missing_category_is_not_found() {
        let store = StaticRuleStore::new().with_rules("cedar", PAYROLL_CATEGORY, payroll_rules());
        let err = load_network_config(&store, "cedar").await.unwrap_err();
        assert!(matches!(
            err,
            RuleStoreError::NotFound { ref category, .. } if category == INVOICE_CATEGORY
        ));
    }

    #[tokio::test]
    async fn test_malformed_rules_are_reported() {
        let store = StaticRuleStore::new()
            .with_rules("cedar", PAYROLL_CATEGORY, json!({ "rates": "none" }))
            .with_rules("cedar", INVOICE_CATEGORY, invoice_rules());
        let err = load_network_config(&store, "cedar").await.unwrap_err();
        assert!(matches!(err, RuleStoreError::InvalidRules { .. }));
    }

    #[tokio::test]
    async fn test_out_of_range_incentive_hours_are_invalid_rules() {
        let mut rules = payroll_rules();
        rules["incentives"] = json!({
            "enabled": true,
            "rules": [{
                "facility_code": "100402",
                "cost_centers": ["9343"],
                "hours": { "start": 19, "end": 24 },
                "amount": "10"
            }]
        });
        let store = StaticRuleStore::new()
            .with_rules("cedar", PAYROLL_CATEGORY, rules)
            .with_rules("cedar", INVOICE_CATEGORY, invoice_rules());
        let err = load_network_config(&store, "cedar").await.unwrap_err();
        assert!(matches!(
            err,
            RuleStoreError::InvalidRules { ref message, .. } if message.contains("hours 0-23")
        ));
    }

    #[test]
    fn test_rules_url_and_cache_key() {
        let store = create_test_store("https://rules.example.com/api/", "url");
        assert_eq!(
            store.rules_url("cedar crest", "payroll").unwrap().as_str(),
            "https://rules.example.com/api/clients/cedar%20crest/rules/payroll"
        );
        assert_eq!(store.generate_cache_key("cedar", "payroll"), "rules__cedar__payroll");

        let long_client = "c".repeat(150);
        let key = store.generate_cache_key(&long_client, "payroll");
        assert!(key.len() < 100);
        assert_ne!(key, store.generate_cache_key(&"d".repeat(150), "payroll"));
    }

    #[test]
    fn test_cache_key_with_multibyte_client_name() {
        let store = create_test_store("http://localhost:1", "multibyte");
        let long_key = store.generate_cache_key(&format!("ab{}", "é".repeat(60)), "payroll");
        assert!(long_key.is_ascii());
        assert!(long_key.len() < 100);

        let accented = store.generate_cache_key("café", "payroll");
        assert!(accented.starts_with("rules__caf___payroll_"));
        assert_ne!(accented, store.generate_cache_key("caf_", "payroll"));
    }

    #[test]
    fn test_cache_round_trip_and_corrupt_file_removed() {
        let store = create_test_store("http://localhost:1", "corrupt");
        store.save_to_cache("cedar", "payroll", &payroll_rules()).unwrap();
        assert_eq!(
            store.load_from_cache("cedar", "payroll").unwrap(),
            Some(payroll_rules())
        );

        let path = store.cache_file_path(&store.generate_cache_key("cedar", "payroll"));
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(store.load_from_cache("cedar", "payroll").unwrap(), None);
        assert!(!path.exists());

        store.save_to_cache("cedar", "invoice", &invoice_rules()).unwrap();
        store.clear_cache().unwrap();
        assert_eq!(store.load_from_cache("cedar", "invoice").unwrap(), None);
    }

    #[test]
    fn test_cache_staleness() {
        let fresh = CacheMetadata::new("cedar", "payroll").unwrap();
        assert!(!fresh.is_stale(60).unwrap());
        let old = CacheMetadata {
            last_updated_unix_secs: unix_now().unwrap() - 3600,
            ..fresh
        };
        assert!(old.is_stale(60).unwrap());
    }

    #[tokio::test]
    async fn test_http_store_fetches_once_then_serves_cache() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/clients/{client}/rules/{category}",
                get(
                    |State(hits): State<Arc<AtomicUsize>>,
                     AxumPath((client, category)): AxumPath<(String, String)>| async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        match (client.as_str(), category.as_str()) {
                            ("cedar", "payroll") => Ok(Json(payroll_rules())),
                            _ => Err(axum::http::StatusCode::NOT_FOUND),
                        }
                    },
                ),
            )
            .with_state(hits.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let store = create_test_store(&format!("http://{}", addr), "http");
        let first = store.fetch_rules("cedar", "payroll").await.unwrap();
        let second = store.fetch_rules("cedar", "payroll").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let missing = store.fetch_rules("cedar", "invoice").await.unwrap_err();
        assert!(matches!(missing, RuleStoreError::NotFound { .. }));
    }
}
