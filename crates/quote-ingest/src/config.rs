//! Configuration for the ingestion service

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Environment variable pointing at an optional TOML config file
pub const CONFIG_PATH_ENV: &str = "QUOTE_INGEST_CONFIG";

/// Main ingestion service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Backend provider (gcp or local)
    #[serde(default)]
    pub backend: BackendProvider,
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Admission control (rate limiting)
    #[serde(default)]
    pub admission: AdmissionConfig,
    /// Pipeline limits and stage deadlines
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Extraction service and retry policy
    #[serde(default)]
    pub extraction: ExtractionConfig,
    /// GCP configuration (required when backend = gcp)
    #[serde(default)]
    pub gcp: Option<GcpConfig>,
    /// Local backend configuration (used when backend = local)
    #[serde(default)]
    pub local: LocalConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Frontend origin allowed by CORS
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            cors_origin: "http://localhost:3000".to_string(),
        }
    }
}

/// Fixed-window admission control
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Window length in seconds (default: 3600 = 1 hour)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Admitted requests per identity per window (default: 10)
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    /// Key callers by the first X-Forwarded-For hop instead of the peer address
    #[serde(default)]
    pub trust_forwarded_for: bool,
    /// How often elapsed windows are dropped (default: 300s)
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
}

fn default_window_secs() -> u64 { 3600 }
fn default_max_requests() -> u32 { 10 }
fn default_purge_interval() -> u64 { 300 }

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            window_secs: 3600,
            max_requests: 10,
            trust_forwarded_for: false,
            purge_interval_secs: 300,
        }
    }
}

/// Pipeline limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum accepted payload in bytes (default: 10MB)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// Deadline for the whole blob upload, pre-flight included (default: 30s)
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,
    /// Deadline for the record insert (default: 30s)
    #[serde(default = "default_persist_timeout")]
    pub persist_timeout_secs: u64,
}

fn default_max_upload_bytes() -> u64 { 10 * 1024 * 1024 } // 10MB
fn default_upload_timeout() -> u64 { 30 }
fn default_persist_timeout() -> u64 { 30 }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 10 * 1024 * 1024, // 10MB
            upload_timeout_secs: 30,
            persist_timeout_secs: 30,
        }
    }
}

/// Extraction service (Gemini) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Gemini API key
    #[serde(default)]
    pub api_key: Option<String>,
    /// API base URL
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    /// Model name (default: "gemini-1.5-pro")
    #[serde(default = "default_gemini_model")]
    pub model: String,
    /// Instruction sent ahead of the document
    #[serde(default = "default_prompt")]
    pub prompt: String,
    /// Retries after the first attempt (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds, doubled each retry (default: 1000)
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Deadline for a single attempt (default: 120s)
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,
    /// Total time budget for attempts and backoff, 0 disables (default: 300s)
    #[serde(default = "default_max_elapsed")]
    pub max_elapsed_secs: u64,
}

pub const DEFAULT_EXTRACTION_PROMPT: &str = "Your task is to extract the data in this solar quote \
to generate a comprehensive JSON response containing all of the solar quote data.";

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_gemini_model() -> String {
    "gemini-1.5-pro".to_string()
}

fn default_prompt() -> String {
    DEFAULT_EXTRACTION_PROMPT.to_string()
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_delay_ms() -> u64 { 1000 }
fn default_attempt_timeout() -> u64 { 120 }
fn default_max_elapsed() -> u64 { 300 }

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_gemini_base_url(),
            model: default_gemini_model(),
            prompt: default_prompt(),
            max_retries: 3,
            initial_delay_ms: 1000,
            attempt_timeout_secs: 120,
            max_elapsed_secs: 300,
        }
    }
}

/// Backend provider selection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum BackendProvider {
    /// Google Cloud Platform (GCS + Firestore)
    #[default]
    Gcp,
    /// Local backend (filesystem + SQLite)
    Local,
}

impl std::str::FromStr for BackendProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gcp" => Ok(BackendProvider::Gcp),
            "local" => Ok(BackendProvider::Local),
            other => Err(Error::Config(format!("unknown backend '{}'", other))),
        }
    }
}

/// Google Cloud Platform configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcpConfig {
    /// Path to service account JSON key file
    #[serde(default)]
    pub service_account_key_path: Option<PathBuf>,
    /// Pre-issued OAuth access token, used instead of the key file when set
    #[serde(default)]
    pub access_token: Option<String>,
    /// GCP project ID
    #[serde(default)]
    pub project_id: String,
    /// GCS bucket for uploaded documents
    #[serde(default)]
    pub bucket: String,
    /// Object name prefix (default: "quotes/")
    #[serde(default = "default_object_prefix")]
    pub object_prefix: String,
    /// Firestore collection (default: "solarQuotes")
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Firestore database (default: "(default)")
    #[serde(default = "default_database")]
    pub database: String,
    /// GCS JSON API base URL
    #[serde(default = "default_storage_api_url")]
    pub storage_api_url: String,
    /// Base of public object URLs
    #[serde(default = "default_storage_public_url")]
    pub storage_public_url: String,
    /// Firestore REST base URL
    #[serde(default = "default_firestore_api_url")]
    pub firestore_api_url: String,
}

fn default_object_prefix() -> String {
    "quotes/".to_string()
}

fn default_collection() -> String {
    "solarQuotes".to_string()
}

fn default_database() -> String {
    "(default)".to_string()
}

fn default_storage_api_url() -> String {
    "https://storage.googleapis.com".to_string()
}

fn default_storage_public_url() -> String {
    "https://storage.googleapis.com".to_string()
}

fn default_firestore_api_url() -> String {
    "https://firestore.googleapis.com".to_string()
}

impl GcpConfig {
    /// Defaults for every optional field
    pub fn new(project_id: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            service_account_key_path: None,
            access_token: None,
            project_id: project_id.into(),
            bucket: bucket.into(),
            object_prefix: default_object_prefix(),
            collection: default_collection(),
            database: default_database(),
            storage_api_url: default_storage_api_url(),
            storage_public_url: default_storage_public_url(),
            firestore_api_url: default_firestore_api_url(),
        }
    }
}

/// Local backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Directory receiving uploaded documents
    pub blob_dir: PathBuf,
    /// SQLite database holding records
    pub database_path: PathBuf,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            blob_dir: PathBuf::from("./data/uploads"),
            database_path: PathBuf::from("./data/records.db"),
        }
    }
}

impl IngestConfig {
    /// Load configuration: optional TOML file, then environment overrides
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path, e)))?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("invalid config {}: {}", path, e)))
    }

    /// Apply environment overrides using the given lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| Error::Config(format!("PORT is not a valid port: {}", port)))?;
        }
        if let Some(origin) = lookup("CORS_ORIGIN") {
            self.server.cors_origin = origin;
        }
        if let Some(key) = lookup("GEMINI_API_KEY") {
            self.extraction.api_key = Some(key);
        }
        if let Some(model) = lookup("GEMINI_MODEL") {
            self.extraction.model = model;
        }
        if let Some(backend) = lookup("QUOTE_INGEST_BACKEND") {
            self.backend = backend.parse()?;
        }

        let project = lookup("GOOGLE_CLOUD_PROJECT_ID");
        let keyfile = lookup("GOOGLE_CLOUD_KEYFILE");
        let bucket = lookup("GCS_BUCKET_NAME");
        let collection = lookup("FIRESTORE_COLLECTION");
        let token = lookup("GOOGLE_CLOUD_ACCESS_TOKEN");

        let any_gcp = project.is_some()
            || keyfile.is_some()
            || bucket.is_some()
            || collection.is_some()
            || token.is_some();
        if any_gcp {
            let gcp = self
                .gcp
                .get_or_insert_with(|| GcpConfig::new(String::new(), String::new()));
            if let Some(project) = project {
                gcp.project_id = project;
            }
            if let Some(keyfile) = keyfile {
                gcp.service_account_key_path = Some(PathBuf::from(keyfile));
            }
            if let Some(bucket) = bucket {
                gcp.bucket = bucket;
            }
            if let Some(collection) = collection {
                gcp.collection = collection;
            }
            if let Some(token) = token {
                gcp.access_token = Some(token);
            }
        }

        Ok(())
    }

    /// Check that the selected backend has what it needs
    pub fn validate(&self) -> Result<()> {
        if self.admission.max_requests == 0 {
            return Err(Error::Config("admission.max_requests must be at least 1".into()));
        }
        if self.admission.window_secs == 0 {
            return Err(Error::Config("admission.window_secs must be at least 1".into()));
        }
        if self.pipeline.max_upload_bytes == 0 {
            return Err(Error::Config("pipeline.max_upload_bytes must be positive".into()));
        }
        let timeouts = [
            ("pipeline.upload_timeout_secs", self.pipeline.upload_timeout_secs),
            ("pipeline.persist_timeout_secs", self.pipeline.persist_timeout_secs),
            ("extraction.attempt_timeout_secs", self.extraction.attempt_timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(Error::Config(format!("{} must be at least 1", name)));
        }
        if self.extraction.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(Error::Config("GEMINI_API_KEY is not set".into()));
        }

        if self.backend == BackendProvider::Gcp {
            let gcp = self.gcp.as_ref().ok_or_else(|| {
                Error::Config("GCP backend selected but no [gcp] configuration present".into())
            })?;
            if gcp.project_id.is_empty() {
                return Err(Error::Config("GOOGLE_CLOUD_PROJECT_ID is not set".into()));
            }
            if gcp.bucket.is_empty() {
                return Err(Error::Config("GCS_BUCKET_NAME is not set".into()));
            }
            if gcp.service_account_key_path.is_none() && gcp.access_token.is_none() {
                return Err(Error::Config(
                    "GOOGLE_CLOUD_KEYFILE or GOOGLE_CLOUD_ACCESS_TOKEN must be set".into(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = IngestConfig::default();
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.admission.window_secs, 3600);
        assert_eq!(config.admission.max_requests, 10);
        assert_eq!(config.pipeline.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.extraction.max_retries, 3);
        assert_eq!(config.extraction.initial_delay_ms, 1000);
        assert_eq!(config.extraction.model, "gemini-1.5-pro");
        assert_eq!(config.backend, BackendProvider::Gcp);
    }

    #[test]
    fn test_env_overrides_build_gcp_section() {
        let mut config = IngestConfig::default();
        config
            .apply_env(env(&[
                ("PORT", "8088"),
                ("GEMINI_API_KEY", "key"),
                ("GOOGLE_CLOUD_PROJECT_ID", "solar-prod"),
                ("GOOGLE_CLOUD_KEYFILE", "/etc/keys/sa.json"),
                ("GCS_BUCKET_NAME", "quotes-bucket"),
            ]))
            .unwrap();

        assert_eq!(config.server.port, 8088);
        let gcp = config.gcp.as_ref().unwrap();
        assert_eq!(gcp.project_id, "solar-prod");
        assert_eq!(gcp.bucket, "quotes-bucket");
        assert_eq!(gcp.collection, "solarQuotes");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let mut config = IngestConfig::default();
        let err = config.apply_env(env(&[("PORT", "http")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_gcp_backend_requires_credentials() {
        let mut config = IngestConfig::default();
        config.extraction.api_key = Some("key".into());
        config.gcp = Some(GcpConfig::new("proj", "bucket"));
        assert!(config.validate().is_err());

        config.gcp.as_mut().unwrap().access_token = Some("token".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_local_backend_needs_only_api_key() {
        let mut config = IngestConfig::default();
        config
            .apply_env(env(&[("QUOTE_INGEST_BACKEND", "local")]))
            .unwrap();
        assert!(config.validate().is_err());

        config.extraction.api_key = Some("key".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeouts_are_rejected() {
        let valid = || {
            let mut config = IngestConfig::default();
            config.backend = BackendProvider::Local;
            config.extraction.api_key = Some("key".into());
            config
        };
        assert!(valid().validate().is_ok());

        let mut config = valid();
        config.pipeline.upload_timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("upload_timeout_secs"));

        let mut config = valid();
        config.pipeline.persist_timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("persist_timeout_secs"));

        let mut config = valid();
        config.extraction.attempt_timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("attempt_timeout_secs"));
    }

    #[test]
    fn test_toml_sections_are_optional() {
        let config: IngestConfig = toml::from_str(
            r#"
            backend = "local"

            [admission]
            max_requests = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.backend, BackendProvider::Local);
        assert_eq!(config.admission.max_requests, 3);
        assert_eq!(config.admission.window_secs, 3600);
        assert_eq!(config.server.port, 3001);
    }
}
