//! Configuration module

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::storage::RetentionPolicy;

/// Origins allowed to call the API from a browser when `ALLOWED_ORIGINS` is unset
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "https://farm-lence.vercel.app",
];

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Service name shown in the liveness message
    pub service_name: String,

    /// Bind host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Path to the exported ONNX classifier
    pub model_path: PathBuf,

    /// Label table overriding the names embedded in the model
    pub labels_path: Option<PathBuf>,

    /// Square input resolution of the classifier
    pub image_size: u32,

    /// Upper bound for a single inference call
    pub inference_timeout: Duration,

    /// Transient upload area
    pub upload_dir: PathBuf,

    /// What happens to an upload once its scan is finished
    pub upload_retention: RetentionPolicy,

    /// Request body limit for `/scan`
    pub max_upload_bytes: usize,

    /// CORS allow-list
    pub allowed_origins: Vec<String>,

    /// Optional JSON file overriding the built-in advisory tables
    pub advisory_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "ONLYTECH".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            model_path: PathBuf::from("model/best.onnx"),
            labels_path: None,
            image_size: 224,
            inference_timeout: Duration::from_secs(30),
            upload_dir: PathBuf::from("uploads"),
            upload_retention: RetentionPolicy::Delete,
            max_upload_bytes: 10 * 1024 * 1024,
            allowed_origins: DEFAULT_ALLOWED_ORIGINS.iter().map(|o| o.to_string()).collect(),
            advisory_path: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            service_name: env::var("SERVICE_NAME").unwrap_or(defaults.service_name),

            host: env::var("HOST").unwrap_or(defaults.host),

            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),

            model_path: env::var("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),

            labels_path: env::var("LABELS_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from)
                .or(defaults.labels_path),

            image_size: env::var("IMAGE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|s: &u32| *s > 0)
                .unwrap_or(defaults.image_size),

            inference_timeout: env::var("INFERENCE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.inference_timeout),

            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),

            upload_retention: env::var("UPLOAD_RETENTION")
                .ok()
                .and_then(|r| r.parse().ok())
                .unwrap_or(defaults.upload_retention),

            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|b| b.parse().ok())
                .unwrap_or(defaults.max_upload_bytes),

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|list| parse_origins(&list))
                .filter(|origins| !origins.is_empty())
                .unwrap_or(defaults.allowed_origins),

            advisory_path: env::var("ADVISORY_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    /// Socket address string for the listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Split a comma separated origin list, dropping blanks and trailing slashes
pub fn parse_origins(list: &str) -> Vec<String> {
    list.split(',')
        .map(|o| o.trim().trim_end_matches('/'))
        .filter(|o| !o.is_empty())
        .map(String::from)
        .collect()
}
