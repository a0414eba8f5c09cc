//! Service configuration.
//!
//! Loaded from an optional JSON file; every field has a default so an empty
//! object (or no file at all) yields a working configuration.  The server
//! binary layers CLI flags on top.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Schema
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

/// Where the object store is mounted and where outputs go inside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// Key prefix for generated files (`<prefix>/<uuid>.wav`).
    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { root: default_storage_root(), output_prefix: default_output_prefix() }
    }
}

/// Execution device for the ONNX session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
    Cuda,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// HuggingFace repository ID (bare names get the `KittenML/` owner).
    #[serde(default = "default_repo_id")]
    pub repo_id: String,
    /// Load `config.json` and friends from this directory instead of the Hub.
    #[serde(default)]
    pub local_dir: Option<PathBuf>,
    /// Voice used when the request carries no reference.
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default)]
    pub device: Device,
    /// `espeak-ng-data` directory; the library's compiled-in path if unset.
    #[serde(default)]
    pub espeak_data: Option<PathBuf>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            repo_id: default_repo_id(),
            local_dir: None,
            voice: default_voice(),
            speed: default_speed(),
            device: Device::default(),
            espeak_data: None,
        }
    }
}

/// Caller credential pair.  Auth is disabled unless both values are set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_key_header")]
    pub key_header: String,
    #[serde(default = "default_secret_header")]
    pub secret_header: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            key: None,
            secret: None,
            key_header: default_key_header(),
            secret_header: default_secret_header(),
        }
    }
}

impl AuthConfig {
    pub fn is_enabled(&self) -> bool {
        self.key.is_some() && self.secret.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), json: false }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("/s3-mount")
}

fn default_output_prefix() -> String {
    "tts".to_string()
}

fn default_repo_id() -> String {
    "KittenML/kitten-tts-mini-0.8".to_string()
}

fn default_voice() -> String {
    "Jasper".to_string()
}

fn default_speed() -> f32 {
    1.0
}

fn default_key_header() -> String {
    "Modal-Key".to_string()
}

fn default_secret_header() -> String {
    "Modal-Secret".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Loading
// ─────────────────────────────────────────────────────────────────────────────

impl ServiceConfig {
    /// Read a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Cannot read config: {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Host and port the HTTP listener binds to.  The host may be an IPv4 or
    /// IPv6 literal or a name resolved at bind time.
    pub fn bind_addr(&self) -> (&str, u16) {
        (self.server.host.as_str(), self.server.port)
    }

    /// Reject combinations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.auth.key.is_some() != self.auth.secret.is_some() {
            anyhow::bail!("auth.key and auth.secret must be set together");
        }
        let prefix = self.storage.output_prefix.trim_matches('/');
        if prefix.is_empty() || prefix.split('/').any(|c| c == ".." || c == ".") {
            anyhow::bail!(
                "storage.output_prefix '{}' is not a valid key prefix",
                self.storage.output_prefix
            );
        }
        if self.server.host.trim().is_empty() {
            anyhow::bail!("server.host must not be empty");
        }
        if !(self.model.speed.is_finite() && self.model.speed > 0.0) {
            anyhow::bail!("model.speed must be a positive number, got {}", self.model.speed);
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let cfg: ServiceConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.server.port, 8000);
        assert_eq!(cfg.storage.root, PathBuf::from("/s3-mount"));
        assert_eq!(cfg.storage.output_prefix, "tts");
        assert_eq!(cfg.model.device, Device::Cpu);
        assert!(!cfg.auth.is_enabled());
        assert_eq!(cfg.auth.key_header, "Modal-Key");
        cfg.validate().unwrap();
    }

    #[test]
    fn test_partial_sections() {
        let cfg: ServiceConfig = serde_json::from_str(
            r#"{"model": {"device": "cuda", "voice": "Bella"}, "auth": {"key": "k", "secret": "s"}}"#,
        )
        .unwrap();
        assert_eq!(cfg.model.device, Device::Cuda);
        assert_eq!(cfg.model.voice, "Bella");
        assert_eq!(cfg.model.speed, 1.0);
        assert!(cfg.auth.is_enabled());
    }

    #[test]
    fn test_half_configured_auth_is_rejected() {
        let mut cfg = ServiceConfig::default();
        cfg.auth.key = Some("k".into());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_bad_prefix_is_rejected() {
        let mut cfg = ServiceConfig::default();
        cfg.storage.output_prefix = "../escape".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_bind_addr_accepts_names_and_ipv6() {
        let mut cfg = ServiceConfig::default();
        assert_eq!(cfg.bind_addr(), ("0.0.0.0", 8000));

        cfg.server.host = "localhost".into();
        cfg.server.port = 9001;
        assert_eq!(cfg.bind_addr(), ("localhost", 9001));
        cfg.validate().unwrap();

        cfg.server.host = "::".into();
        assert_eq!(cfg.bind_addr(), ("::", 9001));
        cfg.validate().unwrap();
    }

    #[tokio::test]
    async fn test_bind_addr_resolves_hostnames() {
        let mut cfg = ServiceConfig::default();
        cfg.server.port = 0;
        for host in ["localhost", "127.0.0.1"] {
            cfg.server.host = host.into();
            tokio::net::TcpListener::bind(cfg.bind_addr()).await.unwrap();
        }
    }

    #[test]
    fn test_empty_host_is_rejected() {
        let mut cfg = ServiceConfig::default();
        cfg.server.host = " ".into();
        assert!(cfg.validate().is_err());
    }
}
