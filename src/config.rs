//! Gateway Configuration
//!
//! Loads the gateway configuration from an optional JSON file
//! (`ventanilla.json`), merges defaults, and applies environment
//! overrides. The backend base URL is validated once at startup; a
//! missing value is a configuration error, never a per-request failure.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Config file looked up in the working directory when no `--config`
/// path is given.
const CONFIG_FILENAME: &str = "ventanilla.json";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
    /// Base URL of the customer-management backend. Required.
    pub backend_api_url: String,
    /// Base URL of the OpenAI-compatible inference provider.
    pub inference_api_url: String,
    /// Bearer key for the inference provider.
    pub inference_api_key: String,
    pub inference_model: String,
    pub max_tokens_per_reply: u32,
    pub temperature: f32,
    /// Cap on model↔tool round trips per request.
    pub max_tool_rounds: usize,
    pub request_timeout_secs: u64,
    pub bind_addr: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            backend_api_url: String::new(),
            inference_api_url: "https://api.openai.com".to_string(),
            inference_api_key: String::new(),
            inference_model: "gpt-4o".to_string(),
            max_tokens_per_reply: 1000,
            temperature: 0.3,
            max_tool_rounds: 4,
            request_timeout_secs: 30,
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load the configuration: file (if present), then environment
    /// overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)
                .with_context(|| format!("Failed to load config from {}", p.display()))?,
            None => {
                let default_path = PathBuf::from(CONFIG_FILENAME);
                if default_path.exists() {
                    Self::from_file(&default_path)
                        .with_context(|| format!("Failed to load config from {}", CONFIG_FILENAME))?
                } else {
                    GatewayConfig::default()
                }
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).context("Failed to read config file")?;
        let config: GatewayConfig =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("VENTANILLA_BACKEND_URL") {
            self.backend_api_url = url;
        }
        if let Ok(url) = std::env::var("VENTANILLA_INFERENCE_URL") {
            self.inference_api_url = url;
        }
        if let Ok(key) = std::env::var("VENTANILLA_INFERENCE_KEY") {
            self.inference_api_key = key;
        }
        if let Ok(model) = std::env::var("VENTANILLA_MODEL") {
            self.inference_model = model;
        }
        if let Ok(bind) = std::env::var("VENTANILLA_BIND") {
            self.bind_addr = bind;
        }
    }

    /// Startup-time validation of the merged configuration.
    pub fn validate(&self) -> Result<()> {
        if self.backend_api_url.trim().is_empty() {
            bail!(
                "Backend base URL is not configured. Set backendApiUrl in {} \
                 or the VENTANILLA_BACKEND_URL environment variable.",
                CONFIG_FILENAME
            );
        }
        if self.inference_api_url.trim().is_empty() {
            bail!("Inference base URL is not configured");
        }
        if self.max_tool_rounds == 0 {
            bail!("maxToolRounds must be at least 1");
        }
        Ok(())
    }
}

/// Resolve a path that may start with `~` to an absolute path.
pub fn resolve_path(p: &str) -> PathBuf {
    if let Some(rest) = p.strip_prefix('~') {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/root"));
        let rest = rest.strip_prefix('/').unwrap_or(rest);
        home.join(rest)
    } else {
        PathBuf::from(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.inference_model, "gpt-4o");
        assert_eq!(config.max_tokens_per_reply, 1000);
        assert_eq!(config.max_tool_rounds, 4);
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_missing_backend_url_is_a_startup_error() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_complete_config() {
        let config = GatewayConfig {
            backend_api_url: "http://localhost:8000/api".to_string(),
            ..GatewayConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_merges_defaults() {
        let config: GatewayConfig =
            serde_json::from_str(r#"{ "backendApiUrl": "http://localhost:8000/api" }"#).unwrap();
        assert_eq!(config.backend_api_url, "http://localhost:8000/api");
        assert_eq!(config.temperature, 0.3);
        assert_eq!(config.max_tool_rounds, 4);
    }

    #[test]
    fn test_zero_rounds_rejected() {
        let config = GatewayConfig {
            backend_api_url: "http://localhost:8000/api".to_string(),
            max_tool_rounds: 0,
            ..GatewayConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_path_with_tilde() {
        let resolved = resolve_path("~/some/path");
        assert!(!resolved.to_string_lossy().starts_with('~'));
        assert!(resolved.ends_with("some/path"));
    }

    #[test]
    fn test_resolve_path_without_tilde() {
        assert_eq!(
            resolve_path("/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
