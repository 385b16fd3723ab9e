//! Configuration loading and management.
//!
//! Loads configuration from embedded config.toml with environment variable overrides.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::time::Duration;
use url::Url;

/// Embedded configuration file content.
const CONFIG_TOML: &str = include_str!("../config.toml");

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub oauth: OAuthConfig,
    pub api: ApiConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub name: String,
    pub version: String,
    pub client_header_name: String,
    pub client_header_value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    pub tenant: String,
    pub authority_host: String,
    pub scopes: ScopesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScopesConfig {
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub graph_base_url: String,
    pub beta_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    /// Load configuration from embedded config.toml with environment variable overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::from_toml_str(CONFIG_TOML)?;
        config.apply_overrides(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration document without applying overrides.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config.toml")
    }

    /// Apply overrides from a key lookup (normally the process environment).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(client_id) = lookup("AZURE_CLIENT_ID") {
            self.oauth.client_id = client_id;
        }

        if let Some(tenant) = lookup("AZURE_TENANT_ID") {
            self.oauth.tenant = tenant;
        }

        if let Some(base_url) = lookup("GRAPH_BASE_URL") {
            self.api.graph_base_url = base_url;
        }

        if let Some(base_url) = lookup("GRAPH_BETA_BASE_URL") {
            self.api.beta_base_url = base_url;
        }

        if let Some(log_level) = lookup("RUST_LOG") {
            self.logging.level = log_level;
        }
    }

    /// Validate the API endpoints.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("api.graph_base_url", &self.api.graph_base_url),
            ("api.beta_base_url", &self.api.beta_base_url),
        ] {
            let url = Url::parse(value).with_context(|| format!("{} is not a valid URL", name))?;
            if url.scheme() != "https" && url.scheme() != "http" {
                anyhow::bail!("{} must use http or https, got {}", name, url.scheme());
            }
        }

        if self.http.timeout_seconds == 0 {
            anyhow::bail!("http.timeout_seconds must be greater than zero");
        }

        Ok(())
    }

    /// Validate that the OAuth application is configured.
    ///
    /// Only needed when tokens are acquired through the refresh-token flow.
    pub fn validate_oauth(&self) -> Result<()> {
        if self.oauth.client_id.is_empty() || self.oauth.client_id == "YOUR_AZURE_AD_CLIENT_ID" {
            anyhow::bail!(
                "Azure AD client_id not configured. Set AZURE_CLIENT_ID environment variable \
                 or update config.toml"
            );
        }

        if self.oauth.tenant.is_empty() || self.oauth.tenant == "YOUR_TENANT_ID" {
            anyhow::bail!(
                "Azure AD tenant not configured. Set AZURE_TENANT_ID environment variable \
                 or update config.toml"
            );
        }

        Ok(())
    }

    /// Get the token URL for Azure AD.
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.oauth.authority_host.trim_end_matches('/'),
            self.oauth.tenant
        )
    }

    /// Get the device authorization URL used by `--sign-in`.
    pub fn device_code_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/devicecode",
            self.oauth.authority_host.trim_end_matches('/'),
            self.oauth.tenant
        )
    }

    /// Per-attempt request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_seconds)
    }

    /// Connection establishment timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.http.connect_timeout_seconds)
    }
}
