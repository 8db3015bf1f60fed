//! Gateway configuration
//!
//! Loaded from environment variables (a `.env` file is read at startup).

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_TEMPLATE_ID: &str = "genapi";
pub const DEFAULT_DOMAIN: &str = "e2b.dev";

/// Service configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// API key for the hosted sandbox. `/execute` refuses to run without it.
    pub api_key: Option<String>,
    /// Template used when no chain file is configured (default: "genapi")
    pub template_id: String,
    /// Optional TOML file describing the template fallback chain
    pub templates_config: Option<PathBuf>,
    /// Provider domain (default: "e2b.dev")
    pub domain: String,
    /// Control-plane base URL (default: https://api.{domain})
    pub api_url: String,
    /// Fixed URL for in-sandbox traffic, bypassing per-sandbox hostnames
    pub sandbox_url: Option<String>,
    /// Extra sandbox lifetime on top of the request timeout (default: 10s)
    pub timeout_padding_secs: u64,
    /// Largest accepted request timeout (default: 300s)
    pub max_timeout_secs: u64,
    pub bind_addr: SocketAddr,
}

impl GatewayConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let domain = var("E2B_DOMAIN").unwrap_or_else(|| DEFAULT_DOMAIN.into());
        let api_url = var("E2B_API_URL").unwrap_or_else(|| format!("https://api.{}", domain));

        let parse_secs = |key: &str, default: u64| -> Result<u64> {
            match var(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .with_context(|| format!("Invalid {}: {}", key, raw)),
                None => Ok(default),
            }
        };

        let max_timeout_secs = parse_secs("MAX_EXECUTION_TIMEOUT_SECS", 300)?;
        if max_timeout_secs == 0 {
            anyhow::bail!("MAX_EXECUTION_TIMEOUT_SECS must be positive");
        }

        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = var("PORT").unwrap_or_else(|| "8001".into());
        let bind_addr = format!("{}:{}", host, port)
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid bind address {}:{}", host, port))?;

        Ok(Self {
            api_key: var("E2B_API_KEY"),
            template_id: var("E2B_TEMPLATE_ID").unwrap_or_else(|| DEFAULT_TEMPLATE_ID.into()),
            templates_config: var("TEMPLATES_CONFIG").map(PathBuf::from),
            domain,
            api_url: api_url.trim_end_matches('/').to_string(),
            sandbox_url: var("E2B_SANDBOX_URL").map(|url| url.trim_end_matches('/').to_string()),
            timeout_padding_secs: parse_secs("SANDBOX_TIMEOUT_PADDING_SECS", 10)?,
            max_timeout_secs,
            bind_addr,
        })
    }
}
