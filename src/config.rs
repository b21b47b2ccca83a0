//! Benchmark Configuration
//!
//! Loaded from the environment (with `.env` support) or a TOML file, then
//! validated once before any component is built.

use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::quotes::ZeroQuotePolicy;

/// Anvil's first dev account; any address works since it is impersonated
const DEFAULT_TEST_ACCOUNT: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

// ============================================
// ERRORS
// ============================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key} ({value:?}): {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse config file: {0}")]
    Toml(#[from] toml::de::Error),
}

// ============================================
// MAIN CONFIGURATION
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // ========== Node ==========
    /// JSON-RPC endpoint of the forked node
    pub fork_rpc_url: String,

    /// Archive RPC the fork is re-created from on every reset
    pub upstream_rpc_url: String,

    /// Optional HTTP health endpoint; block-number check otherwise
    pub fork_health_url: Option<String>,

    // ========== Simulation ==========
    /// Impersonated sender of every simulated swap
    pub test_account: Address,

    /// Gas price used to value gas in output tokens (wei)
    pub assumed_gas_price_wei: u64,

    /// Gas limit on swap transactions
    pub gas_ceiling: u64,

    /// Input funding = amount_in * this
    pub funding_buffer_multiplier: u64,

    /// Pause after state-mutating node calls
    pub settle_delay_ms: u64,

    // ========== Timeouts ==========
    pub node_ready_timeout_secs: u64,
    pub quote_timeout_secs: u64,

    // ========== Output ==========
    /// JSON-lines file results are appended to
    pub results_path: String,

    /// What a quote of zero means
    pub zero_quote_policy: ZeroQuotePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fork_rpc_url: String::new(),
            upstream_rpc_url: String::new(),
            fork_health_url: None,
            test_account: DEFAULT_TEST_ACCOUNT,
            assumed_gas_price_wei: 1_000_000_000,
            gas_ceiling: 3_000_000,
            funding_buffer_multiplier: 10,
            settle_delay_ms: 100,
            node_ready_timeout_secs: 120,
            quote_timeout_secs: 30,
            results_path: "./results/simulations.jsonl".to_string(),
            zero_quote_policy: ZeroQuotePolicy::Error,
        }
    }
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key -> value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let required = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let config = Self {
            fork_rpc_url: required("FORK_RPC_URL")?,
            upstream_rpc_url: required("UPSTREAM_RPC_URL")?,
            fork_health_url: lookup("FORK_HEALTH_URL").filter(|v| !v.trim().is_empty()),
            test_account: parse_or(&lookup, "TEST_ACCOUNT", defaults.test_account)?,
            assumed_gas_price_wei: parse_or(
                &lookup,
                "ASSUMED_GAS_PRICE_WEI",
                defaults.assumed_gas_price_wei,
            )?,
            gas_ceiling: parse_or(&lookup, "GAS_CEILING", defaults.gas_ceiling)?,
            funding_buffer_multiplier: parse_or(
                &lookup,
                "FUNDING_BUFFER_MULTIPLIER",
                defaults.funding_buffer_multiplier,
            )?,
            settle_delay_ms: parse_or(&lookup, "SETTLE_DELAY_MS", defaults.settle_delay_ms)?,
            node_ready_timeout_secs: parse_or(
                &lookup,
                "NODE_READY_TIMEOUT_SECS",
                defaults.node_ready_timeout_secs,
            )?,
            quote_timeout_secs: parse_or(
                &lookup,
                "QUOTE_TIMEOUT_SECS",
                defaults.quote_timeout_secs,
            )?,
            results_path: lookup("RESULTS_PATH").unwrap_or(defaults.results_path),
            zero_quote_policy: parse_or(
                &lookup,
                "ZERO_QUOTE_POLICY",
                defaults.zero_quote_policy,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("FORK_RPC_URL", &self.fork_rpc_url)?;
        check_url("UPSTREAM_RPC_URL", &self.upstream_rpc_url)?;
        if let Some(url) = &self.fork_health_url {
            check_url("FORK_HEALTH_URL", url)?;
        }

        let positive = [
            ("ASSUMED_GAS_PRICE_WEI", self.assumed_gas_price_wei),
            ("GAS_CEILING", self.gas_ceiling),
            ("FUNDING_BUFFER_MULTIPLIER", self.funding_buffer_multiplier),
            ("NODE_READY_TIMEOUT_SECS", self.node_ready_timeout_secs),
            ("QUOTE_TIMEOUT_SECS", self.quote_timeout_secs),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    value: value.to_string(),
                    reason: "must be greater than zero".into(),
                });
            }
        }

        if self.results_path.trim().is_empty() {
            return Err(ConfigError::Missing("RESULTS_PATH"));
        }
        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn node_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.node_ready_timeout_secs)
    }

    pub fn quote_timeout(&self) -> Duration {
        Duration::from_secs(self.quote_timeout_secs)
    }

    pub fn print_summary(&self) {
        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║               DEX BENCH - CONFIGURATION                    ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ FORK NODE                                                  ║");
        println!("║ • RPC:             {:<40} ║", truncate(&self.fork_rpc_url, 40));
        println!("║ • Upstream:        {:<40} ║", truncate(&self.upstream_rpc_url, 40));
        println!(
            "║ • Health:          {:<40} ║",
            self.fork_health_url
                .as_deref()
                .map(|u| truncate(u, 40))
                .unwrap_or_else(|| "block-number check".to_string())
        );
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ SIMULATION                                                 ║");
        println!("║ • Test Account:    {:<40} ║", truncate(&self.test_account.to_string(), 40));
        println!("║ • Gas Price:       {:>35} wei ║", self.assumed_gas_price_wei);
        println!("║ • Gas Ceiling:     {:>40} ║", self.gas_ceiling);
        println!("║ • Funding Buffer:  {:>39}x ║", self.funding_buffer_multiplier);
        println!("║ • Settle Delay:    {:>37} ms ║", self.settle_delay_ms);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ OUTPUT                                                     ║");
        println!("║ • Results:         {:<40} ║", truncate(&self.results_path, 40));
        println!("║ • Zero Quotes:     {:<40} ║", self.zero_quote_policy);
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            })
        }
        _ => Ok(default),
    }
}

fn check_url(key: &'static str, url: &str) -> Result<(), ConfigError> {
    if url.trim().is_empty() {
        return Err(ConfigError::Missing(key));
    }
    let parsed = reqwest::Url::parse(url).map_err(|e| ConfigError::Invalid {
        key,
        value: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        // The node client and the health check both speak plain HTTP
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Invalid {
            key,
            value: url.to_string(),
            reason: format!("unsupported scheme {}", other),
        }),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max - 1).collect();
        format!("{}…", head)
    }
}

// ============================================
// TESTS
// ============================================
