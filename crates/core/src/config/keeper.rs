//! Keeper runtime configuration.
//!
//! Resolution order: built-in defaults, then an optional TOML file named by
//! `LTV_KEEPER_CONFIG`, then `LTV_KEEPER_*` environment overrides. The
//! result is validated once and is immutable afterwards.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::band::LtvBand;
use crate::error::{KeeperError, Result};

/// Environment variable naming an optional TOML config file.
pub const CONFIG_PATH_ENV: &str = "LTV_KEEPER_CONFIG";

const MAX_TOKEN_DECIMALS: u32 = 18;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeeperConfig {
    #[serde(default)]
    pub band: LtvBand,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub chain: ChainConfig,

    #[serde(default)]
    pub gas: GasConfig,

    #[serde(default)]
    pub tokens: TokenConfig,
}

/// Loop and shutdown timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Seconds between LTV checks
    #[serde(default = "default_check_period")]
    pub check_period_secs: u64,

    /// Seconds to wait for an in-flight cycle on shutdown
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Seconds to wait for a transaction receipt
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
}

fn default_check_period() -> u64 {
    30
}
fn default_shutdown_timeout() -> u64 {
    30
}
fn default_confirmation_timeout() -> u64 {
    120
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            check_period_secs: default_check_period(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            confirmation_timeout_secs: default_confirmation_timeout(),
        }
    }
}

/// RPC endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

fn default_rpc_url() -> String {
    "http://localhost:8545".to_string()
}
fn default_chain_id() -> u64 {
    1
}
fn default_http_timeout() -> u64 {
    30
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            chain_id: default_chain_id(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

/// Gas pricing model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GasPricingModel {
    /// Gas price only
    #[default]
    Legacy,
    /// Base fee + priority fee
    Eip1559,
}

impl GasPricingModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Eip1559 => "eip1559",
        }
    }
}

impl fmt::Display for GasPricingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GasPricingModel {
    type Err = KeeperError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "eip1559" | "eip-1559" => Ok(Self::Eip1559),
            other => Err(KeeperError::Config(format!("unknown gas pricing model: {other}"))),
        }
    }
}

/// Gas settings, prices in gwei.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasConfig {
    #[serde(default)]
    pub pricing: GasPricingModel,

    /// Applied to the estimated gas limit
    #[serde(default = "default_limit_multiplier")]
    pub limit_multiplier: f64,

    #[serde(default = "default_gas_price")]
    pub default_gas_price_gwei: f64,

    #[serde(default = "default_max_gas_price")]
    pub max_gas_price_gwei: f64,

    #[serde(default)]
    pub priority_fee_gwei: Option<f64>,
}

fn default_limit_multiplier() -> f64 {
    1.5
}
fn default_gas_price() -> f64 {
    1.0
}
fn default_max_gas_price() -> f64 {
    50.0
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            pricing: GasPricingModel::default(),
            limit_multiplier: default_limit_multiplier(),
            default_gas_price_gwei: default_gas_price(),
            max_gas_price_gwei: default_max_gas_price(),
            priority_fee_gwei: None,
        }
    }
}

/// On-chain decimals of the two market tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    #[serde(default = "default_token_decimals")]
    pub stable_decimals: u32,

    #[serde(default = "default_token_decimals")]
    pub yield_decimals: u32,
}

fn default_token_decimals() -> u32 {
    6
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            stable_decimals: default_token_decimals(),
            yield_decimals: default_token_decimals(),
        }
    }
}

impl KeeperConfig {
    /// Load from TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| KeeperError::Config(format!("cannot read {path}: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| KeeperError::Config(format!("invalid TOML: {e}")))
    }

    /// Defaults, optional file, environment overrides, then validation.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path.trim())?,
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `LTV_KEEPER_*` overrides supplied by `lookup`.
    ///
    /// Empty values are ignored; unparsable values are configuration errors.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("LTV_KEEPER_MIN_LTV") {
            self.band.min_ltv = parse("LTV_KEEPER_MIN_LTV", &v)?;
        }
        if let Some(v) = get("LTV_KEEPER_MAX_LTV") {
            self.band.max_ltv = parse("LTV_KEEPER_MAX_LTV", &v)?;
        }
        if let Some(v) = get("LTV_KEEPER_TARGET_LTV") {
            self.band.target_ltv = parse("LTV_KEEPER_TARGET_LTV", &v)?;
        }
        if let Some(v) = get("LTV_KEEPER_CHECK_PERIOD") {
            self.timing.check_period_secs = parse("LTV_KEEPER_CHECK_PERIOD", &v)?;
        }
        if let Some(v) = get("LTV_KEEPER_SHUTDOWN_TIMEOUT") {
            self.timing.shutdown_timeout_secs = parse("LTV_KEEPER_SHUTDOWN_TIMEOUT", &v)?;
        }
        if let Some(v) = get("LTV_KEEPER_RPC_URL") {
            self.chain.rpc_url = v.trim().to_string();
        }
        if let Some(v) = get("LTV_KEEPER_CHAIN_ID") {
            self.chain.chain_id = parse("LTV_KEEPER_CHAIN_ID", &v)?;
        }
        if let Some(v) = get("LTV_KEEPER_GAS_PRICING") {
            self.gas.pricing = v.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.band.validate()?;

        if self.timing.check_period_secs == 0 {
            return Err(KeeperError::Config("check_period_secs must be positive".into()));
        }
        if self.chain.rpc_url.trim().is_empty() {
            return Err(KeeperError::Config("rpc_url is empty".into()));
        }
        if self.gas.limit_multiplier < 1.0 {
            return Err(KeeperError::Config(format!(
                "gas limit_multiplier must be at least 1.0 (got {})",
                self.gas.limit_multiplier
            )));
        }
        for (name, decimals) in [
            ("stable_decimals", self.tokens.stable_decimals),
            ("yield_decimals", self.tokens.yield_decimals),
        ] {
            if decimals > MAX_TOKEN_DECIMALS {
                return Err(KeeperError::Config(format!(
                    "{name} must be at most {MAX_TOKEN_DECIMALS} (got {decimals})"
                )));
            }
        }
        Ok(())
    }

    pub fn check_period(&self) -> Duration {
        Duration::from_secs(self.timing.check_period_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.timing.shutdown_timeout_secs)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.timing.confirmation_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.chain.http_timeout_secs)
    }

    /// Log the resolved configuration.
    pub fn log_config(&self) {
        info!(
            min_ltv = %self.band.min_ltv,
            max_ltv = %self.band.max_ltv,
            target_ltv = %self.band.target_ltv,
            "LTV band"
        );
        info!(
            check_period_secs = self.timing.check_period_secs,
            shutdown_timeout_secs = self.timing.shutdown_timeout_secs,
            confirmation_timeout_secs = self.timing.confirmation_timeout_secs,
            "Timing"
        );
        info!(
            rpc_url = %self.chain.rpc_url,
            chain_id = self.chain.chain_id,
            gas_pricing = %self.gas.pricing,
            max_gas_price_gwei = self.gas.max_gas_price_gwei,
            "Chain"
        );
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| KeeperError::Config(format!("{key}={value}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = KeeperConfig::default();
        assert_eq!(config.band, LtvBand::default());
        assert_eq!(config.check_period(), Duration::from_secs(30));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
        assert_eq!(config.chain.rpc_url, "http://localhost:8545");
        assert_eq!(config.gas.pricing, GasPricingModel::Legacy);
        assert_eq!(config.tokens.stable_decimals, 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = KeeperConfig::from_toml(
            r#"
            [band]
            min_ltv = 60
            max_ltv = 80

            [gas]
            pricing = "eip1559"
            priority_fee_gwei = 0.1
            "#,
        )
        .unwrap();

        assert_eq!(config.band.min_ltv, dec!(60));
        assert_eq!(config.band.max_ltv, dec!(80));
        assert_eq!(config.band.target_ltv, dec!(75));
        assert_eq!(config.gas.pricing, GasPricingModel::Eip1559);
        assert_eq!(config.gas.priority_fee_gwei, Some(0.1));
        assert_eq!(config.timing.check_period_secs, 30);
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = KeeperConfig::default();
        config.band.target_ltv = dec!(72.5);
        let toml_str = toml::to_string(&config).unwrap();
        let parsed = KeeperConfig::from_toml(&toml_str).unwrap();
        assert_eq!(parsed.band, config.band);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = KeeperConfig::default();
        config
            .apply_overrides(env(&[
                ("LTV_KEEPER_MIN_LTV", "50"),
                ("LTV_KEEPER_MAX_LTV", "70.5"),
                ("LTV_KEEPER_TARGET_LTV", "60"),
                ("LTV_KEEPER_CHECK_PERIOD", "5"),
                ("LTV_KEEPER_RPC_URL", " https://rpc.example "),
                ("LTV_KEEPER_GAS_PRICING", "EIP-1559"),
                ("LTV_KEEPER_CHAIN_ID", ""),
            ]))
            .unwrap();

        assert_eq!(config.band.min_ltv, dec!(50));
        assert_eq!(config.band.max_ltv, dec!(70.5));
        assert_eq!(config.band.target_ltv, dec!(60));
        assert_eq!(config.check_period(), Duration::from_secs(5));
        assert_eq!(config.chain.rpc_url, "https://rpc.example");
        assert_eq!(config.gas.pricing, GasPricingModel::Eip1559);
        assert_eq!(config.chain.chain_id, 1);
    }

    #[test]
    fn test_bad_env_value_is_config_error() {
        let mut config = KeeperConfig::default();
        let err = config
            .apply_overrides(env(&[("LTV_KEEPER_MIN_LTV", "sixty")]))
            .unwrap_err();
        assert!(matches!(err, KeeperError::Config(msg) if msg.contains("LTV_KEEPER_MIN_LTV")));
    }

    #[test]
    fn test_validation() {
        let mut config = KeeperConfig::default();
        config.timing.check_period_secs = 0;
        assert!(config.validate().is_err());

        let mut config = KeeperConfig::default();
        config.band.min_ltv = dec!(90);
        assert!(config.validate().is_err());

        let mut config = KeeperConfig::default();
        config.tokens.yield_decimals = 19;
        assert!(config.validate().is_err());
    }
}
