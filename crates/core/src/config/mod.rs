//! Keeper configuration.
//!
//! This module provides:
//! - The LTV band and its validation
//! - Runtime configuration (timing, chain, gas, token decimals)
//! - Loading from defaults, an optional TOML file and the environment

mod band;
mod keeper;

pub use band::{BandBreach, LtvBand};
pub use keeper::{
    ChainConfig, GasConfig, GasPricingModel, KeeperConfig, TimingConfig, TokenConfig,
    CONFIG_PATH_ENV,
};
