//! Gas pricing for correction transactions.
//!
//! Two strategies are supported: a single `gas_price` for chains without
//! EIP-1559, and base fee + tip for the rest. Both cap what they pay.

use alloy::network::TransactionBuilder;
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::TransactionRequest;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fmt::Debug;

const GWEI: f64 = 1e9;

/// Gas parameters fetched from the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GasParams {
    Legacy {
        gas_price: u128,
    },
    Eip1559 {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
}

impl GasParams {
    /// Highest price per gas the transaction may pay.
    pub fn effective_gas_price(&self) -> u128 {
        match self {
            GasParams::Legacy { gas_price } => *gas_price,
            GasParams::Eip1559 { max_fee_per_gas, .. } => *max_fee_per_gas,
        }
    }
}

/// A way of pricing gas.
#[async_trait]
pub trait GasStrategy: Send + Sync + Debug {
    /// Query current prices.
    async fn fetch_params(&self, provider: &RootProvider) -> Result<GasParams>;

    /// Write the price fields into the request.
    fn apply_gas(&self, tx: &mut TransactionRequest, params: &GasParams);

    fn strategy_name(&self) -> &'static str;
}

/// Pre-EIP-1559 pricing: node's gas price, capped.
#[derive(Debug)]
pub struct LegacyGasStrategy {
    default_gas_price: u128,
    max_gas_price: u128,
}

impl LegacyGasStrategy {
    pub fn new(default_gas_price: u128, max_gas_price: u128) -> Self {
        Self {
            default_gas_price,
            max_gas_price,
        }
    }

    fn cap(&self, price: u128) -> u128 {
        price.min(self.max_gas_price)
    }
}

#[async_trait]
impl GasStrategy for LegacyGasStrategy {
    async fn fetch_params(&self, provider: &RootProvider) -> Result<GasParams> {
        let quoted = provider
            .get_gas_price()
            .await
            .unwrap_or(self.default_gas_price);
        Ok(GasParams::Legacy {
            gas_price: self.cap(quoted),
        })
    }

    fn apply_gas(&self, tx: &mut TransactionRequest, params: &GasParams) {
        tx.set_gas_price(params.effective_gas_price());
    }

    fn strategy_name(&self) -> &'static str {
        "Legacy"
    }
}

/// EIP-1559 pricing: `max_fee = base_fee * multiplier + tip`, capped.
#[derive(Debug)]
pub struct Eip1559GasStrategy {
    priority_fee: u128,
    base_fee_multiplier: f64,
    max_fee_cap: u128,
}

impl Eip1559GasStrategy {
    pub fn new(priority_fee: u128, base_fee_multiplier: f64, max_fee_cap: u128) -> Self {
        Self {
            priority_fee,
            base_fee_multiplier,
            max_fee_cap,
        }
    }

    fn params_for(&self, base_fee: u128) -> GasParams {
        let scaled = (base_fee as f64 * self.base_fee_multiplier) as u128;
        let max_fee = scaled.saturating_add(self.priority_fee).min(self.max_fee_cap);
        GasParams::Eip1559 {
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: self.priority_fee.min(max_fee),
        }
    }
}

#[async_trait]
impl GasStrategy for Eip1559GasStrategy {
    async fn fetch_params(&self, provider: &RootProvider) -> Result<GasParams> {
        let block = provider
            .get_block_by_number(alloy::eips::BlockNumberOrTag::Latest)
            .await
            .context("fetching latest block")?
            .ok_or_else(|| anyhow::anyhow!("latest block not available"))?;
        let base_fee = block
            .header
            .base_fee_per_gas
            .map(u128::from)
            .ok_or_else(|| anyhow::anyhow!("chain does not report a base fee"))?;
        Ok(self.params_for(base_fee))
    }

    fn apply_gas(&self, tx: &mut TransactionRequest, params: &GasParams) {
        match params {
            GasParams::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                tx.set_max_fee_per_gas(*max_fee_per_gas);
                tx.set_max_priority_fee_per_gas(*max_priority_fee_per_gas);
            }
            GasParams::Legacy { gas_price } => tx.set_gas_price(*gas_price),
        }
    }

    fn strategy_name(&self) -> &'static str {
        "EIP-1559"
    }
}

/// Create a gas strategy from configured values (all prices in gwei).
///
/// Unknown pricing models fall back to legacy pricing.
pub fn create_gas_strategy(
    pricing_model: &str,
    default_gas_price_gwei: f64,
    max_gas_price_gwei: f64,
    priority_fee_gwei: Option<f64>,
) -> Box<dyn GasStrategy> {
    let max_gas_price = (max_gas_price_gwei * GWEI) as u128;
    match pricing_model.to_lowercase().as_str() {
        "eip1559" | "eip-1559" => Box::new(Eip1559GasStrategy::new(
            (priority_fee_gwei.unwrap_or(1.0) * GWEI) as u128,
            2.0,
            max_gas_price,
        )),
        _ => Box::new(LegacyGasStrategy::new(
            (default_gas_price_gwei * GWEI) as u128,
            max_gas_price,
        )),
    }
}
