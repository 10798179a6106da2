//! Keeper chain interaction layer.
//!
//! This crate provides:
//! - The read/submit interfaces the keeper core depends on
//! - Contract bindings for the overseer, market, yield token and position account
//! - An RPC-backed state reader
//! - Transaction signing and sending with local nonce tracking
//! - Gas strategy abstraction (Legacy + EIP-1559)
//! - Raw on-chain integer to decimal conversion

pub mod contracts;
pub mod gas;
pub mod protocol;
mod provider;
mod signer;
pub mod units;

pub use contracts::{MarketAddresses, StepEncoder};
pub use gas::{create_gas_strategy, Eip1559GasStrategy, GasParams, GasStrategy, LegacyGasStrategy};
pub use protocol::{MarketStep, StateReader, SubmittedTx, TransactionSubmitter};
pub use provider::{http_client, MarketReader, TokenDecimals};
pub use signer::{NonceTracker, TransactionSender, TransactionSenderBuilder};
