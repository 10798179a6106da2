//! Protocol abstraction consumed by the keeper core.
//!
//! The core never talks to the network directly. It reads position state
//! through [`StateReader`] and hands ordered batches of [`MarketStep`]s to a
//! [`TransactionSubmitter`], which turns them into one signed transaction.

use alloy::primitives::{Address, B256};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::fmt;

/// One money-market operation inside a correction transaction.
///
/// Amounts are in human units (stable asset or yield token), already
/// truncated by the caller to the precision it wants on-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketStep {
    /// Borrow stable asset against posted collateral.
    BorrowStable { amount: Decimal },
    /// Deposit stable asset into the yield market (mints yield token).
    DepositStable { amount: Decimal },
    /// Redeem yield token for stable asset.
    RedeemYieldToken { amount: Decimal },
    /// Repay outstanding stable-asset loan.
    RepayStable { amount: Decimal },
}

impl MarketStep {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BorrowStable { .. } => "borrow_stable",
            Self::DepositStable { .. } => "deposit_stable",
            Self::RedeemYieldToken { .. } => "redeem_yield_token",
            Self::RepayStable { .. } => "repay_stable",
        }
    }

    /// Amount carried by the step.
    pub fn amount(&self) -> Decimal {
        match *self {
            Self::BorrowStable { amount }
            | Self::DepositStable { amount }
            | Self::RedeemYieldToken { amount }
            | Self::RepayStable { amount } => amount,
        }
    }
}

impl fmt::Display for MarketStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.amount())
    }
}

/// Summary of a confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedTx {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
    pub gas_used: u64,
}

/// Point-in-time reads of the position and market.
///
/// No staleness guarantee is made across separate calls.
#[async_trait]
pub trait StateReader: Send + Sync {
    /// Maximum stable-asset amount borrowable against the account's collateral.
    async fn borrow_limit(&self, account: Address) -> Result<Decimal>;

    /// Current stable-asset loan of the account.
    async fn loan_amount(&self, account: Address) -> Result<Decimal>;

    /// Stable-asset value of one yield token.
    async fn exchange_rate(&self) -> Result<Decimal>;

    /// Yield-token balance of the account.
    async fn token_balance(&self, account: Address) -> Result<Decimal>;
}

/// Executes an ordered batch of steps as one transaction.
///
/// Implementations sign, broadcast and block until the transaction is
/// confirmed or rejected. Either every step commits or none does.
#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    async fn submit(&self, steps: &[MarketStep]) -> Result<SubmittedTx>;
}
