//! Position adjustment toward a target LTV.
//!
//! A correction is one of two mutually exclusive procedures:
//!
//! ```text
//! expand   (delta > 0):  borrow delta  -> deposit delta
//! contract (delta < 0):  redeem |delta| / rate yield tokens -> repay |delta|
//! ```
//!
//! Both steps of a procedure go out in one transaction, in that order, so
//! the position is never less collateralized than before at any
//! intermediate on-chain state.

use std::sync::Arc;

use alloy::primitives::Address;
use keeper_chain::{MarketStep, StateReader, SubmittedTx, TransactionSubmitter};
use rust_decimal::Decimal;
use tracing::{info, instrument};

use crate::decimal_math::{target_loan_amount, yield_tokens_for};
use crate::error::{KeeperError, Result};

/// Decision derived from a fresh read of the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustmentPlan {
    /// Loan already matches the target.
    Unchanged { new_loan_amount: Decimal },
    /// Borrow and deposit `amount` stable.
    Expand {
        new_loan_amount: Decimal,
        amount: Decimal,
    },
    /// Repay `repay` stable, funded by redeeming yield token.
    Contract {
        new_loan_amount: Decimal,
        repay: Decimal,
    },
}

impl AdjustmentPlan {
    /// Signed loan change: positive expands, negative contracts.
    pub fn delta(&self) -> Decimal {
        match *self {
            Self::Unchanged { .. } => Decimal::ZERO,
            Self::Expand { amount, .. } => amount,
            Self::Contract { repay, .. } => -repay,
        }
    }

    pub fn new_loan_amount(&self) -> Decimal {
        match *self {
            Self::Unchanged { new_loan_amount }
            | Self::Expand { new_loan_amount, .. }
            | Self::Contract { new_loan_amount, .. } => new_loan_amount,
        }
    }
}

/// Compute the corrective plan for `target_ltv` percent.
pub fn plan_adjustment(
    borrow_limit: Decimal,
    loan_amount: Decimal,
    target_ltv: Decimal,
) -> AdjustmentPlan {
    let new_loan_amount = target_loan_amount(borrow_limit, target_ltv);
    let delta = new_loan_amount - loan_amount;

    if delta.is_zero() {
        AdjustmentPlan::Unchanged { new_loan_amount }
    } else if delta.is_sign_positive() {
        AdjustmentPlan::Expand {
            new_loan_amount,
            amount: delta,
        }
    } else {
        AdjustmentPlan::Contract {
            new_loan_amount,
            repay: delta.abs(),
        }
    }
}

/// Ordered steps for an expansion.
pub fn expansion_steps(amount: Decimal) -> [MarketStep; 2] {
    [
        MarketStep::BorrowStable { amount },
        MarketStep::DepositStable { amount },
    ]
}

/// Ordered steps for a contraction.
pub fn contraction_steps(redeem: Decimal, repay: Decimal) -> [MarketStep; 2] {
    [
        MarketStep::RedeemYieldToken { amount: redeem },
        MarketStep::RepayStable { amount: repay },
    ]
}

/// What a call to [`PositionAdjuster::set_ltv`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Adjustment {
    Unchanged,
    Expanded {
        amount: Decimal,
        tx: SubmittedTx,
    },
    Contracted {
        repaid: Decimal,
        redeemed: Decimal,
        exchange_rate: Decimal,
        tx: SubmittedTx,
    },
}

impl Adjustment {
    pub fn transaction(&self) -> Option<&SubmittedTx> {
        match self {
            Self::Unchanged => None,
            Self::Expanded { tx, .. } | Self::Contracted { tx, .. } => Some(tx),
        }
    }
}

/// Drives the expand/contract procedures for one account.
pub struct PositionAdjuster<R, S> {
    reader: Arc<R>,
    submitter: Arc<S>,
    account: Address,
}

impl<R, S> PositionAdjuster<R, S>
where
    R: StateReader,
    S: TransactionSubmitter,
{
    pub fn new(reader: Arc<R>, submitter: Arc<S>, account: Address) -> Self {
        Self {
            reader,
            submitter,
            account,
        }
    }

    /// Move the position to `target_ltv` percent.
    ///
    /// State is always read fresh here, never reused from an earlier
    /// evaluation. At most one transaction is submitted.
    #[instrument(skip(self), fields(account = %self.account))]
    pub async fn set_ltv(&self, target_ltv: Decimal) -> Result<Adjustment> {
        let borrow_limit = self
            .reader
            .borrow_limit(self.account)
            .await
            .map_err(KeeperError::state("borrow limit"))?;
        let loan_amount = self
            .reader
            .loan_amount(self.account)
            .await
            .map_err(KeeperError::state("loan amount"))?;

        let plan = plan_adjustment(borrow_limit, loan_amount, target_ltv);
        info!(
            new_loan_amount = %plan.new_loan_amount().round_dp(2),
            delta = %plan.delta().round_dp(2),
            "Computed loan adjustment"
        );

        let adjustment = match plan {
            AdjustmentPlan::Unchanged { .. } => {
                info!("LTV is already at the requested value");
                Adjustment::Unchanged
            }
            AdjustmentPlan::Expand { amount, .. } => self.expand(amount).await?,
            AdjustmentPlan::Contract { repay, .. } => self.contract(repay).await?,
        };

        if adjustment.transaction().is_some() {
            info!(target_ltv = %target_ltv, "LTV set");
        }
        Ok(adjustment)
    }

    async fn expand(&self, amount: Decimal) -> Result<Adjustment> {
        info!(amount = %amount, "Borrowing and depositing");
        let tx = self
            .submitter
            .submit(&expansion_steps(amount))
            .await
            .map_err(KeeperError::submission("borrow and deposit"))?;
        Ok(Adjustment::Expanded { amount, tx })
    }

    async fn contract(&self, repay: Decimal) -> Result<Adjustment> {
        info!(repay = %repay, "Redeeming yield token and repaying loan");

        let exchange_rate = self
            .reader
            .exchange_rate()
            .await
            .map_err(KeeperError::state("exchange rate"))?;
        let redeem = yield_tokens_for(repay, exchange_rate)
            .ok_or(KeeperError::InvalidExchangeRate {
                rate: exchange_rate,
            })?;
        info!(
            redeem = %redeem.round_dp(2),
            exchange_rate = %exchange_rate,
            "Yield token to redeem"
        );

        let balance = self
            .reader
            .token_balance(self.account)
            .await
            .map_err(KeeperError::state("yield token balance"))?;
        info!(balance = %balance.round_dp(2), "Yield token balance");

        if balance < redeem {
            return Err(KeeperError::InsufficientBalance {
                balance,
                required: redeem,
            });
        }

        let tx = self
            .submitter
            .submit(&contraction_steps(redeem, repay))
            .await
            .map_err(KeeperError::submission("redeem and repay"))?;
        Ok(Adjustment::Contracted {
            repaid: repay,
            redeemed: redeem,
            exchange_rate,
            tx,
        })
    }
}
