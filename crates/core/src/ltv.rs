use std::sync::Arc;

use alloy::primitives::Address;
use keeper_chain::{StateReader, TransactionSubmitter};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::adjuster::{Adjustment, PositionAdjuster};
use crate::config::{BandBreach, LtvBand};
use crate::decimal_math::ltv_percent;
use crate::error::{KeeperError, Result};

/// Outcome of one band check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correction {
    WithinBand {
        ltv: Decimal,
    },
    Adjusted {
        ltv: Decimal,
        breach: BandBreach,
        adjustment: Adjustment,
    },
}

impl Correction {
    pub fn ltv(&self) -> Decimal {
        match self {
            Self::WithinBand { ltv } | Self::Adjusted { ltv, .. } => *ltv,
        }
    }
}

/// Computes the position's LTV and corrects it when it leaves the band.
pub struct LtvEvaluator<R, S> {
    reader: Arc<R>,
    adjuster: PositionAdjuster<R, S>,
    account: Address,
}

impl<R, S> LtvEvaluator<R, S>
where
    R: StateReader,
    S: TransactionSubmitter,
{
    pub fn new(reader: Arc<R>, submitter: Arc<S>, account: Address) -> Self {
        let adjuster = PositionAdjuster::new(reader.clone(), submitter, account);
        Self {
            reader,
            adjuster,
            account,
        }
    }

    pub fn account(&self) -> Address {
        self.account
    }

    /// Current LTV in percent.
    pub async fn compute_ltv(&self) -> Result<Decimal> {
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

        debug!(
            borrow_limit = %borrow_limit,
            loan_amount = %loan_amount,
            "Read position"
        );

        ltv_percent(loan_amount, borrow_limit).ok_or(KeeperError::NoBorrowLimit { loan_amount })
    }

    /// Check the LTV against `band` and move it to the target if outside.
    pub async fn check_and_correct(&self, band: &LtvBand) -> Result<Correction> {
        let ltv = self.compute_ltv().await?;
        info!(ltv = %ltv.round_dp(2), "Current LTV");

        let Some(breach) = band.breach(ltv) else {
            debug!(
                ltv = %ltv.round_dp(2),
                min_ltv = %band.min_ltv,
                max_ltv = %band.max_ltv,
                "LTV within band"
            );
            return Ok(Correction::WithinBand { ltv });
        };

        let bound = match breach {
            BandBreach::Below => band.min_ltv,
            BandBreach::Above => band.max_ltv,
        };
        warn!(
            ltv = %ltv.round_dp(2),
            bound = %bound,
            direction = breach.as_str(),
            target_ltv = %band.target_ltv,
            "LTV out of band, adjusting"
        );

        let adjustment = self.adjuster.set_ltv(band.target_ltv).await?;
        Ok(Correction::Adjusted {
            ltv,
            breach,
            adjustment,
        })
    }
}
