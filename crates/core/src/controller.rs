//! Periodic LTV control loop.

use std::error::Error as _;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use keeper_chain::{StateReader, TransactionSubmitter};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::LtvBand;
use crate::error::Result;
use crate::ltv::{Correction, LtvEvaluator};

/// Owns the evaluator and drives it on a fixed interval.
///
/// One controller per account: the submitter's nonce is not shared with any
/// other sender.
pub struct Controller<R, S> {
    evaluator: LtvEvaluator<R, S>,
    band: LtvBand,
    check_period: Duration,
}

impl<R, S> Controller<R, S>
where
    R: StateReader,
    S: TransactionSubmitter,
{
    pub fn new(
        reader: Arc<R>,
        submitter: Arc<S>,
        account: Address,
        band: LtvBand,
        check_period: Duration,
    ) -> Self {
        Self {
            evaluator: LtvEvaluator::new(reader, submitter, account),
            band,
            check_period,
        }
    }

    pub fn band(&self) -> &LtvBand {
        &self.band
    }

    /// One evaluation against `band`.
    pub async fn evaluate(&self, band: &LtvBand) -> Result<Correction> {
        self.evaluator.check_and_correct(band).await
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// The first check happens one period after start. A cycle in flight when
    /// cancellation arrives runs to completion; ticks missed while a cycle is
    /// running are skipped.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            account = %self.evaluator.account(),
            check_period_secs = self.check_period.as_secs(),
            "LTV keeper started"
        );

        let mut ticker = interval_at(Instant::now() + self.check_period, self.check_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut consecutive_failures: u32 = 0;

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    info!("LTV keeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let started = chrono::Utc::now();
                    match self.evaluate(&self.band).await {
                        Ok(correction) => {
                            consecutive_failures = 0;
                            log_correction(&correction, started);
                        }
                        Err(e) => {
                            consecutive_failures += 1;
                            error!(
                                error = %e,
                                cause = ?e.source().map(ToString::to_string),
                                consecutive_failures,
                                started_at = %started.to_rfc3339(),
                                "LTV check failed"
                            );
                        }
                    }
                }
            }
        }
    }
}

fn log_correction(correction: &Correction, started: chrono::DateTime<chrono::Utc>) {
    let elapsed_ms = (chrono::Utc::now() - started).num_milliseconds();
    match correction {
        Correction::WithinBand { ltv } => {
            info!(ltv = %ltv.round_dp(2), elapsed_ms, "LTV check complete, no action");
        }
        Correction::Adjusted {
            ltv, adjustment, ..
        } => match adjustment.transaction() {
            Some(tx) => info!(
                ltv = %ltv.round_dp(2),
                tx_hash = %tx.tx_hash,
                block = ?tx.block_number,
                gas_used = tx.gas_used,
                elapsed_ms,
                "LTV corrected"
            ),
            None => info!(
                ltv = %ltv.round_dp(2),
                elapsed_ms,
                "LTV already at target after re-read"
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KeeperError;
    use crate::testing::MockMarket;
    use rust_decimal_macros::dec;

    fn controller(market: &Arc<MockMarket>) -> Controller<MockMarket, MockMarket> {
        Controller::new(
            market.clone(),
            market.clone(),
            Address::repeat_byte(7),
            LtvBand::default(),
            Duration::from_secs(10),
        )
    }

    #[tokio::test]
    async fn test_evaluate_scenario_a() {
        let market = Arc::new(MockMarket::new(dec!(1000), dec!(600)));
        let controller = controller(&market);

        let correction = controller.evaluate(controller.band()).await.unwrap();

        assert!(matches!(correction, Correction::Adjusted { .. }));
        assert_eq!(market.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_evaluate_surfaces_errors() {
        let market = Arc::new(MockMarket::new(dec!(1000), dec!(600)));
        market.fail_read("borrow_limit");

        let err = controller(&market)
            .evaluate(&LtvBand::default())
            .await
            .unwrap_err();

        assert!(matches!(err, KeeperError::StateUnavailable { what: "borrow limit", .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_cancel() {
        let market = Arc::new(MockMarket::new(dec!(1000), dec!(750)));
        let controller = Arc::new(controller(&market));
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn({
            let controller = controller.clone();
            let shutdown = shutdown.clone();
            async move { controller.run(shutdown).await }
        });

        // Ticks at 10s, 20s, 30s
        tokio::time::sleep(Duration::from_secs(35)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(*market.reads.lock(), 6);
        assert!(market.submitted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_check_waits_one_period() {
        let market = Arc::new(MockMarket::new(dec!(1000), dec!(750)));
        let controller = Arc::new(controller(&market));
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn({
            let controller = controller.clone();
            let shutdown = shutdown.clone();
            async move { controller.run(shutdown).await }
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(*market.reads.lock(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_continues_after_failures() {
        let market = Arc::new(MockMarket::new(dec!(1000), dec!(600)));
        market.fail_read("borrow_limit");
        let controller = Arc::new(controller(&market));
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn({
            let controller = controller.clone();
            let shutdown = shutdown.clone();
            async move { controller.run(shutdown).await }
        });

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(*market.reads.lock(), 2);

        // Recovered reads are picked up on the next tick
        *market.fail_reads.lock() = None;
        tokio::time::sleep(Duration::from_secs(10)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(market.submitted().len(), 1);
        assert_eq!(market.loan_amount_now(), dec!(750));
    }
}
