//! In-memory market used by unit tests.
//!
//! Implements both [`StateReader`] and [`TransactionSubmitter`]; confirmed
//! batches are applied to the market's own state so a follow-up read sees
//! the corrected position.

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use keeper_chain::{MarketStep, StateReader, SubmittedTx, TransactionSubmitter};
use parking_lot::Mutex;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Default)]
pub struct MarketState {
    pub borrow_limit: Decimal,
    pub loan_amount: Decimal,
    pub exchange_rate: Decimal,
    pub token_balance: Decimal,
    pub stable_balance: Decimal,
}

#[derive(Debug, Default)]
pub struct MockMarket {
    pub state: Mutex<MarketState>,
    pub submissions: Mutex<Vec<Vec<MarketStep>>>,
    pub fail_reads: Mutex<Option<&'static str>>,
    pub fail_submit: Mutex<bool>,
    pub reads: Mutex<usize>,
}

impl MockMarket {
    pub fn new(borrow_limit: Decimal, loan_amount: Decimal) -> Self {
        let market = Self::default();
        {
            let mut state = market.state.lock();
            state.borrow_limit = borrow_limit;
            state.loan_amount = loan_amount;
            state.exchange_rate = Decimal::ONE;
        }
        market
    }

    pub fn with_yield(self, exchange_rate: Decimal, token_balance: Decimal) -> Self {
        {
            let mut state = self.state.lock();
            state.exchange_rate = exchange_rate;
            state.token_balance = token_balance;
        }
        self
    }

    /// Make the named read fail ("borrow_limit", "loan_amount", ...).
    pub fn fail_read(&self, what: &'static str) {
        *self.fail_reads.lock() = Some(what);
    }

    pub fn fail_submissions(&self) {
        *self.fail_submit.lock() = true;
    }

    pub fn submitted(&self) -> Vec<Vec<MarketStep>> {
        self.submissions.lock().clone()
    }

    pub fn loan_amount_now(&self) -> Decimal {
        self.state.lock().loan_amount
    }

    fn read(&self, what: &'static str) -> anyhow::Result<()> {
        *self.reads.lock() += 1;
        if *self.fail_reads.lock() == Some(what) {
            anyhow::bail!("rpc timeout while reading {what}");
        }
        Ok(())
    }
}

#[async_trait]
impl StateReader for MockMarket {
    async fn borrow_limit(&self, _account: Address) -> anyhow::Result<Decimal> {
        self.read("borrow_limit")?;
        Ok(self.state.lock().borrow_limit)
    }

    async fn loan_amount(&self, _account: Address) -> anyhow::Result<Decimal> {
        self.read("loan_amount")?;
        Ok(self.state.lock().loan_amount)
    }

    async fn exchange_rate(&self) -> anyhow::Result<Decimal> {
        self.read("exchange_rate")?;
        Ok(self.state.lock().exchange_rate)
    }

    async fn token_balance(&self, _account: Address) -> anyhow::Result<Decimal> {
        self.read("token_balance")?;
        Ok(self.state.lock().token_balance)
    }
}

#[async_trait]
impl TransactionSubmitter for MockMarket {
    async fn submit(&self, steps: &[MarketStep]) -> anyhow::Result<SubmittedTx> {
        if *self.fail_submit.lock() {
            anyhow::bail!("transaction reverted");
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;
        for step in steps {
            match *step {
                MarketStep::BorrowStable { amount } => {
                    state.loan_amount += amount;
                    state.stable_balance += amount;
                }
                MarketStep::DepositStable { amount } => {
                    state.stable_balance -= amount;
                    state.token_balance += amount / state.exchange_rate;
                }
                MarketStep::RedeemYieldToken { amount } => {
                    state.token_balance -= amount;
                    state.stable_balance += amount * state.exchange_rate;
                }
                MarketStep::RepayStable { amount } => {
                    state.loan_amount -= amount;
                    state.stable_balance -= amount;
                }
            }
        }
        drop(guard);

        let mut submissions = self.submissions.lock();
        submissions.push(steps.to_vec());
        Ok(SubmittedTx {
            tx_hash: B256::repeat_byte(submissions.len() as u8),
            block_number: Some(100 + submissions.len() as u64),
            gas_used: 250_000,
        })
    }
}
