use rust_decimal::Decimal;
use thiserror::Error;

/// Errors surfaced by an evaluation cycle.
///
/// Chain-level failures arrive as `anyhow::Error` and are wrapped with the
/// step that failed; nothing here is fatal to the control loop except
/// [`KeeperError::Config`], which only occurs before the loop starts.
#[derive(Error, Debug)]
pub enum KeeperError {
    #[error("state unavailable: reading {what} failed")]
    StateUnavailable {
        what: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("ltv undefined: borrow limit is zero (loan amount {loan_amount})")]
    NoBorrowLimit { loan_amount: Decimal },

    #[error("invalid yield token exchange rate: {rate}")]
    InvalidExchangeRate { rate: Decimal },

    #[error("not enough yield token in wallet (balance {balance} / needed {required})")]
    InsufficientBalance { balance: Decimal, required: Decimal },

    #[error("submitting {action} transaction failed")]
    SubmissionFailed {
        action: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl KeeperError {
    pub(crate) fn state(what: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::StateUnavailable { what, source }
    }

    pub(crate) fn submission(action: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::SubmissionFailed { action, source }
    }
}

pub type Result<T, E = KeeperError> = std::result::Result<T, E>;
