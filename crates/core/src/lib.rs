//! LTV keeper core logic.
//!
//! This crate provides:
//! - LTV computation and band checks
//! - Position expansion/contraction toward a target LTV
//! - The periodic control loop
//! - Keeper configuration
//!
//! Chain access goes through the `StateReader` and `TransactionSubmitter`
//! traits from `keeper-chain`.

mod adjuster;
pub mod config;
mod controller;
pub mod decimal_math;
mod error;
mod ltv;

#[cfg(test)]
mod testing;

pub use adjuster::{
    contraction_steps, expansion_steps, plan_adjustment, Adjustment, AdjustmentPlan,
    PositionAdjuster,
};
pub use config::{BandBreach, KeeperConfig, LtvBand};
pub use controller::Controller;
pub use error::{KeeperError, Result};
pub use ltv::{Correction, LtvEvaluator};
