//! Contract bindings for the money market and the position account.
//!
//! The market follows the Anchor layout: an overseer that knows the
//! borrow limit of each borrower, and a market that holds loans, takes
//! stable deposits and issues the yield-bearing token.

use alloy::primitives::{Address, Bytes};
use alloy::sol;
use alloy::sol_types::SolCall;
use anyhow::{ensure, Result};

use crate::protocol::MarketStep;
use crate::units::to_raw;

sol! {
    /// Overseer: collateral accounting.
    #[sol(rpc)]
    interface IOverseer {
        function borrowLimit(address borrower) external view returns (uint256 limit);
    }

    /// Market: loans, stable deposits and yield token redemption.
    #[sol(rpc)]
    interface IMarket {
        function borrowerInfo(address borrower) external view returns (
            uint256 loanAmount,
            uint256 interestIndex,
            uint256 pendingRewards
        );
        function epochState() external view returns (
            uint256 exchangeRate,
            uint256 yieldTokenSupply
        );

        function borrowStable(uint256 amount) external;
        function depositStable(uint256 amount) external;
        function redeemStable(uint256 yieldTokenAmount) external;
        function repayStable(uint256 amount) external;
    }

    /// Yield token balance lookup.
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256 balance);
    }

    /// Single call executed by the position account.
    #[derive(Debug, PartialEq, Eq)]
    struct Call {
        address target;
        bytes data;
    }

    /// Position account owned by the keeper's signer.
    /// Runs the calls in order and reverts all of them if any fails.
    #[sol(rpc)]
    interface IPositionAccount {
        function execute(Call[] calldata calls) external;
    }
}

/// Addresses of the contracts the keeper talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketAddresses {
    pub overseer: Address,
    pub market: Address,
    pub yield_token: Address,
    /// The borrower. Reads are made for this address and corrections are
    /// sent to it as a batched `execute` call.
    pub position_account: Address,
}

/// Encodes [`MarketStep`]s into position-account calldata.
#[derive(Debug, Clone, Copy)]
pub struct StepEncoder {
    market: Address,
    stable_decimals: u32,
    yield_decimals: u32,
}

impl StepEncoder {
    pub fn new(market: Address, stable_decimals: u32, yield_decimals: u32) -> Self {
        Self {
            market,
            stable_decimals,
            yield_decimals,
        }
    }

    /// Encode one step as a call on the market.
    pub fn encode_step(&self, step: &MarketStep) -> Result<Call> {
        let data = match *step {
            MarketStep::BorrowStable { amount } => IMarket::borrowStableCall {
                amount: to_raw(amount, self.stable_decimals)?,
            }
            .abi_encode(),
            MarketStep::DepositStable { amount } => IMarket::depositStableCall {
                amount: to_raw(amount, self.stable_decimals)?,
            }
            .abi_encode(),
            MarketStep::RedeemYieldToken { amount } => IMarket::redeemStableCall {
                yieldTokenAmount: to_raw(amount, self.yield_decimals)?,
            }
            .abi_encode(),
            MarketStep::RepayStable { amount } => IMarket::repayStableCall {
                amount: to_raw(amount, self.stable_decimals)?,
            }
            .abi_encode(),
        };

        Ok(Call {
            target: self.market,
            data: Bytes::from(data),
        })
    }

    /// Encode the whole batch as a single `execute` call, preserving order.
    pub fn encode_batch(&self, steps: &[MarketStep]) -> Result<Bytes> {
        ensure!(!steps.is_empty(), "refusing to encode an empty step batch");
        let calls = steps
            .iter()
            .map(|step| self.encode_step(step))
            .collect::<Result<Vec<_>>>()?;
        Ok(Bytes::from(IPositionAccount::executeCall { calls }.abi_encode()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;
    use rust_decimal_macros::dec;

    fn encoder() -> StepEncoder {
        StepEncoder::new(Address::repeat_byte(0xaa), 6, 6)
    }

    #[test]
    fn test_encode_borrow_scales_amount() {
        let call = encoder()
            .encode_step(&MarketStep::BorrowStable { amount: dec!(150) })
            .unwrap();
        assert_eq!(call.target, Address::repeat_byte(0xaa));

        let decoded = IMarket::borrowStableCall::abi_decode(&call.data, true).unwrap();
        assert_eq!(decoded.amount, U256::from(150_000_000u64));
    }

    #[test]
    fn test_encode_batch_preserves_order() {
        let steps = [
            MarketStep::RedeemYieldToken { amount: dec!(125) },
            MarketStep::RepayStable { amount: dec!(150) },
        ];
        let calldata = encoder().encode_batch(&steps).unwrap();
        let decoded = IPositionAccount::executeCall::abi_decode(&calldata, true).unwrap();

        assert_eq!(decoded.calls.len(), 2);
        assert_eq!(
            &decoded.calls[0].data[..4],
            IMarket::redeemStableCall::SELECTOR.as_slice()
        );
        assert_eq!(
            &decoded.calls[1].data[..4],
            IMarket::repayStableCall::SELECTOR.as_slice()
        );
    }

    #[test]
    fn test_encode_empty_batch_fails() {
        assert!(encoder().encode_batch(&[]).is_err());
    }
}
