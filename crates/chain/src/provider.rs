//! Read side of the chain adapter.
//! Uses Alloy providers for type-safe RPC interactions.

use std::time::Duration;

use alloy::primitives::Address;
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::client::RpcClient;
use alloy::transports::http::reqwest::{Client, Url};
use alloy::transports::http::Http;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::contracts::{IMarket, IOverseer, MarketAddresses, IERC20};
use crate::protocol::StateReader;
use crate::units::{to_decimal, wad_to_decimal};

/// Build an RPC client whose HTTP requests give up after `timeout`.
pub fn http_client(rpc_url: &str, timeout: Duration) -> Result<RpcClient> {
    let url: Url = rpc_url
        .parse()
        .with_context(|| format!("invalid RPC URL '{rpc_url}'"))?;
    let client = Client::builder()
        .timeout(timeout)
        .build()
        .context("building HTTP client")?;
    let is_local = url
        .host_str()
        .is_some_and(|h| h == "localhost" || h == "127.0.0.1");
    Ok(RpcClient::new(Http::with_client(client, url), is_local))
}

/// Token precision used when scaling raw amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenDecimals {
    pub stable: u32,
    pub yield_token: u32,
}

impl Default for TokenDecimals {
    fn default() -> Self {
        Self {
            stable: 6,
            yield_token: 6,
        }
    }
}

/// [`StateReader`] backed by the overseer, market and yield token contracts.
#[derive(Clone)]
pub struct MarketReader {
    provider: RootProvider,
    addresses: MarketAddresses,
    decimals: TokenDecimals,
}

impl MarketReader {
    /// Create a reader over an HTTP endpoint.
    pub fn new(
        rpc_url: &str,
        timeout: Duration,
        addresses: MarketAddresses,
        decimals: TokenDecimals,
    ) -> Result<Self> {
        let provider = RootProvider::new(http_client(rpc_url, timeout)?);
        Ok(Self {
            provider,
            addresses,
            decimals,
        })
    }

    /// Contract addresses this reader queries.
    pub fn addresses(&self) -> &MarketAddresses {
        &self.addresses
    }

    /// Check that the endpoint answers and serves the expected chain.
    pub async fn health_check(&self, expected_chain_id: u64) -> Result<u64> {
        let chain_id = self
            .provider
            .get_chain_id()
            .await
            .context("querying chain id")?;
        anyhow::ensure!(
            chain_id == expected_chain_id,
            "RPC serves chain {chain_id}, expected {expected_chain_id}"
        );
        let block = self
            .provider
            .get_block_number()
            .await
            .context("querying block number")?;
        info!(chain_id, block, "Provider connection verified");
        Ok(block)
    }
}

#[async_trait]
impl StateReader for MarketReader {
    async fn borrow_limit(&self, account: Address) -> Result<Decimal> {
        let overseer = IOverseer::new(self.addresses.overseer, &self.provider);
        let raw = overseer
            .borrowLimit(account)
            .call()
            .await
            .context("overseer borrowLimit call failed")?
            .limit;
        let limit = to_decimal(raw, self.decimals.stable)?;
        debug!(account = %account, borrow_limit = %limit, "Fetched borrow limit");
        Ok(limit)
    }

    async fn loan_amount(&self, account: Address) -> Result<Decimal> {
        let market = IMarket::new(self.addresses.market, &self.provider);
        let info = market
            .borrowerInfo(account)
            .call()
            .await
            .context("market borrowerInfo call failed")?;
        let loan = to_decimal(info.loanAmount, self.decimals.stable)?;
        debug!(account = %account, loan_amount = %loan, "Fetched loan amount");
        Ok(loan)
    }

    async fn exchange_rate(&self) -> Result<Decimal> {
        let market = IMarket::new(self.addresses.market, &self.provider);
        let state = market
            .epochState()
            .call()
            .await
            .context("market epochState call failed")?;
        let rate = wad_to_decimal(state.exchangeRate)?;
        debug!(exchange_rate = %rate, "Fetched exchange rate");
        Ok(rate)
    }

    async fn token_balance(&self, account: Address) -> Result<Decimal> {
        let token = IERC20::new(self.addresses.yield_token, &self.provider);
        let raw = token
            .balanceOf(account)
            .call()
            .await
            .context("yield token balanceOf call failed")?
            .balance;
        let balance = to_decimal(raw, self.decimals.yield_token)?;
        debug!(account = %account, balance = %balance, "Fetched yield token balance");
        Ok(balance)
    }
}

impl std::fmt::Debug for MarketReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketReader")
            .field("addresses", &self.addresses)
            .field("decimals", &self.decimals)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_client_rejects_bad_url() {
        assert!(http_client("not a url", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_default_decimals() {
        let decimals = TokenDecimals::default();
        assert_eq!(decimals.stable, 6);
        assert_eq!(decimals.yield_token, 6);
    }

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_reader_health_check() {
        let reader = MarketReader::new(
            "http://localhost:8545",
            Duration::from_secs(5),
            MarketAddresses {
                overseer: Address::ZERO,
                market: Address::ZERO,
                yield_token: Address::ZERO,
                position_account: Address::ZERO,
            },
            TokenDecimals::default(),
        )
        .unwrap();

        assert!(reader.health_check(31337).await.is_ok());
    }
}
