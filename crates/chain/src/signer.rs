//! Transaction signer and sender for position corrections.
//! Uses Alloy providers for type-safe RPC interactions.
//!
//! Every batch of [`MarketStep`]s becomes a single `execute` call on the
//! position account, so the steps commit together or not at all.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::Address;
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::client::RpcClient;
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::contracts::StepEncoder;
use crate::gas::{GasParams, GasStrategy, LegacyGasStrategy};
use crate::protocol::{MarketStep, SubmittedTx, TransactionSubmitter};
use crate::provider::http_client;

const DEFAULT_GAS_LIMIT_MULTIPLIER: f64 = 1.5;
const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Locally tracked account nonce.
///
/// The keeper is the only sender for its account, so the next nonce can be
/// handed out without asking the node. Any failed submission resets it
/// from chain.
#[derive(Debug)]
pub struct NonceTracker {
    next: AtomicU64,
}

impl NonceTracker {
    pub fn new(chain_nonce: u64) -> Self {
        Self {
            next: AtomicU64::new(chain_nonce),
        }
    }

    /// Take the next nonce.
    pub fn reserve(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }

    /// Overwrite with the chain's view.
    pub fn reset(&self, chain_nonce: u64) {
        self.next.store(chain_nonce, Ordering::SeqCst);
    }
}

/// Builder for [`TransactionSender`].
pub struct TransactionSenderBuilder {
    rpc_url: String,
    chain_id: u64,
    http_timeout: Duration,
    confirmation_timeout: Duration,
    gas_limit_multiplier: f64,
    gas_strategy: Option<Box<dyn GasStrategy>>,
}

impl TransactionSenderBuilder {
    pub fn new(rpc_url: impl Into<String>, chain_id: u64) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            chain_id,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            gas_limit_multiplier: DEFAULT_GAS_LIMIT_MULTIPLIER,
            gas_strategy: None,
        }
    }

    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Headroom applied on top of the node's gas estimate.
    pub fn gas_limit_multiplier(mut self, multiplier: f64) -> Self {
        self.gas_limit_multiplier = multiplier;
        self
    }

    pub fn gas_strategy(mut self, strategy: Box<dyn GasStrategy>) -> Self {
        self.gas_strategy = Some(strategy);
        self
    }

    /// Parse the key, fetch the starting nonce and build the sender.
    pub async fn build(
        self,
        private_key: &str,
        encoder: StepEncoder,
        position_account: Address,
    ) -> Result<TransactionSender> {
        let signer: PrivateKeySigner = private_key
            .trim()
            .trim_start_matches("0x")
            .parse()
            .map_err(|_| anyhow!("private key is not a valid secp256k1 key"))?;
        let address = signer.address();
        let wallet = EthereumWallet::from(signer);

        let client = http_client(&self.rpc_url, self.http_timeout)?;
        let provider = RootProvider::new(client.clone());

        let chain_nonce = provider
            .get_transaction_count(address)
            .await
            .context("fetching signer nonce")?;

        let gas_strategy = self.gas_strategy.unwrap_or_else(|| {
            Box::new(LegacyGasStrategy::new(
                1_000_000_000,  // 1 gwei
                50_000_000_000, // 50 gwei
            ))
        });

        info!(
            address = %address,
            position_account = %position_account,
            chain_id = self.chain_id,
            nonce = chain_nonce,
            gas_strategy = gas_strategy.strategy_name(),
            "Transaction sender initialized"
        );

        Ok(TransactionSender {
            client,
            provider,
            wallet,
            address,
            chain_id: self.chain_id,
            nonces: NonceTracker::new(chain_nonce),
            gas_strategy,
            cached_gas_params: parking_lot::RwLock::new(None),
            gas_limit_multiplier: self.gas_limit_multiplier,
            confirmation_timeout: self.confirmation_timeout,
            encoder,
            position_account,
        })
    }
}

/// Signs and sends correction batches to the position account.
pub struct TransactionSender {
    client: RpcClient,
    provider: RootProvider,
    wallet: EthereumWallet,
    /// Signer address (owner of the position account)
    pub address: Address,
    chain_id: u64,
    nonces: NonceTracker,
    gas_strategy: Box<dyn GasStrategy>,
    /// Last successfully fetched gas parameters
    cached_gas_params: parking_lot::RwLock<Option<GasParams>>,
    gas_limit_multiplier: f64,
    confirmation_timeout: Duration,
    encoder: StepEncoder,
    position_account: Address,
}

impl TransactionSender {
    pub fn gas_strategy_name(&self) -> &'static str {
        self.gas_strategy.strategy_name()
    }

    pub fn current_nonce(&self) -> u64 {
        self.nonces.peek()
    }

    /// Reset the local nonce from chain (after any failed submission).
    pub async fn sync_nonce(&self) {
        match self.provider.get_transaction_count(self.address).await {
            Ok(chain_nonce) => {
                self.nonces.reset(chain_nonce);
                debug!(nonce = chain_nonce, "Nonce synced from chain");
            }
            Err(e) => warn!(error = %e, "Failed to sync nonce from chain"),
        }
    }

    /// Gas parameters used by the most recent submission attempt.
    pub fn cached_gas_params(&self) -> Option<GasParams> {
        self.cached_gas_params.read().clone()
    }

    /// Fresh gas parameters, or the last known ones if the node fails to answer.
    async fn gas_params(&self) -> Result<GasParams> {
        match self.gas_strategy.fetch_params(&self.provider).await {
            Ok(params) => {
                *self.cached_gas_params.write() = Some(params.clone());
                Ok(params)
            }
            Err(e) => match self.cached_gas_params() {
                Some(params) => {
                    warn!(error = %e, "Gas price fetch failed, using last known parameters");
                    Ok(params)
                }
                None => Err(e.context("fetching gas price")),
            },
        }
    }

    fn scaled_gas_limit(&self, estimate: u64) -> u64 {
        (estimate as f64 * self.gas_limit_multiplier).ceil() as u64
    }

    async fn send_batch(&self, steps: &[MarketStep]) -> Result<SubmittedTx> {
        let start = Instant::now();
        let calldata = self.encoder.encode_batch(steps)?;

        let mut tx = TransactionRequest::default()
            .with_from(self.address)
            .with_to(self.position_account)
            .with_input(calldata)
            .with_chain_id(self.chain_id);

        // A failing estimate means the batch would revert; nothing is broadcast.
        let estimate = self
            .provider
            .estimate_gas(tx.clone())
            .await
            .context("gas estimation failed")?;
        let gas_limit = self.scaled_gas_limit(estimate);

        let gas_params = self.gas_params().await?;
        self.gas_strategy.apply_gas(&mut tx, &gas_params);

        let nonce = self.nonces.reserve();
        tx.set_nonce(nonce);
        tx.set_gas_limit(gas_limit);

        info!(
            to = %self.position_account,
            nonce,
            gas_limit,
            gas_price_gwei = gas_params.effective_gas_price() / 1_000_000_000,
            steps = steps.len(),
            "Sending transaction"
        );

        let provider = ProviderBuilder::new()
            .wallet(self.wallet.clone())
            .on_client(self.client.clone());
        let pending = provider
            .send_transaction(tx)
            .await
            .context("broadcasting transaction")?;
        let tx_hash = *pending.tx_hash();

        info!(tx_hash = %tx_hash, "Transaction submitted, waiting for confirmation");

        let receipt = tokio::time::timeout(self.confirmation_timeout, pending.get_receipt())
            .await
            .map_err(|_| {
                anyhow!(
                    "transaction {tx_hash} not confirmed within {}s",
                    self.confirmation_timeout.as_secs()
                )
            })?
            .with_context(|| format!("waiting for receipt of {tx_hash}"))?;

        if !receipt.status() {
            bail!("transaction reverted: {tx_hash}");
        }

        info!(
            tx_hash = %tx_hash,
            block = receipt.block_number.unwrap_or(0),
            gas_used = receipt.gas_used,
            total_ms = start.elapsed().as_millis(),
            "Transaction confirmed"
        );

        Ok(SubmittedTx {
            tx_hash,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
        })
    }
}

#[async_trait]
impl TransactionSubmitter for TransactionSender {
    async fn submit(&self, steps: &[MarketStep]) -> Result<SubmittedTx> {
        let result = self.send_batch(steps).await;
        if result.is_err() {
            self.sync_nonce().await;
        }
        result
    }
}

impl std::fmt::Debug for TransactionSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSender")
            .field("address", &self.address)
            .field("position_account", &self.position_account)
            .field("chain_id", &self.chain_id)
            .field("gas_strategy", &self.gas_strategy.strategy_name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_tracker() {
        let tracker = NonceTracker::new(10);
        assert_eq!(tracker.reserve(), 10);
        assert_eq!(tracker.reserve(), 11);
        assert_eq!(tracker.peek(), 12);

        tracker.reset(11);
        assert_eq!(tracker.reserve(), 11);
    }

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_sender_creation() {
        // Well-known development key (DO NOT USE IN PRODUCTION)
        let private_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
        let sender = TransactionSenderBuilder::new("http://localhost:8545", 31337)
            .build(
                private_key,
                StepEncoder::new(Address::ZERO, 6, 6),
                Address::ZERO,
            )
            .await
            .unwrap();

        assert_eq!(
            format!("{:?}", sender.address).to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        assert_eq!(sender.gas_strategy_name(), "Legacy");
    }

    #[tokio::test]
    async fn test_build_rejects_bad_key() {
        let result = TransactionSenderBuilder::new("http://localhost:8545", 1)
            .build("not-a-key", StepEncoder::new(Address::ZERO, 6, 6), Address::ZERO)
            .await;
        assert!(result.is_err());
    }
}
