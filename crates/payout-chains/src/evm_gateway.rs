use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use snafu::ResultExt;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{EvmContractSnafu, EvmRpcSnafu, InvalidGatewayUrlSnafu};
use crate::ethereum::{EvmGateway, IERC20};
use crate::{Error, Result};

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// EVM JSON-RPC gateway on top of an alloy HTTP provider.
#[derive(Clone)]
pub struct AlloyEvmGateway {
    provider: DynProvider,
}

impl AlloyEvmGateway {
    pub fn new(rpc_url: &str) -> Result<Self> {
        let url = Url::parse(rpc_url).context(InvalidGatewayUrlSnafu { url: rpc_url })?;
        let provider = ProviderBuilder::new().connect_http(url).erased();
        Ok(Self { provider })
    }
}

#[async_trait]
impl EvmGateway for AlloyEvmGateway {
    async fn chain_id(&self) -> Result<u64> {
        self.provider.get_chain_id().await.context(EvmRpcSnafu)
    }

    #[instrument(level = "debug", skip(self))]
    async fn balance(&self, address: Address) -> Result<U256> {
        self.provider.get_balance(address).await.context(EvmRpcSnafu)
    }

    #[instrument(level = "debug", skip(self))]
    async fn nonce(&self, address: Address) -> Result<u64> {
        self.provider
            .get_transaction_count(address)
            .await
            .context(EvmRpcSnafu)
    }

    async fn gas_price(&self) -> Result<u128> {
        self.provider.get_gas_price().await.context(EvmRpcSnafu)
    }

    async fn max_priority_fee(&self) -> Result<u128> {
        self.provider
            .get_max_priority_fee_per_gas()
            .await
            .context(EvmRpcSnafu)
    }

    #[instrument(level = "debug", skip(self))]
    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256> {
        IERC20::new(token, self.provider.clone())
            .balanceOf(owner)
            .call()
            .await
            .context(EvmContractSnafu)
    }

    #[instrument(level = "debug", skip(self))]
    async fn token_decimals(&self, token: Address) -> Result<u8> {
        IERC20::new(token, self.provider.clone())
            .decimals()
            .call()
            .await
            .context(EvmContractSnafu)
    }

    #[instrument(level = "debug", skip(self, input))]
    async fn estimate_gas(&self, from: Address, to: Address, input: Bytes) -> Result<u64> {
        let request = TransactionRequest::default()
            .from(from)
            .to(to)
            .input(input.into());
        self.provider.estimate_gas(request).await.context(EvmRpcSnafu)
    }

    #[instrument(level = "debug", skip(self, raw_tx))]
    async fn send_raw_transaction(&self, raw_tx: &[u8]) -> Result<B256> {
        let pending = self
            .provider
            .send_raw_transaction(raw_tx)
            .await
            .context(EvmRpcSnafu)?;
        Ok(*pending.tx_hash())
    }

    #[instrument(level = "debug", skip(self))]
    async fn wait_mined(&self, tx_hash: B256) -> Result<()> {
        loop {
            let receipt = self
                .provider
                .get_transaction_receipt(tx_hash)
                .await
                .context(EvmRpcSnafu)?;
            match receipt {
                Some(receipt) if receipt.status() => return Ok(()),
                Some(_) => {
                    return Err(Error::TransactionReverted {
                        tx_hash: tx_hash.to_string(),
                    })
                }
                None => {
                    debug!(%tx_hash, "transaction not mined yet");
                    tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
                }
            }
        }
    }
}
