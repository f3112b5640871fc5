use std::str::FromStr;
use std::sync::Arc;

use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::hex;
use alloy::primitives::{Address, Bytes, TxKind, B256, U256};
use alloy::signers::{local::PrivateKeySigner, SignerSync};
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use payout_models::{to_base_units, ChainType, SendResult, SenderConfig, ETH_DECIMALS, GWEI_DECIMALS};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::{ChainSender, Error, Result};

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function decimals() external view returns (uint8);
        function transfer(address to, uint256 amount) external returns (bool);
    }
}

pub const NATIVE_TRANSFER_GAS: u64 = 21_000;

/// Tip used for token transfers when the node suggests none.
pub const MIN_TOKEN_TIP_WEI: u128 = 1_000_000_000;

#[async_trait]
pub trait EvmGateway: Send + Sync {
    async fn chain_id(&self) -> Result<u64>;

    async fn balance(&self, address: Address) -> Result<U256>;

    async fn nonce(&self, address: Address) -> Result<u64>;

    /// Suggested gas price, used as the fee cap.
    async fn gas_price(&self) -> Result<u128>;

    /// Suggested priority fee.
    async fn max_priority_fee(&self) -> Result<u128>;

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256>;

    async fn token_decimals(&self, token: Address) -> Result<u8>;

    async fn estimate_gas(&self, from: Address, to: Address, input: Bytes) -> Result<u64>;

    /// Submit an EIP-2718 encoded signed transaction.
    async fn send_raw_transaction(&self, raw_tx: &[u8]) -> Result<B256>;

    /// Resolve once the transaction is mined; fails if it reverted.
    async fn wait_mined(&self, tx_hash: B256) -> Result<()>;
}

/// Call parameters that differ between the native and token paths.
struct TransferCall {
    to: Address,
    value: U256,
    input: Bytes,
    gas_limit: u64,
    max_fee_per_gas: u128,
    max_priority_fee_per_gas: u128,
    remaining: Option<U256>,
}

pub struct EthereumSender {
    gateway: Arc<dyn EvmGateway>,
}

impl EthereumSender {
    pub fn new(gateway: Arc<dyn EvmGateway>) -> Self {
        Self { gateway }
    }

    async fn native_transfer(
        &self,
        config: &SenderConfig,
        from: Address,
        to: Address,
        amount: Decimal,
        fee_cap: u128,
        tip: u128,
    ) -> Result<TransferCall> {
        let value = to_base_units(amount, ETH_DECIMALS)?;
        let balance = match config.balance_hint {
            Some(hint) => to_base_units(hint, ETH_DECIMALS)?,
            None => self.gateway.balance(from).await?,
        };
        if balance <= value {
            return Err(Error::InsufficientBalance {
                required: value,
                available: balance,
            });
        }

        Ok(TransferCall {
            to,
            value,
            input: Bytes::new(),
            gas_limit: NATIVE_TRANSFER_GAS,
            max_fee_per_gas: fee_cap,
            max_priority_fee_per_gas: tip,
            remaining: None,
        })
    }

    async fn token_transfer(
        &self,
        contract: &str,
        from: Address,
        to: Address,
        amount: Decimal,
        fee_cap: u128,
        tip: u128,
    ) -> Result<TransferCall> {
        let token = Address::from_str(contract).map_err(|e| Error::InvalidAddress {
            address: contract.to_string(),
            chain: ChainType::Ethereum,
            reason: e.to_string(),
        })?;

        let token_balance = self.gateway.token_balance(token, from).await?;
        let decimals = self.gateway.token_decimals(token).await?;
        let units = to_base_units(amount, decimals)?;
        if token_balance < units {
            return Err(Error::InsufficientBalance {
                required: units,
                available: token_balance,
            });
        }

        let tip = if tip == 0 { MIN_TOKEN_TIP_WEI } else { tip };
        let fee_cap = fee_cap.saturating_mul(2);
        let input: Bytes = IERC20::transferCall { to, amount: units }.abi_encode().into();
        let gas_limit = self.gateway.estimate_gas(from, token, input.clone()).await?;
        debug!(%token, decimals, %units, gas_limit, "prepared token transfer");

        Ok(TransferCall {
            to: token,
            value: U256::ZERO,
            input,
            gas_limit,
            max_fee_per_gas: fee_cap,
            max_priority_fee_per_gas: tip,
            remaining: Some(token_balance - units),
        })
    }
}

fn parse_signer(private_key: &str) -> Result<PrivateKeySigner> {
    PrivateKeySigner::from_str(private_key.trim()).map_err(|e| Error::InvalidPrivateKey {
        chain: ChainType::Ethereum,
        reason: e.to_string(),
    })
}

fn tip_boost_wei(boost_gwei: Option<Decimal>) -> Result<u128> {
    let Some(boost) = boost_gwei else {
        return Ok(0);
    };
    let wei = to_base_units(boost, GWEI_DECIMALS)?;
    u128::try_from(wei).map_err(|_| Error::OutOfRange {
        message: format!("tip boost of {boost} gwei"),
    })
}

#[async_trait]
impl ChainSender for EthereumSender {
    fn chain_type(&self) -> ChainType {
        ChainType::Ethereum
    }

    async fn send(
        &self,
        config: &SenderConfig,
        private_key: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<SendResult> {
        let signer = parse_signer(private_key)?;
        let from = signer.address();
        let to = Address::from_str(to).map_err(|e| Error::InvalidAddress {
            address: to.to_string(),
            chain: ChainType::Ethereum,
            reason: e.to_string(),
        })?;
        if to == from {
            info!(address = %to, "send to self");
        }

        let chain_id = self.gateway.chain_id().await?;
        let nonce = match config.nonce {
            Some(nonce) => nonce,
            None => self.gateway.nonce(from).await?,
        };
        let fee_cap = self.gateway.gas_price().await?;
        let tip = self
            .gateway
            .max_priority_fee()
            .await?
            .saturating_add(tip_boost_wei(config.tip_boost)?);

        let call = match config.token_contract() {
            Some(contract) => {
                self.token_transfer(contract, from, to, amount, fee_cap, tip)
                    .await?
            }
            None => {
                self.native_transfer(config, from, to, amount, fee_cap, tip)
                    .await?
            }
        };

        let tx = TxEip1559 {
            chain_id,
            nonce,
            gas_limit: call.gas_limit,
            max_fee_per_gas: call.max_fee_per_gas.max(call.max_priority_fee_per_gas),
            max_priority_fee_per_gas: call.max_priority_fee_per_gas,
            to: TxKind::Call(call.to),
            value: call.value,
            access_list: Default::default(),
            input: call.input,
        };
        let signature = signer
            .sign_hash_sync(&tx.signature_hash())
            .map_err(|e| Error::Signing {
                message: e.to_string(),
            })?;
        let envelope = TxEnvelope::from(tx.into_signed(signature));
        let raw_tx = envelope.encoded_2718();
        let local_hash = *envelope.tx_hash();

        let tx_hash = self.gateway.send_raw_transaction(&raw_tx).await?;
        if tx_hash != local_hash {
            warn!(%tx_hash, %local_hash, "node returned a different transaction hash");
        }
        info!(%tx_hash, nonce, chain_id, "broadcast ethereum transaction");

        if config.await_confirmation {
            self.gateway.wait_mined(tx_hash).await?;
            info!(%tx_hash, "transaction mined");
        }

        Ok(SendResult {
            tx_hash: tx_hash.to_string(),
            tx_position: None,
            nonce: Some(nonce),
            balance: call.remaining,
            raw_tx: Some(hex::encode_prefixed(&raw_tx)),
        })
    }
}
