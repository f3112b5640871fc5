use std::str::FromStr;
use std::sync::Arc;

use alloy::hex;
use alloy::primitives::{Address, B256, U256};
use alloy::signers::{local::PrivateKeySigner, SignerSync};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use bitcoin::base58;
use payout_models::{to_base_units, ChainType, SendResult, SenderConfig, TRX_DECIMALS};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::ethereum::IERC20;
use crate::{ChainSender, Error, Result};

/// Version byte prefixed to the 20-byte account hash in Tron addresses.
pub const ADDRESS_PREFIX: u8 = 0x41;

/// 100 TRX, the energy budget given to TRC-20 transfers unless configured otherwise.
pub const DEFAULT_FEE_LIMIT_SUN: u64 = 100_000_000;

/// Transaction envelope as returned by the full node HTTP API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TronTransaction {
    #[serde(rename = "txID")]
    pub tx_id: String,
    pub raw_data: serde_json::Value,
    pub raw_data_hex: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signature: Vec<String>,
    #[serde(default)]
    pub visible: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BroadcastResponse {
    #[serde(default)]
    pub result: bool,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub txid: Option<String>,
    /// Hex encoded reason on failure.
    #[serde(default)]
    pub message: Option<String>,
}

impl BroadcastResponse {
    pub fn is_success(&self) -> bool {
        match self.code.as_deref() {
            Some(code) => code == "SUCCESS",
            None => self.result,
        }
    }

    pub fn reason(&self) -> String {
        let Some(message) = self.message.as_deref() else {
            return String::new();
        };
        hex::decode(message)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .unwrap_or_else(|| message.to_string())
    }
}

#[async_trait]
pub trait TronGateway: Send + Sync {
    /// Unsigned TRX transfer of `amount_sun` from `owner` to `to` (base58 addresses).
    async fn create_transfer(&self, owner: &str, to: &str, amount_sun: i64) -> Result<TronTransaction>;

    async fn token_decimals(&self, owner: &str, contract: &str) -> Result<u8>;

    /// Unsigned `transfer(address,uint256)` call; `parameter` is the hex ABI encoding of the
    /// arguments without the selector.
    async fn trigger_token_transfer(
        &self,
        owner: &str,
        contract: &str,
        parameter: &str,
        fee_limit: u64,
    ) -> Result<TronTransaction>;

    async fn broadcast(&self, tx: &TronTransaction) -> Result<BroadcastResponse>;
}

/// Base58check encoding of `0x41 || address`.
pub fn tron_address(address: Address) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(ADDRESS_PREFIX);
    payload.extend_from_slice(address.as_slice());
    base58::encode_check(&payload)
}

/// Decode a base58 Tron address into the 20-byte account hash.
pub fn parse_tron_address(address: &str) -> Result<Address> {
    let invalid = |reason: String| Error::InvalidAddress {
        address: address.to_string(),
        chain: ChainType::Tron,
        reason,
    };
    let payload = base58::decode_check(address).map_err(|e| invalid(e.to_string()))?;
    match payload.split_first() {
        Some((&ADDRESS_PREFIX, hash)) if hash.len() == 20 => Ok(Address::from_slice(hash)),
        _ => Err(invalid("expected 21 bytes starting with 0x41".to_string())),
    }
}

fn transfer_parameter(to: Address, amount: U256) -> String {
    let call = IERC20::transferCall { to, amount }.abi_encode();
    hex::encode(&call[4..])
}

/// Check the node's txID against the raw data it claims to identify, then sign it.
fn sign_transaction(tx: &mut TronTransaction, signer: &PrivateKeySigner) -> Result<()> {
    let raw = hex::decode(&tx.raw_data_hex).map_err(|e| Error::Signing {
        message: format!("raw_data_hex is not hex: {e}"),
    })?;
    let digest = B256::from_slice(&Sha256::digest(&raw));
    let claimed = B256::from_str(tx.tx_id.trim_start_matches("0x")).map_err(|e| Error::Signing {
        message: format!("bad txID {}: {e}", tx.tx_id),
    })?;
    if digest != claimed {
        return Err(Error::Signing {
            message: format!("txID {} does not match raw data hash {digest}", tx.tx_id),
        });
    }

    let signature = signer.sign_hash_sync(&digest).map_err(|e| Error::Signing {
        message: e.to_string(),
    })?;
    tx.signature.push(hex::encode(signature.as_bytes()));
    Ok(())
}

pub struct TronSender {
    gateway: Arc<dyn TronGateway>,
}

impl TronSender {
    pub fn new(gateway: Arc<dyn TronGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl ChainSender for TronSender {
    fn chain_type(&self) -> ChainType {
        ChainType::Tron
    }

    async fn send(
        &self,
        config: &SenderConfig,
        private_key: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<SendResult> {
        let signer = PrivateKeySigner::from_str(private_key.trim()).map_err(|e| {
            Error::InvalidPrivateKey {
                chain: ChainType::Tron,
                reason: e.to_string(),
            }
        })?;
        let owner = tron_address(signer.address());
        let recipient = parse_tron_address(to)?;
        if owner == to {
            info!(address = %to, "send to self");
        }

        let mut tx = match config.token_contract() {
            Some(contract) => {
                let decimals = self.gateway.token_decimals(&owner, contract).await?;
                let units = to_base_units(amount, decimals)?;
                let fee_limit = config.fee_limit.unwrap_or(DEFAULT_FEE_LIMIT_SUN);
                debug!(%contract, decimals, %units, fee_limit, "prepared TRC-20 transfer");
                self.gateway
                    .trigger_token_transfer(&owner, contract, &transfer_parameter(recipient, units), fee_limit)
                    .await?
            }
            None => {
                let sun = to_base_units(amount, TRX_DECIMALS)?;
                let sun = i64::try_from(sun).map_err(|_| Error::OutOfRange {
                    message: format!("{amount} TRX in sun"),
                })?;
                self.gateway.create_transfer(&owner, to, sun).await?
            }
        };

        sign_transaction(&mut tx, &signer)?;
        let response = self.gateway.broadcast(&tx).await?;
        if !response.is_success() {
            return Err(Error::BroadcastRejected {
                code: response.code.clone().unwrap_or_default(),
                message: response.reason(),
            });
        }

        let tx_hash = tx.tx_id.trim_start_matches("0x").to_string();
        info!(%tx_hash, "broadcast tron transaction");
        let raw_tx = serde_json::to_string(&tx).map_err(|e| Error::Signing {
            message: format!("cannot serialize signed transaction: {e}"),
        })?;

        Ok(SendResult {
            tx_hash,
            tx_position: None,
            nonce: None,
            balance: None,
            raw_tx: Some(raw_tx),
        })
    }
}
