use alloy::primitives::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One recipient of a batch payout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub address: String,
    /// Amount in whole coins (or whole tokens).
    pub amount: Decimal,
    /// Stop the batch at this entry if its transfer fails.
    #[serde(default)]
    pub terminate_on_fail: bool,
}

impl TransferRequest {
    pub fn new(address: impl Into<String>, amount: Decimal) -> Self {
        Self {
            address: address.into(),
            amount,
            terminate_on_fail: false,
        }
    }

    #[must_use]
    pub fn terminating(self) -> Self {
        Self {
            terminate_on_fail: true,
            ..self
        }
    }
}

/// Outcome of a broadcast transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    pub tx_hash: String,
    /// Output index paying the recipient (UTXO chains).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_position: Option<u32>,
    /// Nonce the transaction was signed with (account chains).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    /// Sender funds left after the transfer, in base units, when known.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::serde_utils::option_u256_decimal"
    )]
    pub balance: Option<U256>,
    /// Hex of the signed transaction (or the JSON body sent for Tron).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_tx: Option<String>,
}
