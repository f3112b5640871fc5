use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ChainType, NetworkType};

/// Sender configuration for one chain.
///
/// The value is immutable: every `with_*` call consumes it and returns the reconfigured copy,
/// so two calls never observe each other's changes. Build one per call (or clone a template)
/// when sending from several tasks at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderConfig {
    pub chain: ChainType,
    pub network: NetworkType,
    /// Node / gateway endpoint (Electrum JSON-RPC for Bitcoin, EVM JSON-RPC, Tron full node HTTP API).
    pub gateway_url: String,
    /// Token contract; when set, transfers move this token instead of the native coin.
    pub contract_address: Option<String>,
    pub api_key: Option<String>,
    /// Explicit nonce for account chains; the gateway nonce is used when absent.
    pub nonce: Option<u64>,
    /// Extra priority fee in gwei added to the suggested tip (Ethereum).
    pub tip_boost: Option<Decimal>,
    /// Known sender balance, in whole coins. Skips the balance lookup on account chains and
    /// values the hinted output on Bitcoin.
    pub balance_hint: Option<Decimal>,
    /// Hash of the sender's previous transaction; Bitcoin spends its change output directly.
    pub last_hash: Option<String>,
    /// Output index paired with `last_hash`.
    pub tx_position: u32,
    /// Upper bound in sun for energy burnt by TRC-20 calls.
    pub fee_limit: Option<u64>,
    pub await_confirmation: bool,
    /// Deadline applied to every call made with this configuration.
    #[serde(default, with = "crate::serde_utils::option_duration_secs")]
    pub timeout: Option<Duration>,
}

impl SenderConfig {
    pub fn new(chain: ChainType, network: NetworkType, gateway_url: impl Into<String>) -> Self {
        Self {
            chain,
            network,
            gateway_url: gateway_url.into(),
            contract_address: None,
            api_key: None,
            nonce: None,
            tip_boost: None,
            balance_hint: None,
            last_hash: None,
            tx_position: 0,
            fee_limit: None,
            await_confirmation: false,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_api_key(self, api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..self
        }
    }

    #[must_use]
    pub fn with_contract_address(self, contract_address: impl Into<String>) -> Self {
        Self {
            contract_address: Some(contract_address.into()),
            ..self
        }
    }

    #[must_use]
    pub fn with_nonce(self, nonce: u64) -> Self {
        Self {
            nonce: Some(nonce),
            ..self
        }
    }

    #[must_use]
    pub fn with_tip_boost(self, tip_boost_gwei: Decimal) -> Self {
        Self {
            tip_boost: Some(tip_boost_gwei),
            ..self
        }
    }

    #[must_use]
    pub fn with_balance_hint(self, balance: Decimal) -> Self {
        Self {
            balance_hint: Some(balance),
            ..self
        }
    }

    #[must_use]
    pub fn with_last_hash(self, hash: impl Into<String>) -> Self {
        Self {
            last_hash: Some(hash.into()),
            ..self
        }
    }

    #[must_use]
    pub fn with_tx_position(self, position: u32) -> Self {
        Self {
            tx_position: position,
            ..self
        }
    }

    #[must_use]
    pub fn with_fee_limit(self, fee_limit_sun: u64) -> Self {
        Self {
            fee_limit: Some(fee_limit_sun),
            ..self
        }
    }

    #[must_use]
    pub fn with_await_confirmation(self, wait: bool) -> Self {
        Self {
            await_confirmation: wait,
            ..self
        }
    }

    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..self
        }
    }

    /// The token contract to transfer, or `None` for the native coin.
    pub fn token_contract(&self) -> Option<&str> {
        self.contract_address
            .as_deref()
            .filter(|addr| !addr.is_empty())
    }
}
