use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use payout_models::{ChainType, SendResult, SenderConfig, TransferRequest};
use rust_decimal::Decimal;

use crate::{Error, Result};

// implementors hold their gateway but no per-call state; everything a call needs arrives in
// the config it is given
#[async_trait]
pub trait ChainSender: Send + Sync {
    fn chain_type(&self) -> ChainType;

    /// Build, sign and broadcast a transfer of `amount` (whole coins or tokens) to `to`.
    ///
    /// The destination has already been validated against the configured network.
    async fn send(
        &self,
        config: &SenderConfig,
        private_key: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<SendResult>;

    /// Pay every recipient from a single transaction, returning one result per recipient in
    /// request order. Only UTXO chains can do this.
    async fn send_to_many(
        &self,
        _config: &SenderConfig,
        _private_key: &str,
        _transfers: &[TransferRequest],
    ) -> Result<Vec<SendResult>> {
        Err(Error::BatchNotSupported {
            chain: self.chain_type(),
        })
    }
}

#[derive(Clone)]
pub struct SenderRegistry {
    senders: HashMap<ChainType, Arc<dyn ChainSender>>,
}

impl SenderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            senders: HashMap::new(),
        }
    }

    /// Register a sender under the chain it reports.
    pub fn register(&mut self, sender: Arc<dyn ChainSender>) {
        self.senders.insert(sender.chain_type(), sender);
    }

    pub fn get(&self, chain_type: ChainType) -> Option<Arc<dyn ChainSender>> {
        self.senders.get(&chain_type).cloned()
    }
}

impl Default for SenderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
