use std::sync::Arc;

use payout_models::{
    validate_destination, ChainType, FundingModel, SendResult, SenderConfig, TransferRequest,
};
use rust_decimal::Decimal;
use tracing::{info, instrument};

use crate::batch::{run_account_batch, BatchResult};
use crate::bitcoin::BitcoinSender;
use crate::electrum::ElectrumGateway;
use crate::ethereum::EthereumSender;
use crate::evm_gateway::AlloyEvmGateway;
use crate::tron::TronSender;
use crate::tron_http::TronHttpGateway;
use crate::{CallContext, ChainSender, Error, Result, SenderRegistry};

/// Build the sender for `config.chain`, wired to the configured gateway.
pub fn sender_for_config(config: &SenderConfig) -> Result<Arc<dyn ChainSender>> {
    let sender: Arc<dyn ChainSender> = match config.chain {
        ChainType::Bitcoin => Arc::new(BitcoinSender::new(
            Arc::new(ElectrumGateway::new(&config.gateway_url)?),
            config.network,
        )),
        ChainType::Ethereum => Arc::new(EthereumSender::new(Arc::new(AlloyEvmGateway::new(
            &config.gateway_url,
        )?))),
        ChainType::Tron => Arc::new(TronSender::new(Arc::new(TronHttpGateway::new(
            &config.gateway_url,
            config.api_key.as_deref(),
        )?))),
    };
    Ok(sender)
}

/// Single entry point for payouts: validates the destination, routes to the chain's sender and
/// runs it under the call's deadline. No retries.
pub struct PayoutDispatcher {
    config: SenderConfig,
    registry: SenderRegistry,
}

impl PayoutDispatcher {
    pub fn new(config: SenderConfig) -> Result<Self> {
        let mut registry = SenderRegistry::new();
        registry.register(sender_for_config(&config)?);
        Ok(Self::with_registry(config, registry))
    }

    pub fn with_registry(config: SenderConfig, registry: SenderRegistry) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    fn sender(&self) -> Result<Arc<dyn ChainSender>> {
        self.registry
            .get(self.config.chain)
            .ok_or_else(|| Error::ChainNotSupported {
                chain: self.config.chain.to_string(),
            })
    }

    #[instrument(skip(self, ctx, private_key), fields(chain = %self.config.chain))]
    pub async fn send(
        &self,
        ctx: &CallContext,
        private_key: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<SendResult> {
        validate_destination(self.config.chain, self.config.network, to)?;
        let sender = self.sender()?;
        let ctx = ctx.tightened(self.config.timeout);

        let result = ctx
            .run(sender.send(&self.config, private_key, to, amount))
            .await?;
        info!(tx_hash = %result.tx_hash, "transfer sent");
        Ok(result)
    }

    #[instrument(skip_all, fields(chain = %self.config.chain, count = transfers.len()))]
    pub async fn send_to_many(
        &self,
        ctx: &CallContext,
        private_key: &str,
        transfers: &[TransferRequest],
    ) -> Result<BatchResult> {
        let first = transfers.first().ok_or(Error::EmptyBatch)?;
        let first_class =
            validate_destination(self.config.chain, self.config.network, &first.address)?;
        let sender = self.sender()?;
        let ctx = ctx.tightened(self.config.timeout);

        match self.config.chain.funding_model() {
            FundingModel::Utxo => {
                if let Some(stray) = transfers.iter().find(|transfer| {
                    !payout_models::classify_address(&transfer.address)
                        .is_some_and(|class| class.label() == first_class.label())
                }) {
                    return Err(Error::InvalidBatchAddress {
                        address: stray.address.clone(),
                    });
                }

                let results = ctx
                    .run(sender.send_to_many(&self.config, private_key, transfers))
                    .await?;
                info!(tx_hash = ?results.first().map(|r| &r.tx_hash), "batch transaction sent");
                Ok(BatchResult::from_shared_transaction(transfers, results))
            }
            FundingModel::Account => {
                run_account_batch(&ctx, sender.as_ref(), &self.config, private_key, transfers).await
            }
        }
    }
}
