use payout_models::{validate_destination, SendResult, SenderConfig, TransferRequest};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::{CallContext, ChainSender, Error, Result};

#[derive(Debug, Serialize)]
pub struct BatchSuccess {
    pub address: String,
    pub amount: Decimal,
    pub result: SendResult,
}

#[derive(Debug, Serialize)]
pub struct BatchFailure {
    pub address: String,
    pub amount: Decimal,
    #[serde(serialize_with = "serialize_error")]
    pub error: Error,
}

/// Per-recipient outcome of a batch payout, in request order within each list.
#[derive(Debug, Default, Serialize)]
pub struct BatchResult {
    pub success: Vec<BatchSuccess>,
    pub failed: Vec<BatchFailure>,
}

impl BatchResult {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Pair a multi-output transaction's per-recipient results with the requests they answer.
    pub(crate) fn from_shared_transaction(
        transfers: &[TransferRequest],
        results: Vec<SendResult>,
    ) -> Self {
        let success = transfers
            .iter()
            .zip(results)
            .map(|(transfer, result)| BatchSuccess {
                address: transfer.address.clone(),
                amount: transfer.amount,
                result,
            })
            .collect();
        Self {
            success,
            failed: Vec::new(),
        }
    }
}

fn serialize_error<S>(error: &Error, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_str(error)
}

/// Run an account-model batch: one transaction per recipient, strictly in order, each signed
/// with the nonce following the last successful one.
///
/// A native balance hint shrinks by each sent amount. Failures are recorded and the batch moves
/// on, unless the failing entry asks to terminate or the call's deadline has passed; then the
/// partial result comes back inside [`Error::BatchTerminated`] and the remaining entries are
/// never attempted.
pub async fn run_account_batch(
    ctx: &CallContext,
    sender: &dyn ChainSender,
    config: &SenderConfig,
    private_key: &str,
    transfers: &[TransferRequest],
) -> Result<BatchResult> {
    let mut batch = BatchResult::default();
    let mut config = config.clone();
    let mut nonce_exhausted = false;

    for (index, transfer) in transfers.iter().enumerate() {
        let outcome = if nonce_exhausted {
            Err(Error::OutOfRange {
                message: format!("no nonce left after {}", u64::MAX),
            })
        } else {
            match validate_destination(config.chain, config.network, &transfer.address) {
                Ok(_) => {
                    ctx.run(sender.send(&config, private_key, &transfer.address, transfer.amount))
                        .await
                }
                Err(source) => Err(Error::AddressValidation { source }),
            }
        };

        match outcome {
            Ok(result) => {
                info!(
                    index,
                    address = %transfer.address,
                    tx_hash = %result.tx_hash,
                    nonce = ?result.nonce,
                    "batch transfer sent"
                );
                if let Some(nonce) = result.nonce {
                    match nonce.checked_add(1) {
                        Some(next) => config = config.with_nonce(next),
                        None => nonce_exhausted = true,
                    }
                }
                // the hint is a native balance; token transfers leave it alone
                let native = config.token_contract().is_none();
                if let Some(hint) = config.balance_hint.filter(|_| native) {
                    let remaining = hint
                        .checked_sub(transfer.amount)
                        .unwrap_or(Decimal::ZERO)
                        .max(Decimal::ZERO);
                    config = config.with_balance_hint(remaining);
                }
                batch.success.push(BatchSuccess {
                    address: transfer.address.clone(),
                    amount: transfer.amount,
                    result,
                });
            }
            Err(error) => {
                warn!(index, address = %transfer.address, %error, "batch transfer failed");
                let stop = transfer.terminate_on_fail || matches!(error, Error::DeadlineExceeded);
                batch.failed.push(BatchFailure {
                    address: transfer.address.clone(),
                    amount: transfer.amount,
                    error,
                });
                if stop {
                    return Err(Error::BatchTerminated {
                        address: transfer.address.clone(),
                        partial: Box::new(batch),
                    });
                }
            }
        }
    }

    if !batch.is_complete() {
        warn!(
            sent = batch.success.len(),
            failed = batch.failed.len(),
            "batch finished with failures"
        );
    }
    Ok(batch)
}
