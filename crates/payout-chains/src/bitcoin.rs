use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::U256;
use async_trait::async_trait;
use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{Message, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{
    consensus, Address, Amount, CompressedPublicKey, Network, NetworkKind, OutPoint, PrivateKey,
    ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};
use payout_models::{
    to_base_units, ChainType, NetworkType, SendResult, SenderConfig, TransferRequest, BTC_DECIMALS,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{ChainSender, Error, Result};

/// Flat amount kept out of the change output on top of the size based fee.
pub const FEE_PADDING_SATS: u64 = 50;

/// Input sequence: final minus two, which signals replaceability.
const INPUT_SEQUENCE: Sequence = Sequence(u32::MAX - 2);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    pub tx_hash: String,
    pub tx_pos: u32,
    /// Value in satoshi.
    pub value: u64,
    #[serde(default)]
    pub height: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainInfo {
    #[serde(rename = "blockchain_height")]
    pub height: u64,
    /// Fee rate in satoshi per 1000 bytes.
    pub fee_per_kb: u64,
}

#[async_trait]
pub trait UtxoGateway: Send + Sync {
    /// Unspent outputs of `address`, in the order the gateway reports them.
    async fn address_unspent(&self, address: &str) -> Result<Vec<UnspentOutput>>;

    async fn chain_info(&self) -> Result<ChainInfo>;

    /// Submit a serialized transaction and return its txid.
    async fn broadcast(&self, raw_tx_hex: &str) -> Result<String>;
}

pub fn bitcoin_network(network: NetworkType) -> Network {
    match network {
        NetworkType::Mainnet => Network::Bitcoin,
        NetworkType::Testnet => Network::Testnet,
    }
}

/// The unspent output chosen to fund a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FundingSource {
    outpoint: OutPoint,
    value: u64,
}

struct BroadcastTransaction {
    txid: String,
    change: u64,
    raw_tx: String,
}

pub struct BitcoinSender {
    gateway: Arc<dyn UtxoGateway>,
    network: Network,
}

impl BitcoinSender {
    pub fn new(gateway: Arc<dyn UtxoGateway>, network: NetworkType) -> Self {
        Self {
            gateway,
            network: bitcoin_network(network),
        }
    }

    fn parse_key(&self, private_key: &str) -> Result<PrivateKey> {
        let key = PrivateKey::from_wif(private_key).map_err(|e| Error::InvalidPrivateKey {
            chain: ChainType::Bitcoin,
            reason: e.to_string(),
        })?;
        let expected = NetworkKind::from(self.network);
        if key.network != expected {
            return Err(Error::InvalidPrivateKey {
                chain: ChainType::Bitcoin,
                reason: format!("key is for {:?}, sender is on {}", key.network, self.network),
            });
        }
        Ok(key)
    }

    fn parse_destination(&self, address: &str) -> Result<Address> {
        Address::from_str(address)
            .and_then(|unchecked| unchecked.require_network(self.network))
            .map_err(|e| Error::InvalidAddress {
                address: address.to_string(),
                chain: ChainType::Bitcoin,
                reason: e.to_string(),
            })
    }

    /// Resolve the output that funds the transaction: the hinted change output when the caller
    /// chains spends, otherwise the first gateway output worth strictly more than `required`.
    async fn select_source(
        &self,
        config: &SenderConfig,
        sender: &Address,
        required: u64,
    ) -> Result<FundingSource> {
        if let Some(last_hash) = config.last_hash.as_deref().filter(|h| !h.is_empty()) {
            let balance = config.balance_hint.ok_or_else(|| Error::MissingBalanceHint {
                last_hash: last_hash.to_string(),
            })?;
            let value = to_sats(balance)?;
            let txid = Txid::from_str(last_hash).map_err(|e| Error::InvalidTxHash {
                hash: last_hash.to_string(),
                reason: e.to_string(),
            })?;
            if value <= required {
                return Err(Error::InsufficientBalance {
                    required: U256::from(required),
                    available: U256::from(value),
                });
            }
            debug!(%txid, vout = config.tx_position, value, "spending hinted output");
            return Ok(FundingSource {
                outpoint: OutPoint::new(txid, config.tx_position),
                value,
            });
        }

        let unspent = self.gateway.address_unspent(&sender.to_string()).await?;
        let Some(utxo) = unspent.iter().find(|utxo| utxo.value > required) else {
            let available = unspent.iter().map(|utxo| utxo.value).max().unwrap_or(0);
            return Err(Error::InsufficientBalance {
                required: U256::from(required),
                available: U256::from(available),
            });
        };

        let txid = Txid::from_str(&utxo.tx_hash).map_err(|e| Error::GatewayResponse {
            method: "getaddressunspent".to_string(),
            message: format!("bad tx_hash {}: {e}", utxo.tx_hash),
        })?;
        debug!(%txid, vout = utxo.tx_pos, value = utxo.value, "selected unspent output");
        Ok(FundingSource {
            outpoint: OutPoint::new(txid, utxo.tx_pos),
            value: utxo.value,
        })
    }

    /// Build, sign and broadcast one transaction paying `recipients` in order after the change
    /// output at index 0.
    async fn pay(
        &self,
        config: &SenderConfig,
        private_key: &str,
        recipients: &[(&str, Decimal)],
    ) -> Result<BroadcastTransaction> {
        let private_key = self.parse_key(private_key)?;
        let secp = Secp256k1::new();
        let sender_pubkey = CompressedPublicKey::from_private_key(&secp, &private_key).map_err(
            |e| Error::InvalidPrivateKey {
                chain: ChainType::Bitcoin,
                reason: e.to_string(),
            },
        )?;
        let sender_address = Address::p2wpkh(&sender_pubkey, self.network);
        let sender_script = sender_address.script_pubkey();

        let mut outputs = Vec::with_capacity(recipients.len() + 1);
        outputs.push(TxOut {
            value: Amount::ZERO,
            script_pubkey: sender_script.clone(),
        });
        let mut total: u64 = 0;
        for (address, amount) in recipients {
            let destination = self.parse_destination(address)?;
            if destination == sender_address {
                info!(address = %destination, "send to self");
            }
            let sats = to_sats(*amount)?;
            total = total.checked_add(sats).ok_or_else(|| Error::OutOfRange {
                message: "sum of outputs overflows".to_string(),
            })?;
            outputs.push(TxOut {
                value: Amount::from_sat(sats),
                script_pubkey: destination.script_pubkey(),
            });
        }

        let chain_info = self.gateway.chain_info().await?;
        let height = u32::try_from(chain_info.height).map_err(|_| Error::OutOfRange {
            message: format!("block height {}", chain_info.height),
        })?;
        let lock_time = LockTime::from_height(height).map_err(|e| Error::OutOfRange {
            message: e.to_string(),
        })?;

        let mut tx = Transaction {
            version: Version::TWO,
            lock_time,
            input: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig: ScriptBuf::new(),
                sequence: INPUT_SEQUENCE,
                witness: Witness::new(),
            }],
            output: outputs,
        };

        // one input and a fixed output set, so the size does not depend on the chosen output
        let size = tx.base_size() as u64;
        let fee = size.saturating_mul(chain_info.fee_per_kb) / 1000;
        let required = total
            .checked_add(FEE_PADDING_SATS)
            .and_then(|v| v.checked_add(fee))
            .ok_or_else(|| Error::OutOfRange {
                message: "required input value overflows".to_string(),
            })?;

        let source = self.select_source(config, &sender_address, required).await?;
        let change = source.value - required;
        tx.input[0].previous_output = source.outpoint;
        tx.output[0].value = Amount::from_sat(change);

        info!(
            outputs = recipients.len(),
            total, fee, change, size, "built bitcoin transaction"
        );

        sign_p2wpkh_input(&mut tx, &secp, &private_key, &sender_pubkey, &sender_script, source.value)?;

        let raw_tx = consensus::encode::serialize_hex(&tx);
        let local_txid = tx.compute_txid().to_string();
        let txid = self.gateway.broadcast(&raw_tx).await?;
        if txid != local_txid {
            warn!(%txid, %local_txid, "gateway txid differs from the computed one");
        }
        info!(%txid, "broadcast bitcoin transaction");

        Ok(BroadcastTransaction {
            txid,
            change,
            raw_tx,
        })
    }
}

fn to_sats(amount: Decimal) -> Result<u64> {
    let units = to_base_units(amount, BTC_DECIMALS)?;
    u64::try_from(units).map_err(|_| Error::OutOfRange {
        message: format!("{amount} BTC in satoshi"),
    })
}

/// BIP-143 signature over input 0 with `SIGHASH_ALL`, witness `[signature, pubkey]`.
fn sign_p2wpkh_input(
    tx: &mut Transaction,
    secp: &Secp256k1<bitcoin::secp256k1::All>,
    private_key: &PrivateKey,
    public_key: &CompressedPublicKey,
    script_pubkey: &ScriptBuf,
    value: u64,
) -> Result<()> {
    let sighash_type = EcdsaSighashType::All;
    let sighash = SighashCache::new(&*tx)
        .p2wpkh_signature_hash(0, script_pubkey, Amount::from_sat(value), sighash_type)
        .map_err(|e| Error::Signing {
            message: e.to_string(),
        })?;
    let message = Message::from_digest(sighash.to_byte_array());
    let signature = bitcoin::ecdsa::Signature {
        signature: secp.sign_ecdsa(&message, &private_key.inner),
        sighash_type,
    };
    tx.input[0].witness = Witness::p2wpkh(&signature, &public_key.0);
    Ok(())
}

#[async_trait]
impl ChainSender for BitcoinSender {
    fn chain_type(&self) -> ChainType {
        ChainType::Bitcoin
    }

    async fn send(
        &self,
        config: &SenderConfig,
        private_key: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<SendResult> {
        let tx = self.pay(config, private_key, &[(to, amount)]).await?;
        Ok(SendResult {
            tx_hash: tx.txid,
            tx_position: Some(1),
            nonce: None,
            balance: Some(U256::from(tx.change)),
            raw_tx: Some(tx.raw_tx),
        })
    }

    async fn send_to_many(
        &self,
        config: &SenderConfig,
        private_key: &str,
        transfers: &[TransferRequest],
    ) -> Result<Vec<SendResult>> {
        let recipients: Vec<(&str, Decimal)> = transfers
            .iter()
            .map(|t| (t.address.as_str(), t.amount))
            .collect();
        let tx = self.pay(config, private_key, &recipients).await?;

        Ok((1..=transfers.len())
            .map(|position| SendResult {
                tx_hash: tx.txid.clone(),
                tx_position: u32::try_from(position).ok(),
                nonce: None,
                balance: Some(U256::from(tx.change)),
                raw_tx: Some(tx.raw_tx.clone()),
            })
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bitcoin::secp256k1::SecretKey;
    use std::sync::Mutex;

    pub(crate) struct MockUtxoGateway {
        pub unspent: Vec<UnspentOutput>,
        pub info: ChainInfo,
        pub broadcasts: Mutex<Vec<String>>,
        pub unspent_queries: Mutex<u32>,
    }

    impl MockUtxoGateway {
        pub(crate) fn new(values: &[u64]) -> Self {
            let unspent = values
                .iter()
                .enumerate()
                .map(|(i, value)| UnspentOutput {
                    tx_hash: format!("{:064x}", i + 1),
                    tx_pos: i as u32,
                    value: *value,
                    height: 100,
                })
                .collect();
            Self {
                unspent,
                info: ChainInfo {
                    height: 2_500_000,
                    fee_per_kb: 1000,
                },
                broadcasts: Mutex::new(Vec::new()),
                unspent_queries: Mutex::new(0),
            }
        }

        pub(crate) fn broadcasts(&self) -> Vec<Transaction> {
            self.broadcasts
                .lock()
                .unwrap()
                .iter()
                .map(|hex| consensus::encode::deserialize_hex(hex).unwrap())
                .collect()
        }
    }

    #[async_trait]
    impl UtxoGateway for MockUtxoGateway {
        async fn address_unspent(&self, _address: &str) -> Result<Vec<UnspentOutput>> {
            *self.unspent_queries.lock().unwrap() += 1;
            Ok(self.unspent.clone())
        }

        async fn chain_info(&self) -> Result<ChainInfo> {
            Ok(self.info)
        }

        async fn broadcast(&self, raw_tx_hex: &str) -> Result<String> {
            self.broadcasts.lock().unwrap().push(raw_tx_hex.to_string());
            let tx: Transaction = consensus::encode::deserialize_hex(raw_tx_hex).unwrap();
            Ok(tx.compute_txid().to_string())
        }
    }

    pub(crate) fn testnet_key(seed: u8) -> PrivateKey {
        PrivateKey::new(SecretKey::from_slice(&[seed; 32]).unwrap(), NetworkKind::Test)
    }

    pub(crate) fn testnet_address(seed: u8) -> String {
        let secp = Secp256k1::new();
        let pubkey = CompressedPublicKey::from_private_key(&secp, &testnet_key(seed)).unwrap();
        Address::p2wpkh(&pubkey, Network::Testnet).to_string()
    }

    fn config() -> SenderConfig {
        SenderConfig::new(ChainType::Bitcoin, NetworkType::Testnet, "http://localhost:7000")
    }

    fn btc(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn expected_change(value: u64, outputs: u64, tx: &Transaction, fee_per_kb: u64) -> u64 {
        value - FEE_PADDING_SATS - outputs - tx.base_size() as u64 * fee_per_kb / 1000
    }

    #[tokio::test]
    async fn picks_first_output_that_covers_the_transfer() {
        let gateway = Arc::new(MockUtxoGateway::new(&[50_000, 300_000, 500_000]));
        let sender = BitcoinSender::new(gateway.clone(), NetworkType::Testnet);
        let key = testnet_key(1).to_wif();

        let result = sender
            .send(&config(), &key, &testnet_address(2), btc("0.001"))
            .await
            .unwrap();

        let txs = gateway.broadcasts();
        assert_eq!(txs.len(), 1);
        let tx = &txs[0];
        assert_eq!(tx.input.len(), 1);
        assert_eq!(tx.input[0].previous_output.txid.to_string(), format!("{:064x}", 2));
        assert_eq!(tx.input[0].previous_output.vout, 1);
        assert_eq!(tx.input[0].sequence, Sequence(0xFFFF_FFFD));
        assert_eq!(tx.lock_time, LockTime::from_height(2_500_000).unwrap());
        assert_eq!(tx.version, Version::TWO);

        assert_eq!(tx.output.len(), 2);
        assert_eq!(tx.output[1].value, Amount::from_sat(100_000));
        let change = expected_change(300_000, 100_000, tx, 1000);
        assert_eq!(tx.output[0].value, Amount::from_sat(change));
        assert_eq!(tx.input[0].witness.len(), 2);

        assert_eq!(result.tx_hash, tx.compute_txid().to_string());
        assert_eq!(result.tx_position, Some(1));
        assert_eq!(result.balance, Some(U256::from(change)));
        assert!(result.raw_tx.is_some());
    }

    #[tokio::test]
    async fn output_must_cover_padding_and_fee() {
        // one input, change plus one P2WPKH destination: 113 bytes, 113 sat at 1000 sat/kB,
        // so 100_000 sat need an output strictly above 100_000 + 50 + 113
        let required = 100_163;
        let gateway = Arc::new(MockUtxoGateway::new(&[100_001, required, required + 1]));
        let sender = BitcoinSender::new(gateway.clone(), NetworkType::Testnet);

        let result = sender
            .send(&config(), &testnet_key(1).to_wif(), &testnet_address(2), btc("0.001"))
            .await
            .unwrap();

        let tx = &gateway.broadcasts()[0];
        assert_eq!(tx.base_size(), 113);
        assert_eq!(tx.input[0].previous_output.vout, 2);
        assert_eq!(tx.output[0].value, Amount::from_sat(1));
        assert_eq!(result.balance, Some(U256::from(1u64)));
    }

    #[tokio::test]
    async fn change_is_output_zero_for_many_recipients() {
        let gateway = Arc::new(MockUtxoGateway::new(&[1_000_000]));
        let sender = BitcoinSender::new(gateway.clone(), NetworkType::Testnet);
        let transfers = vec![
            TransferRequest::new(testnet_address(2), btc("0.001")),
            TransferRequest::new(testnet_address(3), btc("0.002")),
            TransferRequest::new(testnet_address(4), btc("0.0005")),
        ];

        let results = sender
            .send_to_many(&config(), &testnet_key(1).to_wif(), &transfers)
            .await
            .unwrap();

        let tx = &gateway.broadcasts()[0];
        assert_eq!(tx.output.len(), 4);
        assert_eq!(tx.output[1].value, Amount::from_sat(100_000));
        assert_eq!(tx.output[2].value, Amount::from_sat(200_000));
        assert_eq!(tx.output[3].value, Amount::from_sat(50_000));
        assert_eq!(
            tx.output[0].value,
            Amount::from_sat(expected_change(1_000_000, 350_000, tx, 1000))
        );

        let positions: Vec<_> = results.iter().map(|r| r.tx_position).collect();
        assert_eq!(positions, vec![Some(1), Some(2), Some(3)]);
        assert!(results.iter().all(|r| r.tx_hash == results[0].tx_hash));
    }

    #[tokio::test]
    async fn output_equal_to_amount_is_insufficient() {
        let gateway = Arc::new(MockUtxoGateway::new(&[100_000]));
        let sender = BitcoinSender::new(gateway.clone(), NetworkType::Testnet);

        let err = sender
            .send(&config(), &testnet_key(1).to_wif(), &testnet_address(2), btc("0.001"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InsufficientBalance { .. }));
        assert!(gateway.broadcasts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn hinted_output_skips_the_unspent_lookup() {
        let gateway = Arc::new(MockUtxoGateway::new(&[]));
        let sender = BitcoinSender::new(gateway.clone(), NetworkType::Testnet);
        let last_hash = "ab".repeat(32);
        let config = config()
            .with_last_hash(last_hash.clone())
            .with_tx_position(0)
            .with_balance_hint(btc("0.01"));

        let result = sender
            .send(&config, &testnet_key(1).to_wif(), &testnet_address(2), btc("0.001"))
            .await
            .unwrap();

        assert_eq!(*gateway.unspent_queries.lock().unwrap(), 0);
        let tx = &gateway.broadcasts()[0];
        assert_eq!(tx.input[0].previous_output.txid.to_string(), last_hash);
        assert_eq!(tx.input[0].previous_output.vout, 0);
        assert_eq!(
            result.balance,
            Some(U256::from(expected_change(1_000_000, 100_000, tx, 1000)))
        );
    }

    #[tokio::test]
    async fn hint_without_balance_is_rejected() {
        let gateway = Arc::new(MockUtxoGateway::new(&[1_000_000]));
        let sender = BitcoinSender::new(gateway.clone(), NetworkType::Testnet);
        let config = config().with_last_hash("ab".repeat(32));

        let err = sender
            .send(&config, &testnet_key(1).to_wif(), &testnet_address(2), btc("0.001"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingBalanceHint { .. }));
    }

    #[tokio::test]
    async fn mainnet_key_is_rejected_on_testnet() {
        let gateway = Arc::new(MockUtxoGateway::new(&[1_000_000]));
        let sender = BitcoinSender::new(gateway.clone(), NetworkType::Testnet);
        let mainnet_key = PrivateKey::new(SecretKey::from_slice(&[1; 32]).unwrap(), NetworkKind::Main);

        let err = sender
            .send(&config(), &mainnet_key.to_wif(), &testnet_address(2), btc("0.001"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPrivateKey { .. }));
        assert!(gateway.broadcasts.lock().unwrap().is_empty());
    }
}
