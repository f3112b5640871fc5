use std::{fs, path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use payout_chains::{CallContext, PayoutDispatcher};
use payout_models::{ChainType, NetworkType, SenderConfig, TransferRequest};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use snafu::prelude::*;
use tracing::{error, info};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to initialize logger: {}", source))]
    LoggerFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[snafu(display("Failed to read transfers file {}: {}", path.display(), source))]
    ReadTransfers {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to parse transfers file {}: {}", path.display(), source))]
    ParseTransfers {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("{}", source))]
    Payout { source: payout_chains::Error },

    #[snafu(display("Batch stopped at {}", address))]
    BatchStopped { address: String },

    #[snafu(display("Failed to encode output: {}", source))]
    Output { source: serde_json::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub fn init_logger(log_level: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .try_init()
        .context(LoggerFailedSnafu)?;

    Ok(())
}

fn parse_secret(value: &str) -> std::result::Result<SecretString, String> {
    Ok(SecretString::from(value.to_string()))
}

#[derive(Parser, Debug)]
#[command(name = "payout-cli")]
#[command(about = "Send coins and tokens on Bitcoin, Ethereum and Tron")]
pub struct PayoutCliArgs {
    /// Chain to send on (bitcoin, ethereum, tron)
    #[arg(long, env = "PAYOUT_CHAIN")]
    pub chain: ChainType,

    /// Network (mainnet, testnet); only Bitcoin addresses encode it
    #[arg(long, env = "PAYOUT_NETWORK", default_value = "mainnet")]
    pub network: NetworkType,

    /// Gateway endpoint: Electrum JSON-RPC, EVM JSON-RPC or Tron full node HTTP API
    #[arg(long, env = "PAYOUT_GATEWAY_URL")]
    pub gateway_url: String,

    /// API key for the gateway, required for Tron
    #[arg(long, env = "PAYOUT_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Sender private key (WIF for Bitcoin, hex otherwise)
    #[arg(long, env = "PAYOUT_PRIVATE_KEY", hide_env_values = true, value_parser = parse_secret)]
    pub private_key: SecretString,

    /// ERC-20 / TRC-20 contract to transfer instead of the native coin
    #[arg(long, env = "PAYOUT_CONTRACT_ADDRESS")]
    pub contract_address: Option<String>,

    /// Nonce of the first transaction; queried from the gateway when omitted
    #[arg(long)]
    pub nonce: Option<u64>,

    /// Extra priority fee in gwei (Ethereum)
    #[arg(long)]
    pub tip_boost: Option<Decimal>,

    /// Known sender balance in whole coins
    #[arg(long)]
    pub balance_hint: Option<Decimal>,

    /// Previous transaction whose change output should be spent (Bitcoin)
    #[arg(long)]
    pub last_hash: Option<String>,

    /// Output index of the change in --last-hash
    #[arg(long, default_value = "0")]
    pub tx_position: u32,

    /// Energy fee limit in sun for TRC-20 transfers
    #[arg(long)]
    pub fee_limit: Option<u64>,

    /// Wait until the transaction is mined (Ethereum)
    #[arg(long)]
    pub await_confirmation: bool,

    /// Give up after this many seconds
    #[arg(long, env = "PAYOUT_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Log level
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one transfer
    Send {
        #[arg(long)]
        to: String,
        /// Amount in whole coins or tokens
        #[arg(long)]
        amount: Decimal,
    },
    /// Pay every entry of a JSON list of {address, amount, terminate_on_fail}
    SendMany {
        #[arg(long)]
        transfers: PathBuf,
    },
}

impl PayoutCliArgs {
    pub fn sender_config(&self) -> SenderConfig {
        let mut config = SenderConfig::new(self.chain, self.network, self.gateway_url.clone())
            .with_tx_position(self.tx_position)
            .with_await_confirmation(self.await_confirmation);
        if let Some(api_key) = &self.api_key {
            config = config.with_api_key(api_key.clone());
        }
        if let Some(contract) = &self.contract_address {
            config = config.with_contract_address(contract.clone());
        }
        if let Some(nonce) = self.nonce {
            config = config.with_nonce(nonce);
        }
        if let Some(boost) = self.tip_boost {
            config = config.with_tip_boost(boost);
        }
        if let Some(balance) = self.balance_hint {
            config = config.with_balance_hint(balance);
        }
        if let Some(hash) = &self.last_hash {
            config = config.with_last_hash(hash.clone());
        }
        if let Some(fee_limit) = self.fee_limit {
            config = config.with_fee_limit(fee_limit);
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        config
    }
}

pub fn read_transfers(path: &PathBuf) -> Result<Vec<TransferRequest>> {
    let body = fs::read(path).context(ReadTransfersSnafu { path: path.clone() })?;
    serde_json::from_slice(&body).context(ParseTransfersSnafu { path: path.clone() })
}

fn to_json(value: &impl Serialize) -> Result<String> {
    serde_json::to_string_pretty(value).context(OutputSnafu)
}

/// Execute the selected command and return its JSON report.
pub async fn run(args: PayoutCliArgs) -> Result<String> {
    let config = args.sender_config();
    info!(chain = %config.chain, network = %config.network, "starting payout");
    let dispatcher = PayoutDispatcher::new(config).context(PayoutSnafu)?;
    let ctx = CallContext::background();
    let private_key = args.private_key.expose_secret();

    match &args.command {
        Command::Send { to, amount } => {
            let result = dispatcher
                .send(&ctx, private_key, to, *amount)
                .await
                .context(PayoutSnafu)?;
            to_json(&result)
        }
        Command::SendMany { transfers } => {
            let transfers = read_transfers(transfers)?;
            match dispatcher.send_to_many(&ctx, private_key, &transfers).await {
                Ok(batch) => to_json(&batch),
                Err(payout_chains::Error::BatchTerminated { address, partial }) => {
                    error!(%address, "batch terminated");
                    println!("{}", to_json(&partial)?);
                    Err(Error::BatchStopped { address })
                }
                Err(source) => Err(Error::Payout { source }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn parses_send_command() {
        let args = PayoutCliArgs::try_parse_from([
            "payout-cli",
            "--chain",
            "ethereum",
            "--gateway-url",
            "http://localhost:8545",
            "--private-key",
            "0x01",
            "--nonce",
            "9",
            "--tip-boost",
            "1.5",
            "send",
            "--to",
            "0x742d35Cc6634C0532925a3b844Bc454e4438f44e",
            "--amount",
            "0.25",
        ])
        .unwrap();

        assert_eq!(args.chain, ChainType::Ethereum);
        assert_eq!(args.network, NetworkType::Mainnet);
        let config = args.sender_config();
        assert_eq!(config.nonce, Some(9));
        assert_eq!(config.tip_boost, Some(Decimal::from_str("1.5").unwrap()));
        assert!(config.api_key.is_none());
        match args.command {
            Command::Send { amount, .. } => assert_eq!(amount, Decimal::from_str("0.25").unwrap()),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn private_key_is_not_printed() {
        let args = PayoutCliArgs::try_parse_from([
            "payout-cli",
            "--chain",
            "bitcoin",
            "--network",
            "testnet",
            "--gateway-url",
            "http://localhost:7000",
            "--private-key",
            "cVerySecretWif",
            "send-many",
            "--transfers",
            "transfers.json",
        ])
        .unwrap();
        assert!(!format!("{args:?}").contains("cVerySecretWif"));
        assert_eq!(args.private_key.expose_secret(), "cVerySecretWif");
    }

    #[test]
    fn reads_transfers_file() {
        let path = std::env::temp_dir().join(format!("payout-cli-transfers-{}.json", std::process::id()));
        fs::write(
            &path,
            r#"[{"address":"TJRabPrwbZy45sbavfcjinPJC18kjpRTv8","amount":"10","terminate_on_fail":true}]"#,
        )
        .unwrap();

        let transfers = read_transfers(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].amount, Decimal::from(10));
        assert!(transfers[0].terminate_on_fail);
    }

    #[test]
    fn missing_transfers_file_is_reported() {
        let err = read_transfers(&PathBuf::from("/nonexistent/transfers.json")).unwrap_err();
        assert!(matches!(err, Error::ReadTransfers { .. }));
    }
}
