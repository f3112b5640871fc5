use alloy::primitives::U256;
use payout_models::{AddressError, ChainType, UnitError};
use snafu::{prelude::*, Location};

use crate::batch::BatchResult;

/// Coarse classification callers can branch on without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    InsufficientFunds,
    Conversion,
    Gateway,
    Signing,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{source}"))]
    AddressValidation { source: AddressError },

    #[snafu(display("invalid addrValues length: at least one transfer is required"))]
    EmptyBatch,

    #[snafu(display("invalid address found: {address}"))]
    InvalidBatchAddress { address: String },

    #[snafu(display("Invalid address format for {address} for network {chain}: {reason}"))]
    InvalidAddress {
        address: String,
        chain: ChainType,
        reason: String,
    },

    #[snafu(display("Invalid transaction hash {hash}: {reason}"))]
    InvalidTxHash { hash: String, reason: String },

    #[snafu(display("Invalid private key for {chain}: {reason}"))]
    InvalidPrivateKey { chain: ChainType, reason: String },

    #[snafu(display("Invalid gateway url {url}: {source}"))]
    InvalidGatewayUrl {
        url: String,
        source: url::ParseError,
    },

    #[snafu(display("An API key is required to talk to the {chain} gateway"))]
    MissingApiKey { chain: ChainType },

    #[snafu(display("Chain not supported: {chain}"))]
    ChainNotSupported { chain: String },

    #[snafu(display("{chain} cannot pay several recipients in one transaction"))]
    BatchNotSupported { chain: ChainType },

    #[snafu(display("last hash {last_hash} was given without a balance hint"))]
    MissingBalanceHint { last_hash: String },

    #[snafu(display("Insufficient balance: required {required}, available {available}"))]
    InsufficientBalance { required: U256, available: U256 },

    #[snafu(display("Amount conversion failed: {source}"))]
    Conversion { source: UnitError },

    #[snafu(display("Value out of range: {message}"))]
    OutOfRange { message: String },

    #[snafu(display("EVMRPCError at {loc}: {source}"))]
    EvmRpc {
        source: alloy::transports::RpcError<alloy::transports::TransportErrorKind>,
        #[snafu(implicit)]
        loc: Location,
    },

    #[snafu(display("EVM contract call failed at {loc}: {source}"))]
    EvmContract {
        source: alloy::contract::Error,
        #[snafu(implicit)]
        loc: Location,
    },

    #[snafu(display("Transaction {tx_hash} was mined but reverted"))]
    TransactionReverted { tx_hash: String },

    #[snafu(display("HTTP request failed at {loc}: {source}"))]
    Http {
        source: reqwest::Error,
        #[snafu(implicit)]
        loc: Location,
    },

    #[snafu(display("http req failed with status {status}: {body}"))]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },

    #[snafu(display("failed to decode gateway response: {source}. Body: {body}"))]
    Decode {
        source: serde_json::Error,
        body: String,
    },

    #[snafu(display("gateway call {method} failed: {message}"))]
    GatewayResponse { method: String, message: String },

    #[snafu(display("transaction failed: {code} {message}"))]
    BroadcastRejected { code: String, message: String },

    #[snafu(display("deadline exceeded before the call completed"))]
    DeadlineExceeded,

    #[snafu(display("Signing failed: {message}"))]
    Signing { message: String },

    #[snafu(display(
        "batch stopped at {address} after {} successful transfers",
        partial.success.len()
    ))]
    BatchTerminated {
        address: String,
        partial: Box<BatchResult>,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::AddressValidation { .. }
            | Error::EmptyBatch
            | Error::InvalidBatchAddress { .. }
            | Error::InvalidAddress { .. }
            | Error::InvalidTxHash { .. }
            | Error::InvalidPrivateKey { .. }
            | Error::InvalidGatewayUrl { .. }
            | Error::MissingApiKey { .. }
            | Error::ChainNotSupported { .. }
            | Error::BatchNotSupported { .. }
            | Error::MissingBalanceHint { .. } => ErrorKind::Validation,
            Error::InsufficientBalance { .. } => ErrorKind::InsufficientFunds,
            Error::Conversion { .. } | Error::OutOfRange { .. } => ErrorKind::Conversion,
            Error::EvmRpc { .. }
            | Error::EvmContract { .. }
            | Error::TransactionReverted { .. }
            | Error::Http { .. }
            | Error::HttpStatus { .. }
            | Error::Decode { .. }
            | Error::GatewayResponse { .. }
            | Error::BroadcastRejected { .. }
            | Error::DeadlineExceeded => ErrorKind::Gateway,
            Error::Signing { .. } => ErrorKind::Signing,
            Error::BatchTerminated { partial, .. } => partial
                .failed
                .last()
                .map_or(ErrorKind::Gateway, |failure| failure.error.kind()),
        }
    }
}

impl From<AddressError> for Error {
    fn from(source: AddressError) -> Self {
        Error::AddressValidation { source }
    }
}

impl From<UnitError> for Error {
    fn from(source: UnitError) -> Self {
        Error::Conversion { source }
    }
}
