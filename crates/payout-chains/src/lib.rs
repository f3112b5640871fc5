pub mod batch;
pub mod bitcoin;
mod context;
pub mod dispatcher;
pub mod electrum;
pub mod error;
pub mod ethereum;
pub mod evm_gateway;
pub mod traits;
pub mod tron;
pub mod tron_http;

pub use batch::{BatchFailure, BatchResult, BatchSuccess};
pub use crate::bitcoin::{BitcoinSender, UtxoGateway};
pub use context::CallContext;
pub use dispatcher::PayoutDispatcher;
pub use error::{Error, ErrorKind, Result};
pub use ethereum::{EthereumSender, EvmGateway};
pub use traits::{ChainSender, SenderRegistry};
pub use tron::{TronGateway, TronSender};
