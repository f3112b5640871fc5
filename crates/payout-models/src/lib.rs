mod address;
mod chain;
mod config;
pub mod serde_utils;
mod transfer;
pub mod units;

pub use address::*;
pub use chain::*;
pub use config::*;
pub use transfer::*;
pub use units::{
    from_base_units, to_base_units, UnitError, BTC_DECIMALS, ETH_DECIMALS, GWEI_DECIMALS,
    TRX_DECIMALS,
};
