use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    Bitcoin,
    Ethereum,
    Tron,
}

impl ChainType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainType::Bitcoin => "bitcoin",
            ChainType::Ethereum => "ethereum",
            ChainType::Tron => "tron",
        }
    }

    pub fn from_name(s: &str) -> Option<ChainType> {
        match s {
            "bitcoin" => Some(ChainType::Bitcoin),
            "ethereum" => Some(ChainType::Ethereum),
            "tron" => Some(ChainType::Tron),
            _ => None,
        }
    }

    /// How a transfer on this chain is funded, which decides how batches are executed.
    pub fn funding_model(&self) -> FundingModel {
        match self {
            ChainType::Bitcoin => FundingModel::Utxo,
            ChainType::Ethereum | ChainType::Tron => FundingModel::Account,
        }
    }
}

impl fmt::Display for ChainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChainType::from_name(&s.to_lowercase()).ok_or_else(|| format!("unknown chain: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    #[default]
    Mainnet,
    Testnet,
}

impl NetworkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkType::Mainnet => "mainnet",
            NetworkType::Testnet => "testnet",
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "" => Ok(NetworkType::Mainnet),
            "testnet" => Ok(NetworkType::Testnet),
            other => Err(format!("unknown network: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundingModel {
    /// One transaction spends an unspent output and can pay many recipients at once.
    Utxo,
    /// Every transfer is its own transaction ordered by the sender's nonce.
    Account,
}
