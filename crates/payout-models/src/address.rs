use std::sync::LazyLock;

use snafu::Snafu;

use crate::{ChainType, NetworkType};

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum AddressError {
    #[snafu(display("invalid network or address: {address} has no known prefix"))]
    UnrecognizedAddress { address: String },

    #[snafu(display(
        "invalid network or address: {address} belongs to {found}, sender is configured for {expected}"
    ))]
    NetworkMismatch {
        address: String,
        found: String,
        expected: String,
    },
}

/// What an address prefix says about the chain (and, for Bitcoin, the network) it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressClass {
    pub prefix: &'static str,
    pub chain: ChainType,
    /// Only Bitcoin encodes the network in its address format.
    pub network: Option<NetworkType>,
}

impl AddressClass {
    const fn new(prefix: &'static str, chain: ChainType, network: Option<NetworkType>) -> Self {
        Self {
            prefix,
            chain,
            network,
        }
    }

    /// Label in the `<chain>[<network>]` form used in error messages, e.g. `bitcointestnet`.
    pub fn label(&self) -> String {
        match self.network {
            Some(NetworkType::Testnet) => format!("{}{}", self.chain, NetworkType::Testnet),
            _ => self.chain.to_string(),
        }
    }

    /// Whether this class is acceptable for a sender configured on `chain`/`network`.
    pub fn matches(&self, chain: ChainType, network: NetworkType) -> bool {
        if self.chain != chain {
            return false;
        }
        match (chain, self.network) {
            (ChainType::Bitcoin, Some(address_network)) => address_network == network,
            (ChainType::Bitcoin, None) => false,
            _ => true,
        }
    }
}

/// Known address prefixes, longest first so that the first hit is the longest match.
pub static ADDRESS_PREFIXES: LazyLock<Vec<AddressClass>> = LazyLock::new(|| {
    let mut prefixes = vec![
        AddressClass::new("T", ChainType::Tron, None),
        AddressClass::new("0x", ChainType::Ethereum, None),
        AddressClass::new("1", ChainType::Bitcoin, Some(NetworkType::Mainnet)),
        AddressClass::new("3", ChainType::Bitcoin, Some(NetworkType::Mainnet)),
        AddressClass::new("bc1", ChainType::Bitcoin, Some(NetworkType::Mainnet)),
        AddressClass::new("2", ChainType::Bitcoin, Some(NetworkType::Testnet)),
        AddressClass::new("m", ChainType::Bitcoin, Some(NetworkType::Testnet)),
        AddressClass::new("n", ChainType::Bitcoin, Some(NetworkType::Testnet)),
        AddressClass::new("tb1", ChainType::Bitcoin, Some(NetworkType::Testnet)),
    ];
    prefixes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
    prefixes
});

/// Infer chain and network from the address prefix.
pub fn classify_address(address: &str) -> Option<AddressClass> {
    ADDRESS_PREFIXES
        .iter()
        .find(|class| address.starts_with(class.prefix))
        .copied()
}

/// Check that `address` can receive funds from a sender configured on `chain`/`network`.
///
/// Pure: no I/O is performed, so callers run this before touching any gateway.
pub fn validate_destination(
    chain: ChainType,
    network: NetworkType,
    address: &str,
) -> Result<AddressClass, AddressError> {
    let class = classify_address(address).ok_or_else(|| AddressError::UnrecognizedAddress {
        address: address.to_string(),
    })?;

    if !class.matches(chain, network) {
        let expected = match chain {
            ChainType::Bitcoin if network == NetworkType::Testnet => {
                format!("{chain}{network}")
            }
            _ => chain.to_string(),
        };
        return Err(AddressError::NetworkMismatch {
            address: address.to_string(),
            found: class.label(),
            expected,
        });
    }

    Ok(class)
}
