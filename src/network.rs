//! Network parameters - fixed set of chains the device can sign for.

use crate::core::paths;

/// Immutable description of a target chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkParams {
    pub name: &'static str,
    pub network: bitcoin::Network,
    /// Base58 version byte for P2PKH addresses
    pub p2pkh: u8,
    /// Base58 version byte for P2SH addresses
    pub p2sh: u8,
    /// Bech32 human-readable part
    pub bech32_hrp: &'static str,
    /// BIP32 coin type used in default derivations
    pub coin_type: u32,
}

pub const MAINNET: NetworkParams = NetworkParams {
    name: "Mainnet",
    network: bitcoin::Network::Bitcoin,
    p2pkh: 0x00,
    p2sh: 0x05,
    bech32_hrp: "bc",
    coin_type: 0,
};

pub const TESTNET: NetworkParams = NetworkParams {
    name: "Testnet",
    network: bitcoin::Network::Testnet,
    p2pkh: 0x6F,
    p2sh: 0xC4,
    bech32_hrp: "tb",
    coin_type: 1,
};

pub const REGTEST: NetworkParams = NetworkParams {
    name: "Regtest",
    network: bitcoin::Network::Regtest,
    p2pkh: 0x6F,
    p2sh: 0xC4,
    bech32_hrp: "bcrt",
    coin_type: 1,
};

pub const SIGNET: NetworkParams = NetworkParams {
    name: "Signet",
    network: bitcoin::Network::Signet,
    p2pkh: 0x6F,
    p2sh: 0xC4,
    bech32_hrp: "tb",
    coin_type: 1,
};

/// Selectable networks, in menu order.
pub static NETWORKS: [NetworkParams; 4] = [MAINNET, TESTNET, REGTEST, SIGNET];

/// Index of Testnet, the power-on default.
pub const DEFAULT_NETWORK: usize = 1;

impl NetworkParams {
    /// Look up by menu index. `None` when out of range.
    pub fn by_index(index: usize) -> Option<&'static NetworkParams> {
        NETWORKS.get(index)
    }

    /// Look up by name, case-insensitive. Accepts `bitcoin` as an alias for mainnet.
    pub fn by_name(name: &str) -> Option<(usize, &'static NetworkParams)> {
        let wanted = name.trim().to_ascii_lowercase();
        let wanted = match wanted.as_str() {
            "bitcoin" | "main" => "mainnet",
            "test" => "testnet",
            other => other,
        }
        .to_string();
        NETWORKS
            .iter()
            .enumerate()
            .find(|(_, n)| n.name.eq_ignore_ascii_case(&wanted))
    }

    pub fn names() -> Vec<&'static str> {
        NETWORKS.iter().map(|n| n.name).collect()
    }

    /// `m/84'/<coin>'/0'`
    pub fn default_single_path(&self) -> String {
        paths::single_sig_account(self.coin_type)
    }

    /// `m/48'/<coin>'/0'/2'`
    pub fn default_multisig_path(&self) -> String {
        paths::multisig_account(self.coin_type)
    }
}
