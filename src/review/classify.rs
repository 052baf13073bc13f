//! Output Classifier - script category, display address and change flag per output.

use crate::core::paths::CUSTOM_SCRIPT;
use crate::keystore::Keystore;
use crate::network::NetworkParams;
use bitcoin::bech32::{self, Hrp};
use bitcoin::psbt::Psbt;
use bitcoin::Script;
use serde::Serialize;
use std::fmt;

/// Script shapes the device knows how to present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScriptCategory {
    SegwitV0KeyHash,
    SegwitV0ScriptHash,
    LegacyP2sh,
    LegacyP2pkh,
    Unknown,
}

impl ScriptCategory {
    /// Classify purely from script structure.
    pub fn of(script: &Script) -> Self {
        if script.is_p2wpkh() {
            Self::SegwitV0KeyHash
        } else if script.is_p2wsh() {
            Self::SegwitV0ScriptHash
        } else if script.is_p2sh() {
            Self::LegacyP2sh
        } else if script.is_p2pkh() {
            Self::LegacyP2pkh
        } else {
            Self::Unknown
        }
    }
}

/// Where an output pays to, as shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum Destination {
    Address(String),
    CustomScript,
}

impl Destination {
    pub fn address(&self) -> Option<&str> {
        match self {
            Destination::Address(addr) => Some(addr),
            Destination::CustomScript => None,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Address(addr) => f.write_str(addr),
            Destination::CustomScript => f.write_str(CUSTOM_SCRIPT),
        }
    }
}

/// One transaction output prepared for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedOutput {
    pub destination: Destination,
    pub category: ScriptCategory,
    /// Satoshis
    pub amount: u64,
    pub is_change: bool,
    pub warning: Option<String>,
}

/// Encode `script` as an address of `network`. Anything that does not encode
/// cleanly under `category` becomes [`Destination::CustomScript`].
pub fn encode_destination(script: &Script, category: ScriptCategory, network: &NetworkParams) -> Destination {
    if ScriptCategory::of(script) != category {
        return Destination::CustomScript;
    }
    let bytes = script.as_bytes();
    let encoded = match category {
        ScriptCategory::SegwitV0KeyHash | ScriptCategory::SegwitV0ScriptHash => {
            let program = bytes.get(2..);
            Hrp::parse(network.bech32_hrp)
                .ok()
                .zip(program)
                .and_then(|(hrp, program)| bech32::segwit::encode(hrp, bech32::segwit::VERSION_0, program).ok())
        }
        // OP_HASH160 <20> ... OP_EQUAL
        ScriptCategory::LegacyP2sh => bytes.get(2..22).map(|hash| base58_with_version(network.p2sh, hash)),
        // OP_DUP OP_HASH160 <20> ... OP_EQUALVERIFY OP_CHECKSIG
        ScriptCategory::LegacyP2pkh => bytes.get(3..23).map(|hash| base58_with_version(network.p2pkh, hash)),
        ScriptCategory::Unknown => None,
    };
    encoded.map(Destination::Address).unwrap_or(Destination::CustomScript)
}

fn base58_with_version(version: u8, hash: &[u8]) -> String {
    let mut payload = [0u8; 21];
    payload[0] = version;
    payload[1..].copy_from_slice(hash);
    bitcoin::base58::encode_check(&payload)
}

/// Classify output `index` of `proposal`.
///
/// Change detection is the keystore's call; its flag and warning are attached as is.
pub fn classify<K: Keystore + ?Sized>(
    proposal: &Psbt,
    index: usize,
    keystore: &K,
    network: &NetworkParams,
) -> Option<ClassifiedOutput> {
    let txout = proposal.unsigned_tx.output.get(index)?;
    let category = ScriptCategory::of(&txout.script_pubkey);
    let destination = encode_destination(&txout.script_pubkey, category, network);
    let change = keystore.is_change(proposal, index);
    Some(ClassifiedOutput {
        destination,
        category,
        amount: txout.value.to_sat(),
        is_change: change.is_change,
        warning: change.warning,
    })
}
