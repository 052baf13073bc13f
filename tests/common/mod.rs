//! Shared fixtures: proposals built against the well-known test wallet.

#![allow(dead_code)]

use base64::Engine;
use beesigner::{HotKeystore, Keystore, WalletIdentity};
use bitcoin::absolute::LockTime;
use bitcoin::bip32::{DerivationPath, Fingerprint};
use bitcoin::hashes::Hash;
use bitcoin::psbt::Psbt;
use bitcoin::secp256k1::Secp256k1;
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, CompressedPublicKey, NetworkKind, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid,
    Witness,
};
use std::str::FromStr;

// Test mnemonic (well-known, never use with real funds)
pub const TEST_MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
pub const TEST_FINGERPRINT: &str = "73c5da0a";

pub fn keystore() -> HotKeystore {
    let mut keystore = HotKeystore::new();
    keystore.init(Some(TEST_MNEMONIC), None).expect("init");
    keystore
}

pub fn fingerprint() -> Fingerprint {
    Fingerprint::from_str(TEST_FINGERPRINT).expect("fingerprint")
}

/// Wallet key at `path`.
pub fn wallet_key(path: &str) -> CompressedPublicKey {
    let secp = Secp256k1::new();
    let identity = WalletIdentity::from_mnemonic(&secp, TEST_MNEMONIC, "").expect("identity");
    let path = DerivationPath::from_str(path).expect("path");
    let xpub = identity.derive_pub(&secp, &path, NetworkKind::Test).expect("derive");
    CompressedPublicKey(xpub.public_key)
}

pub fn wpkh(key: &CompressedPublicKey) -> ScriptBuf {
    ScriptBuf::new_p2wpkh(&key.wpubkey_hash())
}

/// Segwit v0 key hash script of someone else.
pub fn external_script(byte: u8) -> ScriptBuf {
    let mut bytes = vec![0x00, 0x14];
    bytes.extend_from_slice(&[byte; 20]);
    ScriptBuf::from_bytes(bytes)
}

/// Input shapes the fixtures can build.
pub enum In {
    /// P2WPKH owned by the test wallet
    Wallet { path: &'static str, sat: u64 },
    /// P2SH-P2WPKH owned by the test wallet
    Nested { path: &'static str, sat: u64 },
    /// Wallet derivation but no witness utxo
    Legacy { path: &'static str },
    /// P2WPKH whose derivation claims `claimed` but the key is from `path`
    WrongPath { path: &'static str, claimed: &'static str, sat: u64 },
    /// Someone else's coin
    Foreign { sat: u64 },
}

pub enum Out {
    External { byte: u8, sat: u64 },
    /// Wallet-owned output with its derivation attached
    Owned { path: &'static str, sat: u64 },
    /// Derivation of `path` attached to an unrelated script
    Spoofed { path: &'static str, byte: u8, sat: u64 },
}

pub fn proposal(inputs: &[In], outputs: &[Out]) -> Psbt {
    let tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: (0..inputs.len())
            .map(|vout| TxIn {
                previous_output: OutPoint { txid: Txid::all_zeros(), vout: vout as u32 },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::new(),
            })
            .collect(),
        output: outputs
            .iter()
            .map(|out| match out {
                Out::External { byte, sat } => TxOut { value: Amount::from_sat(*sat), script_pubkey: external_script(*byte) },
                Out::Owned { path, sat } => TxOut { value: Amount::from_sat(*sat), script_pubkey: wpkh(&wallet_key(path)) },
                Out::Spoofed { byte, sat, .. } => {
                    TxOut { value: Amount::from_sat(*sat), script_pubkey: external_script(*byte) }
                }
            })
            .collect(),
    };
    let mut psbt = Psbt::from_unsigned_tx(tx).expect("unsigned tx");

    for (input, shape) in psbt.inputs.iter_mut().zip(inputs) {
        match shape {
            In::Wallet { path, sat } => {
                let key = wallet_key(path);
                input.witness_utxo = Some(TxOut { value: Amount::from_sat(*sat), script_pubkey: wpkh(&key) });
                input.bip32_derivation.insert(key.0, (fingerprint(), DerivationPath::from_str(path).expect("path")));
            }
            In::Nested { path, sat } => {
                let key = wallet_key(path);
                let redeem = wpkh(&key);
                input.witness_utxo = Some(TxOut {
                    value: Amount::from_sat(*sat),
                    script_pubkey: ScriptBuf::new_p2sh(&redeem.script_hash()),
                });
                input.redeem_script = Some(redeem);
                input.bip32_derivation.insert(key.0, (fingerprint(), DerivationPath::from_str(path).expect("path")));
            }
            In::Legacy { path } => {
                let key = wallet_key(path);
                input.bip32_derivation.insert(key.0, (fingerprint(), DerivationPath::from_str(path).expect("path")));
            }
            In::WrongPath { path, claimed, sat } => {
                let key = wallet_key(path);
                input.witness_utxo = Some(TxOut { value: Amount::from_sat(*sat), script_pubkey: wpkh(&key) });
                input
                    .bip32_derivation
                    .insert(key.0, (fingerprint(), DerivationPath::from_str(claimed).expect("path")));
            }
            In::Foreign { sat } => {
                input.witness_utxo = Some(TxOut { value: Amount::from_sat(*sat), script_pubkey: external_script(0x77) });
            }
        }
    }

    for (output, shape) in psbt.outputs.iter_mut().zip(outputs) {
        match shape {
            Out::Owned { path, .. } | Out::Spoofed { path, .. } => {
                let key = wallet_key(path);
                output.bip32_derivation.insert(key.0, (fingerprint(), DerivationPath::from_str(path).expect("path")));
            }
            Out::External { .. } => {}
        }
    }
    psbt
}

pub fn to_base64(psbt: &Psbt) -> String {
    base64::engine::general_purpose::STANDARD.encode(psbt.serialize())
}

pub fn from_base64(text: &str) -> Psbt {
    let bytes = base64::engine::general_purpose::STANDARD.decode(text).expect("base64");
    Psbt::deserialize(&bytes).expect("psbt")
}
