//! HotKeystore - single-key segwit keystore holding the master key in RAM.
//!
//! Spends P2WPKH and P2SH-P2WPKH inputs whose `bip32_derivation` carries this
//! wallet's fingerprint. Everything else is reported through [`ProposalFlags`].

use super::{AddressFormat, ChangeInfo, Keystore, KeystoreError, ProposalFlags};
use crate::core::paths::CHANGE_CHAIN;
use crate::identity::WalletIdentity;
use crate::network::NetworkParams;
use bitcoin::bip32::{ChildNumber, DerivationPath, Fingerprint};
use bitcoin::hashes::Hash;
use bitcoin::psbt::{Input as PsbtIn, Psbt};
use bitcoin::secp256k1::{self, All, Message, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{ecdsa, Address, CompressedPublicKey, NetworkKind, ScriptBuf};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Spend types of a single-key wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SpendKind {
    Wpkh,
    ShWpkh,
    Other,
}

/// `None` when the input has no witness utxo to look at.
fn spend_kind(input: &PsbtIn) -> Option<SpendKind> {
    let spk = &input.witness_utxo.as_ref()?.script_pubkey;
    Some(if spk.is_p2wpkh() {
        SpendKind::Wpkh
    } else if spk.is_p2sh() && input.redeem_script.as_ref().is_some_and(|r| r.is_p2wpkh()) {
        SpendKind::ShWpkh
    } else {
        SpendKind::Other
    })
}

fn wpkh_script(key: &CompressedPublicKey) -> ScriptBuf {
    Address::p2wpkh(key, bitcoin::Network::Bitcoin).script_pubkey()
}

fn sh_wpkh_script(key: &CompressedPublicKey) -> ScriptBuf {
    Address::p2shwpkh(key, NetworkKind::Main).script_pubkey()
}

fn on_change_chain(path: &DerivationPath) -> bool {
    let steps: &[ChildNumber] = path.as_ref();
    steps.len() >= 2 && steps[steps.len() - 2] == ChildNumber::Normal { index: CHANGE_CHAIN }
}

pub struct HotKeystore {
    secp: Secp256k1<All>,
    identity: Option<WalletIdentity>,
}

impl Default for HotKeystore {
    fn default() -> Self {
        Self::new()
    }
}

impl HotKeystore {
    /// Empty keystore; call [`Keystore::init`] to load keys.
    pub fn new() -> Self {
        Self { secp: Secp256k1::new(), identity: None }
    }

    fn identity(&self) -> Result<&WalletIdentity, KeystoreError> {
        self.identity.as_ref().ok_or(KeystoreError::Uninitialized)
    }

    fn derive_key(&self, path: &DerivationPath) -> Result<CompressedPublicKey, KeystoreError> {
        let xpub = self.identity()?.derive_pub(&self.secp, path, NetworkKind::Test)?;
        Ok(CompressedPublicKey(xpub.public_key))
    }

    /// Does `key` lock the input's prevout the way its spend kind says?
    fn script_matches(key: &CompressedPublicKey, input: &PsbtIn, kind: SpendKind) -> bool {
        let Some(utxo) = input.witness_utxo.as_ref() else {
            return false;
        };
        match kind {
            SpendKind::Wpkh => utxo.script_pubkey == wpkh_script(key),
            SpendKind::ShWpkh => {
                input.redeem_script.as_ref() == Some(&wpkh_script(key))
                    && utxo.script_pubkey == sh_wpkh_script(key)
            }
            SpendKind::Other => false,
        }
    }
}

fn own_derivations(
    input: &PsbtIn,
    fingerprint: Fingerprint,
) -> Vec<(secp256k1::PublicKey, DerivationPath)> {
    input
        .bip32_derivation
        .iter()
        .filter(|(_, (source, _))| *source == fingerprint)
        .map(|(key, (_, path))| (*key, path.clone()))
        .collect()
}

impl Keystore for HotKeystore {
    fn init(&mut self, mnemonic: Option<&str>, passphrase: Option<&str>) -> Result<(), KeystoreError> {
        self.identity = None;
        if let Some(mnemonic) = mnemonic {
            let identity =
                WalletIdentity::from_mnemonic(&self.secp, mnemonic, passphrase.unwrap_or(""))?;
            debug!(fingerprint = %identity.fingerprint(), "keys loaded");
            self.identity = Some(identity);
        }
        Ok(())
    }

    fn fingerprint(&self) -> Option<Fingerprint> {
        self.identity.as_ref().map(WalletIdentity::fingerprint)
    }

    fn check_proposal(&self, proposal: &Psbt) -> ProposalFlags {
        let Some(identity) = self.identity.as_ref() else {
            return ProposalFlags::CANNOT_SIGN;
        };
        let fingerprint = identity.fingerprint();

        let mut flags = ProposalFlags::empty();
        let mut kinds = BTreeSet::new();
        let mut ours = false;

        for input in &proposal.inputs {
            // Inputs without prevout data are rejected by the review gates, not here.
            let kind = spend_kind(input);
            if let Some(kind) = kind {
                kinds.insert(kind);
                if kind == SpendKind::Other {
                    flags |= ProposalFlags::UNSUPPORTED_POLICY;
                }
            }

            for (key, path) in own_derivations(input, fingerprint) {
                ours = true;
                match self.derive_key(&path) {
                    Ok(derived) if derived.0 == key => {
                        if let Some(kind) = kind.filter(|k| *k != SpendKind::Other) {
                            if !Self::script_matches(&derived, input, kind) {
                                flags |= ProposalFlags::WRONG_FIELDS;
                            }
                        }
                    }
                    _ => flags |= ProposalFlags::WRONG_FIELDS,
                }
            }
        }

        if !ours {
            flags |= ProposalFlags::CANNOT_SIGN;
        }
        if kinds.len() > 1 {
            flags |= ProposalFlags::MIXED_INPUTS;
        }
        flags
    }

    fn is_change(&self, proposal: &Psbt, output_index: usize) -> ChangeInfo {
        let Some(identity) = self.identity.as_ref() else {
            return ChangeInfo::external();
        };
        let (Some(output), Some(txout)) = (
            proposal.outputs.get(output_index),
            proposal.unsigned_tx.output.get(output_index),
        ) else {
            return ChangeInfo::external();
        };

        let fingerprint = identity.fingerprint();
        let Some((key, (_, path))) = output
            .bip32_derivation
            .iter()
            .find(|(_, (source, _))| *source == fingerprint)
        else {
            return ChangeInfo::external();
        };

        let derived = match self.derive_key(path) {
            Ok(derived) => derived,
            Err(_) => return ChangeInfo::external().with_warning("Change derivation path is invalid"),
        };
        if derived.0 != *key {
            warn!(output = output_index, "output key does not match its derivation");
            return ChangeInfo::external().with_warning("Output key does not match its derivation path");
        }
        if txout.script_pubkey != wpkh_script(&derived) && txout.script_pubkey != sh_wpkh_script(&derived) {
            warn!(output = output_index, "output script does not match the wallet key");
            return ChangeInfo::external().with_warning("Output script does not match the wallet key");
        }

        if on_change_chain(path) {
            ChangeInfo::change()
        } else {
            ChangeInfo::change().with_warning("Change goes to a receiving address")
        }
    }

    fn derive_address(
        &self,
        path: &DerivationPath,
        network: &NetworkParams,
        format: AddressFormat,
    ) -> Result<String, KeystoreError> {
        let key = self.derive_key(path)?;
        Ok(match format {
            AddressFormat::Bech32 => Address::p2wpkh(&key, network.network).to_string(),
            AddressFormat::Base58 => Address::p2shwpkh(&key, network.network).to_string(),
        })
    }

    fn extended_public_key(
        &self,
        path: &DerivationPath,
        network: &NetworkParams,
    ) -> Result<String, KeystoreError> {
        let xpub = self.identity()?.derive_pub(&self.secp, path, network.network)?;
        Ok(xpub.to_string())
    }

    fn sign(&self, proposal: &Psbt) -> Result<Psbt, KeystoreError> {
        let identity = self.identity()?;
        let fingerprint = identity.fingerprint();

        let mut psbt = proposal.clone();
        let mut cache = SighashCache::new(&psbt.unsigned_tx);
        let mut signed = 0usize;

        for (index, input) in psbt.inputs.iter_mut().enumerate() {
            let own = own_derivations(input, fingerprint);
            if own.is_empty() {
                continue;
            }

            let utxo = input.witness_utxo.as_ref().ok_or_else(|| {
                KeystoreError::IncompleteProposal(format!("input {} has no witness utxo", index))
            })?;
            let value = utxo.value;
            let script_code = match spend_kind(input) {
                Some(SpendKind::Wpkh) => utxo.script_pubkey.clone(),
                Some(SpendKind::ShWpkh) => input.redeem_script.clone().ok_or_else(|| {
                    KeystoreError::IncompleteProposal(format!("input {} has no redeem script", index))
                })?,
                _ => {
                    return Err(KeystoreError::InsaneProposal(format!(
                        "input {} has an unsupported script",
                        index
                    )))
                }
            };

            let sighash = cache
                .p2wpkh_signature_hash(index, &script_code, value, EcdsaSighashType::All)
                .map_err(|e| KeystoreError::InsaneProposal(e.to_string()))?;
            let message = Message::from_digest(sighash.to_byte_array());

            for (key, path) in own {
                let mut privkey = identity.derive_priv(&self.secp, &path)?.to_priv();
                let pubkey = privkey.public_key(&self.secp);
                if pubkey.inner != key {
                    privkey.inner.non_secure_erase();
                    return Err(KeystoreError::InsaneProposal(format!(
                        "input {}: key does not match its derivation path",
                        index
                    )));
                }
                let signature = self.secp.sign_ecdsa_low_r(&message, &privkey.inner);
                privkey.inner.non_secure_erase();
                input.partial_sigs.insert(
                    pubkey,
                    ecdsa::Signature { signature, sighash_type: EcdsaSighashType::All },
                );
                signed += 1;
            }
        }

        if signed == 0 {
            return Err(KeystoreError::NothingToSign);
        }
        debug!(signatures = signed, "proposal signed");
        Ok(psbt)
    }
}
