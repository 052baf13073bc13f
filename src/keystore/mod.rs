//! Keystore - key derivation, policy checks and signing behind one trait.
//!
//! # Architecture
//!
//! ```text
//! Controller
//!     │
//!     ├── review::review ──► check_proposal / is_change
//!     ├── dispatch (verify) ──► derive_address
//!     ├── ShowXpub ──► extended_public_key
//!     └── ConfirmSignature ──► sign
//!                                 │
//!                                 ▼
//!                           HotKeystore (WalletIdentity + secp context)
//! ```
//!
//! The controller never touches private keys directly: everything that needs
//! the master key goes through [`Keystore`].

mod hot;

pub use hot::HotKeystore;

use crate::identity::IdentityError;
use crate::network::NetworkParams;
use bitcoin::bip32::{DerivationPath, Fingerprint};
use bitcoin::psbt::Psbt;

bitflags::bitflags! {
    /// Independent reasons a proposal cannot be signed. Empty means acceptable.
    pub struct ProposalFlags: u8 {
        /// No input is spendable with the current keys
        const CANNOT_SIGN = 1 << 0;
        /// Inputs of different script types
        const MIXED_INPUTS = 1 << 1;
        /// Inconsistent key or script fields
        const WRONG_FIELDS = 1 << 2;
        /// Script policy the wallet does not handle
        const UNSUPPORTED_POLICY = 1 << 3;
    }
}

impl ProposalFlags {
    /// Operator-facing text for every set reason, most severe first.
    pub fn reasons(&self) -> Vec<&'static str> {
        let table = [
            (Self::CANNOT_SIGN, "Can't sign the transaction"),
            (Self::MIXED_INPUTS, "Mixed inputs are not supported yet"),
            (Self::WRONG_FIELDS, "Something is wrong with transaction fields"),
            (Self::UNSUPPORTED_POLICY, "Script policy is not supported"),
        ];
        table
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, text)| *text)
            .collect()
    }

    /// The reason shown when only one line fits.
    pub fn primary_reason(&self) -> &'static str {
        self.reasons()
            .first()
            .copied()
            .unwrap_or("Something is wrong with transaction")
    }
}

/// Address encoding requested by the host for verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFormat {
    /// Native segwit P2WPKH
    Bech32,
    /// P2SH-wrapped P2WPKH
    Base58,
}

/// Change classification of one output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeInfo {
    pub is_change: bool,
    pub warning: Option<String>,
}

impl ChangeInfo {
    pub fn external() -> Self {
        Self::default()
    }

    pub fn change() -> Self {
        Self { is_change: true, warning: None }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }
}

/// Errors from the keystore
#[derive(Debug, thiserror::Error)]
pub enum KeystoreError {
    #[error("Keys are not loaded")]
    Uninitialized,
    #[error("Invalid derivation path: {0}")]
    InvalidPath(String),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("Proposal is missing data needed for signing: {0}")]
    IncompleteProposal(String),
    #[error("Proposal fields are inconsistent: {0}")]
    InsaneProposal(String),
    #[error("Nothing to sign with the current keys")]
    NothingToSign,
}

/// Key derivation and signing engine.
pub trait Keystore {
    /// Load keys. `None` mnemonic drops any loaded identity.
    fn init(&mut self, mnemonic: Option<&str>, passphrase: Option<&str>) -> Result<(), KeystoreError>;

    fn fingerprint(&self) -> Option<Fingerprint>;

    /// Policy check; every failing reason is set.
    fn check_proposal(&self, proposal: &Psbt) -> ProposalFlags;

    fn is_change(&self, proposal: &Psbt, output_index: usize) -> ChangeInfo;

    fn derive_address(
        &self,
        path: &DerivationPath,
        network: &NetworkParams,
        format: AddressFormat,
    ) -> Result<String, KeystoreError>;

    fn extended_public_key(
        &self,
        path: &DerivationPath,
        network: &NetworkParams,
    ) -> Result<String, KeystoreError>;

    /// Returns a signed copy of the proposal.
    fn sign(&self, proposal: &Psbt) -> Result<Psbt, KeystoreError>;
}
