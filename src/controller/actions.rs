//! Operator actions delivered by the UI

use std::fmt;
use zeroize::Zeroizing;

/// One operator intent. Secret-carrying variants wipe their text when dropped.
#[derive(Clone, PartialEq, Eq)]
pub enum Action {
    /// Generate and show a fresh mnemonic of `words` words
    GenerateKey { words: usize },
    SubmitMnemonic(Zeroizing<String>),
    SubmitPassphrase(Zeroizing<String>),
    /// Index into [`crate::network::NETWORKS`]
    SelectNetwork(usize),
    /// Show the extended public key at a derivation path
    ShowXpub(String),
    VerifyAddress,
    SignPsbt,
    ConfirmSignature,
    Back,
    Shutdown,
}

impl Action {
    pub fn mnemonic(text: impl Into<String>) -> Self {
        Action::SubmitMnemonic(Zeroizing::new(text.into()))
    }

    pub fn passphrase(text: impl Into<String>) -> Self {
        Action::SubmitPassphrase(Zeroizing::new(text.into()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::GenerateKey { .. } => "generate-key",
            Action::SubmitMnemonic(_) => "submit-mnemonic",
            Action::SubmitPassphrase(_) => "submit-passphrase",
            Action::SelectNetwork(_) => "select-network",
            Action::ShowXpub(_) => "show-xpub",
            Action::VerifyAddress => "verify-address",
            Action::SignPsbt => "sign-psbt",
            Action::ConfirmSignature => "confirm-signature",
            Action::Back => "back",
            Action::Shutdown => "shutdown",
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::GenerateKey { words } => f.debug_struct("GenerateKey").field("words", words).finish(),
            Action::SubmitMnemonic(_) => f.write_str("SubmitMnemonic(<redacted>)"),
            Action::SubmitPassphrase(_) => f.write_str("SubmitPassphrase(<redacted>)"),
            Action::SelectNetwork(index) => f.debug_tuple("SelectNetwork").field(index).finish(),
            Action::ShowXpub(path) => f.debug_tuple("ShowXpub").field(path).finish(),
            other => f.write_str(other.name()),
        }
    }
}
