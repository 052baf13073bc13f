//! Screens and the collaborator traits the controller drives

use super::actions::Action;
use crate::dispatch::{AddressCheck, RequestKind};
use crate::review::Summary;
use std::fmt;
use zeroize::Zeroizing;

/// Secret text that is shown once and wiped when the screen goes away.
#[derive(Clone, PartialEq, Eq)]
pub struct ShownSecret(Zeroizing<String>);

impl ShownSecret {
    pub(crate) fn new(text: String) -> Self {
        Self(Zeroizing::new(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ShownSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ShownSecret(<redacted>)")
    }
}

/// What the display should show next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    /// Main menu
    Initial { network: &'static str },
    GeneratedMnemonic { words: usize, phrase: ShownSecret },
    PassphrasePrompt,
    WalletReady { fingerprint: String, network: &'static str },
    NetworkSelected { network: &'static str, single_sig: String, multisig: String },
    /// `[fingerprint/path]xpub`
    Xpub { derivation: String, xpub: String },
    AwaitingHost(RequestKind),
    Address(AddressCheck),
    Transaction(Summary),
    /// Base64 PSBT, also sent to the host
    Signed { psbt: String },
    Goodbye,
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Screen::Initial { network } => write!(f, "Main menu ({})", network),
            Screen::GeneratedMnemonic { words, .. } => write!(f, "Write down these {} words", words),
            Screen::PassphrasePrompt => f.write_str("Enter passphrase"),
            Screen::WalletReady { fingerprint, network } => write!(f, "Wallet {} on {}", fingerprint, network),
            Screen::NetworkSelected { network, single_sig, multisig } => {
                write!(f, "{}\nSingle: {}\nMultisig: {}", network, single_sig, multisig)
            }
            Screen::Xpub { derivation, xpub } => write!(f, "{}{}", derivation, xpub),
            Screen::AwaitingHost(RequestKind::VerifyAddress) => f.write_str("Waiting for address request"),
            Screen::AwaitingHost(RequestKind::SignTransaction) => f.write_str("Waiting for transaction"),
            Screen::Address(check) => {
                write!(f, "{}\n{}\n{}", check.derivation, check.bech32, check.base58)?;
                match check.claimed_matches {
                    Some(true) => f.write_str("\nHost address matches"),
                    Some(false) => f.write_str("\nHost address DOES NOT match"),
                    None => Ok(()),
                }
            }
            Screen::Transaction(summary) => {
                for output in &summary.outputs {
                    let marker = if output.is_change { " (change)" } else { "" };
                    writeln!(f, "{} sat -> {}{}", output.amount, output.destination, marker)?;
                    if let Some(warning) = &output.warning {
                        writeln!(f, "  ! {}", warning)?;
                    }
                }
                write!(f, "Fee: {} sat", summary.fee)
            }
            Screen::Signed { psbt } => write!(f, "Signed: {}", psbt),
            Screen::Goodbye => f.write_str("Keys wiped"),
        }
    }
}

/// Display and input device.
pub trait Ui {
    fn poll_action(&mut self) -> Option<Action>;
    fn show(&mut self, screen: &Screen);
    fn show_error(&mut self, message: &str);
    fn calibration_requested(&mut self) -> bool {
        false
    }
    /// Blocks until calibration finishes or times out.
    fn calibrate(&mut self) {}
}

/// Link to the host computer.
pub trait HostLink {
    fn request_data(&mut self, kind: RequestKind);
    /// A payload once it is fully buffered.
    fn poll_payload(&mut self) -> Option<Vec<u8>>;
    fn send(&mut self, payload: &str);
}

#[derive(Debug, thiserror::Error)]
#[error("entropy source failed: {0}")]
pub struct EntropyError(pub String);

pub trait EntropySource {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), EntropyError>;
}

/// Operating system RNG.
#[cfg(feature = "native")]
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

#[cfg(feature = "native")]
impl EntropySource for OsEntropy {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), EntropyError> {
        use rand::RngCore;
        rand::rngs::OsRng
            .try_fill_bytes(buf)
            .map_err(|e| EntropyError(e.to_string()))
    }
}
