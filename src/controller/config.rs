//! Controller configuration - built by the firmware entry point or the CLI

use crate::network::{DEFAULT_NETWORK, NETWORKS};
use zeroize::Zeroizing;

/// Mnemonic lengths the generator accepts
pub const VALID_WORD_COUNTS: [usize; 5] = [12, 15, 18, 21, 24];
pub const DEFAULT_WORDS: usize = 12;

#[derive(Clone)]
pub struct ControllerConfig {
    pub network: usize,
    pub default_words: usize,
    /// Preloaded at start; development builds only
    pub debug_mnemonic: Option<Zeroizing<String>>,
    /// Refuse bare `m/` verification requests
    pub require_fingerprint: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            network: DEFAULT_NETWORK,
            default_words: DEFAULT_WORDS,
            debug_mnemonic: None,
            require_fingerprint: false,
        }
    }
}

impl ControllerConfig {
    pub fn new() -> Self { Self::default() }

    /// Out of range indices fall back to the default network.
    pub fn with_network(mut self, index: usize) -> Self {
        self.network = if index < NETWORKS.len() { index } else { DEFAULT_NETWORK };
        self
    }

    /// Invalid counts fall back to 12 words.
    pub fn with_default_words(mut self, words: usize) -> Self {
        self.default_words = if is_valid_word_count(words) { words } else { DEFAULT_WORDS };
        self
    }

    pub fn with_debug_mnemonic(mut self, mnemonic: impl Into<String>) -> Self {
        self.debug_mnemonic = Some(Zeroizing::new(mnemonic.into()));
        self
    }

    pub fn require_fingerprint(mut self, required: bool) -> Self { self.require_fingerprint = required; self }

    /// `words` when valid, else the configured default.
    pub fn word_count(&self, words: usize) -> usize {
        if is_valid_word_count(words) { words } else { self.default_words }
    }
}

pub fn is_valid_word_count(words: usize) -> bool {
    VALID_WORD_COUNTS.contains(&words)
}

impl std::fmt::Debug for ControllerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerConfig")
            .field("network", &self.network)
            .field("default_words", &self.default_words)
            .field("debug_mnemonic", &self.debug_mnemonic.as_ref().map(|_| "<redacted>"))
            .field("require_fingerprint", &self.require_fingerprint)
            .finish()
    }
}
