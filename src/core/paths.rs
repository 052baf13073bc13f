//! Derivation path constants and helpers
//!
//! Centralized registry of default derivations and the text forms the host and
//! the UI exchange. Paths are shown with `'` for hardened steps; `h` is accepted
//! on input.

use bitcoin::bip32::DerivationPath;
use std::str::FromStr;

/// BIP84 purpose (native segwit single key)
pub const PURPOSE_SINGLE: u32 = 84;
/// BIP48 purpose (multisig), script type 2' = native segwit
pub const PURPOSE_MULTISIG: u32 = 48;
pub const MULTISIG_SCRIPT_TYPE: u32 = 2;

/// Index of the internal (change) chain in BIP44-style paths
pub const CHANGE_CHAIN: u32 = 1;

/// Placeholder shown for outputs whose script has no address form
pub const CUSTOM_SCRIPT: &str = "...custom script...";

pub fn single_sig_account(coin_type: u32) -> String {
    format!("m/{}'/{}'/0'", PURPOSE_SINGLE, coin_type)
}

pub fn multisig_account(coin_type: u32) -> String {
    format!("m/{}'/{}'/0'/{}'", PURPOSE_MULTISIG, coin_type, MULTISIG_SCRIPT_TYPE)
}

/// Normalize free text from the host or the UI into `m/...` form.
///
/// Trims whitespace and trailing NULs, and prefixes `m/` when it is missing.
pub fn normalize(text: &str) -> String {
    let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    if text == "m" || text.starts_with("m/") {
        text.to_string()
    } else {
        format!("m/{}", text.trim_start_matches('/'))
    }
}

/// Parse free text into a derivation path.
pub fn parse(text: &str) -> Result<DerivationPath, bitcoin::bip32::Error> {
    DerivationPath::from_str(&normalize(text))
}

/// Path text without the leading `m/`, as used inside `[fingerprint/path]`.
pub fn strip_master(text: &str) -> &str {
    text.strip_prefix("m/").unwrap_or(if text == "m" { "" } else { text })
}
