//! Address verification payloads from the host.
//!
//! Three text forms are accepted:
//!
//! ```text
//! address=<addr>\ntype=<type>\n<fingerprint>/<path>
//! <fingerprint>/<path>
//! m/<path>
//! ```

use super::DispatchError;
use crate::core::paths;

/// Hex length of a BIP32 fingerprint
pub const FINGERPRINT_LEN: usize = 8;

/// Parsed address verification request. Nothing here is trusted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRequest {
    /// Address the host claims to display
    pub claimed_address: Option<String>,
    pub script_type: Option<String>,
    /// First 8 characters the host sent as fingerprint; `None` for bare `m/` paths
    pub fingerprint: Option<String>,
    /// Path text after the fingerprint, normalized to `m/...`
    pub path: String,
}

impl AddressRequest {
    pub fn parse(payload: &str) -> Result<Self, DispatchError> {
        let payload = payload.trim_matches(|c: char| c.is_whitespace() || c == '\0');

        if let Some(rest) = payload.strip_prefix("address=") {
            let mut lines = rest.lines().map(str::trim);
            let address = lines
                .next()
                .filter(|l| !l.is_empty())
                .ok_or_else(|| invalid("missing address"))?;
            let script_type = lines
                .next()
                .and_then(|l| l.strip_prefix("type="))
                .ok_or_else(|| invalid("missing type"))?;
            let derivation = lines
                .next()
                .filter(|l| !l.is_empty())
                .ok_or_else(|| invalid("missing derivation"))?;
            // Only the standalone `m/` form may omit the fingerprint
            let (fingerprint, path) = split_derivation(derivation);
            if fingerprint.is_none() {
                return Err(DispatchError::WrongFingerprint);
            }
            return Ok(Self {
                claimed_address: Some(address.to_string()),
                script_type: Some(script_type.to_string()),
                fingerprint,
                path,
            });
        }

        let (fingerprint, path) = split_derivation(payload);
        Ok(Self { claimed_address: None, script_type: None, fingerprint, path })
    }

    /// Compare the attached fingerprint with the wallet's, then require the `/`
    /// separator. Bare `m/` requests pass through with `Ok(false)`.
    pub fn authenticate(&self, wallet_fingerprint: &str) -> Result<bool, DispatchError> {
        let Some(attached) = self.fingerprint.as_deref() else {
            return Ok(false);
        };
        let head = attached.get(..FINGERPRINT_LEN).unwrap_or(attached);
        if !head.eq_ignore_ascii_case(wallet_fingerprint) {
            return Err(DispatchError::WrongFingerprint);
        }
        if attached.len() != FINGERPRINT_LEN {
            return Err(invalid("expected <fingerprint>/<path>"));
        }
        Ok(true)
    }
}

/// `m/...` has no fingerprint; anything else is `<fingerprint>/<path>`.
fn split_derivation(text: &str) -> (Option<String>, String) {
    if text == "m" || text.starts_with("m/") {
        return (None, paths::normalize(text));
    }
    match text.split_once('/') {
        Some((fingerprint, path)) => (Some(fingerprint.to_string()), paths::normalize(path)),
        None => (Some(text.to_string()), "m".to_string()),
    }
}

fn invalid(reason: &str) -> DispatchError {
    DispatchError::InvalidRequest(reason.to_string())
}
