//! Request Dispatcher - one outstanding host request at a time.
//!
//! ```text
//!            arm(kind)                payload (sign, accepted)
//!   Idle ───────────────► Awaiting ─────────────────────────► Reviewing
//!    ▲                      │  │                                 │   │
//!    │   payload (verify)   │  │ payload rejected                │   │ arm(kind)
//!    ├──────────────────────┘  │                                 │   └──────► Awaiting
//!    ├─────────────────────────┘                                 │
//!    └───────────────── confirm / cancel ────────────────────────┘
//! ```
//!
//! The armed tag is consumed before a payload is looked at, so every failure
//! lands back in `Idle` with nothing held.

mod request;

pub use request::{AddressRequest, FINGERPRINT_LEN};

use crate::core::paths;
use crate::keystore::{AddressFormat, Keystore, KeystoreError};
use crate::network::NetworkParams;
use crate::review::{self, ReviewError, Summary};
use base64::Engine;
use bitcoin::psbt::Psbt;
use serde::Serialize;
use tracing::{debug, info, warn};

/// What the host has been asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestKind {
    VerifyAddress,
    SignTransaction,
}

#[derive(Debug, Default)]
pub enum RequestState {
    #[default]
    Idle,
    AwaitingHostData(RequestKind),
    /// A proposal that passed review, waiting for the operator
    Reviewing(Box<Psbt>),
}

/// Errors from host request handling
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Another host request is outstanding")]
    RequestOutstanding,
    #[error("No host request is armed")]
    NotArmed,
    #[error("Wrong fingerprint")]
    WrongFingerprint,
    #[error("Fingerprint is required")]
    FingerprintRequired,
    #[error("Invalid address request: {0}")]
    InvalidRequest(String),
    #[error("Invalid base64 payload: {0}")]
    InvalidBase64(String),
    #[error(transparent)]
    Review(#[from] ReviewError),
    #[error(transparent)]
    Keystore(#[from] KeystoreError),
    #[error("No transaction to sign")]
    NothingToSign,
}

/// Result of an address verification request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressCheck {
    /// Derivation as it will be shown, `[fingerprint/path]` or `m/path`
    pub derivation: String,
    pub bech32: String,
    pub base58: String,
    pub claimed: Option<String>,
    /// Whether the claimed address equals one of the derived ones
    pub claimed_matches: Option<bool>,
    pub script_type: Option<String>,
    pub fingerprint_checked: bool,
}

/// What a payload turned into.
#[derive(Debug)]
pub enum Outcome {
    Address(AddressCheck),
    Transaction(Summary),
}

#[derive(Debug, Default)]
pub struct Dispatcher {
    state: RequestState,
    require_fingerprint: bool,
}

impl Dispatcher {
    pub fn new(require_fingerprint: bool) -> Self {
        Self { state: RequestState::Idle, require_fingerprint }
    }

    pub fn state(&self) -> &RequestState {
        &self.state
    }

    /// Kind of the armed request, if one is waiting for host data.
    pub fn armed(&self) -> Option<RequestKind> {
        match self.state {
            RequestState::AwaitingHostData(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn is_awaiting(&self) -> bool {
        self.armed().is_some()
    }

    pub fn pending_proposal(&self) -> Option<&Psbt> {
        match &self.state {
            RequestState::Reviewing(psbt) => Some(psbt),
            _ => None,
        }
    }

    pub fn arm(&mut self, kind: RequestKind) -> Result<(), DispatchError> {
        if self.is_awaiting() {
            return Err(DispatchError::RequestOutstanding);
        }
        if matches!(self.state, RequestState::Reviewing(_)) {
            debug!("held proposal released by new request");
        }
        self.state = RequestState::AwaitingHostData(kind);
        info!(?kind, "host request armed");
        Ok(())
    }

    /// Drop whatever is pending.
    pub fn cancel(&mut self) {
        if !matches!(self.state, RequestState::Idle) {
            debug!("pending request cancelled");
        }
        self.state = RequestState::Idle;
    }

    /// Process one fully buffered host payload for the armed request.
    pub fn handle_payload<K: Keystore + ?Sized>(
        &mut self,
        keystore: &K,
        network: &NetworkParams,
        payload: &[u8],
    ) -> Result<Outcome, DispatchError> {
        let kind = match std::mem::take(&mut self.state) {
            RequestState::AwaitingHostData(kind) => kind,
            other => {
                self.state = other;
                return Err(DispatchError::NotArmed);
            }
        };

        match kind {
            RequestKind::VerifyAddress => {
                let text = String::from_utf8_lossy(payload);
                let check = verify_address(keystore, network, &text, self.require_fingerprint)
                    .inspect_err(|e| warn!(error = %e, "address request refused"))?;
                Ok(Outcome::Address(check))
            }
            RequestKind::SignTransaction => {
                let raw = decode_base64(payload)?;
                let review = review::review(keystore, network, &raw)
                    .inspect_err(|e| warn!(error = %e, "proposal refused"))?;
                self.state = RequestState::Reviewing(Box::new(review.proposal));
                Ok(Outcome::Transaction(review.summary))
            }
        }
    }

    /// Sign the held proposal and return it base64 encoded. The proposal is
    /// released whatever the outcome.
    pub fn confirm<K: Keystore + ?Sized>(&mut self, keystore: &K) -> Result<String, DispatchError> {
        let proposal = match std::mem::take(&mut self.state) {
            RequestState::Reviewing(proposal) => proposal,
            other => {
                self.state = other;
                return Err(DispatchError::NothingToSign);
            }
        };
        let signed = keystore.sign(&proposal)?;
        info!(inputs = signed.inputs.len(), "proposal signed");
        Ok(base64::engine::general_purpose::STANDARD.encode(signed.serialize()))
    }
}

fn decode_base64(payload: &[u8]) -> Result<Vec<u8>, DispatchError> {
    let trimmed = payload
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace() && *b != 0)
        .collect::<Vec<u8>>();
    base64::engine::general_purpose::STANDARD
        .decode(trimmed)
        .map_err(|e| DispatchError::InvalidBase64(e.to_string()))
}

/// Authenticate, then derive both address forms. Nothing is derived when the
/// fingerprint check fails.
pub fn verify_address<K: Keystore + ?Sized>(
    keystore: &K,
    network: &NetworkParams,
    payload: &str,
    require_fingerprint: bool,
) -> Result<AddressCheck, DispatchError> {
    let request = AddressRequest::parse(payload)?;
    let fingerprint = keystore.fingerprint().ok_or(KeystoreError::Uninitialized)?.to_string();

    let fingerprint_checked = request.authenticate(&fingerprint)?;
    if !fingerprint_checked && require_fingerprint {
        return Err(DispatchError::FingerprintRequired);
    }

    let path = paths::parse(&request.path)
        .map_err(|e| KeystoreError::InvalidPath(format!("{}: {}", request.path, e)))?;
    let bech32 = keystore.derive_address(&path, network, AddressFormat::Bech32)?;
    let base58 = keystore.derive_address(&path, network, AddressFormat::Base58)?;

    let derivation = if fingerprint_checked {
        format!("[{}/{}]", fingerprint, paths::strip_master(&request.path))
    } else {
        request.path.clone()
    };
    let claimed_matches = request
        .claimed_address
        .as_deref()
        .map(|claimed| claimed == bech32 || claimed == base58);
    if claimed_matches == Some(false) {
        warn!("host-claimed address differs from derived addresses");
    }

    Ok(AddressCheck {
        derivation,
        bech32,
        base58,
        claimed: request.claimed_address,
        claimed_matches,
        script_type: request.script_type,
        fingerprint_checked,
    })
}
