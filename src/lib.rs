//! Beesigner: signing-review controller for an air-gapped Bitcoin wallet.
//!
//! # Architecture
//!
//! ```text
//! Controller (owns everything, one cooperative tick)
//!   │
//!   ├── Ui ──► Action ──► Action Router
//!   │                        ├── SecretSlot x2 (mnemonic, passphrase)
//!   │                        ├── Keystore (HotKeystore: identity, policy, signing)
//!   │                        └── Dispatcher (Idle → AwaitingHostData → Reviewing)
//!   │
//!   └── HostLink ──► payload ──► Dispatcher
//!                                  ├── verify: fingerprint check, then derive
//!                                  └── sign: review gates ──► Summary ──► Ui
//! ```
//!
//! # Operations
//!
//! | Action | Effect |
//! |--------|--------|
//! | `GenerateKey` | Fresh BIP39 mnemonic from the entropy source, shown only |
//! | `SubmitMnemonic` / `SubmitPassphrase` | Load the wallet; passphrase wiped right after |
//! | `SelectNetwork` | Switch chain, cancel any pending request |
//! | `ShowXpub` | `[fingerprint/path]xpub` |
//! | `VerifyAddress` / `SignPsbt` | Ask the host for data |
//! | `ConfirmSignature` | Sign the reviewed proposal, send it back |
//! | `Back` / `Shutdown` | Cancel / wipe everything and stop |
//!
//! # Features
//!
//! - `native` - CLI, OS entropy and the `tracing-subscriber` setup
//!
//! # Usage
//!
//! ```ignore
//! use beesigner::{Action, Controller, ControllerConfig, HotKeystore, OsEntropy};
//!
//! let mut controller = Controller::new(HotKeystore::new(), OsEntropy, ControllerConfig::new());
//! controller.process_action(Action::mnemonic("abandon abandon ... about"))?;
//! controller.process_action(Action::passphrase(""))?;
//! let screen = controller.process_action(Action::ShowXpub("m/84'/1'/0'".into()))?;
//! ```

pub mod controller;
pub mod core;
pub mod dispatch;
pub mod identity;
pub mod keystore;
pub mod network;
pub mod review;
pub mod secret;

#[cfg(feature = "native")]
pub mod logging;

pub use controller::{
    Action, Controller, ControllerConfig, ControllerError, EntropyError, EntropySource, HostLink, Screen,
    SessionState, Ui,
};
#[cfg(feature = "native")]
pub use controller::OsEntropy;
pub use dispatch::{AddressCheck, DispatchError, Dispatcher, RequestKind, RequestState};
pub use identity::{IdentityError, WalletIdentity};
pub use keystore::{AddressFormat, ChangeInfo, HotKeystore, Keystore, KeystoreError, ProposalFlags};
pub use network::{NetworkParams, NETWORKS};
pub use review::{review, ClassifiedOutput, Destination, Review, ReviewError, ScriptCategory, Summary};
pub use secret::SecretSlot;
