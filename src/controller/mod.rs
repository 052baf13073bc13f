//! Controller - owns the session and routes operator actions and host payloads.
//!
//! One tick:
//!
//! 1. UI input, routed through [`Controller::process_action`]
//! 2. host link, polled only while a request is armed
//! 3. touch calibration when the UI asks for it
//!
//! There is a single owner for the keystore, the secret slots and the
//! dispatcher, so nothing here locks.

mod actions;
mod config;
mod io;

pub use actions::Action;
pub use config::{is_valid_word_count, ControllerConfig, DEFAULT_WORDS, VALID_WORD_COUNTS};
#[cfg(feature = "native")]
pub use io::OsEntropy;
pub use io::{EntropyError, EntropySource, HostLink, Screen, ShownSecret, Ui};

use crate::core::paths;
use crate::dispatch::{DispatchError, Dispatcher, Outcome, RequestKind};
use crate::keystore::{Keystore, KeystoreError};
use crate::network::{NetworkParams, DEFAULT_NETWORK, NETWORKS};
use crate::secret::SecretSlot;
use bip39::Mnemonic;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Errors surfaced to the operator
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("No such network: {0}")]
    NoSuchNetwork(usize),
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),
    #[error("Enter a mnemonic first")]
    NoMnemonic,
    #[error("Controller is shut down")]
    Stopped,
    #[error(transparent)]
    Entropy(#[from] EntropyError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Keystore(#[from] KeystoreError),
}

/// Everything that lives for one power cycle.
#[derive(Debug)]
pub struct SessionState {
    network: usize,
    dispatcher: Dispatcher,
    mnemonic: SecretSlot,
    passphrase: SecretSlot,
    running: bool,
}

impl SessionState {
    fn new(config: &ControllerConfig) -> Self {
        Self {
            network: config.network,
            dispatcher: Dispatcher::new(config.require_fingerprint),
            mnemonic: SecretSlot::new(),
            passphrase: SecretSlot::new(),
            running: true,
        }
    }

    pub fn network_index(&self) -> usize {
        self.network
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn has_mnemonic(&self) -> bool {
        self.mnemonic.is_set()
    }

    pub fn has_passphrase(&self) -> bool {
        self.passphrase.is_set()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

pub struct Controller<K: Keystore, E: EntropySource> {
    config: ControllerConfig,
    keystore: K,
    entropy: E,
    session: SessionState,
}

impl<K: Keystore, E: EntropySource> Controller<K, E> {
    pub fn new(keystore: K, entropy: E, config: ControllerConfig) -> Self {
        let session = SessionState::new(&config);
        Self { config, keystore, entropy, session }
    }

    /// First screen. A configured debug mnemonic is loaded and the passphrase
    /// prompt shown directly.
    pub fn start(&mut self) -> Screen {
        if let Some(preset) = self.config.debug_mnemonic.as_ref() {
            warn!("loading debug mnemonic");
            let mut text = String::from(preset.as_str());
            self.session.mnemonic.set(&mut text);
            return Screen::PassphrasePrompt;
        }
        self.initial_screen()
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn keystore(&self) -> &K {
        &self.keystore
    }

    pub fn network(&self) -> &'static NetworkParams {
        NetworkParams::by_index(self.session.network).unwrap_or(&NETWORKS[DEFAULT_NETWORK])
    }

    pub fn is_running(&self) -> bool {
        self.session.running
    }

    pub fn process_action(&mut self, action: Action) -> Result<Screen, ControllerError> {
        if !self.session.running {
            return Err(ControllerError::Stopped);
        }
        debug!(action = action.name(), "processing action");

        match action {
            Action::GenerateKey { words } => self.generate_key(words),
            Action::SubmitMnemonic(text) => self.submit_mnemonic(text),
            Action::SubmitPassphrase(text) => self.submit_passphrase(text),
            Action::SelectNetwork(index) => self.select_network(index),
            Action::ShowXpub(path) => self.show_xpub(&path),
            Action::VerifyAddress => self.arm(RequestKind::VerifyAddress),
            Action::SignPsbt => self.arm(RequestKind::SignTransaction),
            Action::ConfirmSignature => {
                let psbt = self.session.dispatcher.confirm(&self.keystore)?;
                Ok(Screen::Signed { psbt })
            }
            Action::Back => {
                self.session.dispatcher.cancel();
                Ok(self.initial_screen())
            }
            Action::Shutdown => {
                self.shutdown()?;
                Ok(Screen::Goodbye)
            }
        }
    }

    /// Feed one complete host payload to the armed request.
    pub fn process_host_payload(&mut self, payload: &[u8]) -> Result<Screen, ControllerError> {
        let network = self.network();
        let outcome = self.session.dispatcher.handle_payload(&self.keystore, network, payload)?;
        Ok(match outcome {
            Outcome::Address(check) => Screen::Address(check),
            Outcome::Transaction(summary) => Screen::Transaction(summary),
        })
    }

    /// One cooperative step. Returns `false` once the controller has shut down.
    pub fn tick<U: Ui + ?Sized, H: HostLink + ?Sized>(&mut self, ui: &mut U, host: &mut H) -> bool {
        if !self.session.running {
            return false;
        }

        if let Some(action) = ui.poll_action() {
            let result = self.process_action(action);
            self.present(ui, host, result);
        }

        if self.session.dispatcher.is_awaiting() {
            if let Some(payload) = host.poll_payload() {
                let result = self.process_host_payload(&payload);
                self.present(ui, host, result);
            }
        }

        if ui.calibration_requested() {
            debug!("touch calibration");
            ui.calibrate();
        }

        self.session.running
    }

    /// Tick until shutdown.
    pub fn run<U: Ui + ?Sized, H: HostLink + ?Sized>(&mut self, ui: &mut U, host: &mut H) {
        let first = self.start();
        ui.show(&first);
        while self.tick(ui, host) {}
        info!("controller stopped");
    }

    fn present<U: Ui + ?Sized, H: HostLink + ?Sized>(
        &mut self,
        ui: &mut U,
        host: &mut H,
        result: Result<Screen, ControllerError>,
    ) {
        match result {
            Ok(screen) => {
                match &screen {
                    Screen::AwaitingHost(kind) => host.request_data(*kind),
                    Screen::Signed { psbt } => host.send(psbt),
                    _ => {}
                }
                ui.show(&screen);
            }
            Err(e) => {
                warn!(error = %e, "operation failed");
                ui.show_error(&e.to_string());
            }
        }
    }

    fn initial_screen(&self) -> Screen {
        Screen::Initial { network: self.network().name }
    }

    fn generate_key(&mut self, words: usize) -> Result<Screen, ControllerError> {
        let words = self.config.word_count(words);
        let mut entropy = Zeroizing::new(vec![0u8; words * 16 / 12]);
        self.entropy.fill(&mut entropy)?;
        let mnemonic =
            Mnemonic::from_entropy(&entropy).map_err(|e| ControllerError::InvalidMnemonic(e.to_string()))?;
        info!(words, "mnemonic generated");
        Ok(Screen::GeneratedMnemonic { words, phrase: ShownSecret::new(mnemonic.to_string()) })
    }

    fn submit_mnemonic(&mut self, mut text: Zeroizing<String>) -> Result<Screen, ControllerError> {
        Mnemonic::parse_normalized(&text).map_err(|e| ControllerError::InvalidMnemonic(e.to_string()))?;
        self.keystore.init(None, None)?;
        self.session.dispatcher.cancel();
        self.session.passphrase.clear();
        self.session.mnemonic.set(&mut text);
        Ok(Screen::PassphrasePrompt)
    }

    fn submit_passphrase(&mut self, mut text: Zeroizing<String>) -> Result<Screen, ControllerError> {
        if !self.session.mnemonic.is_set() {
            return Err(ControllerError::NoMnemonic);
        }
        self.session.passphrase.set(&mut text);
        let loaded = self
            .keystore
            .init(self.session.mnemonic.expose(), self.session.passphrase.expose());
        self.session.passphrase.clear();
        loaded?;

        let fingerprint = self.keystore.fingerprint().ok_or(KeystoreError::Uninitialized)?;
        info!(%fingerprint, "wallet loaded");
        Ok(Screen::WalletReady { fingerprint: fingerprint.to_string(), network: self.network().name })
    }

    fn select_network(&mut self, index: usize) -> Result<Screen, ControllerError> {
        let params = NetworkParams::by_index(index).ok_or(ControllerError::NoSuchNetwork(index))?;
        self.session.network = index;
        self.session.dispatcher.cancel();
        info!(network = params.name, "network selected");
        Ok(Screen::NetworkSelected {
            network: params.name,
            single_sig: params.default_single_path(),
            multisig: params.default_multisig_path(),
        })
    }

    fn show_xpub(&mut self, path_text: &str) -> Result<Screen, ControllerError> {
        let normalized = paths::normalize(path_text);
        let path = paths::parse(&normalized)
            .map_err(|e| KeystoreError::InvalidPath(format!("{}: {}", normalized, e)))?;
        let xpub = self.keystore.extended_public_key(&path, self.network())?;
        let fingerprint = self.keystore.fingerprint().ok_or(KeystoreError::Uninitialized)?;
        Ok(Screen::Xpub {
            derivation: format!("[{}/{}]", fingerprint, paths::strip_master(&normalized)),
            xpub,
        })
    }

    fn arm(&mut self, kind: RequestKind) -> Result<Screen, ControllerError> {
        if self.keystore.fingerprint().is_none() {
            return Err(KeystoreError::Uninitialized.into());
        }
        self.session.dispatcher.arm(kind)?;
        Ok(Screen::AwaitingHost(kind))
    }

    fn shutdown(&mut self) -> Result<(), ControllerError> {
        self.session.dispatcher.cancel();
        self.session.mnemonic.clear();
        self.session.passphrase.clear();
        self.session.running = false;
        self.keystore.init(None, None)?;
        info!("session wiped");
        Ok(())
    }
}
