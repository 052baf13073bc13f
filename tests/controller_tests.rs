//! Controller: action routing, the request state machine and the tick loop
//!
//! These tests verify:
//! 1. Network selection and key generation fallbacks
//! 2. Address verification never derives on a fingerprint mismatch
//! 3. Dispatcher transitions driven through operator actions
//! 4. A full sign round trip over mock UI and host links

mod common;

use beesigner::controller::{EntropyError, EntropySource};
use beesigner::{
    Action, Controller, ControllerConfig, ControllerError, DispatchError, HostLink, HotKeystore, Keystore,
    RequestKind, RequestState, Screen, Ui,
};
use common::{In, Out};
use std::collections::VecDeque;

struct FixedEntropy(u8);

impl EntropySource for FixedEntropy {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), EntropyError> {
        buf.fill(self.0);
        Ok(())
    }
}

struct FailingEntropy;

impl EntropySource for FailingEntropy {
    fn fill(&mut self, _: &mut [u8]) -> Result<(), EntropyError> {
        Err(EntropyError("rng offline".into()))
    }
}

fn controller_with(config: ControllerConfig) -> Controller<HotKeystore, FixedEntropy> {
    Controller::new(HotKeystore::new(), FixedEntropy(0), config)
}

fn unlocked(config: ControllerConfig) -> Controller<HotKeystore, FixedEntropy> {
    let mut c = controller_with(config);
    c.process_action(Action::mnemonic(common::TEST_MNEMONIC)).expect("mnemonic");
    c.process_action(Action::passphrase("")).expect("passphrase");
    c
}

fn verify(c: &mut Controller<HotKeystore, FixedEntropy>, payload: &str) -> Result<Screen, ControllerError> {
    c.process_action(Action::VerifyAddress).expect("arm");
    c.process_host_payload(payload.as_bytes())
}

/// Test: select-network(99) fails and leaves the network alone
#[test]
fn select_network_out_of_range() {
    let mut c = unlocked(ControllerConfig::new());
    let before = c.session().network_index();
    let err = c.process_action(Action::SelectNetwork(99)).unwrap_err();
    assert!(matches!(err, ControllerError::NoSuchNetwork(99)));
    assert_eq!(c.session().network_index(), before);
    assert_eq!(c.network().name, "Testnet");
}

/// Test: select-network shows the default paths of the chain
#[test]
fn select_network_shows_default_paths() {
    let mut c = unlocked(ControllerConfig::new());
    let screen = c.process_action(Action::SelectNetwork(0)).expect("select");
    assert_eq!(
        screen,
        Screen::NetworkSelected {
            network: "Mainnet",
            single_sig: "m/84'/0'/0'".into(),
            multisig: "m/48'/0'/0'/2'".into(),
        }
    );
}

/// Test: generate-key(13) falls back to 12 valid words
#[test]
fn generate_key_falls_back_to_default() {
    let mut c = controller_with(ControllerConfig::new());
    let Screen::GeneratedMnemonic { words, phrase } = c.process_action(Action::GenerateKey { words: 13 }).expect("generate")
    else {
        panic!("expected mnemonic screen");
    };
    assert_eq!(words, 12);
    let parsed = bip39::Mnemonic::parse_normalized(phrase.as_str()).expect("valid mnemonic");
    assert_eq!(parsed.word_count(), 12);
    // All-zero entropy
    assert_eq!(phrase.as_str(), common::TEST_MNEMONIC);
}

/// Test: entropy failure surfaces and shows nothing
#[test]
fn generate_key_entropy_failure() {
    let mut c = Controller::new(HotKeystore::new(), FailingEntropy, ControllerConfig::new());
    assert!(matches!(
        c.process_action(Action::GenerateKey { words: 24 }),
        Err(ControllerError::Entropy(_))
    ));
}

/// Test: a mismatched fingerprint never yields an address, in every payload form
#[test]
fn wrong_fingerprint_never_derives() {
    let mut c = unlocked(ControllerConfig::new());
    let payloads = [
        "address=tb1q6rz28mcfaxtmd6v789l9rrlrusdprr9pqcpvkl\ntype=wpkh\ndeadbeef/84h/1h/0h/0/0",
        "deadbeef/84h/1h/0h/0/0",
        "73c5da0b/84h/1h/0h/0/0",
        // The full form never skips the check, even with a bare path
        "address=tb1q6rz28mcfaxtmd6v789l9rrlrusdprr9pqcpvkl\ntype=wpkh\nm/84h/1h/0h/0/0",
    ];
    for payload in payloads {
        let err = verify(&mut c, payload).unwrap_err();
        assert!(
            matches!(err, ControllerError::Dispatch(DispatchError::WrongFingerprint)),
            "{}: {:?}",
            payload,
            err
        );
        assert!(matches!(c.session().dispatcher().state(), RequestState::Idle));
    }

    // Bare paths have no fingerprint to mismatch; with the check required they fail too
    let mut strict = unlocked(ControllerConfig::new().require_fingerprint(true));
    let err = verify(&mut strict, "m/84h/1h/0h/0/0").unwrap_err();
    assert!(matches!(err, ControllerError::Dispatch(DispatchError::FingerprintRequired)));
}

/// Test: matching fingerprint derives both encodings
#[test]
fn verify_address_all_forms() {
    let mut c = unlocked(ControllerConfig::new());
    let expected = "tb1q6rz28mcfaxtmd6v789l9rrlrusdprr9pqcpvkl";

    for payload in [
        format!("address={}\ntype=wpkh\n73c5da0a/84h/1h/0h/0/0", expected),
        "73C5DA0A/84'/1'/0'/0/0".to_string(),
        "m/84h/1h/0h/0/0\0".to_string(),
    ] {
        let Screen::Address(check) = verify(&mut c, &payload).expect("verify") else {
            panic!("expected address screen");
        };
        assert_eq!(check.bech32, expected);
        assert!(check.base58.starts_with('2'));
    }

    let Screen::Address(check) = verify(&mut c, &format!("address={}\ntype=wpkh\n73c5da0a/84h/1h/0h/0/0", expected))
        .expect("verify")
    else {
        panic!("expected address screen");
    };
    assert_eq!(check.claimed_matches, Some(true));
    assert!(check.fingerprint_checked);
}

/// Test: arming while a request is outstanding is refused
#[test]
fn request_outstanding() {
    let mut c = unlocked(ControllerConfig::new());
    assert_eq!(c.process_action(Action::SignPsbt).expect("arm"), Screen::AwaitingHost(RequestKind::SignTransaction));
    let err = c.process_action(Action::VerifyAddress).unwrap_err();
    assert!(matches!(err, ControllerError::Dispatch(DispatchError::RequestOutstanding)));
    assert_eq!(c.session().dispatcher().armed(), Some(RequestKind::SignTransaction));
}

/// Test: host data without an armed request is refused
#[test]
fn payload_when_idle() {
    let mut c = unlocked(ControllerConfig::new());
    let err = c.process_host_payload(b"73c5da0a/84h/1h/0h/0/0").unwrap_err();
    assert!(matches!(err, ControllerError::Dispatch(DispatchError::NotArmed)));
}

/// Test: back and network switch both release a held proposal
#[test]
fn cancellation_paths() {
    let mut c = unlocked(ControllerConfig::new());
    let psbt = common::proposal(
        &[In::Wallet { path: "m/84'/1'/0'/0/0", sat: 100_000 }],
        &[Out::External { byte: 0xAB, sat: 99_000 }],
    );
    let payload = common::to_base64(&psbt);

    for cancel in [Action::Back, Action::SelectNetwork(2)] {
        c.process_action(Action::SignPsbt).expect("arm");
        c.process_host_payload(payload.as_bytes()).expect("review");
        assert!(c.session().dispatcher().pending_proposal().is_some());
        c.process_action(cancel).expect("cancel");
        assert!(matches!(c.session().dispatcher().state(), RequestState::Idle));
        assert!(matches!(
            c.process_action(Action::ConfirmSignature),
            Err(ControllerError::Dispatch(DispatchError::NothingToSign))
        ));
    }
}

/// Test: switching network while armed drops the armed request
#[test]
fn network_switch_cancels_armed_request() {
    let mut c = unlocked(ControllerConfig::new());
    c.process_action(Action::SignPsbt).expect("arm");
    assert!(c.session().dispatcher().is_awaiting());

    c.process_action(Action::SelectNetwork(0)).expect("select");
    assert_eq!(c.session().dispatcher().armed(), None);
    assert!(matches!(c.session().dispatcher().state(), RequestState::Idle));

    let err = c.process_host_payload(b"73c5da0a/84h/0h/0h/0/0").unwrap_err();
    assert!(matches!(err, ControllerError::Dispatch(DispatchError::NotArmed)));

    // Nothing stays outstanding after the switch
    assert_eq!(c.process_action(Action::VerifyAddress).expect("rearm"), Screen::AwaitingHost(RequestKind::VerifyAddress));
}

/// Test: a second proposal replaces the first
#[test]
fn last_proposal_wins() {
    let mut c = unlocked(ControllerConfig::new());
    let first = common::proposal(
        &[In::Wallet { path: "m/84'/1'/0'/0/0", sat: 100_000 }],
        &[Out::External { byte: 0x01, sat: 99_000 }],
    );
    let second = common::proposal(
        &[In::Wallet { path: "m/84'/1'/0'/0/1", sat: 50_000 }],
        &[Out::External { byte: 0x02, sat: 49_500 }],
    );

    for psbt in [&first, &second] {
        c.process_action(Action::SignPsbt).expect("arm");
        c.process_host_payload(common::to_base64(psbt).as_bytes()).expect("review");
    }
    assert_eq!(c.session().dispatcher().pending_proposal(), Some(&second));

    let Screen::Signed { psbt } = c.process_action(Action::ConfirmSignature).expect("confirm") else {
        panic!("expected signed screen");
    };
    assert_eq!(common::from_base64(&psbt).unsigned_tx, second.unsigned_tx);
    assert!(matches!(c.session().dispatcher().state(), RequestState::Idle));
}

/// Test: rejected proposal leaves nothing held
#[test]
fn rejected_proposal_returns_to_idle() {
    let mut c = unlocked(ControllerConfig::new());
    let psbt = common::proposal(&[In::Foreign { sat: 20_000 }], &[Out::External { byte: 0xAB, sat: 10_000 }]);
    c.process_action(Action::SignPsbt).expect("arm");
    let err = c.process_host_payload(common::to_base64(&psbt).as_bytes()).unwrap_err();
    assert_eq!(err.to_string(), "Can't sign the transaction");
    assert!(matches!(c.session().dispatcher().state(), RequestState::Idle));
}

/// Test: passphrase never stays in its slot and changes the wallet
#[test]
fn passphrase_is_wiped_after_use() {
    let mut c = controller_with(ControllerConfig::new());
    c.process_action(Action::mnemonic(common::TEST_MNEMONIC)).expect("mnemonic");
    let Screen::WalletReady { fingerprint, .. } = c.process_action(Action::passphrase("TREZOR")).expect("passphrase")
    else {
        panic!("expected wallet screen");
    };
    assert_ne!(fingerprint, common::TEST_FINGERPRINT);
    assert!(c.session().has_mnemonic());
    assert!(!c.session().has_passphrase());
}

#[derive(Default)]
struct MockUi {
    actions: VecDeque<Action>,
    screens: Vec<Screen>,
    errors: Vec<String>,
    calibrations: usize,
    calibrate_next: bool,
}

impl Ui for MockUi {
    fn poll_action(&mut self) -> Option<Action> {
        self.actions.pop_front()
    }
    fn show(&mut self, screen: &Screen) {
        self.screens.push(screen.clone());
    }
    fn show_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }
    fn calibration_requested(&mut self) -> bool {
        std::mem::take(&mut self.calibrate_next)
    }
    fn calibrate(&mut self) {
        self.calibrations += 1;
    }
}

#[derive(Default)]
struct MockHost {
    requests: Vec<RequestKind>,
    inbox: VecDeque<Vec<u8>>,
    polls: usize,
    sent: Vec<String>,
}

impl HostLink for MockHost {
    fn request_data(&mut self, kind: RequestKind) {
        self.requests.push(kind);
    }
    fn poll_payload(&mut self) -> Option<Vec<u8>> {
        self.polls += 1;
        self.inbox.pop_front()
    }
    fn send(&mut self, payload: &str) {
        self.sent.push(payload.to_string());
    }
}

/// Test: full tick loop from unlock to signed payload on both display and host
#[test]
fn tick_loop_sign_round_trip() {
    let psbt = common::proposal(
        &[In::Wallet { path: "m/84'/1'/0'/0/0", sat: 100_000 }],
        &[Out::External { byte: 0xAB, sat: 99_000 }],
    );

    let mut c = controller_with(ControllerConfig::new());
    let mut ui = MockUi::default();
    let mut host = MockHost::default();
    ui.actions.extend([
        Action::mnemonic(common::TEST_MNEMONIC),
        Action::passphrase(""),
        Action::SignPsbt,
        Action::ConfirmSignature,
        Action::Shutdown,
    ]);
    host.inbox.push_back(common::to_base64(&psbt).into_bytes());

    // Host is not polled while nothing is armed
    assert!(c.tick(&mut ui, &mut host));
    assert!(c.tick(&mut ui, &mut host));
    assert_eq!(host.polls, 0);

    // Arm and receive in the same tick
    assert!(c.tick(&mut ui, &mut host));
    assert_eq!(host.requests, vec![RequestKind::SignTransaction]);
    let Some(Screen::Transaction(summary)) = ui.screens.last() else {
        panic!("expected summary, got {:?}", ui.screens.last());
    };
    assert_eq!(summary.fee, 1_000);

    ui.calibrate_next = true;
    assert!(c.tick(&mut ui, &mut host));
    assert_eq!(ui.calibrations, 1);
    assert_eq!(host.sent.len(), 1);
    assert!(matches!(ui.screens.last(), Some(Screen::Signed { psbt }) if *psbt == host.sent[0]));
    let signed = common::from_base64(&host.sent[0]);
    assert_eq!(signed.inputs[0].partial_sigs.len(), 1);

    assert!(!c.tick(&mut ui, &mut host));
    assert_eq!(ui.screens.last(), Some(&Screen::Goodbye));
    assert!(c.keystore().fingerprint().is_none());
    assert!(ui.errors.is_empty(), "{:?}", ui.errors);
}

/// Test: errors go to the display and the loop keeps running
#[test]
fn tick_reports_errors() {
    let mut c = controller_with(ControllerConfig::new());
    let mut ui = MockUi::default();
    let mut host = MockHost::default();
    ui.actions.extend([Action::SelectNetwork(99), Action::mnemonic("not a mnemonic")]);

    assert!(c.tick(&mut ui, &mut host));
    assert!(c.tick(&mut ui, &mut host));
    assert_eq!(ui.errors.len(), 2);
    assert_eq!(ui.errors[0], "No such network: 99");
    assert!(ui.screens.is_empty());
}

/// Test: debug mnemonic goes straight to the passphrase prompt
#[test]
fn debug_mnemonic_preset() {
    let mut c = controller_with(ControllerConfig::new().with_debug_mnemonic(common::TEST_MNEMONIC));
    assert_eq!(c.start(), Screen::PassphrasePrompt);
    let Screen::WalletReady { fingerprint, network } = c.process_action(Action::passphrase("")).expect("passphrase")
    else {
        panic!("expected wallet screen");
    };
    assert_eq!(fingerprint, common::TEST_FINGERPRINT);
    assert_eq!(network, "Testnet");
}
