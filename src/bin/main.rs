//! Beesigner CLI - drives the signing controller from a terminal
//!
//! Every command runs the real controller with a scripted operator and a
//! scripted host:
//!   beesigner generate [--words 24]        → {"words": 24, "mnemonic": "..."}
//!   beesigner xpub [path]                  → {"xpub": "[73c5da0a/84'/1'/0']tpub..."}
//!   beesigner verify <request>             → derived addresses
//!   beesigner review <psbt|@file>          → transaction summary
//!   beesigner sign <psbt|@file>            → summary + signed base64 PSBT
//!
//! Keys come from --mnemonic / BEESIGNER_MNEMONIC and
//! --passphrase / BEESIGNER_PASSPHRASE.

use anyhow::{anyhow, bail, Context};
use base64::Engine;
use beesigner::logging::init_logging;
use beesigner::{
    Action, Controller, ControllerConfig, HostLink, HotKeystore, NetworkParams, OsEntropy, RequestKind, Screen, Ui,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::env;
use std::io::IsTerminal;
use tracing::debug;
use zeroize::Zeroizing;

/// PSBT magic, for binary files passed with `@file`
const PSBT_MAGIC: &[u8] = b"psbt\xff";

fn main() {
    init_logging();

    let args: Vec<String> = env::args().collect();
    let opts = ParsedArgs::parse(&args[1..]);

    if opts.help {
        print_usage();
        return;
    }

    if opts.version {
        println!("beesigner {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let result = match opts.command.as_deref() {
        Some("generate") => cmd_generate(&opts),
        Some("xpub") => cmd_xpub(&opts),
        Some("verify") => cmd_verify(&opts),
        Some("review") => cmd_review(&opts, false),
        Some("sign") => cmd_review(&opts, true),
        Some(cmd) => Err(anyhow!("Unknown command: {}", cmd)),
        None => {
            print_usage();
            return;
        }
    };

    let pretty = opts.pretty || std::io::stdout().is_terminal();
    match result {
        Ok(output) => println!("{}", render(&output, pretty)),
        Err(e) => {
            eprintln!("{}", render(&json!({"error": format!("{:#}", e)}), pretty));
            std::process::exit(1);
        }
    }
}

fn render(value: &Value, pretty: bool) -> String {
    let text = if pretty { serde_json::to_string_pretty(value) } else { serde_json::to_string(value) };
    text.unwrap_or_else(|_| value.to_string())
}

#[derive(Default)]
struct ParsedArgs {
    command: Option<String>,
    argument: Option<String>,
    mnemonic: Option<Zeroizing<String>>,
    passphrase: Option<Zeroizing<String>>,
    network: Option<String>,
    words: Option<usize>,
    require_fingerprint: bool,
    pretty: bool,
    help: bool,
    version: bool,
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Self {
        let mut opts = ParsedArgs::default();
        let mut positional = Vec::new();
        let mut i = 0;

        while i < args.len() {
            let arg = &args[i];
            let value = args.get(i + 1).cloned();
            match arg.as_str() {
                "--help" | "-h" => opts.help = true,
                "--version" | "-V" => opts.version = true,
                "--pretty" => opts.pretty = true,
                "--require-fingerprint" => opts.require_fingerprint = true,
                "--mnemonic" | "-m" => {
                    opts.mnemonic = value.map(Zeroizing::new);
                    i += 1;
                }
                "--passphrase" | "-p" => {
                    opts.passphrase = value.map(Zeroizing::new);
                    i += 1;
                }
                "--network" | "-n" => {
                    opts.network = value;
                    i += 1;
                }
                "--words" | "-w" => {
                    opts.words = value.and_then(|v| v.parse().ok());
                    i += 1;
                }
                _ if !arg.starts_with('-') => positional.push(arg.clone()),
                _ => {} // Ignore unknown flags
            }
            i += 1;
        }

        if !positional.is_empty() {
            opts.command = Some(positional.remove(0));
        }
        // Verify requests may contain spaces when passed unquoted
        if !positional.is_empty() {
            opts.argument = Some(positional.join(" "));
        }

        // Environment is lower priority than flags
        if opts.mnemonic.is_none() {
            opts.mnemonic = env::var("BEESIGNER_MNEMONIC").ok().filter(|s| !s.is_empty()).map(Zeroizing::new);
        }
        if opts.passphrase.is_none() {
            opts.passphrase = env::var("BEESIGNER_PASSPHRASE").ok().map(Zeroizing::new);
        }
        if opts.network.is_none() {
            opts.network = env::var("BEESIGNER_NETWORK").ok().filter(|s| !s.is_empty());
        }

        opts
    }

    fn network_index(&self) -> anyhow::Result<usize> {
        match self.network.as_deref() {
            None => Ok(beesigner::network::DEFAULT_NETWORK),
            Some(name) => NetworkParams::by_name(name)
                .map(|(index, _)| index)
                .ok_or_else(|| anyhow!("Unknown network '{}' (expected one of {:?})", name, NetworkParams::names())),
        }
    }

    /// Actions that load the wallet and switch to the requested network.
    fn unlock_actions(&self) -> anyhow::Result<Vec<Action>> {
        let mnemonic = self
            .mnemonic
            .as_ref()
            .ok_or_else(|| anyhow!("Mnemonic required (--mnemonic or BEESIGNER_MNEMONIC)"))?;
        let passphrase = self.passphrase.as_ref().map(|p| p.as_str()).unwrap_or("");
        Ok(vec![
            Action::mnemonic(mnemonic.as_str()),
            Action::passphrase(passphrase),
            Action::SelectNetwork(self.network_index()?),
        ])
    }

    fn config(&self) -> ControllerConfig {
        ControllerConfig::new().require_fingerprint(self.require_fingerprint)
    }
}

/// Replays a fixed list of actions and records what the display shows.
struct ScriptedUi {
    actions: VecDeque<Action>,
    screens: Vec<Screen>,
    errors: Vec<String>,
}

impl ScriptedUi {
    fn new(mut actions: Vec<Action>) -> Self {
        actions.push(Action::Shutdown);
        Self { actions: actions.into(), screens: Vec::new(), errors: Vec::new() }
    }

    fn finish(self) -> anyhow::Result<Vec<Screen>> {
        if let Some(first) = self.errors.into_iter().next() {
            bail!(first);
        }
        Ok(self.screens)
    }
}

impl Ui for ScriptedUi {
    fn poll_action(&mut self) -> Option<Action> {
        self.actions.pop_front()
    }

    fn show(&mut self, screen: &Screen) {
        debug!(%screen, "display");
        self.screens.push(screen.clone());
    }

    fn show_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }
}

/// Hands over one payload when asked, collects what the device sends back.
#[derive(Default)]
struct ScriptedHost {
    payload: Option<Vec<u8>>,
    requested: Option<RequestKind>,
    sent: Vec<String>,
}

impl HostLink for ScriptedHost {
    fn request_data(&mut self, kind: RequestKind) {
        self.requested = Some(kind);
    }

    fn poll_payload(&mut self) -> Option<Vec<u8>> {
        self.requested.take().and_then(|_| self.payload.take())
    }

    fn send(&mut self, payload: &str) {
        self.sent.push(payload.to_string());
    }
}

fn drive(
    config: ControllerConfig,
    actions: Vec<Action>,
    payload: Option<Vec<u8>>,
) -> anyhow::Result<(Vec<Screen>, Vec<String>)> {
    let mut controller = Controller::new(HotKeystore::new(), OsEntropy, config);
    let mut ui = ScriptedUi::new(actions);
    let mut host = ScriptedHost { payload, ..Default::default() };
    controller.run(&mut ui, &mut host);
    Ok((ui.finish()?, host.sent))
}

fn cmd_generate(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let words = opts.words.unwrap_or(beesigner::controller::DEFAULT_WORDS);
    let (screens, _) = drive(opts.config(), vec![Action::GenerateKey { words }], None)?;
    screens
        .iter()
        .find_map(|s| match s {
            Screen::GeneratedMnemonic { words, phrase } => Some(json!({"words": words, "mnemonic": phrase.as_str()})),
            _ => None,
        })
        .ok_or_else(|| anyhow!("No mnemonic generated"))
}

fn cmd_xpub(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let network = NetworkParams::by_index(opts.network_index()?).ok_or_else(|| anyhow!("Unknown network"))?;
    let path = opts.argument.clone().unwrap_or_else(|| network.default_single_path());
    let mut actions = opts.unlock_actions()?;
    actions.push(Action::ShowXpub(path));

    let (screens, _) = drive(opts.config(), actions, None)?;
    screens
        .iter()
        .find_map(|s| match s {
            Screen::Xpub { derivation, xpub } => {
                Some(json!({"xpub": format!("{}{}", derivation, xpub), "network": network.name}))
            }
            _ => None,
        })
        .ok_or_else(|| anyhow!("No extended public key shown"))
}

fn cmd_verify(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let request = opts.argument.clone().ok_or_else(|| anyhow!("Usage: beesigner verify <request>"))?;
    // Shells pass "\n" literally
    let request = request.replace("\\n", "\n");
    let mut actions = opts.unlock_actions()?;
    actions.push(Action::VerifyAddress);

    let (screens, _) = drive(opts.config(), actions, Some(request.into_bytes()))?;
    let check = screens
        .into_iter()
        .find_map(|s| match s {
            Screen::Address(check) => Some(check),
            _ => None,
        })
        .ok_or_else(|| anyhow!("No address derived"))?;
    Ok(serde_json::to_value(check)?)
}

fn cmd_review(opts: &ParsedArgs, sign: bool) -> anyhow::Result<Value> {
    let argument = opts.argument.as_deref().ok_or_else(|| anyhow!("Usage: beesigner review|sign <psbt|@file>"))?;
    let payload = load_psbt_payload(argument)?;
    let mut actions = opts.unlock_actions()?;
    actions.push(Action::SignPsbt);
    actions.push(if sign { Action::ConfirmSignature } else { Action::Back });

    let (screens, sent) = drive(opts.config(), actions, Some(payload))?;
    let summary = screens
        .into_iter()
        .find_map(|s| match s {
            Screen::Transaction(summary) => Some(summary),
            _ => None,
        })
        .ok_or_else(|| anyhow!("No transaction reviewed"))?;

    let mut output = json!({ "summary": summary, "spending": summary.spending() });
    if sign {
        let signed = sent.into_iter().next().ok_or_else(|| anyhow!("Nothing was signed"))?;
        output["psbt"] = Value::String(signed);
    }
    Ok(output)
}

/// Base64 text inline, or `@path` to a base64 or binary PSBT file.
fn load_psbt_payload(argument: &str) -> anyhow::Result<Vec<u8>> {
    let Some(path) = argument.strip_prefix('@') else {
        return Ok(argument.trim().as_bytes().to_vec());
    };
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path))?;
    if bytes.starts_with(PSBT_MAGIC) {
        return Ok(base64::engine::general_purpose::STANDARD.encode(bytes).into_bytes());
    }
    Ok(bytes)
}

fn print_usage() {
    println!(
        r#"beesigner - review and sign Bitcoin transactions

USAGE:
    beesigner <command> [argument] [options]

COMMANDS:
    generate                Generate a new mnemonic
    xpub [path]             Show [fingerprint/path]xpub (default m/84'/<coin>'/0')
    verify <request>        Verify an address request:
                              <fingerprint>/<path>
                              m/<path>
                              "address=<addr>\ntype=<type>\n<fingerprint>/<path>"
    review <psbt|@file>     Summarize a PSBT without signing
    sign <psbt|@file>       Summarize and sign a PSBT

OPTIONS:
    --mnemonic, -m <words>  BIP39 mnemonic (env: BEESIGNER_MNEMONIC)
    --passphrase, -p <text> BIP39 passphrase (env: BEESIGNER_PASSPHRASE)
    --network, -n <net>     mainnet|testnet|regtest|signet (default: testnet)
    --words, -w <n>         Mnemonic length for generate: 12|15|18|21|24
    --require-fingerprint   Refuse verify requests without a fingerprint
    --pretty                Pretty-print JSON
    --help, -h              Show this help
    --version, -V           Show version

ENVIRONMENT:
    RUST_LOG                Log filter (default: info)
    BEESIGNER_LOG_JSON=1    JSON logs on stderr"#
    );
}
