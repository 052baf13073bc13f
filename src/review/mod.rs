//! Review engine - turns untrusted proposal bytes into an operator-facing summary.
//!
//! # Gates
//!
//! | # | Gate | Failure |
//! |---|------|---------|
//! | 1 | PSBT parses, has inputs and outputs | `MalformedProposal` |
//! | 2 | Keystore policy check | `Rejected(flags)` |
//! | 3 | Every input carries its witness utxo | `MissingPrevoutInfo` |
//! | 4 | Totals fit in u64 | `MalformedProposal` |
//! | 5 | Inputs cover outputs | `FeeUnderflow` |
//!
//! The first failing gate wins and nothing partial is returned.

mod classify;

pub use classify::{classify, encode_destination, ClassifiedOutput, Destination, ScriptCategory};

use crate::keystore::{Keystore, ProposalFlags};
use crate::network::NetworkParams;
use bitcoin::psbt::Psbt;
use serde::Serialize;
use tracing::{debug, info};

/// Why a proposal was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReviewError {
    #[error("failed to parse psbt transaction: {0}")]
    MalformedProposal(String),
    #[error("{}", .0.primary_reason())]
    Rejected(ProposalFlags),
    #[error("Unsupported legacy transaction or missing prevout information (input {input})")]
    MissingPrevoutInfo { input: usize },
    #[error("Outputs ({outputs} sat) exceed inputs ({inputs} sat)")]
    FeeUnderflow { inputs: u64, outputs: u64 },
}

/// What the operator confirms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Satoshis spent from the inputs
    pub total_in: u64,
    /// Satoshis across all outputs, change included
    pub total_out: u64,
    /// Satoshis returning to this wallet
    pub change_amount: u64,
    pub fee: u64,
    /// Same order as the proposal's outputs
    pub outputs: Vec<ClassifiedOutput>,
}

impl Summary {
    /// Amount leaving the wallet, fee excluded.
    pub fn spending(&self) -> u64 {
        self.total_out.saturating_sub(self.change_amount)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().filter_map(|o| o.warning.as_deref())
    }
}

/// A proposal that passed every gate, with its summary.
#[derive(Debug, Clone)]
pub struct Review {
    pub proposal: Psbt,
    pub summary: Summary,
}

/// Parse and validate `raw` PSBT bytes, then summarize it.
pub fn review<K: Keystore + ?Sized>(
    keystore: &K,
    network: &NetworkParams,
    raw: &[u8],
) -> Result<Review, ReviewError> {
    let proposal = Psbt::deserialize(raw).map_err(|e| ReviewError::MalformedProposal(e.to_string()))?;
    let summary = summarize(keystore, network, &proposal)?;
    Ok(Review { proposal, summary })
}

/// Run every gate after parsing and build the summary.
pub fn summarize<K: Keystore + ?Sized>(
    keystore: &K,
    network: &NetworkParams,
    proposal: &Psbt,
) -> Result<Summary, ReviewError> {
    if proposal.inputs.is_empty() || proposal.unsigned_tx.output.is_empty() {
        return Err(ReviewError::MalformedProposal("proposal needs inputs and outputs".into()));
    }

    let flags = keystore.check_proposal(proposal);
    if !flags.is_empty() {
        info!(reasons = ?flags.reasons(), "proposal rejected by keystore");
        return Err(ReviewError::Rejected(flags));
    }

    let mut total_in = 0u64;
    for (index, input) in proposal.inputs.iter().enumerate() {
        let utxo = input
            .witness_utxo
            .as_ref()
            .ok_or(ReviewError::MissingPrevoutInfo { input: index })?;
        total_in = total_in
            .checked_add(utxo.value.to_sat())
            .ok_or_else(|| ReviewError::MalformedProposal("input total overflows".into()))?;
    }

    let mut total_out = 0u64;
    let mut change_amount = 0u64;
    let mut outputs = Vec::with_capacity(proposal.unsigned_tx.output.len());
    for index in 0..proposal.unsigned_tx.output.len() {
        let output = classify(proposal, index, keystore, network)
            .ok_or_else(|| ReviewError::MalformedProposal(format!("output {} missing", index)))?;
        total_out = total_out
            .checked_add(output.amount)
            .ok_or_else(|| ReviewError::MalformedProposal("output total overflows".into()))?;
        if output.is_change {
            change_amount += output.amount;
        }
        outputs.push(output);
    }

    let fee = total_in
        .checked_sub(total_out)
        .ok_or(ReviewError::FeeUnderflow { inputs: total_in, outputs: total_out })?;

    debug!(total_in, total_out, change_amount, fee, outputs = outputs.len(), "proposal summarized");
    Ok(Summary { total_in, total_out, change_amount, fee, outputs })
}
