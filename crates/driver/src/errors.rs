//! The `errors` module contains the [ProtocolError] taxonomy surfaced by the player state loop.

use crate::types::{DisputeEvidence, GamePhase, PlayerStage};
use ethers::types::{Address, Bytes, H256};
use sc_battleship_game::{signer::InvalidSignatureFormat, MoveKind};
use thiserror::Error;

/// Errors produced while running the channel protocol. Verification failures carry the hash and
/// signature that triggered them so a dispute can be built from the error alone.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("{context} signed by {recovered:?}, not by counterparty {expected:?} (hash {hash:?})")]
    SignatureMismatch {
        context: &'static str,
        expected: Address,
        recovered: Address,
        hash: H256,
        signature: Bytes,
    },
    #[error("stale {field}: local view is {expected}, counterparty used {actual}")]
    StaleCounterOrRound {
        field: &'static str,
        expected: String,
        actual: String,
    },
    #[error("contract call `{method}` failed: {source}")]
    ContractCallFailure {
        method: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("invalid player stage: {0:?}")]
    InvalidPlayerStage(PlayerStage),
    #[error("out of order {kind} move while in phase {phase:?}")]
    OutOfOrderMove { kind: MoveKind, phase: GamePhase },
    #[error(transparent)]
    InvalidSignatureFormat(#[from] InvalidSignatureFormat),
    #[error("signer failed: {0}")]
    Signer(#[source] anyhow::Error),
    #[error("off-chain contract not available: {0}")]
    MissingOffChainContract(&'static str),
    #[error("channel is stalled and requires out-of-band resolution")]
    ChannelStalled,
    #[error("transport failed: {0}")]
    Transport(#[source] anyhow::Error),
}

impl ProtocolError {
    /// Builds a contract call failure for `method`.
    pub fn contract(method: &'static str, source: anyhow::Error) -> Self {
        Self::ContractCallFailure { method, source }
    }

    /// Builds a stale counter error.
    pub fn stale(field: &'static str, expected: impl ToString, actual: impl ToString) -> Self {
        Self::StaleCounterOrRound {
            field,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Whether the error leaves the channel in a state that needs out-of-band resolution.
    /// Stage violations are rejected before any state is touched and do not stall the channel.
    pub fn stalls_channel(&self) -> bool {
        !matches!(
            self,
            ProtocolError::InvalidPlayerStage(_)
                | ProtocolError::ChannelStalled
                | ProtocolError::MissingOffChainContract(_)
        )
    }

    /// The data needed to build a fraud proof from a signature mismatch.
    pub fn dispute_evidence(&self) -> Option<DisputeEvidence> {
        match self {
            ProtocolError::SignatureMismatch {
                context,
                expected,
                recovered,
                hash,
                signature,
            } => Some(DisputeEvidence {
                context: context.to_string(),
                hash: *hash,
                signatures: vec![signature.clone()],
                expected_signer: Some(*expected),
                recovered_signer: Some(*recovered),
                state_round: None,
            }),
            _ => None,
        }
    }
}
