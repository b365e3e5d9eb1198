//! The types module contains the primitive types shared by the hashing, update and board modules.

use ethers::types::{Bytes, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The [Reveal] enum is the defender's answer to an attack on one of its cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reveal {
    Miss,
    Hit,
    Sink,
}

impl fmt::Display for Reveal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reveal::Miss => write!(f, "miss"),
            Reveal::Hit => write!(f, "hit"),
            Reveal::Sink => write!(f, "sink"),
        }
    }
}

/// The [MoveKind] enum names the three kinds of state update. The names double as the
/// battleship contract method names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveKind {
    Attack,
    RevealSlot,
    RevealSunk,
}

impl MoveKind {
    /// Returns the canonical name of the move kind.
    pub fn name(&self) -> &'static str {
        match self {
            MoveKind::Attack => "attack",
            MoveKind::RevealSlot => "revealslot",
            MoveKind::RevealSunk => "revealsunk",
        }
    }
}

impl fmt::Display for MoveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The [MethodCall] enum is the exact shape of a state-changing call against a battleship
/// contract, either the on-chain instance or an off-chain mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodCall {
    /// `attack(uint8 x, uint8 y, bytes signature)`
    Attack { x: u8, y: u8, signature: Bytes },
    /// `revealslot(bool hit, bytes signature)`
    RevealSlot { hit: bool, signature: Bytes },
    /// `revealsunk(uint256 shipIndex, uint8 x1, uint8 y1, uint8 x2, uint8 y2, uint256 r, bytes signature)`
    RevealSunk {
        ship_index: U256,
        x1: u8,
        y1: u8,
        x2: u8,
        y2: u8,
        r: U256,
        signature: Bytes,
    },
    /// `lock(bytes[] signatures)`
    Lock { signatures: Vec<Bytes> },
    /// `unlock(uint256 nonce, bytes[] signatures)`
    Unlock { nonce: U256, signatures: Vec<Bytes> },
}

impl MethodCall {
    /// Returns the contract method name targeted by the call.
    pub fn method(&self) -> &'static str {
        match self {
            MethodCall::Attack { .. } => MoveKind::Attack.name(),
            MethodCall::RevealSlot { .. } => MoveKind::RevealSlot.name(),
            MethodCall::RevealSunk { .. } => MoveKind::RevealSunk.name(),
            MethodCall::Lock { .. } => "lock",
            MethodCall::Unlock { .. } => "unlock",
        }
    }
}
