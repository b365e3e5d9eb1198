//! The updates module contains the three state update kinds ([Attack], [RevealSlot] and
//! [RevealSunk]) and the three roles every update passes through during one exchange:
//! [Propose] -> [Verify] -> [Acknowledge].
//!
//! Roles are plain structs; moving to the next role consumes or copies the previous role's
//! fields and adds the signatures gathered in between.

use crate::{codec::Packed, MethodCall, MoveKind, Reveal};
use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};

/// The [StateUpdate] trait is the capability set shared by every move kind.
pub trait StateUpdate {
    /// The kind of the move.
    fn kind(&self) -> MoveKind;

    /// A short human readable rendering of the move, used in diagnostics.
    fn serialise(&self) -> String;

    /// Hashes the move data together with the counters read from the governing contract and the
    /// address of the contract the hash is meant for. The same move hashed for two contracts
    /// yields two different hashes.
    fn hash_data(&self, move_ctr: U256, round: U256, contract_address: Address) -> H256;

    /// The contract call that applies the move, carrying `signature` over [Self::hash_data].
    fn method_call(&self, signature: Bytes) -> MethodCall;
}

/// An attack on the counterparty's board at `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attack {
    pub x: u8,
    pub y: u8,
}

impl StateUpdate for Attack {
    fn kind(&self) -> MoveKind {
        MoveKind::Attack
    }

    fn serialise(&self) -> String {
        format!("attack-{},{}", self.x, self.y)
    }

    fn hash_data(&self, move_ctr: U256, round: U256, contract_address: Address) -> H256 {
        Packed::new()
            .uint8(self.x)
            .uint8(self.y)
            .uint256(move_ctr)
            .uint256(round)
            .address(contract_address)
            .keccak()
    }

    fn method_call(&self, signature: Bytes) -> MethodCall {
        MethodCall::Attack {
            x: self.x,
            y: self.y,
            signature,
        }
    }
}

/// The answer to an attack that did not sink a ship. `reveal` is either [Reveal::Hit] or
/// [Reveal::Miss].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealSlot {
    pub x: u8,
    pub y: u8,
    pub reveal: Reveal,
}

impl RevealSlot {
    /// Whether the revealed slot holds part of a ship.
    pub fn is_hit(&self) -> bool {
        self.reveal == Reveal::Hit
    }
}

impl StateUpdate for RevealSlot {
    fn kind(&self) -> MoveKind {
        MoveKind::RevealSlot
    }

    fn serialise(&self) -> String {
        format!("{}-{},{}", self.reveal, self.x, self.y)
    }

    fn hash_data(&self, move_ctr: U256, round: U256, contract_address: Address) -> H256 {
        Packed::new()
            .uint8(self.x)
            .uint8(self.y)
            .boolean(self.is_hit())
            .uint256(move_ctr)
            .uint256(round)
            .address(contract_address)
            .keccak()
    }

    fn method_call(&self, signature: Bytes) -> MethodCall {
        MethodCall::RevealSlot {
            hit: self.is_hit(),
            signature,
        }
    }
}

/// The geometry of a ship as committed to at setup: the two end cells, the commitment salt
/// and the ship's index in the owner's ship list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipGeometry {
    pub x1: u8,
    pub y1: u8,
    pub x2: u8,
    pub y2: u8,
    pub r: U256,
    pub ship_index: u64,
}

impl ShipGeometry {
    /// Whether the cell `(x, y)` lies on the ship.
    pub fn covers(&self, x: u8, y: u8) -> bool {
        (self.x1.min(self.x2)..=self.x1.max(self.x2)).contains(&x)
            && (self.y1.min(self.y2)..=self.y1.max(self.y2)).contains(&y)
    }
}

/// The answer to an attack that sank a ship. The full geometry is revealed so the contract
/// can check the claim against the ship commitment on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealSunk {
    pub x: u8,
    pub y: u8,
    pub ship: ShipGeometry,
}

impl StateUpdate for RevealSunk {
    fn kind(&self) -> MoveKind {
        MoveKind::RevealSunk
    }

    fn serialise(&self) -> String {
        format!("sink-{},{}", self.x, self.y)
    }

    fn hash_data(&self, move_ctr: U256, round: U256, contract_address: Address) -> H256 {
        Packed::new()
            .uint8(self.ship.x1)
            .uint8(self.ship.y1)
            .uint8(self.ship.x2)
            .uint8(self.ship.y2)
            .uint256(self.ship.r)
            .uint256(U256::from(self.ship.ship_index))
            .uint256(move_ctr)
            .uint256(round)
            .address(contract_address)
            .keccak()
    }

    fn method_call(&self, signature: Bytes) -> MethodCall {
        MethodCall::RevealSunk {
            ship_index: U256::from(self.ship.ship_index),
            x1: self.ship.x1,
            y1: self.ship.y1,
            x2: self.ship.x2,
            y2: self.ship.y2,
            r: self.ship.r,
            signature,
        }
    }
}

/// The [Payload] enum is the semantic content of a move, tagged by its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum Payload {
    Attack(Attack),
    RevealSlot(RevealSlot),
    RevealSunk(RevealSunk),
}

impl Payload {
    /// Creates an attack payload.
    pub fn attack(x: u8, y: u8) -> Self {
        Payload::Attack(Attack { x, y })
    }

    /// The attacked cell the payload refers to.
    pub fn cell(&self) -> (u8, u8) {
        match self {
            Payload::Attack(a) => (a.x, a.y),
            Payload::RevealSlot(r) => (r.x, r.y),
            Payload::RevealSunk(r) => (r.x, r.y),
        }
    }

    /// The reveal carried by the payload, if it answers an attack.
    pub fn reveal(&self) -> Option<Reveal> {
        match self {
            Payload::Attack(_) => None,
            Payload::RevealSlot(r) => Some(r.reveal),
            Payload::RevealSunk(_) => Some(Reveal::Sink),
        }
    }

    fn inner(&self) -> &dyn StateUpdate {
        match self {
            Payload::Attack(a) => a,
            Payload::RevealSlot(r) => r,
            Payload::RevealSunk(r) => r,
        }
    }
}

impl StateUpdate for Payload {
    fn kind(&self) -> MoveKind {
        self.inner().kind()
    }

    fn serialise(&self) -> String {
        self.inner().serialise()
    }

    fn hash_data(&self, move_ctr: U256, round: U256, contract_address: Address) -> H256 {
        self.inner().hash_data(move_ctr, round, contract_address)
    }

    fn method_call(&self, signature: Bytes) -> MethodCall {
        self.inner().method_call(signature)
    }
}

/// The proposing role: only the payload and the channel round it targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Propose {
    pub payload: Payload,
    pub state_round: u64,
}

impl Propose {
    /// Creates a new [Propose] update.
    pub fn new(payload: Payload, state_round: u64) -> Self {
        Self {
            payload,
            state_round,
        }
    }

    /// Moves to the verifying role once the proposer has produced its three signatures.
    ///
    /// ### Takes
    /// - `on_chain_data_sig`: Move data signed against the on-chain contract.
    /// - `off_chain_data_sig`: Move data signed against the counterparty's off-chain contract.
    /// - `state_update_sig`: The channel-bound state hash signed by the proposer.
    pub fn into_verify(
        self,
        on_chain_data_sig: Bytes,
        off_chain_data_sig: Bytes,
        state_update_sig: Bytes,
    ) -> Verify {
        Verify {
            payload: self.payload,
            state_round: self.state_round,
            on_chain_data_sig,
            off_chain_data_sig,
            state_update_sig,
        }
    }
}

/// The verifying role: the payload plus the proposer's three signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verify {
    pub payload: Payload,
    pub state_round: u64,
    pub on_chain_data_sig: Bytes,
    pub off_chain_data_sig: Bytes,
    pub state_update_sig: Bytes,
}

impl Verify {
    /// Moves to the acknowledging role with the verifier's own channel signature.
    pub fn into_acknowledge(self, state_update_sig: Bytes) -> Acknowledge {
        Acknowledge {
            payload: self.payload,
            state_round: self.state_round,
            state_update_sig,
        }
    }
}

/// The acknowledging role: the payload plus the counterparty's channel signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledge {
    pub payload: Payload,
    pub state_round: u64,
    pub state_update_sig: Bytes,
}
