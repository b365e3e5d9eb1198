use ethers::types::{Address, Bytes, H256, U256};
use sc_battleship_game::{
    updates::{Acknowledge, Payload, Verify},
    MoveKind, Reveal, StateUpdate,
};
use serde::{Deserialize, Serialize};

/// The [PlayerStage] enum tracks how far the local setup sequence has progressed. Stages only
/// ever move forward.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PlayerStage {
    #[default]
    None,
    ReadyToPlay,
    ReadyToPlayOffChain,
}

/// The [GamePhase] enum is the game-level input the local player is waiting for.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    #[default]
    Setup,
    /// Our turn to attack.
    AwaitAttackInput,
    /// Waiting for the counterparty's attack.
    AwaitCounterpartyAttack,
    /// The counterparty attacked `(x, y)`; we must reveal it.
    AwaitRevealInput { x: u8, y: u8 },
    /// We attacked `(x, y)`; waiting for the counterparty's reveal.
    AwaitCounterpartyReveal { x: u8, y: u8 },
    /// The game is over.
    Finished { won: bool },
}

/// The [UpdateStatus] enum is the status of the state update currently moving through the
/// propose/verify/acknowledge handshake. A proposer walks
/// `AwaitPropose -> Proposed -> AwaitAck -> Acknowledged`; a verifier walks
/// `AwaitPropose -> AwaitVerify -> Verified -> Acknowledged`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateStatus {
    #[default]
    AwaitPropose,
    Proposed,
    AwaitVerify,
    Verified,
    AwaitAck,
    Acknowledged,
    Stalled,
}

/// The steps that move an [UpdateStatus] forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStep {
    /// The local party signed and applied a new move.
    Propose,
    /// A counterparty move arrived for verification.
    Receive,
    /// The local party countersigned the counterparty's move.
    Countersign,
    /// The local party sent its message for the current move.
    Dispatch,
    /// The counterparty's countersignature arrived.
    Acknowledge,
}

impl UpdateStatus {
    /// Whether no update is in flight.
    pub fn is_idle(&self) -> bool {
        matches!(self, UpdateStatus::AwaitPropose | UpdateStatus::Acknowledged)
    }

    /// Returns the status after `step`, or `None` if the step is not allowed from here.
    pub fn advance(self, step: UpdateStep) -> Option<UpdateStatus> {
        use UpdateStatus::*;
        match (self, step) {
            (AwaitPropose | Acknowledged, UpdateStep::Propose) => Some(Proposed),
            (AwaitPropose | Acknowledged, UpdateStep::Receive) => Some(AwaitVerify),
            (Proposed, UpdateStep::Dispatch) => Some(AwaitAck),
            (AwaitVerify, UpdateStep::Countersign) => Some(Verified),
            (Verified, UpdateStep::Dispatch) => Some(Acknowledged),
            (AwaitAck, UpdateStep::Acknowledge) => Some(Acknowledged),
            _ => None,
        }
    }
}

/// A [MoveRecord] is one entry of the append-only game history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub kind: MoveKind,
    pub x: u8,
    pub y: u8,
    pub move_ctr: U256,
    pub round: U256,
    pub state_round: u64,
    /// The channel-bound state hash both parties sign.
    pub hash_state: H256,
    /// Our signature over `hash_state`.
    pub channel_sig: Bytes,
    /// The counterparty's signature over `hash_state`.
    pub counterparty_channel_sig: Option<Bytes>,
    /// The move data signed against the on-chain contract.
    pub attack_sig: Option<Bytes>,
    pub reveal: Option<Reveal>,
    /// Whether we proposed the move.
    pub proposed: bool,
    /// Whether the move was applied directly on the on-chain contract.
    pub settled_on_chain: bool,
}

impl MoveRecord {
    /// Whether the move is final: countersigned by both parties, or settled on-chain.
    pub fn is_finalized(&self) -> bool {
        self.settled_on_chain || self.counterparty_channel_sig.is_some()
    }

    /// The evidence for submitting this state to the state channel contract, available once
    /// both channel signatures exist. Signatures are ordered proposer first.
    pub fn dispute_evidence(&self) -> Option<DisputeEvidence> {
        let counterparty = self.counterparty_channel_sig.clone()?;
        let signatures = if self.proposed {
            vec![self.channel_sig.clone(), counterparty]
        } else {
            vec![counterparty, self.channel_sig.clone()]
        };
        Some(DisputeEvidence {
            context: format!("finalized {} state", self.kind),
            hash: self.hash_state,
            signatures,
            expected_signer: None,
            recovered_signer: None,
            state_round: Some(self.state_round),
        })
    }
}

/// The data preserved for a later on-chain dispute: the hash, the signatures over it, and when
/// it stems from a failed verification, who was expected to sign and who actually did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeEvidence {
    pub context: String,
    pub hash: H256,
    pub signatures: Vec<Bytes>,
    pub expected_signer: Option<Address>,
    pub recovered_signer: Option<Address>,
    pub state_round: Option<u64>,
}

/// Events emitted to the surrounding game layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEvent {
    StageChanged(PlayerStage),
    PhaseChanged(GamePhase),
    MoveFinalized(MoveRecord),
    ChannelStalled {
        reason: String,
        evidence: Option<DisputeEvidence>,
    },
}

/// The state update messages. [ProtocolMessage::ProposeStateUpdate] is the local request to
/// start a move and never crosses the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProtocolMessage {
    ProposeStateUpdate {
        payload: Payload,
    },
    VerifyStateUpdate {
        update: Verify,
        /// The proposer's view of the move counter when it proposed.
        move_ctr: U256,
        /// The proposer's view of the game round when it proposed.
        round: U256,
    },
    AcknowledgeStateUpdate {
        update: Acknowledge,
    },
    /// A move applied directly on the on-chain contract at `move_ctr`.
    OnChainMove {
        payload: Payload,
        move_ctr: U256,
    },
}

impl ProtocolMessage {
    /// The payload carried by the message.
    pub fn payload(&self) -> &Payload {
        match self {
            ProtocolMessage::ProposeStateUpdate { payload } => payload,
            ProtocolMessage::VerifyStateUpdate { update, .. } => &update.payload,
            ProtocolMessage::AcknowledgeStateUpdate { update } => &update.payload,
            ProtocolMessage::OnChainMove { payload, .. } => payload,
        }
    }

    /// The kind of move carried by the message.
    pub fn move_kind(&self) -> MoveKind {
        self.payload().kind()
    }
}

/// Messages of the channel lifecycle: readiness, locking and seeding the off-chain mirrors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LifecycleMessage {
    ReadyToPlay,
    RequestLockSig {
        address: Address,
        channel_counter: U256,
        round: U256,
    },
    LockSig {
        address: Address,
        signature: Bytes,
    },
    DeployOffChain,
    OffChainBattleshipAddress {
        address: Address,
    },
    RequestStateSig,
    StateSig {
        signature: Bytes,
    },
    ReadyToPlayOffChain,
}

/// Everything exchanged between the two parties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "message")]
pub enum WireMessage {
    Update(ProtocolMessage),
    Lifecycle(LifecycleMessage),
}

impl WireMessage {
    /// Encodes the message as JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decodes a message from JSON.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Inputs consumed by a [PlayerDriver](crate::PlayerDriver).
#[derive(Debug, Clone)]
pub enum Inbound {
    /// Local setup finished; signal readiness to play on-chain.
    ReadyToPlay,
    /// Start locking the battleship contract at the given address into the channel.
    Lock(Address),
    /// A message from the counterparty or a local move request.
    Message(WireMessage),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn proposer_and_verifier_walks() {
        let proposer = [UpdateStep::Propose, UpdateStep::Dispatch, UpdateStep::Acknowledge]
            .into_iter()
            .try_fold(UpdateStatus::AwaitPropose, |s, step| s.advance(step));
        assert_eq!(proposer, Some(UpdateStatus::Acknowledged));

        let verifier = [UpdateStep::Receive, UpdateStep::Countersign, UpdateStep::Dispatch]
            .into_iter()
            .try_fold(UpdateStatus::Acknowledged, |s, step| s.advance(step));
        assert_eq!(verifier, Some(UpdateStatus::Acknowledged));
    }

    #[test]
    fn in_flight_update_rejects_new_moves() {
        assert_eq!(UpdateStatus::AwaitAck.advance(UpdateStep::Propose), None);
        assert_eq!(UpdateStatus::AwaitAck.advance(UpdateStep::Receive), None);
        assert_eq!(UpdateStatus::Stalled.advance(UpdateStep::Receive), None);
        assert_eq!(UpdateStatus::AwaitPropose.advance(UpdateStep::Acknowledge), None);
    }

    #[test]
    fn stages_are_ordered() {
        assert!(PlayerStage::None < PlayerStage::ReadyToPlay);
        assert!(PlayerStage::ReadyToPlay < PlayerStage::ReadyToPlayOffChain);
    }

    #[test]
    fn wire_messages_survive_json() {
        let message = WireMessage::Update(ProtocolMessage::VerifyStateUpdate {
            update: Verify {
                payload: Payload::attack(2, 3),
                state_round: 1,
                on_chain_data_sig: Bytes::from(vec![1u8; 65]),
                off_chain_data_sig: Bytes::from(vec![2u8; 65]),
                state_update_sig: Bytes::from(vec![3u8; 65]),
            },
            move_ctr: U256::from(4),
            round: U256::zero(),
        });
        let json = message.to_json().unwrap();
        assert_eq!(WireMessage::from_json(&json).unwrap(), message);

        let lock = WireMessage::Lifecycle(LifecycleMessage::RequestLockSig {
            address: Address::repeat_byte(1),
            channel_counter: U256::one(),
            round: U256::zero(),
        });
        assert_eq!(WireMessage::from_json(&lock.to_json().unwrap()).unwrap(), lock);
    }

    #[test]
    fn evidence_orders_proposer_first() {
        let record = MoveRecord {
            kind: MoveKind::Attack,
            x: 2,
            y: 3,
            move_ctr: U256::zero(),
            round: U256::zero(),
            state_round: 1,
            hash_state: H256::repeat_byte(7),
            channel_sig: Bytes::from(vec![1]),
            counterparty_channel_sig: None,
            attack_sig: None,
            reveal: None,
            proposed: false,
            settled_on_chain: false,
        };
        assert!(!record.is_finalized());
        assert!(record.dispute_evidence().is_none());

        let finalized = MoveRecord {
            counterparty_channel_sig: Some(Bytes::from(vec![2])),
            ..record
        };
        let evidence = finalized.dispute_evidence().unwrap();
        assert_eq!(evidence.signatures, vec![Bytes::from(vec![2]), Bytes::from(vec![1])]);
        assert_eq!(evidence.state_round, Some(1));
    }
}
