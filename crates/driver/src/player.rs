//! The `player` module holds the [Player]: everything one party knows about its channel, and the
//! helpers the protocol, router and lifecycle modules share.

use crate::{
    contract::{BattleshipContract, ContractDeployer},
    errors::ProtocolError,
    transport::Transport,
    types::{
        GameEvent, GamePhase, MoveRecord, PlayerStage, UpdateStatus, UpdateStep, WireMessage,
    },
    DriverConfig,
};
use ethers::types::{Address, Bytes, H256, U256};
use sc_battleship_game::{
    codec::{hash_channel_state, hash_with_address},
    signer::{recover, ChannelSigner},
    updates::Payload,
    MethodCall, MoveKind, StateUpdate,
};
use std::{future::Future, sync::Arc};
use tokio::sync::mpsc;
use tracing::Span;

/// The external collaborators a [Player] talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Signs on behalf of the local player.
    pub signer: Arc<dyn ChannelSigner>,
    /// The on-chain battleship game.
    pub on_chain: Arc<dyn BattleshipContract>,
    /// Instantiates the off-chain mirror once the on-chain game is locked.
    pub deployer: Arc<dyn ContractDeployer>,
    /// The link to the counterparty.
    pub transport: Arc<dyn Transport>,
}

/// The proposal we are waiting on the counterparty to countersign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingUpdate {
    pub(crate) kind: MoveKind,
    pub(crate) state_round: u64,
    pub(crate) record: usize,
}

/// Which side has finished which part of the setup.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Readiness {
    pub(crate) on_chain: bool,
    pub(crate) counterparty_on_chain: bool,
    pub(crate) off_chain: bool,
    pub(crate) counterparty_off_chain: bool,
}

/// The [Player] struct is one party's single state machine for one channel. It is driven one
/// event at a time and is never shared between tasks.
pub struct Player {
    pub(crate) config: Arc<DriverConfig>,
    pub(crate) signer: Arc<dyn ChannelSigner>,
    pub(crate) on_chain: Arc<dyn BattleshipContract>,
    pub(crate) off_chain: Option<Arc<dyn BattleshipContract>>,
    pub(crate) deployer: Arc<dyn ContractDeployer>,
    pub(crate) transport: Arc<dyn Transport>,
    events: mpsc::UnboundedSender<GameEvent>,
    pub(crate) span: Span,
    pub(crate) stage: PlayerStage,
    pub(crate) phase: GamePhase,
    pub(crate) status: UpdateStatus,
    pub(crate) pending: Option<PendingUpdate>,
    pub(crate) moves: Vec<MoveRecord>,
    pub(crate) channel_round: u64,
    pub(crate) counterparty_off_chain: Option<Address>,
    pub(crate) readiness: Readiness,
    pub(crate) sinks_scored: usize,
    pub(crate) ships_lost: usize,
}

impl Player {
    /// Creates a new [Player]. Events for the game layer are sent to `events`.
    pub fn new(
        config: DriverConfig,
        collaborators: Collaborators,
        events: mpsc::UnboundedSender<GameEvent>,
    ) -> Self {
        let address = collaborators.signer.address();
        Self {
            config: Arc::new(config),
            signer: collaborators.signer,
            on_chain: collaborators.on_chain,
            off_chain: None,
            deployer: collaborators.deployer,
            transport: collaborators.transport,
            events,
            span: tracing::info_span!("player", address = ?address),
            stage: PlayerStage::None,
            phase: GamePhase::Setup,
            status: UpdateStatus::AwaitPropose,
            pending: None,
            moves: Vec::new(),
            channel_round: 0,
            counterparty_off_chain: None,
            readiness: Readiness::default(),
            sinks_scored: 0,
            ships_lost: 0,
        }
    }

    /// The local player's address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// The local player's setup stage.
    pub fn stage(&self) -> PlayerStage {
        self.stage
    }

    /// The game input the local player is waiting for.
    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    /// The status of the in-flight state update.
    pub fn status(&self) -> UpdateStatus {
        self.status
    }

    /// The game history, oldest first.
    pub fn moves(&self) -> &[MoveRecord] {
        &self.moves
    }

    /// The most recent move.
    pub fn latest_move(&self) -> Option<&MoveRecord> {
        self.moves.last()
    }

    /// The channel round of the last finalized state update.
    pub fn channel_round(&self) -> u64 {
        self.channel_round
    }

    /// The address of the local off-chain mirror, once deployed.
    pub fn off_chain_address(&self) -> Option<Address> {
        self.off_chain.as_ref().map(|contract| contract.address())
    }

    /// The address of the counterparty's off-chain mirror, once announced.
    pub fn counterparty_off_chain_address(&self) -> Option<Address> {
        self.counterparty_off_chain
    }

    pub(crate) fn emit(&self, event: GameEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!(target: "player", "Event receiver dropped, discarding event.");
        }
    }

    pub(crate) fn set_phase(&mut self, phase: GamePhase) {
        if self.phase != phase {
            tracing::debug!(target: "player", "Phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
            self.emit(GameEvent::PhaseChanged(phase));
        }
    }

    /// Moves the stage forward. Moving backwards is a precondition violation.
    pub(crate) fn advance_stage(&mut self, stage: PlayerStage) -> Result<(), ProtocolError> {
        if stage < self.stage {
            return Err(ProtocolError::InvalidPlayerStage(self.stage));
        }
        if stage > self.stage {
            tracing::info!(target: "player", "Stage {:?} -> {:?}", self.stage, stage);
            self.stage = stage;
            self.emit(GameEvent::StageChanged(stage));
        }
        Ok(())
    }

    pub(crate) fn advance_status(
        &mut self,
        step: UpdateStep,
        kind: MoveKind,
    ) -> Result<(), ProtocolError> {
        if self.status == UpdateStatus::Stalled {
            return Err(ProtocolError::ChannelStalled);
        }
        self.status = self
            .status
            .advance(step)
            .ok_or(ProtocolError::OutOfOrderMove {
                kind,
                phase: self.phase,
            })?;
        Ok(())
    }

    /// Marks the channel as stalled and tells the game layer why.
    pub(crate) fn stall(&mut self, error: &ProtocolError) {
        tracing::error!(target: "player", "Channel stalled: {}", error);
        self.status = UpdateStatus::Stalled;
        self.pending = None;
        self.emit(GameEvent::ChannelStalled {
            reason: error.to_string(),
            evidence: error.dispute_evidence(),
        });
    }

    pub(crate) async fn sign(&self, hash: H256) -> Result<Bytes, ProtocolError> {
        self.signer.sign(hash).await.map_err(ProtocolError::Signer)
    }

    /// Checks that `signature` over `hash` was produced by the counterparty.
    pub(crate) fn expect_counterparty_signature(
        &self,
        context: &'static str,
        hash: H256,
        signature: &Bytes,
    ) -> Result<(), ProtocolError> {
        let recovered = recover(hash, signature)?;
        if recovered != self.config.counterparty {
            return Err(ProtocolError::SignatureMismatch {
                context,
                expected: self.config.counterparty,
                recovered,
                hash,
                signature: signature.clone(),
            });
        }
        Ok(())
    }

    pub(crate) async fn dispatch(&self, message: WireMessage) -> Result<(), ProtocolError> {
        self.transport
            .send_to_counterparty(message)
            .await
            .map_err(ProtocolError::Transport)
    }

    /// Submits `call` to `contract` from the local player's address.
    pub(crate) async fn apply(
        &self,
        contract: &dyn BattleshipContract,
        call: MethodCall,
        gas: u64,
    ) -> Result<(), ProtocolError> {
        let method = call.method();
        let receipt = contract
            .send(call, self.address(), gas)
            .await
            .map_err(|e| ProtocolError::contract(method, e))?;
        tracing::debug!(target: "player", "Applied `{}` to {:?} in tx {:?}", method, contract.address(), receipt.tx_hash);
        Ok(())
    }

    pub(crate) fn off_chain(&self) -> Result<Arc<dyn BattleshipContract>, ProtocolError> {
        self.off_chain
            .clone()
            .ok_or(ProtocolError::MissingOffChainContract("local mirror not deployed"))
    }

    pub(crate) fn counterparty_off_chain(&self) -> Result<Address, ProtocolError> {
        self.counterparty_off_chain
            .ok_or(ProtocolError::MissingOffChainContract(
                "counterparty mirror address unknown",
            ))
    }

    /// Hashes the current state of `contract`, binds it to the on-chain game, then binds that to
    /// the state channel and `state_round`.
    pub(crate) async fn channel_hash(
        &self,
        contract: &dyn BattleshipContract,
        state_round: u64,
    ) -> Result<H256, ProtocolError> {
        let state = read("getState", contract.get_state(self.config.state_nonce)).await?;
        let channel = read("stateChannel", self.on_chain.state_channel()).await?;
        let bound = hash_with_address(state, self.on_chain.address());
        Ok(hash_channel_state(bound, U256::from(state_round), channel))
    }

    /// Checks that the local player may start `payload` now.
    pub(crate) fn check_local_move(&self, payload: &Payload) -> Result<(), ProtocolError> {
        if self.status == UpdateStatus::Stalled {
            return Err(ProtocolError::ChannelStalled);
        }
        let expected = match (payload, self.phase) {
            (Payload::Attack(_), GamePhase::AwaitAttackInput) => true,
            (Payload::RevealSlot(_) | Payload::RevealSunk(_), GamePhase::AwaitRevealInput { x, y }) => {
                payload.cell() == (x, y)
            }
            _ => false,
        };
        if !expected || !self.status.is_idle() {
            return Err(ProtocolError::OutOfOrderMove {
                kind: payload.kind(),
                phase: self.phase,
            });
        }
        Ok(())
    }

    /// Checks that the counterparty may have made `payload` now.
    pub(crate) fn check_counterparty_move(&self, payload: &Payload) -> Result<(), ProtocolError> {
        if self.status == UpdateStatus::Stalled {
            return Err(ProtocolError::ChannelStalled);
        }
        let expected = match (payload, self.phase) {
            (Payload::Attack(_), GamePhase::AwaitCounterpartyAttack) => true,
            (
                Payload::RevealSlot(_) | Payload::RevealSunk(_),
                GamePhase::AwaitCounterpartyReveal { x, y },
            ) => payload.cell() == (x, y),
            _ => false,
        };
        if !expected || !self.status.is_idle() {
            return Err(ProtocolError::OutOfOrderMove {
                kind: payload.kind(),
                phase: self.phase,
            });
        }
        Ok(())
    }

    /// Advances the game phase after a counterparty move became final.
    pub(crate) fn after_counterparty_move(&mut self, payload: &Payload) {
        let next = match payload {
            Payload::Attack(attack) => GamePhase::AwaitRevealInput {
                x: attack.x,
                y: attack.y,
            },
            Payload::RevealSlot(_) => GamePhase::AwaitCounterpartyAttack,
            Payload::RevealSunk(_) => {
                self.sinks_scored += 1;
                if self.sinks_scored >= self.config.ship_count {
                    GamePhase::Finished { won: true }
                } else {
                    GamePhase::AwaitCounterpartyAttack
                }
            }
        };
        self.set_phase(next);
    }

    /// Advances the game phase after one of our own moves became final.
    pub(crate) fn after_own_move(&mut self, payload: &Payload) {
        let next = match payload {
            Payload::Attack(attack) => GamePhase::AwaitCounterpartyReveal {
                x: attack.x,
                y: attack.y,
            },
            Payload::RevealSlot(_) => GamePhase::AwaitAttackInput,
            Payload::RevealSunk(_) => {
                self.ships_lost += 1;
                if self.ships_lost >= self.config.ship_count {
                    GamePhase::Finished { won: false }
                } else {
                    GamePhase::AwaitAttackInput
                }
            }
        };
        self.set_phase(next);
    }
}

/// Awaits a contract read, tagging failures with the method name.
pub(crate) async fn read<T>(
    method: &'static str,
    call: impl Future<Output = anyhow::Result<T>>,
) -> Result<T, ProtocolError> {
    call.await.map_err(|e| ProtocolError::contract(method, e))
}
