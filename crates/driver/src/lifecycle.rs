//! The `lifecycle` module walks the setup sequence that takes a game from on-chain play into the
//! state channel:
//!
//! 1. Both players signal readiness; the first attacker may now play on-chain.
//! 2. The on-chain game is locked with both players' signatures over its lock hash.
//! 3. Each player deploys an off-chain mirror, announces its address and locks it too.
//! 4. The counterparty signs the on-chain state bound to the mirror's address; the mirror is
//!    unlocked with both signatures, which seeds it with the on-chain state.
//! 5. Once both mirrors are seeded, play continues off-chain.

use crate::{
    contract::BattleshipContract,
    errors::ProtocolError,
    player::{read, Player},
    types::{GamePhase, LifecycleMessage, PlayerStage, WireMessage},
};
use ethers::types::{Address, Bytes, U256};
use sc_battleship_game::{
    codec::{hash_lock, hash_with_address},
    MethodCall,
};
use std::sync::Arc;
use tracing::Instrument;

impl Player {
    /// Marks the local setup as done and tells the counterparty.
    pub async fn ready_to_play(&mut self) -> Result<(), ProtocolError> {
        let span = self.span.clone();
        self.announce_ready().instrument(span).await
    }

    /// Requests the counterparty's lock signature for the contract at `address`: the on-chain
    /// game, or our own off-chain mirror.
    pub async fn lock(&mut self, address: Address) -> Result<(), ProtocolError> {
        let span = self.span.clone();
        self.request_lock(address).instrument(span).await
    }

    async fn announce_ready(&mut self) -> Result<(), ProtocolError> {
        self.advance_stage(PlayerStage::ReadyToPlay)?;
        self.readiness.on_chain = true;
        tracing::info!(target: "channel-lifecycle", "Ready to play on-chain");
        self.dispatch(WireMessage::Lifecycle(LifecycleMessage::ReadyToPlay))
            .await?;
        self.maybe_start();
        Ok(())
    }

    async fn request_lock(&mut self, address: Address) -> Result<(), ProtocolError> {
        let contract = self.contract_at(address)?;
        let channel_counter = read("channelCounter", contract.channel_counter()).await?;
        let round = read("round", contract.round()).await?;
        tracing::info!(
            target: "channel-lifecycle",
            "Requesting lock signature for {:?} at channel counter {}",
            address,
            channel_counter
        );
        self.dispatch(WireMessage::Lifecycle(LifecycleMessage::RequestLockSig {
            address,
            channel_counter,
            round,
        }))
        .await
    }

    pub(crate) async fn handle_lifecycle(
        &mut self,
        message: LifecycleMessage,
    ) -> Result<(), ProtocolError> {
        match message {
            LifecycleMessage::ReadyToPlay => {
                tracing::info!(target: "channel-lifecycle", "Counterparty ready to play on-chain");
                self.readiness.counterparty_on_chain = true;
                self.maybe_start();
                Ok(())
            }
            LifecycleMessage::RequestLockSig {
                address,
                channel_counter,
                round,
            } => self.countersign_lock(address, channel_counter, round).await,
            LifecycleMessage::LockSig { address, signature } => {
                self.complete_lock(address, signature).await
            }
            LifecycleMessage::DeployOffChain => self.deploy_off_chain().await,
            LifecycleMessage::OffChainBattleshipAddress { address } => {
                tracing::info!(target: "channel-lifecycle", "Counterparty mirror at {:?}", address);
                self.counterparty_off_chain = Some(address);
                Ok(())
            }
            LifecycleMessage::RequestStateSig => self.sign_seed_state().await,
            LifecycleMessage::StateSig { signature } => self.seed_off_chain(signature).await,
            LifecycleMessage::ReadyToPlayOffChain => {
                tracing::info!(target: "channel-lifecycle", "Counterparty ready to play off-chain");
                self.readiness.counterparty_off_chain = true;
                self.maybe_enter_off_chain()
            }
        }
    }

    /// Signs the lock hash the counterparty asked for. When the contract is one we can read, the
    /// requested counters must match ours.
    async fn countersign_lock(
        &mut self,
        address: Address,
        channel_counter: U256,
        round: U256,
    ) -> Result<(), ProtocolError> {
        if let Ok(contract) = self.contract_at(address) {
            let local_counter = read("channelCounter", contract.channel_counter()).await?;
            let local_round = read("round", contract.round()).await?;
            if local_counter != channel_counter {
                return Err(ProtocolError::stale("channel counter", local_counter, channel_counter));
            }
            if local_round != round {
                return Err(ProtocolError::stale("round", local_round, round));
            }
        }
        let signature = self.sign(hash_lock(channel_counter, round, address)).await?;
        self.dispatch(WireMessage::Lifecycle(LifecycleMessage::LockSig { address, signature }))
            .await
    }

    /// Locks the contract at `address` with both signatures, then moves to the next setup step.
    async fn complete_lock(&mut self, address: Address, signature: Bytes) -> Result<(), ProtocolError> {
        let contract = self.contract_at(address)?;
        let channel_counter = read("channelCounter", contract.channel_counter()).await?;
        let round = read("round", contract.round()).await?;
        let lock_hash = hash_lock(channel_counter, round, address);
        self.expect_counterparty_signature("lock", lock_hash, &signature)?;
        let own = self.sign(lock_hash).await?;
        self.apply(
            contract.as_ref(),
            MethodCall::Lock {
                signatures: vec![own, signature],
            },
            self.config.lock_gas,
        )
        .await?;
        tracing::info!(target: "channel-lifecycle", "Locked {:?}", address);

        if address == self.on_chain.address() {
            self.dispatch(WireMessage::Lifecycle(LifecycleMessage::DeployOffChain))
                .await?;
            self.deploy_off_chain().await
        } else {
            self.dispatch(WireMessage::Lifecycle(LifecycleMessage::RequestStateSig))
                .await
        }
    }

    /// Deploys our off-chain mirror, announces it and starts locking it.
    async fn deploy_off_chain(&mut self) -> Result<(), ProtocolError> {
        if self.off_chain.is_some() {
            return Ok(());
        }
        let contract = self
            .deployer
            .deploy_off_chain(self.address(), self.config.counterparty, self.on_chain.address())
            .await
            .map_err(|e| ProtocolError::contract("deploy", e))?;
        let address = contract.address();
        tracing::info!(target: "channel-lifecycle", "Deployed off-chain mirror at {:?}", address);
        self.off_chain = Some(contract);
        self.dispatch(WireMessage::Lifecycle(
            LifecycleMessage::OffChainBattleshipAddress { address },
        ))
        .await?;
        self.request_lock(address).await
    }

    /// Signs the on-chain state bound to the counterparty's mirror.
    async fn sign_seed_state(&mut self) -> Result<(), ProtocolError> {
        let mirror = self.counterparty_off_chain()?;
        let state = read("getState", self.on_chain.get_state(self.config.state_sig_nonce)).await?;
        let signature = self.sign(hash_with_address(state, mirror)).await?;
        self.dispatch(WireMessage::Lifecycle(LifecycleMessage::StateSig { signature }))
            .await
    }

    /// Unlocks our mirror with both signatures over the on-chain state, seeding it.
    async fn seed_off_chain(&mut self, signature: Bytes) -> Result<(), ProtocolError> {
        let off_chain = self.off_chain()?;
        let nonce = self.config.state_sig_nonce;
        let state = read("getState", self.on_chain.get_state(nonce)).await?;
        let bound = hash_with_address(state, off_chain.address());
        self.expect_counterparty_signature("seed state", bound, &signature)?;
        let own = self.sign(bound).await?;
        self.apply(
            off_chain.as_ref(),
            MethodCall::Unlock {
                nonce,
                signatures: vec![own, signature],
            },
            self.config.lock_gas,
        )
        .await?;
        tracing::info!(target: "channel-lifecycle", "Seeded off-chain mirror {:?}", off_chain.address());

        self.readiness.off_chain = true;
        self.dispatch(WireMessage::Lifecycle(LifecycleMessage::ReadyToPlayOffChain))
            .await?;
        self.maybe_enter_off_chain()
    }

    fn maybe_start(&mut self) {
        if self.readiness.on_chain
            && self.readiness.counterparty_on_chain
            && self.phase == GamePhase::Setup
        {
            let first = if self.config.goes_first {
                GamePhase::AwaitAttackInput
            } else {
                GamePhase::AwaitCounterpartyAttack
            };
            self.set_phase(first);
        }
    }

    fn maybe_enter_off_chain(&mut self) -> Result<(), ProtocolError> {
        if self.readiness.off_chain && self.readiness.counterparty_off_chain {
            if self.stage < PlayerStage::ReadyToPlay {
                return Err(ProtocolError::InvalidPlayerStage(self.stage));
            }
            self.advance_stage(PlayerStage::ReadyToPlayOffChain)?;
        }
        Ok(())
    }

    fn contract_at(&self, address: Address) -> Result<Arc<dyn BattleshipContract>, ProtocolError> {
        if address == self.on_chain.address() {
            return Ok(self.on_chain.clone());
        }
        match &self.off_chain {
            Some(contract) if contract.address() == address => Ok(contract.clone()),
            _ => Err(ProtocolError::MissingOffChainContract("no contract at requested address")),
        }
    }
}
