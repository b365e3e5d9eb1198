//! The `protocol` module implements the three-message handshake that finalizes a move off-chain:
//! the proposer applies and signs, the verifier checks and countersigns, the proposer checks the
//! countersignature.

use crate::{
    contract::BattleshipContract,
    errors::ProtocolError,
    player::{read, PendingUpdate, Player},
    types::{GameEvent, MoveRecord, ProtocolMessage, UpdateStatus, UpdateStep, WireMessage},
};
use ethers::types::U256;
use sc_battleship_game::{
    updates::{Acknowledge, Payload, Propose, Verify},
    StateUpdate,
};
use std::time::Instant;

impl Player {
    /// Starts a state update for a local move. Applies the move to our own mirror, signs the move
    /// data for both the counterparty's mirror and the on-chain game, signs the resulting channel
    /// state and sends all of it for verification.
    pub(crate) async fn propose(&mut self, payload: Payload) -> Result<(), ProtocolError> {
        self.check_local_move(&payload)?;
        let off_chain = self.off_chain()?;
        let counterparty_off_chain = self.counterparty_off_chain()?;
        let kind = payload.kind();
        let update = Propose::new(payload, self.channel_round + 1);

        let started = Instant::now();
        tracing::info!(
            target: "channel-protocol",
            "propose-start {} for state round {}",
            payload.serialise(),
            update.state_round
        );
        let previous = self.status;
        self.advance_status(UpdateStep::Propose, kind)?;

        let (move_ctr, round) = match self.apply_own_move(off_chain.as_ref(), &payload).await {
            Ok(counters) => counters,
            Err(err) => {
                // Our mirror is untouched, so the caller may retry against fresh counters.
                self.status = previous;
                tracing::warn!(target: "channel-protocol", "propose-abort {}: {}", payload.serialise(), err);
                return Err(err);
            }
        };

        let off_chain_data_sig = self
            .sign(payload.hash_data(move_ctr, round, counterparty_off_chain))
            .await?;
        let on_chain_data_sig = self
            .sign(payload.hash_data(move_ctr, round, self.on_chain.address()))
            .await?;

        let hash_state = self.channel_hash(off_chain.as_ref(), update.state_round).await?;
        let state_update_sig = self.sign(hash_state).await?;

        let (x, y) = payload.cell();
        self.moves.push(MoveRecord {
            kind,
            x,
            y,
            move_ctr,
            round,
            state_round: update.state_round,
            hash_state,
            channel_sig: state_update_sig.clone(),
            counterparty_channel_sig: None,
            attack_sig: Some(on_chain_data_sig.clone()),
            reveal: payload.reveal(),
            proposed: true,
            settled_on_chain: false,
        });
        self.pending = Some(PendingUpdate {
            kind,
            state_round: update.state_round,
            record: self.moves.len() - 1,
        });

        let verify = update.into_verify(on_chain_data_sig, off_chain_data_sig, state_update_sig);
        self.dispatch(WireMessage::Update(ProtocolMessage::VerifyStateUpdate {
            update: verify,
            move_ctr,
            round,
        }))
        .await?;
        self.advance_status(UpdateStep::Dispatch, kind)?;

        tracing::info!(
            target: "channel-protocol",
            elapsed_ms = started.elapsed().as_millis() as u64,
            "propose-end {}",
            payload.serialise()
        );
        Ok(())
    }

    /// Signs `payload` for our own mirror and applies it there. Returns the counters the move
    /// was signed over.
    async fn apply_own_move(
        &self,
        off_chain: &dyn BattleshipContract,
        payload: &Payload,
    ) -> Result<(U256, U256), ProtocolError> {
        let move_ctr = read("move_ctr", off_chain.move_ctr()).await?;
        let round = read("round", off_chain.round()).await?;
        let own_sig = self
            .sign(payload.hash_data(move_ctr, round, off_chain.address()))
            .await?;
        self.apply(off_chain, payload.method_call(own_sig), self.config.move_gas)
            .await?;
        Ok((move_ctr, round))
    }

    /// Checks a counterparty move, applies it to our mirror, countersigns the resulting channel
    /// state and acknowledges it. The move is final for us once this returns.
    pub(crate) async fn verify(
        &mut self,
        update: Verify,
        claimed_move_ctr: U256,
        claimed_round: U256,
    ) -> Result<(), ProtocolError> {
        let payload = update.payload;
        let kind = payload.kind();
        self.check_counterparty_move(&payload)?;
        let off_chain = self.off_chain()?;

        let started = Instant::now();
        tracing::info!(
            target: "channel-protocol",
            "verify-start {} for state round {}",
            payload.serialise(),
            update.state_round
        );
        self.advance_status(UpdateStep::Receive, kind)?;

        let expected_round = self.channel_round + 1;
        if update.state_round != expected_round {
            return Err(ProtocolError::stale(
                "state round",
                expected_round,
                update.state_round,
            ));
        }

        let move_ctr = read("move_ctr", off_chain.move_ctr()).await?;
        let round = read("round", off_chain.round()).await?;
        if claimed_move_ctr != move_ctr {
            return Err(ProtocolError::stale("move counter", move_ctr, claimed_move_ctr));
        }
        if claimed_round != round {
            return Err(ProtocolError::stale("round", round, claimed_round));
        }

        // The on-chain data signature is what a dispute would carry; check it before applying.
        let data_hash = payload.hash_data(move_ctr, round, self.on_chain.address());
        self.expect_counterparty_signature("on-chain move data", data_hash, &update.on_chain_data_sig)?;

        self.apply(
            off_chain.as_ref(),
            payload.method_call(update.off_chain_data_sig.clone()),
            self.config.move_gas,
        )
        .await?;

        let hash_state = self.channel_hash(off_chain.as_ref(), update.state_round).await?;
        self.expect_counterparty_signature("channel state", hash_state, &update.state_update_sig)?;
        let channel_sig = self.sign(hash_state).await?;
        self.advance_status(UpdateStep::Countersign, kind)?;

        let (x, y) = payload.cell();
        let record = MoveRecord {
            kind,
            x,
            y,
            move_ctr,
            round,
            state_round: update.state_round,
            hash_state,
            channel_sig: channel_sig.clone(),
            counterparty_channel_sig: Some(update.state_update_sig.clone()),
            attack_sig: Some(update.on_chain_data_sig.clone()),
            reveal: payload.reveal(),
            proposed: false,
            settled_on_chain: false,
        };
        self.moves.push(record.clone());
        self.channel_round = update.state_round;

        self.dispatch(WireMessage::Update(ProtocolMessage::AcknowledgeStateUpdate {
            update: update.into_acknowledge(channel_sig),
        }))
        .await?;
        self.advance_status(UpdateStep::Dispatch, kind)?;

        self.emit(GameEvent::MoveFinalized(record));
        self.after_counterparty_move(&payload);

        tracing::info!(
            target: "channel-protocol",
            elapsed_ms = started.elapsed().as_millis() as u64,
            "verify-end {}",
            payload.serialise()
        );
        Ok(())
    }

    /// Checks the counterparty's countersignature over our pending proposal. The move is final
    /// for us once this returns.
    pub(crate) async fn acknowledge(&mut self, update: Acknowledge) -> Result<(), ProtocolError> {
        let payload = update.payload;
        let kind = payload.kind();
        if self.status == UpdateStatus::Stalled {
            return Err(ProtocolError::ChannelStalled);
        }
        let pending = match self.pending {
            Some(pending) if pending.kind == kind && self.status == UpdateStatus::AwaitAck => {
                pending
            }
            _ => {
                return Err(ProtocolError::OutOfOrderMove {
                    kind,
                    phase: self.phase,
                })
            }
        };

        let started = Instant::now();
        tracing::info!(
            target: "channel-protocol",
            "acknowledge-start {} for state round {}",
            payload.serialise(),
            update.state_round
        );

        if update.state_round != pending.state_round {
            return Err(ProtocolError::stale(
                "state round",
                pending.state_round,
                update.state_round,
            ));
        }
        let proposed_hash = match self.moves.get(pending.record) {
            Some(record) if (record.x, record.y) == payload.cell() => record.hash_state,
            _ => {
                return Err(ProtocolError::OutOfOrderMove {
                    kind,
                    phase: self.phase,
                })
            }
        };

        let off_chain = self.off_chain()?;
        let hash_state = self.channel_hash(off_chain.as_ref(), pending.state_round).await?;
        if hash_state != proposed_hash {
            return Err(ProtocolError::stale(
                "channel state hash",
                format!("{:?}", proposed_hash),
                format!("{:?}", hash_state),
            ));
        }
        self.expect_counterparty_signature(
            "channel state acknowledgement",
            hash_state,
            &update.state_update_sig,
        )?;
        self.advance_status(UpdateStep::Acknowledge, kind)?;

        let finalized = self.moves.get_mut(pending.record).map(|record| {
            record.counterparty_channel_sig = Some(update.state_update_sig.clone());
            record.clone()
        });
        if let Some(record) = finalized {
            self.emit(GameEvent::MoveFinalized(record));
        }
        self.pending = None;
        self.channel_round = pending.state_round;
        self.after_own_move(&payload);

        tracing::info!(
            target: "channel-protocol",
            elapsed_ms = started.elapsed().as_millis() as u64,
            "acknowledge-end {}",
            payload.serialise()
        );
        Ok(())
    }
}
