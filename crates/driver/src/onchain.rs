//! The `onchain` module plays moves directly against the on-chain game, before the channel is
//! opened. The contract checks every signature itself, so the observer only checks ordering.

use crate::{
    errors::ProtocolError,
    player::{read, Player},
    types::{GameEvent, MoveRecord, ProtocolMessage, WireMessage},
};
use ethers::types::U256;
use sc_battleship_game::{updates::Payload, StateUpdate};
use std::time::Instant;

impl Player {
    /// Applies a local move to the on-chain game and tells the counterparty about it.
    pub(crate) async fn propose_on_chain(&mut self, payload: Payload) -> Result<(), ProtocolError> {
        self.check_local_move(&payload)?;
        let on_chain = self.on_chain.clone();
        let started = Instant::now();
        tracing::info!(target: "onchain-path", "on-chain move {}", payload.serialise());

        let move_ctr = read("move_ctr", on_chain.move_ctr()).await?;
        let round = read("round", on_chain.round()).await?;
        let data_sig = self
            .sign(payload.hash_data(move_ctr, round, on_chain.address()))
            .await?;
        self.apply(
            on_chain.as_ref(),
            payload.method_call(data_sig.clone()),
            self.config.move_gas,
        )
        .await?;

        let record = self
            .settled_record(&payload, move_ctr, round, Some(data_sig), true)
            .await?;
        self.moves.push(record.clone());
        self.emit(GameEvent::MoveFinalized(record));

        self.dispatch(WireMessage::Update(ProtocolMessage::OnChainMove { payload, move_ctr }))
            .await?;
        self.after_own_move(&payload);

        tracing::info!(
            target: "onchain-path",
            elapsed_ms = started.elapsed().as_millis() as u64,
            "on-chain move {} settled",
            payload.serialise()
        );
        Ok(())
    }

    /// Records a counterparty move that was applied on-chain at `move_ctr`.
    pub(crate) async fn observe_on_chain(
        &mut self,
        payload: Payload,
        move_ctr: U256,
    ) -> Result<(), ProtocolError> {
        self.check_counterparty_move(&payload)?;
        let current = read("move_ctr", self.on_chain.move_ctr()).await?;
        let claimed = move_ctr.saturating_add(U256::one());
        if current != claimed {
            return Err(ProtocolError::stale("on-chain move counter", current, claimed));
        }
        let round = read("round", self.on_chain.round()).await?;

        tracing::info!(
            target: "onchain-path",
            "observed counterparty on-chain move {}",
            payload.serialise()
        );
        let record = self
            .settled_record(&payload, move_ctr, round, None, false)
            .await?;
        self.moves.push(record.clone());
        self.emit(GameEvent::MoveFinalized(record));
        self.after_counterparty_move(&payload);
        Ok(())
    }

    async fn settled_record(
        &self,
        payload: &Payload,
        move_ctr: U256,
        round: U256,
        attack_sig: Option<ethers::types::Bytes>,
        proposed: bool,
    ) -> Result<MoveRecord, ProtocolError> {
        let hash_state = read("getState", self.on_chain.get_state(self.config.state_nonce)).await?;
        let channel_sig = self.sign(hash_state).await?;
        let (x, y) = payload.cell();
        Ok(MoveRecord {
            kind: payload.kind(),
            x,
            y,
            move_ctr,
            round,
            state_round: self.channel_round,
            hash_state,
            channel_sig,
            counterparty_channel_sig: None,
            attack_sig,
            reveal: payload.reveal(),
            proposed,
            settled_on_chain: true,
        })
    }
}
