//! The `router` module dispatches incoming messages by message kind and the local player's
//! stage. State update messages are only accepted in the stages listed in [DISPATCH_TABLE];
//! lifecycle messages are always accepted.

use crate::{
    errors::ProtocolError,
    player::Player,
    types::{PlayerStage, ProtocolMessage, WireMessage},
};
use tracing::Instrument;

/// The kinds of state update message the router dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Propose,
    Verify,
    Acknowledge,
    OnChainMove,
}

impl Route {
    /// The route of `message`.
    pub fn of(message: &ProtocolMessage) -> Self {
        match message {
            ProtocolMessage::ProposeStateUpdate { .. } => Route::Propose,
            ProtocolMessage::VerifyStateUpdate { .. } => Route::Verify,
            ProtocolMessage::AcknowledgeStateUpdate { .. } => Route::Acknowledge,
            ProtocolMessage::OnChainMove { .. } => Route::OnChainMove,
        }
    }
}

/// The handler a message is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    OnChainPropose,
    OnChainObserve,
    ChannelPropose,
    ChannelVerify,
    ChannelAcknowledge,
}

/// Which handler serves which route in which stage.
pub const DISPATCH_TABLE: &[(Route, PlayerStage, Handler)] = &[
    (Route::Propose, PlayerStage::ReadyToPlay, Handler::OnChainPropose),
    (Route::OnChainMove, PlayerStage::ReadyToPlay, Handler::OnChainObserve),
    (Route::Propose, PlayerStage::ReadyToPlayOffChain, Handler::ChannelPropose),
    (Route::Verify, PlayerStage::ReadyToPlayOffChain, Handler::ChannelVerify),
    (Route::Acknowledge, PlayerStage::ReadyToPlayOffChain, Handler::ChannelAcknowledge),
];

/// Looks up the handler for `route` in `stage`.
pub fn route(route: Route, stage: PlayerStage) -> Result<Handler, ProtocolError> {
    DISPATCH_TABLE
        .iter()
        .find(|(r, s, _)| *r == route && *s == stage)
        .map(|(_, _, handler)| *handler)
        .ok_or(ProtocolError::InvalidPlayerStage(stage))
}

impl Player {
    /// Handles one message, either a local move request or a message from the counterparty.
    pub async fn handle(&mut self, message: WireMessage) -> Result<(), ProtocolError> {
        let span = self.span.clone();
        async move {
            match message {
                WireMessage::Update(message) => self.handle_update(message).await,
                WireMessage::Lifecycle(message) => self.handle_lifecycle(message).await,
            }
        }
        .instrument(span)
        .await
    }

    async fn handle_update(&mut self, message: ProtocolMessage) -> Result<(), ProtocolError> {
        let route_of = Route::of(&message);
        let handler = route(route_of, self.stage)?;
        tracing::debug!(
            target: "stage-router",
            "{:?} {} in stage {:?} -> {:?}",
            route_of,
            message.move_kind(),
            self.stage,
            handler
        );

        let result = match message {
            ProtocolMessage::ProposeStateUpdate { payload } => match handler {
                Handler::OnChainPropose => self.propose_on_chain(payload).await,
                _ => self.propose(payload).await,
            },
            ProtocolMessage::OnChainMove { payload, move_ctr } => {
                self.observe_on_chain(payload, move_ctr).await
            }
            ProtocolMessage::VerifyStateUpdate {
                update,
                move_ctr,
                round,
            } => self.verify(update, move_ctr, round).await,
            ProtocolMessage::AcknowledgeStateUpdate { update } => self.acknowledge(update).await,
        };

        if let Err(err) = &result {
            // A local proposal that failed before changing any state leaves the status idle.
            let retryable = route_of == Route::Propose && self.status.is_idle();
            if err.stalls_channel() && !retryable {
                self.stall(err);
            } else {
                tracing::warn!(target: "stage-router", "Rejected {:?}: {}", route_of, err);
            }
        }
        result
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn none_stage_rejects_everything() {
        for r in [Route::Propose, Route::Verify, Route::Acknowledge, Route::OnChainMove] {
            assert!(matches!(
                route(r, PlayerStage::None),
                Err(ProtocolError::InvalidPlayerStage(PlayerStage::None))
            ));
        }
    }

    #[test]
    fn propose_depends_on_stage() {
        assert_eq!(
            route(Route::Propose, PlayerStage::ReadyToPlay).unwrap(),
            Handler::OnChainPropose
        );
        assert_eq!(
            route(Route::Propose, PlayerStage::ReadyToPlayOffChain).unwrap(),
            Handler::ChannelPropose
        );
    }

    #[test]
    fn channel_messages_need_off_chain_stage() {
        assert!(matches!(
            route(Route::Verify, PlayerStage::ReadyToPlay),
            Err(ProtocolError::InvalidPlayerStage(PlayerStage::ReadyToPlay))
        ));
        assert!(matches!(
            route(Route::OnChainMove, PlayerStage::ReadyToPlayOffChain),
            Err(ProtocolError::InvalidPlayerStage(PlayerStage::ReadyToPlayOffChain))
        ));
        assert_eq!(
            route(Route::Acknowledge, PlayerStage::ReadyToPlayOffChain).unwrap(),
            Handler::ChannelAcknowledge
        );
    }
}
