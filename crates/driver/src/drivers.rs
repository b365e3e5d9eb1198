//! The `drivers` module contains implementations of the [Driver] trait.

use crate::{types::Inbound, Driver, Player};
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// The [PlayerDriver] runs one [Player]'s state loop, consuming local requests and counterparty
/// messages from a single inbox so the player is only ever touched by one event at a time.
pub struct PlayerDriver {
    /// The player driven by this loop.
    pub player: Player,
    inbox: mpsc::Receiver<Inbound>,
}

impl PlayerDriver {
    /// Creates a new [PlayerDriver] consuming `inbox`.
    pub fn new(player: Player, inbox: mpsc::Receiver<Inbound>) -> Self {
        Self { player, inbox }
    }
}

#[async_trait]
impl Driver for PlayerDriver {
    async fn start(mut self) -> Result<()> {
        tracing::info!(target: "player-driver", "Starting player driver for {:?}...", self.player.address());

        while let Some(inbound) = self.inbox.recv().await {
            let result = match inbound {
                Inbound::ReadyToPlay => self.player.ready_to_play().await,
                Inbound::Lock(address) => self.player.lock(address).await,
                Inbound::Message(message) => self.player.handle(message).await,
            };
            if let Err(e) = result {
                // Soft failure, log the error and continue. A stalled channel is reported to the
                // game layer by the player itself.
                tracing::error!(target: "player-driver", "Error handling inbound event: {}", e);
            }
        }

        tracing::info!(target: "player-driver", "Inbox closed, stopping player driver.");
        Ok(())
    }
}
