//! The state channel side of the battleship game: the propose/verify/acknowledge update protocol,
//! the setup lifecycle that moves a game from its on-chain contract into the channel, and the
//! [PlayerDriver] that runs one party's state loop.

use anyhow::Result;
use async_trait::async_trait;

/// Contains the smart contract bindings used by the driver.
mod bindings;

mod config;
pub use config::*;

pub mod contract;
pub use contract::{BattleshipContract, ContractDeployer, EthersBattleship, Receipt};

mod errors;
pub use errors::ProtocolError;

mod drivers;
pub use drivers::PlayerDriver;

mod player;
pub use player::{Collaborators, Player};

pub mod router;
pub mod sim;
pub mod transport;
pub mod types;

mod lifecycle;
mod onchain;
mod protocol;

/// The [Driver] trait defines the interface for all driver loops that are ran by the
/// `sc-battleship` binary.
#[async_trait]
pub trait Driver: Send + Sized {
    /// Starts the [Driver] loop.
    async fn start(self) -> Result<()>;
}
