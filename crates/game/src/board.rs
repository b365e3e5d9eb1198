//! The board module holds the local, off-protocol bookkeeping of a player's own fleet: where the
//! ships are, which cells have been hit and which ships have sunk. It is what a player consults
//! to answer an attack; the protocol only ever sees the resulting [Payload].

use crate::{
    codec::ship_commitment,
    updates::{Payload, RevealSlot, RevealSunk, ShipGeometry},
    Reveal,
};
use anyhow::{anyhow, ensure, Result};
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The ship sizes of a standard fleet.
pub const DEFAULT_SHIP_SIZES: [u8; 5] = [5, 4, 3, 3, 2];

/// The side length of a standard board.
pub const DEFAULT_BOARD_SIZE: u8 = 10;

/// A single ship: its end cells, its salt and the number of distinct hits it has taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ship {
    pub x1: u8,
    pub y1: u8,
    pub x2: u8,
    pub y2: u8,
    pub r: U256,
    pub hits: u8,
}

impl Ship {
    /// Creates a ship spanning `(x1, y1)..=(x2, y2)`. Ships are horizontal or vertical.
    pub fn new(x1: u8, y1: u8, x2: u8, y2: u8, r: U256) -> Result<Self> {
        ensure!(
            x1 == x2 || y1 == y2,
            "Ship ({},{})-({},{}) is neither horizontal nor vertical",
            x1,
            y1,
            x2,
            y2
        );
        Ok(Self {
            x1,
            y1,
            x2,
            y2,
            r,
            hits: 0,
        })
    }

    /// The number of cells the ship occupies.
    pub fn size(&self) -> u8 {
        self.x1.abs_diff(self.x2) + self.y1.abs_diff(self.y2) + 1
    }

    /// Whether every cell of the ship has been hit.
    pub fn is_sunk(&self) -> bool {
        self.hits >= self.size()
    }

    /// The cells covered by the ship.
    pub fn cells(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
        let (xs, ys) = (
            self.x1.min(self.x2)..=self.x1.max(self.x2),
            self.y1.min(self.y2)..=self.y1.max(self.y2),
        );
        xs.flat_map(move |x| ys.clone().map(move |y| (x, y)))
    }

    /// The revealed geometry of the ship at `index` in its owner's fleet.
    pub fn geometry(&self, index: usize) -> ShipGeometry {
        ShipGeometry {
            x1: self.x1,
            y1: self.y1,
            x2: self.x2,
            y2: self.y2,
            r: self.r,
            ship_index: index as u64,
        }
    }

    /// The commitment published for this ship.
    pub fn commitment(&self, owner: Address, round: U256, game_address: Address) -> H256 {
        ship_commitment(
            self.x1,
            self.y1,
            self.x2,
            self.y2,
            self.r,
            owner,
            round,
            game_address,
        )
    }
}

/// The outcome of an attack against a [Board].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Miss,
    Hit,
    Sunk { ship_index: usize },
}

/// A player's own board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    pub size: u8,
    pub ships: Vec<Ship>,
    attacked: HashSet<(u8, u8)>,
}

impl Board {
    /// Creates a board from a fleet, rejecting ships that leave the board or overlap.
    pub fn new(size: u8, ships: Vec<Ship>) -> Result<Self> {
        let mut occupied = HashSet::new();
        for (index, ship) in ships.iter().enumerate() {
            for (x, y) in ship.cells() {
                ensure!(x < size && y < size, "Ship {} leaves the board", index);
                ensure!(occupied.insert((x, y)), "Ship {} overlaps at ({},{})", index, x, y);
            }
        }
        Ok(Self {
            size,
            ships,
            attacked: HashSet::new(),
        })
    }

    /// Lays out `sizes` one ship per row from the top-left corner, each ship starting at
    /// column 0. `salts` supplies the commitment salt of each ship.
    pub fn stacked(size: u8, sizes: &[u8], salts: &[U256]) -> Result<Self> {
        ensure!(salts.len() == sizes.len(), "Expected one salt per ship");
        let ships = sizes
            .iter()
            .zip(salts)
            .enumerate()
            .map(|(row, (len, salt))| {
                ensure!(*len > 0, "Ship {} has no cells", row);
                Ship::new(0, row as u8, len - 1, row as u8, *salt)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(size, ships)
    }

    /// Answers an attack at `(x, y)`. A repeated attack on the same cell is rejected.
    pub fn receive_attack(&mut self, x: u8, y: u8) -> Result<Outcome> {
        ensure!(x < self.size && y < self.size, "Attack ({},{}) is off the board", x, y);
        ensure!(self.attacked.insert((x, y)), "Cell ({},{}) already attacked", x, y);

        let Some((index, ship)) = self
            .ships
            .iter_mut()
            .enumerate()
            .find(|(_, ship)| ship.cells().any(|cell| cell == (x, y)))
        else {
            return Ok(Outcome::Miss);
        };

        ship.hits += 1;
        if ship.is_sunk() {
            Ok(Outcome::Sunk { ship_index: index })
        } else {
            Ok(Outcome::Hit)
        }
    }

    /// Answers an attack and renders the answer as the reveal payload to propose.
    pub fn reveal(&mut self, x: u8, y: u8) -> Result<Payload> {
        Ok(match self.receive_attack(x, y)? {
            Outcome::Miss => Payload::RevealSlot(RevealSlot {
                x,
                y,
                reveal: Reveal::Miss,
            }),
            Outcome::Hit => Payload::RevealSlot(RevealSlot {
                x,
                y,
                reveal: Reveal::Hit,
            }),
            Outcome::Sunk { ship_index } => Payload::RevealSunk(RevealSunk {
                x,
                y,
                ship: self
                    .ships
                    .get(ship_index)
                    .ok_or(anyhow!("Invalid ship index"))?
                    .geometry(ship_index),
            }),
        })
    }

    /// The number of sunk ships.
    pub fn sunk(&self) -> usize {
        self.ships.iter().filter(|ship| ship.is_sunk()).count()
    }

    /// Whether the whole fleet has been sunk.
    pub fn all_sunk(&self) -> bool {
        self.sunk() == self.ships.len()
    }

    /// The commitments of the fleet, in ship order.
    pub fn commitments(&self, owner: Address, round: U256, game_address: Address) -> Vec<H256> {
        self.ships
            .iter()
            .map(|ship| ship.commitment(owner, round, game_address))
            .collect()
    }
}

/// Every cell of the `side` x `side` square at the top-left of the board, in row-major order.
pub fn row_major(side: u8) -> impl Iterator<Item = (u8, u8)> {
    (0..side).flat_map(move |y| (0..side).map(move |x| (x, y)))
}
