//! The `config` module contains the [DriverConfig].

use ethers::types::{Address, U256};

/// The gas limit for applying a single move.
pub const DEFAULT_MOVE_GAS: u64 = 300_000;

/// The gas limit for locking or unlocking a battleship contract.
pub const DEFAULT_LOCK_GAS: u64 = 13_000_000;

/// The nonce passed to `getState` when hashing the game state for a channel update.
pub const DEFAULT_STATE_NONCE: u64 = 1;

/// The nonce passed to `getState` when hashing the on-chain state that seeds an off-chain mirror.
pub const DEFAULT_STATE_SIG_NONCE: u64 = 137;

/// The [DriverConfig] struct contains the per-player configuration of the channel protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// The address of the counterparty. Every signature received is checked against it.
    pub counterparty: Address,
    /// Whether the local player attacks first.
    pub goes_first: bool,
    /// The number of ships in each fleet. Sinking this many ends the game.
    pub ship_count: usize,
    /// The gas limit for move calls.
    pub move_gas: u64,
    /// The gas limit for lock and unlock calls.
    pub lock_gas: u64,
    /// The nonce used for channel state hashes.
    pub state_nonce: U256,
    /// The nonce used for the state that seeds the off-chain mirrors.
    pub state_sig_nonce: U256,
}

impl DriverConfig {
    /// Creates a new [DriverConfig] with the default gas limits and nonces.
    pub fn new(counterparty: Address, goes_first: bool, ship_count: usize) -> Self {
        Self {
            counterparty,
            goes_first,
            ship_count,
            move_gas: DEFAULT_MOVE_GAS,
            lock_gas: DEFAULT_LOCK_GAS,
            state_nonce: U256::from(DEFAULT_STATE_NONCE),
            state_sig_nonce: U256::from(DEFAULT_STATE_SIG_NONCE),
        }
    }

    /// Overrides the gas limits.
    pub fn with_gas(mut self, move_gas: u64, lock_gas: u64) -> Self {
        self.move_gas = move_gas;
        self.lock_gas = lock_gas;
        self
    }
}
