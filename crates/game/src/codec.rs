//! The codec module holds the canonical hashes signed by both parties. Every hash is the
//! keccak256 of a Solidity tightly-packed (`abi.encodePacked`) encoding, so each field keeps the
//! exact width the contracts hash with: `uint8` is one byte, `uint256` is 32 big-endian bytes,
//! `bool` is one byte, `address` is 20 bytes and `bytes32` is 32 bytes.

use ethers::{
    types::{Address, H256, U256},
    utils::keccak256,
};

/// The domain separation prefix prepended to a 32 byte hash before it is signed.
pub const SIGNED_MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n32";

/// The literal tag hashed into every lock message.
pub const LOCK_TAG: &str = "lock";

/// A tightly-packed encoder. Fields are appended in order with no padding and no length
/// prefixes.
#[derive(Debug, Default, Clone)]
pub struct Packed(Vec<u8>);

impl Packed {
    /// Creates an empty encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a `uint8`.
    pub fn uint8(mut self, value: u8) -> Self {
        self.0.push(value);
        self
    }

    /// Appends a `bool` as a single byte.
    pub fn boolean(mut self, value: bool) -> Self {
        self.0.push(value as u8);
        self
    }

    /// Appends a `uint256` as 32 big-endian bytes.
    pub fn uint256(mut self, value: U256) -> Self {
        let mut word = [0u8; 32];
        value.to_big_endian(&mut word);
        self.0.extend_from_slice(&word);
        self
    }

    /// Appends a 20 byte `address`.
    pub fn address(mut self, value: Address) -> Self {
        self.0.extend_from_slice(value.as_bytes());
        self
    }

    /// Appends a `bytes32`.
    pub fn bytes32(mut self, value: H256) -> Self {
        self.0.extend_from_slice(value.as_bytes());
        self
    }

    /// Appends the raw UTF-8 bytes of a `string`.
    pub fn string(mut self, value: &str) -> Self {
        self.0.extend_from_slice(value.as_bytes());
        self
    }

    /// Returns the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hashes the encoded bytes with keccak256.
    pub fn keccak(&self) -> H256 {
        H256::from(keccak256(&self.0))
    }
}

/// Applies the signed-message prefix to a hash. Signing and recovery both operate on the
/// prefixed hash.
pub fn hash_with_prefix(hash: H256) -> H256 {
    Packed::new()
        .string(SIGNED_MESSAGE_PREFIX)
        .bytes32(hash)
        .keccak()
}

/// Binds a contract state hash to a contract address.
pub fn hash_with_address(hash: H256, address: Address) -> H256 {
    Packed::new().bytes32(hash).address(address).keccak()
}

/// Binds a state hash to a state channel round and the channel contract address. The result
/// is the artifact both parties sign for every update.
///
/// ### Takes
/// - `state_hash`: The state hash, already bound to the on-chain battleship address.
/// - `round`: The state channel round the update belongs to.
/// - `channel_address`: The address of the state channel contract.
pub fn hash_channel_state(state_hash: H256, round: U256, channel_address: Address) -> H256 {
    Packed::new()
        .bytes32(state_hash)
        .uint256(round)
        .address(channel_address)
        .keccak()
}

/// The hash both parties sign to lock a battleship contract.
pub fn hash_lock(channel_counter: U256, round: U256, contract_address: Address) -> H256 {
    Packed::new()
        .string(LOCK_TAG)
        .uint256(channel_counter)
        .uint256(round)
        .address(contract_address)
        .keccak()
}

/// The commitment a player publishes for one of its ships. It binds the ship geometry and
/// its salt `r` to the owner, the game round and the on-chain game address.
#[allow(clippy::too_many_arguments)]
pub fn ship_commitment(
    x1: u8,
    y1: u8,
    x2: u8,
    y2: u8,
    r: U256,
    owner: Address,
    round: U256,
    game_address: Address,
) -> H256 {
    Packed::new()
        .uint8(x1)
        .uint8(y1)
        .uint8(x2)
        .uint8(y2)
        .uint256(r)
        .address(owner)
        .uint256(round)
        .address(game_address)
        .keccak()
}
