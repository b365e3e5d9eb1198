//! Pure game-side building blocks for the state channel battleship game: canonical move hashing,
//! signing and recovery, the state update variants exchanged between the two parties, and the
//! local board bookkeeping used to answer attacks.

pub mod board;
pub mod codec;
pub mod signer;
pub mod updates;
pub use updates::StateUpdate;

mod types;
pub use types::*;
