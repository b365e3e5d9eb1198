//! The `contract` module defines the [BattleshipContract] collaborator, the surface the protocol
//! needs from a battleship contract, whether that is the on-chain game or an off-chain mirror.

use crate::bindings::BattleShipWithoutBoard;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::{
    providers::Middleware,
    types::{Address, H256, U256},
};
use sc_battleship_game::MethodCall;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The [Receipt] of a confirmed state-changing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// The contract method that was called.
    pub method: String,
    /// The hash of the transaction that carried the call.
    pub tx_hash: H256,
    /// The gas used by the call, when the backend reports it.
    pub gas_used: Option<U256>,
}

/// The [BattleshipContract] trait is the minimum read/write surface of a battleship contract.
/// Reads never change state. [BattleshipContract::send] blocks until the call is confirmed and
/// fails if it reverts.
#[async_trait]
pub trait BattleshipContract: Send + Sync {
    /// The address of the contract.
    fn address(&self) -> Address;

    /// The number of moves applied so far.
    async fn move_ctr(&self) -> Result<U256>;

    /// The current game round.
    async fn round(&self) -> Result<U256>;

    /// The number of times the contract has been locked into a channel.
    async fn channel_counter(&self) -> Result<U256>;

    /// The address of the state channel contract governing this game.
    async fn state_channel(&self) -> Result<Address>;

    /// The hash of the current game state, salted with `nonce`.
    async fn get_state(&self, nonce: U256) -> Result<H256>;

    /// Submits a state-changing call from `from` with the given gas limit.
    async fn send(&self, call: MethodCall, from: Address, gas: u64) -> Result<Receipt>;
}

/// The [ContractDeployer] trait instantiates the off-chain mirror of an on-chain game.
#[async_trait]
pub trait ContractDeployer: Send + Sync {
    /// Deploys a mirror of `on_chain` owned by `owner`, played against `counterparty`.
    async fn deploy_off_chain(
        &self,
        owner: Address,
        counterparty: Address,
        on_chain: Address,
    ) -> Result<Arc<dyn BattleshipContract>>;
}

/// A [BattleshipContract] backed by a deployed contract reached through an ethers [Middleware].
#[derive(Debug, Clone)]
pub struct EthersBattleship<M> {
    contract: BattleShipWithoutBoard<M>,
}

impl<M: Middleware + 'static> EthersBattleship<M> {
    /// Creates a new [EthersBattleship] for the contract at `address`.
    pub fn new(address: Address, client: Arc<M>) -> Self {
        Self {
            contract: BattleShipWithoutBoard::new(address, client),
        }
    }
}

#[async_trait]
impl<M: Middleware + 'static> BattleshipContract for EthersBattleship<M> {
    fn address(&self) -> Address {
        self.contract.address()
    }

    async fn move_ctr(&self) -> Result<U256> {
        Ok(self.contract.move_ctr().call().await?)
    }

    async fn round(&self) -> Result<U256> {
        Ok(self.contract.round().call().await?)
    }

    async fn channel_counter(&self) -> Result<U256> {
        Ok(self.contract.channel_counter().call().await?)
    }

    async fn state_channel(&self) -> Result<Address> {
        Ok(self.contract.state_channel().call().await?)
    }

    async fn get_state(&self, nonce: U256) -> Result<H256> {
        Ok(H256::from(self.contract.get_state(nonce).call().await?))
    }

    async fn send(&self, call: MethodCall, from: Address, gas: u64) -> Result<Receipt> {
        let method = call.method();
        let prepared = match call {
            MethodCall::Attack { x, y, signature } => self.contract.attack(x, y, signature),
            MethodCall::RevealSlot { hit, signature } => self.contract.revealslot(hit, signature),
            MethodCall::RevealSunk {
                ship_index,
                x1,
                y1,
                x2,
                y2,
                r,
                signature,
            } => self
                .contract
                .revealsunk(ship_index, x1, y1, x2, y2, r, signature),
            MethodCall::Lock { signatures } => self.contract.lock(signatures),
            MethodCall::Unlock { nonce, signatures } => self.contract.unlock(nonce, signatures),
        }
        .from(from)
        .gas(gas);

        let pending = prepared.send().await?;
        let tx_hash = pending.tx_hash();
        tracing::debug!(target: "battleship-contract", "Sent `{}` in tx {:?}, awaiting confirmation.", method, tx_hash);

        let receipt = pending
            .await?
            .ok_or(anyhow!("Transaction {:?} was dropped from the mempool", tx_hash))?;
        if receipt.status == Some(0u64.into()) {
            return Err(anyhow!("Call to `{}` reverted in tx {:?}", method, tx_hash));
        }

        Ok(Receipt {
            method: method.to_string(),
            tx_hash,
            gas_used: receipt.gas_used,
        })
    }
}
