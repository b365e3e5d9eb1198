//! The `transport` module defines how messages reach the counterparty. Delivery is assumed to be
//! ordered and reliable; the protocol never waits on the counterparty's reply inside a send.

use crate::types::{Inbound, WireMessage};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::{collections::VecDeque, sync::Arc};
use tokio::sync::{mpsc, Mutex};

/// The [Transport] trait is the fire-and-forget link to the counterparty.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Hands `message` to the link. Returns once the message is dispatched.
    async fn send_to_counterparty(&self, message: WireMessage) -> Result<()>;
}

/// A [Transport] that feeds the counterparty's [PlayerDriver](crate::PlayerDriver) inbox.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    sender: mpsc::Sender<Inbound>,
}

impl ChannelTransport {
    /// Creates a new [ChannelTransport] delivering into `sender`.
    pub fn new(sender: mpsc::Sender<Inbound>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send_to_counterparty(&self, message: WireMessage) -> Result<()> {
        self.sender
            .send(Inbound::Message(message))
            .await
            .map_err(|_| anyhow!("Counterparty inbox closed"))
    }
}

/// A [Transport] that queues messages until they are explicitly delivered, used to step two
/// parties deterministically.
#[derive(Debug, Clone, Default)]
pub struct QueueTransport {
    queue: Arc<Mutex<VecDeque<WireMessage>>>,
}

impl QueueTransport {
    /// Creates a new, empty [QueueTransport].
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the oldest undelivered message.
    pub async fn pop(&self) -> Option<WireMessage> {
        self.queue.lock().await.pop_front()
    }

    /// Puts a message back at the front of the queue.
    pub async fn push_front(&self, message: WireMessage) {
        self.queue.lock().await.push_front(message);
    }

    /// The number of undelivered messages.
    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Whether every message has been delivered.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Transport for QueueTransport {
    async fn send_to_counterparty(&self, message: WireMessage) -> Result<()> {
        self.queue.lock().await.push_back(message);
        Ok(())
    }
}
