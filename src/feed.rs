//! Order Feed: the external transport that announces orders. Modeled as a trait so the core never
//! depends on a concrete protocol — an `async fn run` that pushes events onto a channel, mirroring
//! how `signet-filler`'s `FillerTask` never embeds a transport either, instead depending on
//! injected providers.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::order::Order;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("feed connection failed: {0}")]
    Connection(#[source] eyre::Error),
    #[error("feed protocol error: {0}")]
    Protocol(String),
}

/// Consumed order-announcement transport. `run` takes `self` by value since a feed is driven
/// exactly once for the life of the process.
///
/// Every announcement is a full [`Order`] — `status`/`finalization_info` are order fields, not
/// separate event payloads — so the dispatcher that owns the `ChainRegistry` resolves
/// `order.take_chain_id()` into the right per-chain pipeline channel and, for `Created` /
/// `ArchivalCreated`, builds the `IncomingOrderContext` that channel expects.
#[async_trait]
pub trait OrderFeed: Send {
    async fn run(self: Box<Self>, sink: mpsc::Sender<Order>) -> Result<(), FeedError>;
}
