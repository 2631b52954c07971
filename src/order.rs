//! Order data model: the immutable facts the feed hands the pipeline about a single cross-chain
//! swap order, plus the per-order runtime context threaded through processing.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::registry::ChainEntry;

/// Opaque 32-byte order identifier, as announced by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub [u8; 32]);

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "0x{}", alloy::hex::encode(self.0))
    }
}

/// One side of an order: a token amount on a given chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetAmount {
    pub chain_id: u64,
    pub token: Address,
    pub amount: U256,
}

/// Feed-supplied lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Created,
    ArchivalCreated,
    Fulfilled,
    ArchivalFulfilled,
    Cancelled,
    Other,
}

/// Feed-supplied attestation level for a `Created` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizationInfo {
    /// Reorged out; the order must be dropped without further on-chain checks.
    Revoked,
    /// Speculative: announced with `confirmation_blocks_count` confirmations so far.
    Confirmed { confirmation_blocks_count: u64 },
    /// Safe to treat as settled.
    Finalized,
}

/// An order as observed from the feed. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub order_id: OrderId,
    pub give: AssetAmount,
    pub take: AssetAmount,
    pub receiver: Address,
    pub maker: Address,
    pub status: OrderStatus,
    /// Only meaningful when `status` is `Created` or `ArchivalCreated`.
    pub finalization_info: Option<FinalizationInfo>,
}

impl Order {
    /// The take-chain id this order is processed against.
    pub fn take_chain_id(&self) -> u64 {
        self.take.chain_id
    }

    /// The give-chain id this order's collateral is locked on.
    pub fn give_chain_id(&self) -> u64 {
        self.give.chain_id
    }
}

/// An order bundled with the runtime context needed to process it.
///
/// Holds no back-reference to the pipeline or executor — every collaborator is reached through
/// the `give_chain`/`take_chain` registry handles, which are themselves plain `Arc<ChainEntry>`
/// shares, not owning references into a larger service struct.
#[derive(Debug, Clone)]
pub struct IncomingOrderContext {
    pub order: Order,
    pub give_chain: Arc<ChainEntry>,
    pub take_chain: Arc<ChainEntry>,
    /// Number of times this order has been re-delivered via the mempool scheduler.
    pub attempts: u32,
}

impl IncomingOrderContext {
    pub fn order_id(&self) -> OrderId {
        self.order.order_id
    }
}
