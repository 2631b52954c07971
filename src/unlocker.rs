//! Batch Unlocker: coalesces fulfilled orders by (give_chain, give_token) into amortized unlock
//! transactions.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::Address;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, info, instrument};

use crate::order::OrderId;
use crate::signer::{ChainSigner, SignedPayload, SignerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchKey {
    pub give_chain: u64,
    pub give_token: Address,
}

/// Builds the unlock transaction payload for a filled batch. Injected so the core never encodes
/// a concrete chain's calldata format — that's left to the wrappers that format/issue the actual
/// fulfill and unlock transactions.
#[async_trait]
pub trait UnlockTxBuilder: Send + Sync {
    async fn build(&self, key: BatchKey, orders: &[OrderId]) -> Result<SignedPayload, SignerError>;
}

struct BatchSlot {
    orders: Vec<OrderId>,
    size_limit: u8,
    opened_at: Instant,
}

impl BatchSlot {
    fn new(size_limit: u8) -> Self {
        Self { orders: Vec::new(), size_limit, opened_at: Instant::now() }
    }

    fn is_full(&self) -> bool {
        self.orders.len() >= self.size_limit as usize
    }
}

/// Accumulates fulfilled orders per (give_chain, give_token) and flushes a single unlock
/// transaction once a batch fills. No idle-flush timer (see DESIGN.md): a stalled partial batch is
/// surfaced only via [`BatchUnlocker::partial_batch_age_secs`].
pub struct BatchUnlocker {
    tx_builder: Arc<dyn UnlockTxBuilder>,
    slots: Mutex<HashMap<BatchKey, BatchSlot>>,
}

impl BatchUnlocker {
    pub fn new(tx_builder: Arc<dyn UnlockTxBuilder>) -> Self {
        Self { tx_builder, slots: Mutex::new(HashMap::new()) }
    }

    /// Enqueue a fulfilled order's unlock entry. If this fills the batch, builds and sends the
    /// unlock transaction via `unlock_signer`, in insertion order — the batch unlocker never
    /// reorders.
    #[instrument(skip(self, unlock_signer))]
    pub async fn enqueue(
        &self,
        key: BatchKey,
        order_id: OrderId,
        batch_unlock_size: u8,
        unlock_signer: &Arc<dyn ChainSigner>,
    ) {
        let orders_to_flush = {
            let mut slots = self.slots.lock().await;
            let slot = slots.entry(key).or_insert_with(|| BatchSlot::new(batch_unlock_size));
            slot.orders.push(order_id);
            if slot.is_full() {
                let flushed = std::mem::replace(slot, BatchSlot::new(batch_unlock_size)).orders;
                Some(flushed)
            } else {
                None
            }
        };

        let Some(orders) = orders_to_flush else { return };

        info!(?key, batch_size = orders.len(), "batch unlock size reached, flushing");
        match self.tx_builder.build(key, &orders).await {
            Ok(payload) => {
                let span = tracing::Span::current();
                match unlock_signer.send_transaction(payload, &span).await {
                    Ok(tx_hash) => {
                        info!(%tx_hash, ?key, "unlock transaction sent");
                        crate::metrics::record_unlock_transaction(crate::metrics::SendResult::Success);
                    }
                    Err(error) => {
                        error!(%error, ?key, ?orders, "unlock transaction send failed; orders remain pending for operator intervention");
                        crate::metrics::record_unlock_transaction(crate::metrics::SendResult::Failure);
                    }
                }
            }
            Err(error) => {
                error!(%error, ?key, ?orders, "unlock transaction build failed; orders remain pending for operator intervention");
                crate::metrics::record_unlock_transaction(crate::metrics::SendResult::Failure);
            }
        }
    }

    /// Age of the oldest open (non-full) batch for `key`, for the
    /// `batch_unlocker.partial_batch_age_seconds` gauge.
    pub async fn partial_batch_age_secs(&self, key: BatchKey) -> Option<u64> {
        let slots = self.slots.lock().await;
        slots.get(&key).map(|slot| slot.opened_at.elapsed().as_secs())
    }

    /// Age of every currently-open partial batch, for periodic gauge publication.
    pub async fn open_batch_ages(&self) -> Vec<(BatchKey, u64)> {
        let slots = self.slots.lock().await;
        slots.iter().map(|(key, slot)| (*key, slot.opened_at.elapsed().as_secs())).collect()
    }
}
