//! Dispatcher: resolves each feed-announced [`Order`] to its take-chain's pipeline and forwards
//! it as a [`PipelineEvent`]. Mirrors `signet-filler`'s `FillerTask::run_loop`, which is similarly
//! the single place that turns a raw feed event into pipeline work.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::order::{IncomingOrderContext, Order, OrderStatus};
use crate::pipeline::PipelineEvent;
use crate::registry::ChainRegistry;

/// Runs until the feed's sink channel closes, routing every order to its take-chain's pipeline
/// channel. Orders for an unconfigured take-chain are logged and dropped rather than treated as
/// fatal for the whole feed.
pub async fn run(
    registry: Arc<ChainRegistry>,
    mut orders: mpsc::Receiver<Order>,
    pipelines: HashMap<u64, mpsc::Sender<PipelineEvent>>,
) {
    while let Some(order) = orders.recv().await {
        let order_id = order.order_id;
        let Some(sender) = pipelines.get(&order.take_chain_id()) else {
            warn!(%order_id, take_chain_id = order.take_chain_id(), "order references an unconfigured take chain");
            continue;
        };

        let event = match order.status {
            OrderStatus::Created | OrderStatus::ArchivalCreated => {
                let (Ok(give_chain), Ok(take_chain)) =
                    (registry.get(order.give_chain_id()), registry.get(order.take_chain_id()))
                else {
                    warn!(%order_id, "order references an unconfigured give chain");
                    continue;
                };
                let ctx = IncomingOrderContext { order: order.clone(), give_chain, take_chain, attempts: 0 };
                if order.status == OrderStatus::Created {
                    PipelineEvent::Created(ctx)
                } else {
                    PipelineEvent::ArchivalCreated(ctx)
                }
            }
            OrderStatus::Fulfilled => PipelineEvent::Fulfilled(order_id),
            OrderStatus::ArchivalFulfilled => PipelineEvent::ArchivalFulfilled(order_id),
            OrderStatus::Cancelled => PipelineEvent::Cancelled(order_id),
            OrderStatus::Other => PipelineEvent::Other(order_id),
        };

        if sender.send(event).await.is_err() {
            debug!(%order_id, "pipeline channel closed, dropping order during shutdown");
        }
    }
}
