//! Filter Pipeline: a pure admission test composed from three filter lists.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;

use crate::order::IncomingOrderContext;

/// A single admission predicate. Implementations must not skip observable side effects based on
/// whether an earlier filter already rejected the order — the pipeline always runs every filter
/// rather than short-circuiting.
#[async_trait]
pub trait Filter: Send + Sync + fmt::Debug {
    async fn admit(&self, ctx: &IncomingOrderContext) -> bool;
}

/// A filter that always returns a fixed verdict. Used to implement the `disabled`-chain blanket
/// deny-destination filter.
#[derive(Debug)]
pub struct StaticFilter {
    pub admit: bool,
    pub label: &'static str,
}

#[async_trait]
impl Filter for StaticFilter {
    async fn admit(&self, _ctx: &IncomingOrderContext) -> bool {
        self.admit
    }
}

/// Builds the blanket deny-destination filter installed for a `disabled` chain.
pub fn disabled_chain_filter() -> Arc<dyn Filter> {
    Arc::new(StaticFilter { admit: false, label: "disabled-chain-deny" })
}

/// Composes the global, destination-side, and source-side filter lists.
#[derive(Debug, Clone, Default)]
pub struct FilterPipeline {
    global: Vec<Arc<dyn Filter>>,
    dst: Vec<Arc<dyn Filter>>,
    src: Vec<Arc<dyn Filter>>,
}

impl FilterPipeline {
    pub fn new(global: Vec<Arc<dyn Filter>>, dst: Vec<Arc<dyn Filter>>, src: Vec<Arc<dyn Filter>>) -> Self {
        Self { global, dst, src }
    }

    /// Run every filter concurrently and admit iff all returned true. Every filter always runs,
    /// in keeping with the no-short-circuit requirement.
    pub async fn admit(&self, ctx: &IncomingOrderContext) -> bool {
        let futures = self
            .global
            .iter()
            .chain(self.dst.iter())
            .chain(self.src.iter())
            .map(|filter| filter.admit(ctx));
        join_all(futures).await.into_iter().all(|admitted| admitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{AssetAmount, Order, OrderId, OrderStatus};
    use crate::registry::ChainEngine;
    use alloy::primitives::Address;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct CountingFilter {
        verdict: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Filter for CountingFilter {
        async fn admit(&self, _ctx: &IncomingOrderContext) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.verdict
        }
    }

    fn test_ctx() -> IncomingOrderContext {
        let order = Order {
            order_id: OrderId([0; 32]),
            give: AssetAmount { chain_id: 1, token: Address::ZERO, amount: alloy::primitives::U256::ZERO },
            take: AssetAmount { chain_id: 2, token: Address::ZERO, amount: alloy::primitives::U256::ZERO },
            receiver: Address::ZERO,
            maker: Address::ZERO,
            status: OrderStatus::Created,
            finalization_info: None,
        };
        let chain = crate::tests_support::dummy_chain_entry(1, ChainEngine::Evm);
        let take_chain = crate::tests_support::dummy_chain_entry(2, ChainEngine::Evm);
        IncomingOrderContext {
            order,
            give_chain: Arc::new(chain),
            take_chain: Arc::new(take_chain),
            attempts: 0,
        }
    }

    #[tokio::test]
    async fn admits_only_when_every_filter_admits() {
        let ctx = test_ctx();
        let all_true = FilterPipeline::new(
            vec![Arc::new(StaticFilter { admit: true, label: "g" })],
            vec![Arc::new(StaticFilter { admit: true, label: "d" })],
            vec![Arc::new(StaticFilter { admit: true, label: "s" })],
        );
        assert!(all_true.admit(&ctx).await);

        let one_false = FilterPipeline::new(
            vec![Arc::new(StaticFilter { admit: true, label: "g" })],
            vec![Arc::new(StaticFilter { admit: false, label: "d" })],
            vec![Arc::new(StaticFilter { admit: true, label: "s" })],
        );
        assert!(!one_false.admit(&ctx).await);
    }

    #[tokio::test]
    async fn every_filter_runs_even_after_a_rejection() {
        let ctx = test_ctx();
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = FilterPipeline::new(
            vec![Arc::new(CountingFilter { verdict: false, calls: calls.clone() })],
            vec![Arc::new(CountingFilter { verdict: true, calls: calls.clone() })],
            vec![Arc::new(CountingFilter { verdict: true, calls: calls.clone() })],
        );
        assert!(!pipeline.admit(&ctx).await);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn disabled_chain_filter_always_denies() {
        let ctx = test_ctx();
        assert!(!disabled_chain_filter().admit(&ctx).await);
    }
}
