//! Order Pipeline: the heart. One instance per take-chain, run as a worker loop over an `mpsc`
//! channel — never recursion — enforcing single-slot in-flight processing with two priority
//! queues and routing recoverable failures to the mempool scheduler.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::bucket::TokensBucketSet;
use crate::confirmation;
use crate::filters::FilterPipeline;
use crate::error::{PipelineError, RecoveryAction};
use crate::executor::evm::GAS_BLOWOUT_FAST_TRACK_MAX_ATTEMPTS;
use crate::executor::{evm, ChainClient, FulfillOutcome, FulfillParams};
use crate::metrics::{self, RejectReason};
use crate::order::{FinalizationInfo, IncomingOrderContext, OrderId, OrderStatus};
use crate::price::{self, TokenPriceService};
use crate::profitability::{self, ProfitabilityError};
use crate::registry::ChainEngine;
use crate::signer::TokenId;
use crate::swap::SwapQuoteProvider;
use crate::unlocker::{BatchKey, BatchUnlocker};

/// Give-chain lock-record state for an order, as read from the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveChainOrderState {
    Created,
    Other,
}

/// On-chain order-state reads, independent of gas/broadcast concerns — kept separate from
/// [`crate::executor::evm::EvmChainClient`] / [`crate::executor::solana::SolanaChainClient`]
/// because both engines need the same two questions answered and neither engine-specific trait
/// should grow an unused method for it.
#[async_trait]
pub trait OrderStateClient: Send + Sync {
    async fn is_fulfilled_on_take_chain(&self, order_id: OrderId) -> Result<bool, eyre::Error>;
    async fn give_chain_state(&self, order_id: OrderId) -> Result<GiveChainOrderState, eyre::Error>;
}

/// Token decimals lookup, injected so the core never hardcodes a metadata table.
#[async_trait]
pub trait TokenDecimalsResolver: Send + Sync {
    async fn decimals(&self, chain_id: u64, token: TokenId) -> Result<u32, eyre::Error>;
}

fn decimal_from_u256(value: U256) -> Decimal {
    Decimal::from_str_exact(&value.to_string()).unwrap_or_default()
}

fn decimal_from_u128(value: u128) -> Decimal {
    Decimal::from_str_exact(&value.to_string()).unwrap_or_default()
}

/// Collaborators shared by every order this take-chain's pipeline processes, injected once at
/// construction — the order's context never holds this back; it's passed to `process_order`
/// explicitly on every call instead.
pub struct PipelineContext {
    pub buckets: Arc<TokensBucketSet>,
    pub price_service: Arc<dyn TokenPriceService>,
    pub swap: Arc<dyn SwapQuoteProvider>,
    pub order_state: Arc<dyn OrderStateClient>,
    pub decimals: Arc<dyn TokenDecimalsResolver>,
    pub chain_client: ChainClient,
    pub batch_unlocker: Arc<BatchUnlocker>,
    pub min_profitability_bps: u32,
    pub unlock_cost_usd: Decimal,
    pub confirmation_timeout: Duration,
}

/// Feed-originated events the pipeline reacts to via its `process(event)` entry point.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Created(IncomingOrderContext),
    ArchivalCreated(IncomingOrderContext),
    Fulfilled(OrderId),
    ArchivalFulfilled(OrderId),
    Cancelled(OrderId),
    Other(OrderId),
}

/// Per-take-chain pipeline state. Not `Clone`/`Send` across tasks by design — one instance owns
/// one Tokio task via [`Pipeline::run`].
pub struct Pipeline {
    incoming: HashMap<OrderId, IncomingOrderContext>,
    priority_q: VecDeque<OrderId>,
    secondary_q: VecDeque<OrderId>,
    pctx: PipelineContext,
    mempool: Arc<crate::mempool::MempoolScheduler>,
}

impl Pipeline {
    pub fn new(pctx: PipelineContext, mempool: Arc<crate::mempool::MempoolScheduler>) -> Self {
        Self {
            incoming: HashMap::new(),
            priority_q: VecDeque::new(),
            secondary_q: VecDeque::new(),
            pctx,
            mempool,
        }
    }

    /// Drive this take-chain's pipeline until cancelled. Feed events and mempool re-entries arrive
    /// over separate channels but both funnel into the same admit-then-drain path, so a re-entered
    /// order is handled the same way a fresh one is.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<PipelineEvent>,
        mut reentries: mpsc::Receiver<OrderId>,
        cancellation: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => break,
                maybe_event = events.recv() => match maybe_event {
                    Some(event) => self.on_event(event, &mut events).await,
                    None => break,
                },
                maybe_reentry = reentries.recv() => if let Some(order_id) = maybe_reentry {
                    self.process_reentry(order_id, &mut events).await
                },
            }
        }
    }

    /// Handle one event, then drain whatever else the channel is already holding before yielding
    /// back to the `select!` loop.
    async fn on_event(&mut self, event: PipelineEvent, events: &mut mpsc::Receiver<PipelineEvent>) {
        self.process(event).await;
        self.drain_queues(events).await;
    }

    #[instrument(skip(self, event))]
    async fn process(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::Created(ctx) | PipelineEvent::ArchivalCreated(ctx) => {
                // Admission filters run only for Created/ArchivalCreated; every filter always
                // runs, so this can't be folded into the later pipeline stages without losing
                // that no-short-circuit guarantee.
                let filters = FilterPipeline::new(
                    ctx.take_chain.global_filters.clone(),
                    ctx.take_chain.dst_filters.clone(),
                    ctx.give_chain.src_filters.clone(),
                );
                if !filters.admit(&ctx).await {
                    debug!(order_id = %ctx.order_id(), "order rejected by filter pipeline");
                    metrics::record_order_rejected(RejectReason::Filter);
                    return;
                }
                let take_chain_id = ctx.order.take_chain_id();
                metrics::record_order_admitted(take_chain_id);
                let order_id = ctx.order_id();
                self.incoming.insert(order_id, ctx);
                self.enqueue(order_id);
                metrics::record_queue_depths(take_chain_id, self.priority_q.len(), self.secondary_q.len());
            }
            PipelineEvent::Fulfilled(order_id) | PipelineEvent::ArchivalFulfilled(order_id) => {
                self.clear_queues(order_id);
            }
            PipelineEvent::Cancelled(order_id) => {
                self.clear_queues(order_id);
                self.mempool.delete(order_id);
            }
            PipelineEvent::Other(order_id) => {
                debug!(%order_id, "ignoring order with unrecognized status");
            }
        }
    }

    async fn process_reentry(
        &mut self,
        order_id: OrderId,
        events: &mut mpsc::Receiver<PipelineEvent>,
    ) {
        // If the order was cancelled or terminally cleared while its mempool timer was pending,
        // it's no longer in `incoming` and this re-entry is a no-op: cancellation removes a
        // mempooled order synchronously rather than racing its timer.
        if self.incoming.contains_key(&order_id) {
            self.enqueue(order_id);
            self.drain_queues(events).await;
        }
    }

    fn clear_queues(&mut self, order_id: OrderId) {
        self.incoming.remove(&order_id);
        self.priority_q.retain(|id| *id != order_id);
        self.secondary_q.retain(|id| *id != order_id);
    }

    fn enqueue(&mut self, order_id: OrderId) {
        let Some(ctx) = self.incoming.get(&order_id) else { return };
        let queue = match ctx.order.status {
            OrderStatus::Created => &mut self.priority_q,
            _ => &mut self.secondary_q,
        };
        if !queue.contains(&order_id) {
            queue.push_back(order_id);
        }
    }

    /// Single-slot enforcement: only one order is ever being fulfilled at a time, in priority
    /// order, never recursing back into itself. Before picking the next order, opportunistically
    /// pulls in anything the channel already has buffered — otherwise a `Created` sitting right
    /// behind an already-delivered `ArchivalCreated` would be stuck waiting for the `select!` loop
    /// to hand it over one at a time, which defeats the point of having two queues at all.
    async fn drain_queues(&mut self, events: &mut mpsc::Receiver<PipelineEvent>) {
        loop {
            while let Ok(event) = events.try_recv() {
                self.process(event).await;
            }

            let Some(order_id) = self.priority_q.pop_front().or_else(|| self.secondary_q.pop_front())
            else {
                break;
            };
            self.priority_q.retain(|id| *id != order_id);
            self.secondary_q.retain(|id| *id != order_id);

            if self.incoming.contains_key(&order_id) {
                self.process_order(order_id).await;
            }
        }
    }

    async fn process_order(&mut self, order_id: OrderId) {
        let Some(ctx) = self.incoming.get(&order_id).cloned() else { return };
        let mut allow_place_to_mempool = true;
        let started_at = tokio::time::Instant::now();
        let result = self.evaluate_and_fulfill(&ctx, &mut allow_place_to_mempool).await;
        metrics::record_order_processing_duration(started_at.elapsed());
        match result {
            Ok(()) => {
                self.incoming.remove(&order_id);
                metrics::record_order_fulfilled(ctx.order.take_chain_id());
            }
            Err(error) => self.handle_failure(&ctx, error, allow_place_to_mempool).await,
        }
    }

    /// Runs the order through every admission and profitability check, then fulfills it. Returns
    /// `Ok(())` once fulfilled and handed to the batch unlocker.
    async fn evaluate_and_fulfill(
        &self,
        ctx: &IncomingOrderContext,
        allow_place_to_mempool: &mut bool,
    ) -> Result<(), PipelineError> {
        let order = &ctx.order;
        let order_id = order.order_id;

        // Step 1.
        let bucket = self
            .pctx
            .buckets
            .pick_for_give(order.give_chain_id(), order.give.token, order.take_chain_id())
            .ok_or_else(|| PipelineError::OrderInvalid {
                order_id,
                reason: "no bucket covers give token".into(),
            })?;
        let reserve_token_addr =
            *bucket.tokens_on(order.take_chain_id()).first().ok_or_else(|| {
                PipelineError::FatalInternal {
                    order_id,
                    reason: "bucket has no reserve token on take chain".into(),
                }
            })?;
        let reserve_token = TokenId::Evm(reserve_token_addr);

        // Checked before any further on-chain query, since a revoked order is never worth an RPC
        // round trip.
        if matches!(order.finalization_info, Some(FinalizationInfo::Revoked)) {
            return Err(PipelineError::OrderInvalid { order_id, reason: "order revoked".into() });
        }

        // Step 2.
        let fulfilled = self
            .pctx
            .order_state
            .is_fulfilled_on_take_chain(order_id)
            .await
            .map_err(|source| PipelineError::TransientRpc { order_id, source })?;
        if fulfilled {
            return Err(PipelineError::OrderInvalid {
                order_id,
                reason: "already fulfilled on take chain".into(),
            });
        }
        let give_state = self
            .pctx
            .order_state
            .give_chain_state(order_id)
            .await
            .map_err(|source| PipelineError::TransientRpc { order_id, source })?;
        if give_state != GiveChainOrderState::Created {
            return Err(PipelineError::OrderInvalid {
                order_id,
                reason: "give-side record is not Created".into(),
            });
        }

        let give_decimals = self
            .pctx
            .decimals
            .decimals(order.give_chain_id(), TokenId::Evm(order.give.token))
            .await
            .map_err(|source| PipelineError::TransientRpc { order_id, source })?;
        let take_decimals = self
            .pctx
            .decimals
            .decimals(order.take_chain_id(), TokenId::Evm(order.take.token))
            .await
            .map_err(|source| PipelineError::TransientRpc { order_id, source })?;

        let give_usd_worth = price::usd_worth(
            &self.pctx.price_service,
            order.give_chain_id(),
            TokenId::Evm(order.give.token),
            decimal_from_u256(order.give.amount),
            give_decimals,
        )
        .await
        .map_err(|source| PipelineError::TransientRpc { order_id, source: source.into() })?;

        // Step 4.
        if let Some(FinalizationInfo::Confirmed { confirmation_blocks_count }) =
            order.finalization_info
        {
            let decision =
                confirmation::evaluate(&ctx.take_chain, give_usd_worth, confirmation_blocks_count);
            if !decision.is_accepted() {
                return Err(PipelineError::OrderInvalid {
                    order_id,
                    reason: format!("confirmation policy rejected: {decision:?}"),
                });
            }
            // Non-finalized exposure is advisory admission: reject rather than mempool, since the
            // budget freeing up isn't tied to this order's own retry delay.
            if !ctx.take_chain.non_finalized_budget.try_reserve(order_id, give_usd_worth) {
                return Err(PipelineError::OrderInvalid {
                    order_id,
                    reason: "non-finalized order budget exhausted".into(),
                });
            }
            *allow_place_to_mempool = false;
        }

        // Step 5: balance check against a rough two-round quote (the same technique the
        // profitability evaluator uses in step 7, run here against a flat 0% slippage probe since
        // the operator's margin hasn't been applied yet).
        let take_amount_decimal =
            decimal_from_u256(order.take.amount) / Decimal::from(10u64.pow(take_decimals));
        let rough_route = profitability::quote_required_input(
            &self.pctx.swap,
            reserve_token,
            TokenId::Evm(order.take.token),
            take_amount_decimal,
            None,
        )
        .await
        .map_err(|source| PipelineError::ClientError { order_id, source: source.into() })?;

        let reserve_decimals = self
            .pctx
            .decimals
            .decimals(order.take_chain_id(), reserve_token)
            .await
            .map_err(|source| PipelineError::TransientRpc { order_id, source })?;
        let reserve_balance_raw = ctx
            .take_chain
            .fulfill_signer
            .get_balance(reserve_token)
            .await
            .map_err(|source| PipelineError::TransientRpc { order_id, source: eyre::eyre!(source) })?;
        let reserve_balance =
            decimal_from_u256(reserve_balance_raw) / Decimal::from(10u64.pow(reserve_decimals));
        if reserve_balance < rough_route.amount_in {
            return Err(PipelineError::TransientRpc {
                order_id,
                source: eyre::eyre!(
                    "insufficient reserve balance: have {reserve_balance}, need {}",
                    rough_route.amount_in
                ),
            });
        }

        // Step 6: EVM-only preliminary gas caps, priced into the profitability decision below.
        let gas_caps = match &self.pctx.chain_client {
            ChainClient::Evm(client) => {
                let params = FulfillParams {
                    order_id,
                    reserve_token,
                    reserve_amount: rough_route.amount_in,
                    slippage_bps: 500,
                    beneficiary: ctx.give_chain.beneficiary,
                };
                let caps = evm::estimate_caps(client.as_ref(), &params)
                    .await
                    .map_err(|source| PipelineError::ClientError {
                        order_id,
                        source: source.into(),
                    })?;
                Some(caps)
            }
            ChainClient::Solana(_) => None,
        };
        let gas_cost_usd = match gas_caps {
            Some(caps) => {
                let native_price = self
                    .pctx
                    .price_service
                    .price_usd(order.take_chain_id(), TokenId::Evm(Address::ZERO))
                    .await
                    .map_err(|source| PipelineError::TransientRpc {
                        order_id,
                        source: eyre::eyre!(source),
                    })?;
                let wei_cost = Decimal::from(caps.gas_limit_cap) * decimal_from_u128(caps.gas_price_cap);
                native_price * wei_cost / Decimal::from(10u64.pow(18))
            }
            None => Decimal::ZERO,
        };

        // Step 7.
        let batch_unlock_size = if ctx.give_chain.engine == ChainEngine::Solana {
            None
        } else {
            Some(ctx.give_chain.batch_unlock_size)
        };
        // Step 8 reuses the step-5/6 quote as `prefer_estimation` so the final fulfillment stays
        // consistent with the route priced into this decision.
        let result = profitability::evaluate(
            &self.pctx.buckets,
            &self.pctx.price_service,
            &self.pctx.swap,
            order,
            take_decimals,
            give_decimals,
            gas_cost_usd,
            self.pctx.unlock_cost_usd,
            batch_unlock_size,
            self.pctx.min_profitability_bps,
            Some(rough_route),
        )
        .await
        .map_err(|source| match source {
            ProfitabilityError::NoBucket { .. } => PipelineError::OrderInvalid {
                order_id,
                reason: "no bucket covers give token".into(),
            },
            other => PipelineError::ClientError { order_id, source: other.into() },
        })?;

        if !result.is_profitable {
            return Err(PipelineError::UnprofitableOrder(order_id));
        }

        // TVL exposure is reserved at the fulfill decision and released at confirmed fulfill or
        // abort, regardless of which outcome this turns out to be.
        if !ctx.take_chain.tvl_budget.try_reserve(order_id, give_usd_worth) {
            return Err(PipelineError::UnprofitableOrder(order_id));
        }

        let fulfill_params = FulfillParams {
            order_id,
            reserve_token: result.reserve_dst_token,
            reserve_amount: result.required_reserve_dst_amount,
            slippage_bps: result.reserve_to_take_slippage_bps,
            beneficiary: ctx.give_chain.beneficiary,
        };

        let dispatch_result: Result<FulfillOutcome, PipelineError> = match &self.pctx.chain_client {
            ChainClient::Evm(client) => {
                let caps = gas_caps.expect("an evm chain always computes preliminary gas caps");
                match evm::fulfill(
                    client.as_ref(),
                    &ctx.take_chain.fulfill_signer,
                    fulfill_params,
                    caps,
                    self.pctx.confirmation_timeout,
                )
                .await
                {
                    Ok(outcome) => Ok(outcome),
                    Err(evm::EvmFulfillError::GasBlowout) => {
                        Err(PipelineError::GasBlowout { order_id })
                    }
                    Err(other) => {
                        Err(PipelineError::TransientRpc { order_id, source: eyre::eyre!(other) })
                    }
                }
            }
            ChainClient::Solana(_) => self
                .pctx
                .chain_client
                .fulfill_solana(
                    &ctx.take_chain.fulfill_signer,
                    fulfill_params,
                    self.pctx.confirmation_timeout,
                )
                .await
                .map_err(|source| PipelineError::TransientRpc { order_id, source: eyre::eyre!(source) }),
        };

        match dispatch_result? {
            FulfillOutcome::Confirmed(tx_hash) => {
                // Both budgets decrement at confirmed fulfill; releasing a budget never reserved
                // for this order is a no-op.
                ctx.take_chain.tvl_budget.release(order_id);
                ctx.take_chain.non_finalized_budget.release(order_id);
                let key =
                    BatchKey { give_chain: order.give_chain_id(), give_token: order.give.token };
                self.pctx
                    .batch_unlocker
                    .enqueue(
                        key,
                        order_id,
                        ctx.give_chain.batch_unlock_size,
                        &ctx.give_chain.unlock_signer,
                    )
                    .await;
                tracing::info!(%order_id, %tx_hash, "order fulfilled and queued for unlock");
                Ok(())
            }
            FulfillOutcome::TimedOut(_tx_hash) => Err(PipelineError::TransientRpc {
                order_id,
                source: eyre::eyre!("wait-for-confirmation timed out"),
            }),
        }
    }

    async fn handle_failure(
        &mut self,
        ctx: &IncomingOrderContext,
        error: PipelineError,
        allow_place_to_mempool: bool,
    ) {
        let order_id = ctx.order_id();
        warn!(%order_id, %error, "order processing failed");

        // Any failed attempt aborts both budget reservations this attempt may have made; a
        // re-entry via the mempool reserves fresh on its own next attempt.
        ctx.take_chain.tvl_budget.release(order_id);
        ctx.take_chain.non_finalized_budget.release(order_id);

        let reject_reason = match &error {
            PipelineError::UnsupportedChain(_)
            | PipelineError::OrderInvalid { .. }
            | PipelineError::FatalInternal { .. } => RejectReason::Invalid,
            PipelineError::TransientRpc { .. } | PipelineError::ClientError { .. } => {
                RejectReason::Transient
            }
            PipelineError::UnprofitableOrder(_) => RejectReason::Unprofitable,
            PipelineError::GasBlowout { .. } => RejectReason::GasBlowout,
        };
        metrics::record_order_rejected(reject_reason);

        match error.recovery(allow_place_to_mempool) {
            RecoveryAction::Drop => {
                self.incoming.remove(&order_id);
            }
            RecoveryAction::Mempool => {
                let attempts = ctx.attempts + 1;
                self.incoming
                    .insert(order_id, IncomingOrderContext { attempts, ..ctx.clone() });
                self.mempool.add_order(order_id, attempts, None);
                metrics::record_order_mempooled(ctx.order.take_chain_id());
            }
            RecoveryAction::FastTrackMempool { delay_secs } => {
                let attempts = ctx.attempts + 1;
                self.incoming
                    .insert(order_id, IncomingOrderContext { attempts, ..ctx.clone() });
                if ctx.attempts < GAS_BLOWOUT_FAST_TRACK_MAX_ATTEMPTS {
                    self.mempool.add_order(order_id, attempts, Some(Duration::from_secs(delay_secs)));
                } else {
                    self.mempool.add_order(order_id, attempts, None);
                }
                metrics::record_order_mempooled(ctx.order.take_chain_id());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::Bucket;
    use crate::executor::evm::EvmChainClient;
    use crate::order::{AssetAmount, Order, OrderStatus};
    use crate::registry::ChainEngine;
    use crate::swap::{SwapError, SwapRequest, SwapRoute};
    use alloy::primitives::Address;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    struct FixedOrderState {
        fulfilled: bool,
        give_state: GiveChainOrderState,
    }

    #[async_trait]
    impl OrderStateClient for FixedOrderState {
        async fn is_fulfilled_on_take_chain(&self, _order_id: OrderId) -> Result<bool, eyre::Error> {
            Ok(self.fulfilled)
        }
        async fn give_chain_state(&self, _order_id: OrderId) -> Result<GiveChainOrderState, eyre::Error> {
            Ok(self.give_state)
        }
    }

    struct FixedDecimals(u32);
    #[async_trait]
    impl TokenDecimalsResolver for FixedDecimals {
        async fn decimals(&self, _chain_id: u64, _token: TokenId) -> Result<u32, eyre::Error> {
            Ok(self.0)
        }
    }

    struct FixedPrice(Decimal);
    #[async_trait]
    impl TokenPriceService for FixedPrice {
        async fn price_usd(&self, _chain_id: u64, _token: TokenId) -> Result<Decimal, price::PriceError> {
            Ok(self.0)
        }
    }

    struct OneToOneSwap;
    #[async_trait]
    impl SwapQuoteProvider for OneToOneSwap {
        async fn quote(&self, request: SwapRequest) -> Result<SwapRoute, SwapError> {
            Ok(SwapRoute { amount_in: request.amount, amount_out: request.amount, slippage_bps: 0 })
        }
    }

    struct CountingEvmClient {
        build_payload_calls: Arc<std::sync::atomic::AtomicUsize>,
    }

    #[async_trait]
    impl EvmChainClient for CountingEvmClient {
        async fn estimate_gas(&self, _params: &FulfillParams) -> Result<u64, eyre::Error> {
            Ok(100_000)
        }
        async fn gas_price(&self) -> Result<u128, eyre::Error> {
            Ok(1)
        }
        async fn build_payload(
            &self,
            _fulfill_signer: crate::signer::AccountId,
            _params: &FulfillParams,
            _gas_limit: u64,
            _gas_price: u128,
        ) -> Result<crate::signer::SignedPayload, eyre::Error> {
            self.build_payload_calls.fetch_add(1, Ordering::SeqCst);
            Ok(crate::signer::SignedPayload(vec![1]))
        }
        async fn wait_for_confirmation(
            &self,
            _tx_hash: crate::signer::TxHash,
            _timeout: StdDuration,
        ) -> Result<bool, eyre::Error> {
            Ok(true)
        }
    }

    fn bucket_set() -> TokensBucketSet {
        let mut members = HashMap::new();
        members.insert(1u64, vec![Address::repeat_byte(1)]);
        members.insert(2u64, vec![Address::repeat_byte(2)]);
        TokensBucketSet::new(vec![Bucket::new(members)])
    }

    fn order_fixture(order_id: u8, status: OrderStatus) -> Order {
        Order {
            order_id: OrderId([order_id; 32]),
            give: AssetAmount {
                chain_id: 1,
                token: Address::repeat_byte(1),
                amount: U256::from(1_000_000u64),
            },
            take: AssetAmount {
                chain_id: 2,
                token: Address::repeat_byte(9),
                amount: U256::from(1_000_000u64),
            },
            receiver: Address::ZERO,
            maker: Address::ZERO,
            status,
            finalization_info: None,
        }
    }

    fn pctx(
        chain_client: ChainClient,
        order_state: FixedOrderState,
        batch_unlocker: Arc<BatchUnlocker>,
    ) -> PipelineContext {
        PipelineContext {
            buckets: Arc::new(bucket_set()),
            price_service: Arc::new(FixedPrice(dec!(1))),
            swap: Arc::new(OneToOneSwap),
            order_state: Arc::new(order_state),
            decimals: Arc::new(FixedDecimals(6)),
            chain_client,
            batch_unlocker,
            min_profitability_bps: 0,
            unlock_cost_usd: dec!(0),
            confirmation_timeout: StdDuration::from_secs(1),
        }
    }

    struct NoopUnlockBuilder;
    #[async_trait]
    impl crate::unlocker::UnlockTxBuilder for NoopUnlockBuilder {
        async fn build(
            &self,
            _key: BatchKey,
            _orders: &[OrderId],
        ) -> Result<crate::signer::SignedPayload, crate::signer::SignerError> {
            Ok(crate::signer::SignedPayload(vec![]))
        }
    }

    /// Like [`crate::tests_support::dummy_chain_entry`] but with a funded reserve-token balance on
    /// the fulfill signer, for tests that exercise the step-5 reserve balance check.
    fn funded_chain_entry(chain_id: u64) -> crate::registry::ChainEntry {
        use crate::budget::{NonFinalizedOrdersBudgetController, TvlBudgetController};

        crate::registry::ChainEntry {
            chain_id,
            engine: ChainEngine::Evm,
            rpc: format!("https://rpc.example/{chain_id}"),
            unlock_signer: crate::tests_support::fixed_signer(0xAA, 0),
            fulfill_signer: crate::tests_support::fixed_signer(0xBB, 1_000_000_000),
            beneficiary: crate::signer::AccountId::Evm(Address::repeat_byte(0xCC)),
            src_constraints: Vec::new(),
            dst_constraints: Vec::new(),
            global_filters: Vec::new(),
            dst_filters: Vec::new(),
            src_filters: Vec::new(),
            batch_unlock_size: 3,
            tvl_budget: TvlBudgetController::new(dec!(1_000_000)),
            non_finalized_budget: NonFinalizedOrdersBudgetController::new(dec!(1_000_000)),
        }
    }

    struct RecordingEvmClient {
        processed: Arc<std::sync::Mutex<Vec<OrderId>>>,
    }

    #[async_trait]
    impl EvmChainClient for RecordingEvmClient {
        async fn estimate_gas(&self, _params: &FulfillParams) -> Result<u64, eyre::Error> {
            Ok(100_000)
        }
        async fn gas_price(&self) -> Result<u128, eyre::Error> {
            Ok(1)
        }
        async fn build_payload(
            &self,
            _fulfill_signer: crate::signer::AccountId,
            params: &FulfillParams,
            _gas_limit: u64,
            _gas_price: u128,
        ) -> Result<crate::signer::SignedPayload, eyre::Error> {
            self.processed.lock().unwrap().push(params.order_id);
            Ok(crate::signer::SignedPayload(vec![1]))
        }
        async fn wait_for_confirmation(
            &self,
            _tx_hash: crate::signer::TxHash,
            _timeout: StdDuration,
        ) -> Result<bool, eyre::Error> {
            Ok(true)
        }
    }

    fn mempool() -> Arc<crate::mempool::MempoolScheduler> {
        let (tx, _rx) = mpsc::channel(8);
        Arc::new(crate::mempool::MempoolScheduler::new(
            StdDuration::from_secs(10),
            StdDuration::from_secs(5),
            tx,
        ))
    }

    #[tokio::test]
    async fn admitted_profitable_order_is_fulfilled_and_queued_for_unlock() {
        let give_chain = Arc::new(funded_chain_entry(1));
        let take_chain = Arc::new(funded_chain_entry(2));
        let build_payload_calls = Arc::new(AtomicUsize::new(0));
        let evm_client: Arc<dyn EvmChainClient> =
            Arc::new(CountingEvmClient { build_payload_calls: build_payload_calls.clone() });
        let batch_unlocker = Arc::new(BatchUnlocker::new(Arc::new(NoopUnlockBuilder)));

        let pctx = pctx(
            ChainClient::Evm(evm_client),
            FixedOrderState { fulfilled: false, give_state: GiveChainOrderState::Created },
            batch_unlocker,
        );
        let mut pipeline = Pipeline::new(pctx, mempool());

        // Give amount carries a 10% margin over the take amount so the tiny EVM gas cost priced
        // into the decision can't flip a break-even 1:1 quote unprofitable.
        let mut order = order_fixture(1, OrderStatus::Created);
        order.give.amount = U256::from(1_100_000u64);
        let ctx = IncomingOrderContext { order, give_chain, take_chain, attempts: 0 };
        let order_id = ctx.order_id();

        let (_tx, mut events) = mpsc::channel(1);
        pipeline.on_event(PipelineEvent::Created(ctx), &mut events).await;

        assert!(!pipeline.incoming.contains_key(&order_id), "fulfilled order leaves the queue");
        assert_eq!(build_payload_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn order_already_fulfilled_on_take_chain_is_dropped_not_mempooled() {
        let give_chain = Arc::new(crate::tests_support::dummy_chain_entry(1, ChainEngine::Evm));
        let take_chain = Arc::new(crate::tests_support::dummy_chain_entry(2, ChainEngine::Evm));
        let build_payload_calls = Arc::new(AtomicUsize::new(0));
        let evm_client: Arc<dyn EvmChainClient> =
            Arc::new(CountingEvmClient { build_payload_calls: build_payload_calls.clone() });
        let batch_unlocker = Arc::new(BatchUnlocker::new(Arc::new(NoopUnlockBuilder)));

        let pctx = pctx(
            ChainClient::Evm(evm_client),
            FixedOrderState { fulfilled: true, give_state: GiveChainOrderState::Created },
            batch_unlocker,
        );
        let mut pipeline = Pipeline::new(pctx, mempool());

        let order = order_fixture(2, OrderStatus::Created);
        let ctx = IncomingOrderContext { order, give_chain, take_chain, attempts: 0 };
        let order_id = ctx.order_id();

        let (_tx, mut events) = mpsc::channel(1);
        pipeline.on_event(PipelineEvent::Created(ctx), &mut events).await;

        // Already-fulfilled is `OrderInvalid`, which drops rather than mempools.
        assert!(!pipeline.incoming.contains_key(&order_id));
        assert_eq!(build_payload_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unprofitable_order_is_sent_to_mempool_and_budget_is_released() {
        let give_chain = Arc::new(funded_chain_entry(1));
        let take_chain = Arc::new(funded_chain_entry(2));
        let build_payload_calls = Arc::new(AtomicUsize::new(0));
        let evm_client: Arc<dyn EvmChainClient> =
            Arc::new(CountingEvmClient { build_payload_calls: build_payload_calls.clone() });
        let batch_unlocker = Arc::new(BatchUnlocker::new(Arc::new(NoopUnlockBuilder)));

        let mut pctx = pctx(
            ChainClient::Evm(evm_client),
            FixedOrderState { fulfilled: false, give_state: GiveChainOrderState::Created },
            batch_unlocker,
        );
        // A 100% margin requirement makes a break-even 1:1 quote unprofitable.
        pctx.min_profitability_bps = 10_000;
        let mut pipeline = Pipeline::new(pctx, mempool());

        let order = order_fixture(3, OrderStatus::Created);
        let ctx = IncomingOrderContext { order, give_chain: give_chain.clone(), take_chain: take_chain.clone(), attempts: 0 };
        let order_id = ctx.order_id();

        let (_tx, mut events) = mpsc::channel(1);
        pipeline.on_event(PipelineEvent::Created(ctx), &mut events).await;

        assert!(pipeline.incoming.contains_key(&order_id), "unprofitable orders retry via the mempool");
        assert_eq!(build_payload_calls.load(Ordering::SeqCst), 0, "never reaches broadcast");
        assert_eq!(take_chain.tvl_budget.current_usage(), dec!(0), "reservation released on failure");
    }

    #[tokio::test]
    async fn cancelled_event_clears_queue_and_mempool_timer() {
        let give_chain = Arc::new(crate::tests_support::dummy_chain_entry(1, ChainEngine::Evm));
        let take_chain = Arc::new(crate::tests_support::dummy_chain_entry(2, ChainEngine::Evm));
        let evm_client: Arc<dyn EvmChainClient> =
            Arc::new(CountingEvmClient { build_payload_calls: Arc::new(AtomicUsize::new(0)) });
        let batch_unlocker = Arc::new(BatchUnlocker::new(Arc::new(NoopUnlockBuilder)));
        let pctx = pctx(
            ChainClient::Evm(evm_client),
            FixedOrderState { fulfilled: false, give_state: GiveChainOrderState::Created },
            batch_unlocker,
        );
        let mut pipeline = Pipeline::new(pctx, mempool());

        let order = order_fixture(4, OrderStatus::Created);
        let order_id = OrderId([4; 32]);
        pipeline.incoming.insert(
            order_id,
            IncomingOrderContext { order, give_chain, take_chain, attempts: 0 },
        );
        pipeline.priority_q.push_back(order_id);

        pipeline.process(PipelineEvent::Cancelled(order_id)).await;

        assert!(!pipeline.incoming.contains_key(&order_id));
        assert!(pipeline.priority_q.is_empty());
    }

    #[tokio::test]
    async fn created_order_jumps_ahead_of_a_buffered_archival_created_and_processes_once() {
        let give_chain = Arc::new(funded_chain_entry(1));
        let take_chain = Arc::new(funded_chain_entry(2));
        let processed = Arc::new(std::sync::Mutex::new(Vec::new()));
        let evm_client: Arc<dyn EvmChainClient> =
            Arc::new(RecordingEvmClient { processed: processed.clone() });
        let batch_unlocker = Arc::new(BatchUnlocker::new(Arc::new(NoopUnlockBuilder)));

        let pctx = pctx(
            ChainClient::Evm(evm_client),
            FixedOrderState { fulfilled: false, give_state: GiveChainOrderState::Created },
            batch_unlocker,
        );
        let mut pipeline = Pipeline::new(pctx, mempool());

        let mut order_b = order_fixture(5, OrderStatus::Created);
        order_b.give.amount = U256::from(1_100_000u64);
        let mut order_c = order_fixture(6, OrderStatus::ArchivalCreated);
        order_c.give.amount = U256::from(1_100_000u64);
        let b_id = order_b.order_id;
        let c_id = order_c.order_id;

        let ctx_b = IncomingOrderContext {
            order: order_b,
            give_chain: give_chain.clone(),
            take_chain: take_chain.clone(),
            attempts: 0,
        };
        let ctx_c = IncomingOrderContext { order: order_c, give_chain, take_chain, attempts: 0 };

        // All three arrive already buffered on the channel before the pipeline looks at any of
        // them, so the only thing that can put B ahead of C is `drain_queues` picking the
        // priority queue first.
        let (tx, mut events) = mpsc::channel(8);
        tx.send(PipelineEvent::ArchivalCreated(ctx_c)).await.unwrap();
        tx.send(PipelineEvent::Created(ctx_b.clone())).await.unwrap();
        tx.send(PipelineEvent::Created(ctx_b)).await.unwrap();
        drop(tx);

        let first = events.recv().await.unwrap();
        pipeline.on_event(first, &mut events).await;

        let recorded = processed.lock().unwrap().clone();
        assert_eq!(recorded, vec![b_id, c_id]);
        assert_eq!(recorded.len(), 2, "the duplicate Created(B) must not cause a second fulfillment");
    }
}
