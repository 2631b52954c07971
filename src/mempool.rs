//! Mempool Scheduler: per-chain retry queue keyed by order id, with monotonically growing delays
//! and cancellation. Named "mempool" only by analogy — unrelated to any chain's transaction
//! mempool.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::order::OrderId;

/// A scheduled re-entry, held until its `next_eligible_at` tick.
#[derive(Debug, Clone)]
struct PendingOrder {
    first_seen_at: Instant,
    attempts: u32,
    next_eligible_at: Instant,
    /// Monotonic insertion sequence, since `next_eligible_at` alone can tie when several orders
    /// are scheduled within the same tick resolution window.
    sequence: u64,
}

struct State {
    pending: HashMap<OrderId, PendingOrder>,
    next_sequence: u64,
    /// Orders due at or before "now", in FIFO order of insertion, so that multiple orders firing
    /// in the same tick preserve insertion order.
    due: VecDeque<OrderId>,
}

/// Per-chain mempool scheduler. `tick()` is driven externally by the owning pipeline's worker
/// loop at >= 1s resolution so shutdown can cooperatively stop ticking rather than racing a
/// free-running timer.
pub struct MempoolScheduler {
    initial_interval: Duration,
    max_delay_step: Duration,
    state: Mutex<State>,
    reentry_tx: mpsc::Sender<OrderId>,
}

impl MempoolScheduler {
    pub fn new(
        initial_interval: Duration,
        max_delay_step: Duration,
        reentry_tx: mpsc::Sender<OrderId>,
    ) -> Self {
        Self {
            initial_interval,
            max_delay_step,
            state: Mutex::new(State {
                pending: HashMap::new(),
                next_sequence: 0,
                due: VecDeque::new(),
            }),
            reentry_tx,
        }
    }

    /// Schedule (or reschedule) `order_id` for re-entry. `delay` overrides the default backoff
    /// (used for the gas-blowout fast track); otherwise delay is
    /// `initial_interval + attempts * max_delay_step`.
    #[instrument(skip(self))]
    pub fn add_order(&self, order_id: OrderId, attempts: u32, delay: Option<Duration>) {
        let now = Instant::now();
        let delay = delay.unwrap_or(self.initial_interval + self.max_delay_step * attempts);
        let mut state = self.state.lock().expect("mempool mutex poisoned");
        let first_seen_at = state
            .pending
            .get(&order_id)
            .map(|existing| existing.first_seen_at)
            .unwrap_or(now);
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.pending.insert(
            order_id,
            PendingOrder { first_seen_at, attempts, next_eligible_at: now + delay, sequence },
        );
        debug!(%order_id, attempts, delay_secs = delay.as_secs(), "order scheduled for retry");
    }

    /// Cancel a scheduled re-entry. No-op if the order is not pending.
    #[instrument(skip(self))]
    pub fn delete(&self, order_id: OrderId) {
        let mut state = self.state.lock().expect("mempool mutex poisoned");
        state.pending.remove(&order_id);
        state.due.retain(|id| id != &order_id);
    }

    /// Attempts of `order_id` if still pending (used to re-deliver with a bumped attempt count).
    pub fn attempts(&self, order_id: OrderId) -> Option<u32> {
        self.state.lock().expect("mempool mutex poisoned").pending.get(&order_id).map(|p| p.attempts)
    }

    /// Move every order whose `next_eligible_at` has passed into the due queue, then drain and
    /// deliver all due orders over `reentry_tx`. Intended to be called once per tick (>= 1s) from
    /// the owning pipeline's worker loop.
    pub async fn tick(&self) {
        let now = Instant::now();
        let due: Vec<OrderId> = {
            let mut state = self.state.lock().expect("mempool mutex poisoned");
            let mut newly_due: Vec<(OrderId, u64)> = state
                .pending
                .iter()
                .filter(|(_, pending)| pending.next_eligible_at <= now)
                .map(|(id, pending)| (*id, pending.sequence))
                .collect();
            newly_due.sort_by_key(|(_, sequence)| *sequence);
            let newly_due: Vec<OrderId> = newly_due.into_iter().map(|(id, _)| id).collect();
            for id in &newly_due {
                state.pending.remove(id);
                state.due.push_back(*id);
            }
            state.due.drain(..).collect()
        };

        for order_id in due {
            // A shutdown race between collecting `due` and sending is fine: the receiver side is
            // dropped during cancellation and `send` failing here just means the order is lost
            // from the mempool, which is the intended drain-without-firing shutdown behavior.
            let _ = self.reentry_tx.send(order_id).await;
        }
    }

    /// Run the tick loop until cancelled. On cancellation, pending timers are drained without
    /// firing rather than raced to completion.
    pub async fn run(&self, tick_resolution: Duration, cancellation: CancellationToken) {
        let mut interval = tokio::time::interval(tick_resolution);
        loop {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => break,
                _ = interval.tick() => self.tick().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(byte: u8) -> OrderId {
        OrderId([byte; 32])
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_grows_with_attempts() {
        let (tx, mut rx) = mpsc::channel(8);
        let scheduler =
            MempoolScheduler::new(Duration::from_secs(10), Duration::from_secs(5), tx);

        // k-th re-entry no earlier than interval + k*max_delay_step.
        scheduler.add_order(oid(1), 2, None);
        tokio::time::advance(Duration::from_secs(19)).await;
        scheduler.tick().await;
        assert!(rx.try_recv().is_err(), "should not fire before 10 + 2*5 = 20s");

        tokio::time::advance(Duration::from_secs(2)).await;
        scheduler.tick().await;
        assert_eq!(rx.try_recv().unwrap(), oid(1));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_cancels_pending_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let scheduler = MempoolScheduler::new(Duration::from_secs(1), Duration::from_secs(1), tx);

        scheduler.add_order(oid(1), 0, None);
        scheduler.delete(oid(1));
        tokio::time::advance(Duration::from_secs(5)).await;
        scheduler.tick().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn same_tick_orders_preserve_insertion_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let scheduler = MempoolScheduler::new(Duration::from_secs(1), Duration::from_secs(0), tx);

        scheduler.add_order(oid(1), 0, None);
        scheduler.add_order(oid(2), 0, None);
        scheduler.add_order(oid(3), 0, None);
        tokio::time::advance(Duration::from_secs(2)).await;
        scheduler.tick().await;

        assert_eq!(rx.try_recv().unwrap(), oid(1));
        assert_eq!(rx.try_recv().unwrap(), oid(2));
        assert_eq!(rx.try_recv().unwrap(), oid(3));
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_delay_overrides_default_backoff() {
        let (tx, mut rx) = mpsc::channel(8);
        let scheduler = MempoolScheduler::new(Duration::from_secs(100), Duration::from_secs(100), tx);

        // Gas-blowout fast track: 5s delay regardless of attempts-derived backoff.
        scheduler.add_order(oid(1), 0, Some(Duration::from_secs(5)));
        tokio::time::advance(Duration::from_secs(6)).await;
        scheduler.tick().await;
        assert_eq!(rx.try_recv().unwrap(), oid(1));
    }
}
