//! Budget controllers: advisory admission gates, not balance checks.
//!
//! Both controllers have the same shape — a USD cap and a running map of per-order contributions
//! — so they share one generic implementation parameterized only by name (for logging/metrics).

use std::collections::HashMap;
use std::sync::Mutex;

use rust_decimal::Decimal;

use crate::order::OrderId;

/// A USD-capped set of per-order contributions. Mutation never spans an `.await`, so a plain
/// `std::sync::Mutex` is sufficient — no need to reach for an async lock here.
#[derive(Debug)]
pub struct BudgetController {
    name: &'static str,
    cap_usd: Decimal,
    contributions: Mutex<HashMap<OrderId, Decimal>>,
}

impl BudgetController {
    pub fn new(name: &'static str, cap_usd: Decimal) -> Self {
        Self { name, cap_usd, contributions: Mutex::new(HashMap::new()) }
    }

    /// Attempt to reserve `usd` of budget for `order_id`. Returns `true` and records the
    /// contribution iff `sum + usd <= cap`.
    pub fn try_reserve(&self, order_id: OrderId, usd: Decimal) -> bool {
        let mut contributions = self.contributions.lock().expect("budget mutex poisoned");
        let current: Decimal = contributions.values().sum();
        if current + usd > self.cap_usd {
            tracing::debug!(
                budget = self.name,
                %order_id,
                %current,
                %usd,
                cap = %self.cap_usd,
                "budget reservation rejected"
            );
            return false;
        }
        contributions.insert(order_id, usd);
        true
    }

    /// Release `order_id`'s contribution, if any. A no-op if the order was never reserved.
    pub fn release(&self, order_id: OrderId) {
        self.contributions.lock().expect("budget mutex poisoned").remove(&order_id);
    }

    /// Current total in-flight contribution, for metrics/logging.
    pub fn current_usage(&self) -> Decimal {
        self.contributions.lock().expect("budget mutex poisoned").values().sum()
    }
}

/// The TVL-across-outstanding-fulfillments cap.
#[derive(Debug)]
pub struct TvlBudgetController(BudgetController);

impl TvlBudgetController {
    pub fn new(cap_usd: Decimal) -> Self {
        Self(BudgetController::new("tvl", cap_usd))
    }

    pub fn try_reserve(&self, order_id: OrderId, usd: Decimal) -> bool {
        self.0.try_reserve(order_id, usd)
    }

    pub fn release(&self, order_id: OrderId) {
        self.0.release(order_id);
    }

    pub fn current_usage(&self) -> Decimal {
        self.0.current_usage()
    }
}

/// The non-finalized-orders exposure cap, covering orders accepted under `Confirmed{n}`.
#[derive(Debug)]
pub struct NonFinalizedOrdersBudgetController(BudgetController);

impl NonFinalizedOrdersBudgetController {
    pub fn new(cap_usd: Decimal) -> Self {
        Self(BudgetController::new("non_finalized", cap_usd))
    }

    pub fn try_reserve(&self, order_id: OrderId, usd: Decimal) -> bool {
        self.0.try_reserve(order_id, usd)
    }

    /// Release the order from non-finalized exposure, e.g. when it graduates to `Finalized`.
    pub fn release(&self, order_id: OrderId) {
        self.0.release(order_id);
    }

    pub fn current_usage(&self) -> Decimal {
        self.0.current_usage()
    }
}
