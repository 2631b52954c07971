//! Metrics facade, following `signet-filler`'s pattern of a `LazyLock<()>` description
//! registration plus small `as_str()` label enums.

use core::time::Duration;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::sync::LazyLock;

const UPTIME_SECONDS: &str = "crosschain_taker.uptime_seconds";
const ORDERS_ADMITTED: &str = "crosschain_taker.orders_admitted";
const ORDERS_REJECTED: &str = "crosschain_taker.orders_rejected";
const ORDERS_FULFILLED: &str = "crosschain_taker.orders_fulfilled";
const ORDERS_MEMPOOLED: &str = "crosschain_taker.orders_mempooled";
const UNLOCK_TRANSACTIONS: &str = "crosschain_taker.unlock_transactions";
const ORDER_PROCESSING_SECONDS: &str = "crosschain_taker.order_processing_seconds";
const PARTIAL_BATCH_AGE_SECONDS: &str = "crosschain_taker.batch_unlocker.partial_batch_age_seconds";
const TVL_BUDGET_USAGE_USD: &str = "crosschain_taker.tvl_budget_usage_usd";
const NON_FINALIZED_BUDGET_USAGE_USD: &str = "crosschain_taker.non_finalized_budget_usage_usd";
const PRIORITY_QUEUE_DEPTH: &str = "crosschain_taker.priority_queue_depth";
const SECONDARY_QUEUE_DEPTH: &str = "crosschain_taker.secondary_queue_depth";

/// Force evaluation to register all metric descriptions with the exporter.
pub(crate) static DESCRIPTIONS: LazyLock<()> = LazyLock::new(|| {
    describe_gauge!(UPTIME_SECONDS, "Seconds since the process started");
    describe_counter!(ORDERS_ADMITTED, "Orders admitted past the filter pipeline (label: chain_id)");
    describe_counter!(
        ORDERS_REJECTED,
        "Orders dropped (label: reason = filter / invalid / unprofitable / gas-blowout / transient)"
    );
    describe_counter!(ORDERS_FULFILLED, "Orders confirmed fulfilled on the take chain (label: chain_id)");
    describe_counter!(ORDERS_MEMPOOLED, "Orders routed to the mempool scheduler (label: chain_id)");
    describe_counter!(
        UNLOCK_TRANSACTIONS,
        "Batch unlock transactions sent (label: result = success / failure)"
    );
    describe_histogram!(ORDER_PROCESSING_SECONDS, "Duration of one process_order attempt");
    describe_gauge!(
        PARTIAL_BATCH_AGE_SECONDS,
        "Age in seconds of the oldest open (non-full) unlock batch (label: give_chain_id)"
    );
    describe_gauge!(TVL_BUDGET_USAGE_USD, "Current TVL budget usage in USD (label: chain_id)");
    describe_gauge!(
        NON_FINALIZED_BUDGET_USAGE_USD,
        "Current non-finalized order budget usage in USD (label: chain_id)"
    );
    describe_gauge!(PRIORITY_QUEUE_DEPTH, "Depth of the priority (Created) queue (label: chain_id)");
    describe_gauge!(SECONDARY_QUEUE_DEPTH, "Depth of the secondary queue (label: chain_id)");
});

pub(crate) enum RejectReason {
    Filter,
    Invalid,
    Unprofitable,
    GasBlowout,
    Transient,
}

impl RejectReason {
    pub(crate) const fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Filter => "filter",
            RejectReason::Invalid => "invalid",
            RejectReason::Unprofitable => "unprofitable",
            RejectReason::GasBlowout => "gas-blowout",
            RejectReason::Transient => "transient",
        }
    }
}

pub(crate) enum SendResult {
    Success,
    Failure,
}

impl SendResult {
    pub(crate) const fn as_str(&self) -> &'static str {
        match self {
            SendResult::Success => "success",
            SendResult::Failure => "failure",
        }
    }
}

pub(crate) fn record_uptime(elapsed: Duration) {
    gauge!(UPTIME_SECONDS).set(elapsed.as_secs_f64());
}

pub(crate) fn record_order_admitted(chain_id: u64) {
    counter!(ORDERS_ADMITTED, "chain_id" => chain_id.to_string()).increment(1);
}

pub(crate) fn record_order_rejected(reason: RejectReason) {
    counter!(ORDERS_REJECTED, "reason" => reason.as_str()).increment(1);
}

pub(crate) fn record_order_fulfilled(chain_id: u64) {
    counter!(ORDERS_FULFILLED, "chain_id" => chain_id.to_string()).increment(1);
}

pub(crate) fn record_order_mempooled(chain_id: u64) {
    counter!(ORDERS_MEMPOOLED, "chain_id" => chain_id.to_string()).increment(1);
}

pub(crate) fn record_unlock_transaction(result: SendResult) {
    counter!(UNLOCK_TRANSACTIONS, "result" => result.as_str()).increment(1);
}

pub(crate) fn record_order_processing_duration(elapsed: Duration) {
    histogram!(ORDER_PROCESSING_SECONDS).record(elapsed.as_secs_f64());
}

pub(crate) fn record_partial_batch_age(give_chain_id: u64, age_secs: u64) {
    gauge!(PARTIAL_BATCH_AGE_SECONDS, "give_chain_id" => give_chain_id.to_string()).set(age_secs as f64);
}

pub(crate) fn record_tvl_budget_usage(chain_id: u64, usd: f64) {
    gauge!(TVL_BUDGET_USAGE_USD, "chain_id" => chain_id.to_string()).set(usd);
}

pub(crate) fn record_non_finalized_budget_usage(chain_id: u64, usd: f64) {
    gauge!(NON_FINALIZED_BUDGET_USAGE_USD, "chain_id" => chain_id.to_string()).set(usd);
}

pub(crate) fn record_queue_depths(chain_id: u64, priority: usize, secondary: usize) {
    gauge!(PRIORITY_QUEUE_DEPTH, "chain_id" => chain_id.to_string()).set(priority as f64);
    gauge!(SECONDARY_QUEUE_DEPTH, "chain_id" => chain_id.to_string()).set(secondary as f64);
}
