//! Shared error kinds for the order pipeline.
//!
//! Each kind carries the routing decision it implies baked into how `pipeline.rs` matches on it —
//! this enum exists so that decision is made in one place instead of re-derived at every call
//! site.

use thiserror::Error;

use crate::order::OrderId;

/// What the pipeline should do after `process_order` returns one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Drop silently (already logged): terminal, no further action.
    Drop,
    /// Route to the mempool scheduler with the default backoff.
    Mempool,
    /// Route to the mempool scheduler with a fixed fast-track delay, unless `attempts` has
    /// already reached the fast-track cap, in which case standard backoff applies instead.
    FastTrackMempool { delay_secs: u64 },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("chain {0} is not configured")]
    UnsupportedChain(u64),

    #[error("order {order_id} invalid: {reason}")]
    OrderInvalid { order_id: OrderId, reason: String },

    #[error("transient RPC error processing {order_id}: {source}")]
    TransientRpc { order_id: OrderId, #[source] source: eyre::Error },

    #[error("order {0} is not profitable")]
    UnprofitableOrder(OrderId),

    #[error("gas estimate for {order_id} exceeded pre-estimated cap")]
    GasBlowout { order_id: OrderId },

    #[error("client error evaluating {order_id}: {source}")]
    ClientError { order_id: OrderId, #[source] source: eyre::Error },

    #[error("internal inconsistency processing {order_id}: {reason}")]
    FatalInternal { order_id: OrderId, reason: String },
}

impl PipelineError {
    /// Whether `allow_place_to_mempool` being false should suppress the normal mempool routing
    /// for this error. Confirmed-order rejections never mempool.
    pub fn recovery(&self, allow_place_to_mempool: bool) -> RecoveryAction {
        use PipelineError::*;
        match self {
            UnsupportedChain(_) | OrderInvalid { .. } | FatalInternal { .. } => RecoveryAction::Drop,
            TransientRpc { .. } | UnprofitableOrder(_) | ClientError { .. } => {
                if allow_place_to_mempool {
                    RecoveryAction::Mempool
                } else {
                    RecoveryAction::Drop
                }
            }
            GasBlowout { .. } => RecoveryAction::FastTrackMempool { delay_secs: 5 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid() -> OrderId {
        OrderId([1; 32])
    }

    #[test]
    fn confirmed_orders_never_mempool_even_on_transient_error() {
        let err = PipelineError::TransientRpc { order_id: oid(), source: eyre::eyre!("boom") };
        assert_eq!(err.recovery(false), RecoveryAction::Drop);
        assert_eq!(err.recovery(true), RecoveryAction::Mempool);
    }

    #[test]
    fn gas_blowout_always_fast_tracks() {
        let err = PipelineError::GasBlowout { order_id: oid() };
        assert_eq!(err.recovery(false), RecoveryAction::FastTrackMempool { delay_secs: 5 });
        assert_eq!(err.recovery(true), RecoveryAction::FastTrackMempool { delay_secs: 5 });
    }
}
