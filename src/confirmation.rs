//! Confirmation Policy: accept pre-finalized orders only when announced confirmations meet a
//! USD-worth-indexed threshold.

use rust_decimal::Decimal;

use crate::registry::ChainEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationDecision {
    /// Accepted; the order is speculative and subject to the non-finalized budget.
    AcceptNonFinalized,
    /// No configured range covers this USD worth; wait for finalization instead.
    RejectNoRange,
    /// A range matched but the announced confirmation count fell short.
    RejectUnderConfirmed { required: u64 },
}

impl ConfirmationDecision {
    pub fn is_accepted(self) -> bool {
        matches!(self, ConfirmationDecision::AcceptNonFinalized)
    }
}

/// Evaluate an announced `Confirmed{n}` order against the take-chain's source constraints.
///
/// `usd_worth` must already be resolved from the give-token's price (give-token price x amount /
/// 10^decimals) — this function is pure given that input.
pub fn evaluate(
    chain: &ChainEntry,
    usd_worth: Decimal,
    announced_confirmations: u64,
) -> ConfirmationDecision {
    let Some(range) = chain.src_range_for(usd_worth) else {
        return ConfirmationDecision::RejectNoRange;
    };
    if announced_confirmations < range.min_block_confirmations {
        return ConfirmationDecision::RejectUnderConfirmed {
            required: range.min_block_confirmations,
        };
    }
    ConfirmationDecision::AcceptNonFinalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ChainEngine, SrcConstraintRange};
    use rust_decimal_macros::dec;

    fn chain_with_ranges() -> ChainEntry {
        let mut chain = crate::tests_support::dummy_chain_entry(1, ChainEngine::Evm);
        chain.src_constraints = vec![
            SrcConstraintRange {
                usd_upper_threshold: dec!(1000),
                min_block_confirmations: 12,
                fulfillment_delay_sec: 0,
            },
            SrcConstraintRange {
                usd_upper_threshold: dec!(1_000_000_000),
                min_block_confirmations: 32,
                fulfillment_delay_sec: 0,
            },
        ];
        chain
    }

    #[test]
    fn exactly_at_threshold_accepts_under_first_range() {
        // worth=1000, 12 confirmations, first range requires 12.
        let chain = chain_with_ranges();
        let decision = evaluate(&chain, dec!(1000), 12);
        assert_eq!(decision, ConfirmationDecision::AcceptNonFinalized);
    }

    #[test]
    fn under_confirmed_is_rejected() {
        let chain = chain_with_ranges();
        let decision = evaluate(&chain, dec!(1000), 11);
        assert_eq!(decision, ConfirmationDecision::RejectUnderConfirmed { required: 12 });
    }

    #[test]
    fn worth_above_every_range_is_rejected() {
        let chain = chain_with_ranges();
        let decision = evaluate(&chain, dec!(2_000_000_000), 1000);
        assert_eq!(decision, ConfirmationDecision::RejectNoRange);
    }

    #[test]
    fn just_above_threshold_requires_next_ranges_confirmations() {
        let chain = chain_with_ranges();
        assert_eq!(evaluate(&chain, dec!(1000.01), 12), ConfirmationDecision::RejectUnderConfirmed {
            required: 32
        });
        assert_eq!(evaluate(&chain, dec!(1000.01), 32), ConfirmationDecision::AcceptNonFinalized);
    }
}
