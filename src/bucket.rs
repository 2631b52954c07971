//! Token equivalence classes across chains.
//!
//! A bucket declares a set of (chain_id, token) pairs as mutually interchangeable reserve assets —
//! e.g. native USDC on three chains. The profitability evaluator and the registry's give/take
//! coverage check both ask the same two questions: "is this (chain, token) a valid reserve for
//! this bucket?" and "which token on chain X is equivalent to this one?".

use std::collections::HashMap;

use alloy::primitives::Address;

/// One equivalence class of tokens across chains.
#[derive(Debug, Clone, Default)]
pub struct Bucket {
    /// chain_id -> tokens on that chain considered equivalent reserve assets.
    members: HashMap<u64, Vec<Address>>,
}

impl Bucket {
    pub fn new(members: HashMap<u64, Vec<Address>>) -> Self {
        Self { members }
    }

    /// Does this bucket contain `token` on `chain_id`?
    pub fn contains(&self, chain_id: u64, token: Address) -> bool {
        self.members.get(&chain_id).is_some_and(|tokens| tokens.contains(&token))
    }

    /// The reserve tokens this bucket offers on `chain_id`, if any.
    pub fn tokens_on(&self, chain_id: u64) -> &[Address] {
        self.members.get(&chain_id).map_or(&[], Vec::as_slice)
    }

    /// Does this bucket span both chains, i.e. does it offer at least one reserve token on each?
    pub fn spans(&self, give_chain_id: u64, take_chain_id: u64) -> bool {
        !self.tokens_on(give_chain_id).is_empty() && !self.tokens_on(take_chain_id).is_empty()
    }
}

/// The full set of configured buckets, queried by the registry and the profitability evaluator.
#[derive(Debug, Clone, Default)]
pub struct TokensBucketSet {
    buckets: Vec<Bucket>,
}

impl TokensBucketSet {
    pub fn new(buckets: Vec<Bucket>) -> Self {
        Self { buckets }
    }

    /// Is `(chain_id, token)` a valid reserve in any configured bucket?
    pub fn is_valid_reserve(&self, chain_id: u64, token: Address) -> bool {
        self.buckets.iter().any(|bucket| bucket.contains(chain_id, token))
    }

    /// The first bucket that contains `token` on `chain_id`, with its equivalent tokens on
    /// `other_chain_id`.
    pub fn equivalents_on(
        &self,
        chain_id: u64,
        token: Address,
        other_chain_id: u64,
    ) -> Option<&[Address]> {
        self.buckets
            .iter()
            .find(|bucket| bucket.contains(chain_id, token))
            .map(|bucket| bucket.tokens_on(other_chain_id))
    }

    /// Does any bucket cover the (give-chain, take-chain) pair, i.e. offer a reserve token on
    /// both sides? Used by [`crate::registry::ChainRegistry`] construction.
    pub fn covers_pair(&self, give_chain_id: u64, take_chain_id: u64) -> bool {
        self.buckets.iter().any(|bucket| bucket.spans(give_chain_id, take_chain_id))
    }

    /// Pick the first bucket containing both `give_token` on `give_chain_id` and at least one
    /// reserve token on `take_chain_id`.
    pub fn pick_for_give(
        &self,
        give_chain_id: u64,
        give_token: Address,
        take_chain_id: u64,
    ) -> Option<&Bucket> {
        self.buckets.iter().find(|bucket| {
            bucket.contains(give_chain_id, give_token) && !bucket.tokens_on(take_chain_id).is_empty()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    #[test]
    fn bucket_spans_requires_both_sides() {
        let mut members = HashMap::new();
        members.insert(1, vec![addr(1)]);
        let bucket = Bucket::new(members);

        assert!(!bucket.spans(1, 2));

        let mut members = HashMap::new();
        members.insert(1, vec![addr(1)]);
        members.insert(2, vec![addr(2)]);
        let bucket = Bucket::new(members);
        assert!(bucket.spans(1, 2));
    }

    #[test]
    fn set_covers_pair_only_when_some_bucket_spans_it() {
        let mut members = HashMap::new();
        members.insert(1, vec![addr(1)]);
        members.insert(2, vec![addr(2)]);
        let set = TokensBucketSet::new(vec![Bucket::new(members)]);

        assert!(set.covers_pair(1, 2));
        assert!(!set.covers_pair(1, 3));
    }

    #[test]
    fn pick_for_give_finds_bucket_with_reserve_on_take_chain() {
        let mut members = HashMap::new();
        members.insert(1, vec![addr(1)]);
        members.insert(2, vec![addr(2), addr(3)]);
        let set = TokensBucketSet::new(vec![Bucket::new(members)]);

        let bucket = set.pick_for_give(1, addr(1), 2).expect("bucket found");
        assert_eq!(bucket.tokens_on(2), &[addr(2), addr(3)]);
        assert!(set.pick_for_give(1, addr(9), 2).is_none());
    }
}
