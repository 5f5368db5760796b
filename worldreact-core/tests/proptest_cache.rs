//! Property-based tests for the reaction cache and key derivation.
//!
//! Uses `proptest` to check capacity, recency and key-normalisation
//! invariants under random operation sequences.

use std::collections::VecDeque;
use std::time::Duration;

use proptest::prelude::*;

use worldreact_core::cache::TtlLruCache;
use worldreact_core::key::{cache_key, normalize_input};
use worldreact_core::types::ReactionContext;

const TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
enum Op {
    Set(u8),
    Get(u8),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![(0u8..16).prop_map(Op::Set), (0u8..16).prop_map(Op::Get)]
}

/// Variants of `words` with random casing and whitespace padding.
fn arb_spelling(words: Vec<String>) -> impl Strategy<Value = String> {
    let n = words.len();
    (
        proptest::collection::vec(any::<bool>(), n),
        proptest::collection::vec(prop_oneof![Just(" "), Just("  "), Just("\t"), Just(" \n ")], n),
    )
        .prop_map(move |(upper, gaps)| {
            let mut out = String::from(" ");
            for ((word, up), gap) in words.iter().zip(upper).zip(gaps) {
                out.push_str(&if up { word.to_uppercase() } else { word.clone() });
                out.push_str(gap);
            }
            out
        })
}

// ---------------------------------------------------------------------------
// Property: the cache never holds more than its capacity
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn size_never_exceeds_capacity(
        capacity in 1usize..8,
        ops in proptest::collection::vec(arb_op(), 0..64),
    ) {
        let cache: TtlLruCache<u8> = TtlLruCache::new(capacity).expect("cache");
        for op in ops {
            match op {
                Op::Set(k) => cache.set(format!("k{k}"), k, TTL),
                Op::Get(k) => { let _ = cache.get(&format!("k{k}")); }
            }
            prop_assert!(cache.len() <= capacity);
        }
    }
}

// ---------------------------------------------------------------------------
// Property: eviction follows access recency, matching a reference model
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn eviction_matches_lru_model(
        capacity in 1usize..6,
        ops in proptest::collection::vec(arb_op(), 0..64),
    ) {
        let cache: TtlLruCache<u8> = TtlLruCache::new(capacity).expect("cache");
        // Front = least recently used.
        let mut model: VecDeque<u8> = VecDeque::new();
        let mut evictions = 0u64;

        for op in ops {
            match op {
                Op::Set(k) => {
                    cache.set(format!("k{k}"), k, TTL);
                    if let Some(pos) = model.iter().position(|&m| m == k) {
                        model.remove(pos);
                    } else if model.len() == capacity {
                        model.pop_front();
                        evictions += 1;
                    }
                    model.push_back(k);
                }
                Op::Get(k) => {
                    let got = cache.get(&format!("k{k}"));
                    if let Some(pos) = model.iter().position(|&m| m == k) {
                        prop_assert_eq!(got, Some(k));
                        model.remove(pos);
                        model.push_back(k);
                    } else {
                        prop_assert_eq!(got, None);
                    }
                }
            }
        }

        prop_assert_eq!(cache.len(), model.len());
        prop_assert_eq!(cache.stats().evictions, evictions);
    }
}

// ---------------------------------------------------------------------------
// Property: invalidation removes exactly the matching keys
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn invalidate_pattern_is_exact(
        players in proptest::collection::vec(0u8..4, 1..20),
    ) {
        let cache: TtlLruCache<u8> = TtlLruCache::new(64).expect("cache");
        for (i, p) in players.iter().enumerate() {
            cache.set(format!("player_{p}:npc_{i}:0000000000000000"), *p, TTL);
        }
        let expected = players.iter().filter(|&&p| p == 0).count();

        let removed = cache.invalidate_pattern("player_0:");
        prop_assert_eq!(removed, expected);
        prop_assert_eq!(cache.len(), players.len() - expected);
    }
}

// ---------------------------------------------------------------------------
// Property: casing and whitespace never change a cache key
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn key_ignores_casing_and_whitespace(
        spelling in proptest::collection::vec("[a-z]{1,8}", 1..6)
            .prop_flat_map(|words| (Just(words.join(" ")), arb_spelling(words))),
    ) {
        let (canonical, noisy) = spelling;
        let ctx = ReactionContext::new("player_1", "market");

        prop_assert_eq!(normalize_input(&noisy), canonical.clone());
        prop_assert_eq!(
            cache_key(&canonical, "npc_merchant", &ctx),
            cache_key(&noisy, "npc_merchant", &ctx)
        );
    }

    #[test]
    fn key_is_deterministic(input in ".{0,64}", entity in "[a-z_]{1,16}") {
        let ctx = ReactionContext::new("player_1", "market");
        prop_assert_eq!(cache_key(&input, &entity, &ctx), cache_key(&input, &entity, &ctx));
    }
}
