//! Cache key derivation.
//!
//! Keys have the shape `"<player>:<entity>:<hash>"`. The readable prefix lets
//! [`ReactionCache::invalidate_pattern`](crate::cache::ReactionCache::invalidate_pattern)
//! drop everything for one player or one entity; the hash covers the
//! normalised input plus the context signals that change a reaction.
//!
//! The reputation summary is hashed in full. Hashing only a prefix would let
//! two long summaries that share their opening collide on the same key.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::types::ReactionContext;

/// Lower-case, trim and collapse internal whitespace runs to one space.
#[must_use]
pub fn normalize_input(input: &str) -> String {
    input
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Deterministic cache key for one (input, entity, context) request.
///
/// Requests that differ only in casing or incidental whitespace map to the
/// same key.
#[must_use]
pub fn cache_key(player_input: &str, target_entity: &str, context: &ReactionContext) -> String {
    let entity = target_entity.trim();
    let player = context.player_id.trim();

    let mut hasher = DefaultHasher::new();
    normalize_input(player_input).hash(&mut hasher);
    entity.hash(&mut hasher);
    player.hash(&mut hasher);
    context.location_id.as_deref().map(str::trim).hash(&mut hasher);
    context.reputation_summary.as_deref().map(str::trim).hash(&mut hasher);

    format!("{player}:{entity}:{:016x}", hasher.finish())
}
