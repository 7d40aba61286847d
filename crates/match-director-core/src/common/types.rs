//! # Match Projections
//!
//! Pure, read-only views over [`MatchObject`]s shared by the population gate,
//! the director and the allocator. None of these functions mutate the match
//! or influence how it moves through the pipeline beyond the validity checks.
//!
//! ## Constants
//!
//! - [`DEFAULT_POOL`] - Name of the pool whose stats carry the total player
//!   population.
//! - [`DEFAULT_PROFILE_ID`] - Profile id used when a profile document has no
//!   `name`.

use crate::proto::MatchObject;
use serde::de::IgnoredAny;

/// Pool name, by convention, that the starter profile's matchmaking function
/// fills with the total number of indexed players.
pub const DEFAULT_POOL: &str = "defaultPool";

/// Fallback profile id for documents without a top-level `name`.
pub const DEFAULT_PROFILE_ID: &str = "test-dm-usc1f";

/// Returns the backend-reported error for a match, if any.
///
/// A match carrying an error is only useful for diagnostics.
pub fn backend_error(m: &MatchObject) -> Option<&str> {
    (!m.error.is_empty()).then_some(m.error.as_str())
}

/// Returns `true` if the match properties are one well-formed JSON document.
///
/// An empty string is not a document and is rejected.
pub fn has_valid_properties(m: &MatchObject) -> bool {
    serde_json::from_str::<IgnoredAny>(&m.properties).is_ok()
}

/// Player count reported in the stats of the [`DEFAULT_POOL`] pool.
///
/// Returns `None` when the pool is absent or carries no stats. If the pool is
/// repeated, the last occurrence wins.
pub fn default_pool_player_count(m: &MatchObject) -> Option<i64> {
    m.pools
        .iter()
        .filter(|pool| pool.name == DEFAULT_POOL)
        .filter_map(|pool| pool.stats.as_ref())
        .map(|stats| stats.count)
        .last()
}

/// Player ids across all rosters, in roster order then player order.
pub fn player_ids(m: &MatchObject) -> Vec<&str> {
    m.rosters
        .iter()
        .flat_map(|roster| roster.players.iter())
        .map(|player| player.id.as_str())
        .collect()
}
