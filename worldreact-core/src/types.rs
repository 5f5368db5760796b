//! Core types shared across the worldreact engine.
//!
//! The host game hands us free-text player input plus a [`ReactionContext`];
//! the engine answers with one [`ReactionResult`] per target entity.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// Coarse kind of a world entity, derived from its identifier prefix.
///
/// The declaration order is the reaction priority order: NPCs react first,
/// then factions, then the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A non-player character (`npc_*`).
    Npc,
    /// A faction or organisation (`faction_*`).
    Faction,
    /// The surroundings of a location (`env_*` / `location_*`).
    Environment,
    /// Anything else.
    Unknown,
}

impl EntityKind {
    /// Classify an entity identifier.
    #[must_use]
    pub fn of(entity: &str) -> Self {
        let id = entity.trim().to_ascii_lowercase();
        if id.starts_with("npc_") {
            Self::Npc
        } else if id.starts_with("faction_") {
            Self::Faction
        } else if id.starts_with("env_") || id.starts_with("location_") {
            Self::Environment
        } else {
            Self::Unknown
        }
    }

    /// Sort rank; lower reacts first.
    #[must_use]
    pub fn priority(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Npc => write!(f, "npc"),
            Self::Faction => write!(f, "faction"),
            Self::Environment => write!(f, "environment"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Identifier of the environment entity for a location.
#[must_use]
pub fn environment_entity(location: &str) -> String {
    format!("env_{location}")
}

/// How a target currently feels about the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Well-disposed toward the player.
    Friendly,
    /// No strong opinion.
    #[default]
    Neutral,
    /// Wary or distrustful.
    Suspicious,
    /// Openly antagonistic.
    Hostile,
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Everything the host knows about the scene a player action happens in.
///
/// Every signal is optional; empty lists simply contribute nothing to target
/// derivation or prompt construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReactionContext {
    /// Acting player.
    #[serde(default)]
    pub player_id: String,
    /// Current location identifier.
    #[serde(default)]
    pub location_id: Option<String>,
    /// Free-text reputation summary for the player.
    #[serde(default)]
    pub reputation_summary: Option<String>,
    /// NPCs the scene is actively focused on.
    #[serde(default)]
    pub active_npcs: Vec<String>,
    /// NPCs physically present in the location.
    #[serde(default)]
    pub present_npcs: Vec<String>,
    /// NPCs currently in dialogue with the player.
    #[serde(default)]
    pub dialogue_npcs: Vec<String>,
    /// NPCs currently in combat with or near the player.
    #[serde(default)]
    pub combat_npcs: Vec<String>,
    /// NPCs the location marks as important (shopkeepers, guards, ...).
    #[serde(default)]
    pub important_npcs: Vec<String>,
    /// Factions with a stake in the scene.
    #[serde(default)]
    pub active_factions: Vec<String>,
    /// Known dispositions, keyed by entity identifier.
    #[serde(default)]
    pub dispositions: HashMap<String, Disposition>,
}

impl ReactionContext {
    /// Create a context for a player at a location.
    #[must_use]
    pub fn new(player_id: impl Into<String>, location_id: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            location_id: Some(location_id.into()),
            ..Self::default()
        }
    }

    /// Disposition of `entity` toward the player (neutral when unknown).
    #[must_use]
    pub fn disposition_of(&self, entity: &str) -> Disposition {
        self.dispositions.get(entity).copied().unwrap_or_default()
    }

    /// Environment entity for the current location, if any.
    #[must_use]
    pub fn location_entity(&self) -> Option<String> {
        self.location_id
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .map(environment_entity)
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Which path submitted a request. Part of the batch similarity key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestMode {
    /// Full assessment.
    Standard,
    /// Reduced-latency priority assessment.
    Priority,
    /// Background cache warming.
    Background,
}

/// A pending unit of reaction work.
#[derive(Debug, Clone)]
pub struct ReactionRequest {
    /// The player's free-text action.
    pub player_input: String,
    /// Scene context, shared across all requests of one assessment.
    pub context: Arc<ReactionContext>,
    /// Entity whose reaction is requested.
    pub target_entity: String,
    /// Cache key derived from input, entity and context.
    pub cache_key: String,
    /// Submitting path.
    pub mode: RequestMode,
}

impl ReactionRequest {
    /// Build a request, deriving its cache key.
    #[must_use]
    pub fn new(
        player_input: impl Into<String>,
        context: Arc<ReactionContext>,
        target_entity: impl Into<String>,
        mode: RequestMode,
    ) -> Self {
        let player_input = player_input.into();
        let target_entity = target_entity.into();
        let cache_key = crate::key::cache_key(&player_input, &target_entity, &context);
        Self {
            player_input,
            context,
            target_entity,
            cache_key,
            mode,
        }
    }

    /// Kind of the target entity.
    #[must_use]
    pub fn target_kind(&self) -> EntityKind {
        EntityKind::of(&self.target_entity)
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// What an entity perceives and how the narrator could voice it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReactionData {
    /// Short summary of how the entity perceives the action.
    pub perception: String,
    /// Narration the game master may use verbatim.
    pub suggested_narration: String,
    /// Optional description of how the entity's attitude shifts.
    #[serde(default)]
    pub attitude_shift: Option<String>,
}

/// Why a result is a fallback rather than an authoritative computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// The computation exceeded its per-item timeout.
    Timeout,
    /// The computation failed.
    Error(String),
    /// Produced locally without attempting the computation.
    Synthesized,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Error(msg) => write!(f, "error: {msg}"),
            Self::Synthesized => write!(f, "synthesized"),
        }
    }
}

/// One entity's reaction: the unit returned to callers and cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionResult {
    /// Whether the authoritative computation succeeded.
    pub success: bool,
    /// Entity this reaction belongs to.
    pub target_entity: String,
    /// The reaction itself.
    pub reaction: ReactionData,
    /// Produced by a fallback path.
    pub is_fallback: bool,
    /// Why, when `is_fallback`.
    pub fallback_reason: Option<FallbackReason>,
    /// Wall time spent producing this result.
    pub assessment_time: Duration,
    /// Served from the cache by this call.
    #[serde(default)]
    pub from_cache: bool,
}

/// Generic narration used when no richer fallback is available.
pub const GENERIC_FALLBACK_NARRATION: &str =
    "The world seems to pause for a moment, taking in what just happened.";

impl ReactionResult {
    /// A successful, authoritative reaction.
    #[must_use]
    pub fn success(target_entity: impl Into<String>, reaction: ReactionData) -> Self {
        Self {
            success: true,
            target_entity: target_entity.into(),
            reaction,
            is_fallback: false,
            fallback_reason: None,
            assessment_time: Duration::ZERO,
            from_cache: false,
        }
    }

    /// A fallback reaction carrying the given narration.
    #[must_use]
    pub fn fallback(
        target_entity: impl Into<String>,
        reaction: ReactionData,
        reason: FallbackReason,
    ) -> Self {
        Self {
            success: false,
            target_entity: target_entity.into(),
            reaction,
            is_fallback: true,
            fallback_reason: Some(reason),
            assessment_time: Duration::ZERO,
            from_cache: false,
        }
    }

    /// Low-commitment fallback with generic narration.
    #[must_use]
    pub fn generic_fallback(target_entity: impl Into<String>, reason: FallbackReason) -> Self {
        let reaction = ReactionData {
            perception: "The reaction could not be assessed in time.".to_string(),
            suggested_narration: GENERIC_FALLBACK_NARRATION.to_string(),
            attitude_shift: None,
        };
        Self::fallback(target_entity, reaction, reason)
    }

    /// Set the measured assessment time.
    #[must_use]
    pub fn with_assessment_time(mut self, elapsed: Duration) -> Self {
        self.assessment_time = elapsed;
        self
    }

    /// Kind of the target entity.
    #[must_use]
    pub fn target_kind(&self) -> EntityKind {
        EntityKind::of(&self.target_entity)
    }

    /// Whether this result timed out.
    #[must_use]
    pub fn timed_out(&self) -> bool {
        matches!(self.fallback_reason, Some(FallbackReason::Timeout))
    }
}
