//! Host game-response types the integration layer reads and enriches.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Kind of response the game master is about to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    /// Story narration.
    Narrative,
    /// An NPC speaking.
    Dialogue,
    /// Combat resolution.
    Combat,
    /// System notices (saves, help text, ...).
    System,
    /// Error messages.
    Error,
    /// Out-of-character chatter.
    OutOfCharacter,
}

impl ResponseType {
    /// Whether world reactions add anything to this kind of response.
    #[must_use]
    pub fn is_in_world(self) -> bool {
        matches!(self, Self::Narrative | Self::Dialogue | Self::Combat)
    }
}

/// Reaction details attached to a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionMetadata {
    /// Entity whose reaction was used.
    pub primary_target: String,
    /// How that entity perceived the action.
    pub perception: String,
    /// How its attitude shifted, if at all.
    pub attitude_shift: Option<String>,
    /// Whether the reaction is a fallback.
    pub is_fallback: bool,
    /// Entities assessed in total.
    pub entities_assessed: usize,
    /// Time spent assessing.
    pub processing_time: Duration,
}

/// A response on its way from the game master to the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameResponse {
    /// Kind of response.
    pub response_type: ResponseType,
    /// Text shown to the player; `None` when the host produced none.
    #[serde(default)]
    pub narration: Option<String>,
    /// Set by the host to skip reaction assessment for this response.
    #[serde(default)]
    pub suppress_reactions: bool,
    /// Filled in by the integration layer.
    #[serde(default)]
    pub reaction: Option<ReactionMetadata>,
}

impl GameResponse {
    /// A response with narration.
    #[must_use]
    pub fn new(response_type: ResponseType, narration: impl Into<String>) -> Self {
        Self {
            response_type,
            narration: Some(narration.into()),
            suppress_reactions: false,
            reaction: None,
        }
    }
}
