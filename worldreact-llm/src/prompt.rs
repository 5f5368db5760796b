//! Prompt templates for world-reaction assessment.
//!
//! Templates use `{key}` placeholders filled by [`render_template`]. Literal
//! braces in the JSON examples are doubled (`{{` / `}}`) and collapsed on
//! render.

use worldreact_core::{EntityKind, ReactionRequest};

/// System prompt for a single entity's reaction.
pub const REACTION_SYSTEM: &str = r"You are the game master of a living fantasy world.
You decide how one {entity_kind} reacts to something a player just did.

RULES:
- Judge the action from {entity_name}'s point of view only.
- Stay consistent with their current disposition toward the player.
- Narration is at most 2 sentences, present tense, second person for the player.
- Never decide the player's feelings or actions.
- Your response must be valid JSON.";

/// User prompt for a single entity's reaction.
pub const REACTION_USER: &str = r#"Location: {location}
Reacting entity: {entity_name} ({entity_kind})
Disposition toward the player: {disposition}
Player reputation: {reputation}

Player action: "{player_input}"

How does {entity_name} perceive and react to this? Return JSON:
{{"perception": "how they read the action", "narration": "what the player sees or hears", "attitude_shift": "how their attitude changes, or null"}}"#;

/// Simple template interpolation for prompts.
///
/// Replaces `{key}` with the corresponding value, then collapses `{{`/`}}`
/// into literal braces. Unknown placeholders are left as-is.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{key}}}"), value);
    }
    result.replace("{{", "{").replace("}}", "}")
}

/// Human-readable name for an entity identifier (`npc_old_miller` → `old miller`).
#[must_use]
pub fn display_name(entity: &str) -> String {
    let trimmed = entity.trim();
    let bare = ["npc_", "faction_", "env_", "location_"]
        .iter()
        .find_map(|prefix| trimmed.strip_prefix(prefix))
        .unwrap_or(trimmed);
    bare.replace('_', " ")
}

/// Render the (system, user) prompt pair for `request`.
#[must_use]
pub fn reaction_prompt(request: &ReactionRequest) -> (String, String) {
    let ctx = &request.context;
    let kind = match request.target_kind() {
        EntityKind::Npc => "character",
        EntityKind::Faction => "faction",
        EntityKind::Environment => "place and its onlookers",
        EntityKind::Unknown => "presence",
    };
    let name = display_name(&request.target_entity);
    let location = ctx
        .location_id
        .as_deref()
        .map_or_else(|| "unknown".to_string(), display_name);
    let disposition = format!("{:?}", ctx.disposition_of(&request.target_entity)).to_lowercase();
    let reputation = ctx.reputation_summary.as_deref().unwrap_or("unknown");

    let vars = [
        ("entity_kind", kind),
        ("entity_name", name.as_str()),
        ("location", location.as_str()),
        ("disposition", disposition.as_str()),
        ("reputation", reputation),
        ("player_input", request.player_input.trim()),
    ];
    (
        render_template(REACTION_SYSTEM, &vars),
        render_template(REACTION_USER, &vars),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use worldreact_core::{Disposition, ReactionContext, RequestMode};

    #[test]
    fn template_rendering_works() {
        let out = render_template("Hello {name}, {{\"a\": 1}}", &[("name", "Goran")]);
        assert_eq!(out, "Hello Goran, {\"a\": 1}");
    }

    #[test]
    fn template_handles_missing_vars() {
        let out = render_template("Hello {name}", &[]);
        assert_eq!(out, "Hello {name}");
    }

    #[test]
    fn display_name_strips_prefix() {
        assert_eq!(display_name("npc_old_miller"), "old miller");
        assert_eq!(display_name("faction_thieves_guild"), "thieves guild");
        assert_eq!(display_name("dragon"), "dragon");
    }

    #[test]
    fn reaction_prompt_fills_every_placeholder() {
        let mut ctx = ReactionContext::new("player_1", "market_square");
        ctx.reputation_summary = Some("known for settling debts".into());
        ctx.dispositions.insert("npc_merchant".into(), Disposition::Suspicious);
        let request = ReactionRequest::new(
            "  haggle over the price ",
            Arc::new(ctx),
            "npc_merchant",
            RequestMode::Standard,
        );

        let (system, user) = reaction_prompt(&request);
        assert!(system.contains("merchant's point of view"));
        assert!(user.contains("Location: market square"));
        assert!(user.contains("Disposition toward the player: suspicious"));
        assert!(user.contains("known for settling debts"));
        assert!(user.contains("\"haggle over the price\""));
        assert!(user.contains("{\"perception\""));
        for rendered in [&system, &user] {
            assert!(!rendered.contains("{entity_name}"));
            assert!(!rendered.contains("{player_input}"));
        }
    }
}
