//! Rule-based reaction synthesis.
//!
//! Used whenever the authoritative computation cannot deliver in time. The
//! player's text is scanned for aggressive, friendly and questioning marker
//! words; the dominant tone and the target's disposition pick a canned line,
//! flavoured with the target's name and kind.
//!
//! Never calls the LLM and never allocates more than a handful of strings,
//! so it stays far below a millisecond.

use worldreact_core::{
    Disposition, EntityKind, FallbackReason, FallbackSynthesizer, ReactionContext, ReactionData,
    ReactionRequest, ReactionResult,
};
use worldreact_llm::prompt::display_name;

// ---------------------------------------------------------------------------
// Lexical analysis
// ---------------------------------------------------------------------------

const AGGRESSIVE_MARKERS: &[&str] = &[
    "attack", "kill", "threaten", "steal", "punch", "fight", "draw", "stab", "burn", "rob",
    "insult", "shove", "hit", "destroy", "smash", "kick", "yell", "spit", "grab", "slap",
];

const FRIENDLY_MARKERS: &[&str] = &[
    "greet", "hello", "hi", "thank", "thanks", "help", "smile", "gift", "give", "compliment",
    "wave", "bow", "hug", "please", "share", "offer", "heal", "praise", "welcome", "befriend",
];

const QUESTIONING_MARKERS: &[&str] = &[
    "ask", "what", "why", "how", "where", "who", "when", "inquire", "wonder", "question",
    "rumor", "rumour", "explain",
];

/// Dominant emotional tone of a player action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerTone {
    /// Threats, violence, theft.
    Aggressive,
    /// Greetings, gifts, help.
    Friendly,
    /// Questions and inquiries.
    Questioning,
    /// Nothing stood out.
    Neutral,
}

/// Marker counts found in one player input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputAnalysis {
    /// Dominant tone.
    pub tone: PlayerTone,
    /// Aggressive marker hits.
    pub aggressive: usize,
    /// Friendly marker hits.
    pub friendly: usize,
    /// Questioning marker hits (a `?` counts once).
    pub questioning: usize,
}

/// Exact match, a plain `-s`/`-es` form of a marker of three or more letters,
/// or a longer word extending a marker of four or more letters.
fn is_marker(word: &str, markers: &[&str]) -> bool {
    let singular = |suffix: &str| word.strip_suffix(suffix).filter(|stem| stem.len() >= 3);
    markers.iter().any(|m| {
        word == *m
            || singular("s") == Some(*m)
            || singular("es") == Some(*m)
            || (m.len() >= 4 && word.len() > m.len() && word.starts_with(m))
    })
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

fn npc_line(tone: PlayerTone, disposition: Disposition) -> &'static str {
    use Disposition::{Friendly, Hostile, Neutral, Suspicious};
    use PlayerTone::{Aggressive, Friendly as Warm, Neutral as Flat, Questioning};

    match (tone, disposition) {
        (Aggressive, Friendly) => "{Name} flinches, hurt more than afraid, and takes a step back.",
        (Aggressive, Neutral) => "{Name} tenses and edges away, eyes fixed on your hands.",
        (Aggressive, Suspicious) => "{Name} mutters that they knew you were trouble and reaches for help.",
        (Aggressive, Hostile) => "{Name} squares up, clearly ready to answer in kind.",
        (Warm, Friendly) => "{Name} breaks into an easy smile and returns the gesture warmly.",
        (Warm, Neutral) => "{Name} nods politely, a little warmer than before.",
        (Warm, Suspicious) => "{Name} accepts the gesture with a guarded look.",
        (Warm, Hostile) => "{Name} eyes you coldly, unmoved by the pleasantries.",
        (Questioning, Friendly) => "{Name} leans in, happy to tell you what they know.",
        (Questioning, Neutral) => "{Name} considers the question before giving a careful answer.",
        (Questioning, Suspicious) => "{Name} answers vaguely and asks why you want to know.",
        (Questioning, Hostile) => "{Name} folds their arms and refuses to answer.",
        (Flat, Friendly) => "{Name} glances over with a friendly nod.",
        (Flat, Neutral) => "{Name} notices, but goes back to what they were doing.",
        (Flat, Suspicious) => "{Name} watches you a moment longer than is comfortable.",
        (Flat, Hostile) => "{Name} glares at you from across the way.",
    }
}

fn faction_line(tone: PlayerTone) -> &'static str {
    match tone {
        PlayerTone::Aggressive => "Word of this will reach the {name}, and they will not take it lightly.",
        PlayerTone::Friendly => "Someone loyal to the {name} takes note of your goodwill.",
        PlayerTone::Questioning => "Your curiosity about the {name} does not go unnoticed.",
        PlayerTone::Neutral => "The {name} has eyes everywhere; this will be remembered.",
    }
}

fn environment_line(tone: PlayerTone) -> &'static str {
    match tone {
        PlayerTone::Aggressive => "A hush falls over the {name} as bystanders scatter.",
        PlayerTone::Friendly => "The mood around the {name} eases a little.",
        PlayerTone::Questioning => "A few people around the {name} pause to listen.",
        PlayerTone::Neutral => "Life around the {name} carries on.",
    }
}

fn tone_reading(tone: PlayerTone) -> &'static str {
    match tone {
        PlayerTone::Aggressive => "a threat",
        PlayerTone::Friendly => "a friendly gesture",
        PlayerTone::Questioning => "an inquiry",
        PlayerTone::Neutral => "nothing remarkable",
    }
}

fn attitude_shift(tone: PlayerTone, disposition: Disposition) -> Option<String> {
    match (tone, disposition) {
        (PlayerTone::Aggressive, Disposition::Hostile) => Some("hostility hardens".into()),
        (PlayerTone::Aggressive, _) => Some("more wary of the player".into()),
        (PlayerTone::Friendly, Disposition::Hostile) => None,
        (PlayerTone::Friendly, _) => Some("slightly warmer toward the player".into()),
        _ => None,
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Synthesizer
// ---------------------------------------------------------------------------

/// Context-flavoured, rule-based [`FallbackSynthesizer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IntelligentFallback;

impl IntelligentFallback {
    /// Count marker words in `input` and pick the dominant tone.
    ///
    /// Ties resolve in the order aggressive, friendly, questioning.
    #[must_use]
    pub fn analyze_input(input: &str) -> InputAnalysis {
        let lowered = input.to_lowercase();
        let mut analysis = InputAnalysis {
            tone: PlayerTone::Neutral,
            aggressive: 0,
            friendly: 0,
            questioning: usize::from(lowered.contains('?')),
        };

        for word in lowered.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            if is_marker(word, AGGRESSIVE_MARKERS) {
                analysis.aggressive += 1;
            } else if is_marker(word, FRIENDLY_MARKERS) {
                analysis.friendly += 1;
            } else if is_marker(word, QUESTIONING_MARKERS) {
                analysis.questioning += 1;
            }
        }

        let top = analysis.aggressive.max(analysis.friendly).max(analysis.questioning);
        analysis.tone = if top == 0 {
            PlayerTone::Neutral
        } else if analysis.aggressive == top {
            PlayerTone::Aggressive
        } else if analysis.friendly == top {
            PlayerTone::Friendly
        } else {
            PlayerTone::Questioning
        };
        analysis
    }

    /// Build a fallback reaction of `entity` to `input` in `context`.
    #[must_use]
    pub fn synthesize_for(
        &self,
        input: &str,
        context: &ReactionContext,
        entity: &str,
        reason: FallbackReason,
    ) -> ReactionResult {
        let tone = Self::analyze_input(input).tone;
        let disposition = context.disposition_of(entity);
        let name = display_name(entity);

        let (template, subject) = match EntityKind::of(entity) {
            EntityKind::Npc => (npc_line(tone, disposition), format!("the {name}")),
            EntityKind::Faction => (faction_line(tone), format!("the {name}")),
            EntityKind::Environment => (environment_line(tone), format!("onlookers in the {name}")),
            EntityKind::Unknown => (npc_line(PlayerTone::Neutral, disposition), name.clone()),
        };
        let narration = template
            .replace("{Name}", &capitalize(&subject))
            .replace("{name}", &name);

        ReactionResult::fallback(
            entity,
            ReactionData {
                perception: format!("{} reads the action as {}.", capitalize(&subject), tone_reading(tone)),
                suggested_narration: narration,
                attitude_shift: attitude_shift(tone, disposition),
            },
            reason,
        )
    }
}

impl FallbackSynthesizer for IntelligentFallback {
    fn synthesize(&self, request: &ReactionRequest, reason: FallbackReason) -> ReactionResult {
        self.synthesize_for(&request.player_input, &request.context, &request.target_entity, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggressive_input_is_detected() {
        let analysis = IntelligentFallback::analyze_input("I draw my sword and threaten the guard");
        assert_eq!(analysis.tone, PlayerTone::Aggressive);
        assert_eq!(analysis.aggressive, 2);
    }

    #[test]
    fn friendly_input_is_detected() {
        let analysis = IntelligentFallback::analyze_input("Hello! I smile and offer a gift");
        assert_eq!(analysis.tone, PlayerTone::Friendly);
        assert_eq!(analysis.friendly, 4);
    }

    #[test]
    fn question_mark_counts_as_questioning() {
        let analysis = IntelligentFallback::analyze_input("Where is the old mill?");
        assert_eq!(analysis.tone, PlayerTone::Questioning);
        assert_eq!(analysis.questioning, 2);
    }

    #[test]
    fn markers_do_not_match_inside_unrelated_words() {
        // "this" contains "hi", "whitewash" contains "hit".
        let analysis = IntelligentFallback::analyze_input("this whitewash");
        assert_eq!(analysis.tone, PlayerTone::Neutral);
    }

    #[test]
    fn inflected_markers_match() {
        let analysis = IntelligentFallback::analyze_input("attacking and threatening");
        assert_eq!(analysis.aggressive, 2);

        let analysis = IntelligentFallback::analyze_input("the rogue attacks and kills, then punches");
        assert_eq!(analysis.aggressive, 3);
        assert_eq!(analysis.tone, PlayerTone::Aggressive);

        let analysis = IntelligentFallback::analyze_input("she greets him and asks");
        assert_eq!(analysis.friendly, 1);
        assert_eq!(analysis.questioning, 1);
    }

    #[test]
    fn short_markers_need_an_exact_or_plural_form() {
        // "his" is not "hi" + s; "hits" is "hit" + s.
        assert_eq!(IntelligentFallback::analyze_input("his hat").tone, PlayerTone::Neutral);
        assert_eq!(IntelligentFallback::analyze_input("he hits").aggressive, 1);
    }

    #[test]
    fn ties_prefer_aggression() {
        let analysis = IntelligentFallback::analyze_input("hello then attack");
        assert_eq!(analysis.tone, PlayerTone::Aggressive);
    }

    #[test]
    fn npc_template_uses_disposition_and_name() {
        let mut ctx = ReactionContext::new("player_1", "market");
        ctx.dispositions.insert("npc_merchant".into(), Disposition::Hostile);

        let result = IntelligentFallback.synthesize_for(
            "attack the merchant",
            &ctx,
            "npc_merchant",
            FallbackReason::Timeout,
        );
        assert!(result.is_fallback);
        assert!(!result.success);
        assert_eq!(result.fallback_reason, Some(FallbackReason::Timeout));
        assert_eq!(
            result.reaction.suggested_narration,
            "The merchant squares up, clearly ready to answer in kind."
        );
        assert_eq!(result.reaction.attitude_shift.as_deref(), Some("hostility hardens"));
    }

    #[test]
    fn environment_and_faction_templates() {
        let ctx = ReactionContext::new("player_1", "market");
        let env = IntelligentFallback.synthesize_for("I smash the stall", &ctx, "env_market", FallbackReason::Synthesized);
        assert_eq!(env.reaction.suggested_narration, "A hush falls over the market as bystanders scatter.");

        let faction = IntelligentFallback.synthesize_for(
            "ask about the guild",
            &ctx,
            "faction_thieves_guild",
            FallbackReason::Synthesized,
        );
        assert_eq!(
            faction.reaction.suggested_narration,
            "Your curiosity about the thieves guild does not go unnoticed."
        );
    }

    #[test]
    fn synthesis_is_fast() {
        let ctx = ReactionContext::new("player_1", "market");
        let started = std::time::Instant::now();
        for _ in 0..1000 {
            let _ = IntelligentFallback.synthesize_for(
                "I greet the merchant and ask about rumours of bandits",
                &ctx,
                "npc_merchant",
                FallbackReason::Timeout,
            );
        }
        // 1000 syntheses comfortably inside 1s even in debug builds.
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }
}
