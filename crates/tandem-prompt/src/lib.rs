//! Prompt builders for the generation pipeline
//!
//! Three builders, each deterministic and pure given its inputs:
//! classification (reasoning-then-label), synthesis (merge two drafts),
//! and refinement (improve a single surviving draft). Conversation
//! history renders as an ordered role-labeled transcript; drafts are
//! always inlined into the prompt text, never passed as history turns.

use tandem_utils::types::ChatTurn;

/// Literal used in place of a transcript when there is no prior context
pub const NO_HISTORY_PLACEHOLDER: &str = "(no prior conversation)";

/// Label word the classifier must emit for creative requests
pub const CREATIVE_LABEL: &str = "CREATIVE";

/// Label word the classifier must emit for factual requests
pub const FACTUAL_LABEL: &str = "FACTUAL";

/// Render history as an ordered, role-labeled transcript.
///
/// Returns [`NO_HISTORY_PLACEHOLDER`] for an empty history so every
/// prompt carries an explicit context section.
#[must_use]
pub fn render_history(history: &[ChatTurn]) -> String {
    if history.is_empty() {
        return NO_HISTORY_PLACEHOLDER.to_string();
    }
    history
        .iter()
        .map(|turn| format!("{}: {}", turn.role, turn.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Optional hard-constraint clause. Empty or absent constraints
/// contribute no text.
fn constraint_clause(constraint: Option<&str>) -> String {
    match constraint {
        Some(c) if !c.trim().is_empty() => {
            format!(
                "\n\nCRITICAL INSTRUCTION: The response MUST satisfy this constraint, \
                 treat it as mandatory: {c}"
            )
        }
        _ => String::new(),
    }
}

/// Build the intent-classification prompt.
///
/// Instructs free-form reasoning followed by a final line containing
/// exactly one of the two label words.
#[must_use]
pub fn classification_prompt(prompt: &str, history: &[ChatTurn]) -> String {
    format!(
        "You are a request classifier. Decide whether the user request below \
         asks primarily for verifiable information ({FACTUAL_LABEL}) or for \
         open-ended generation such as stories, poems or brainstorming \
         ({CREATIVE_LABEL}).\n\n\
         Conversation so far:\n{history}\n\n\
         User request:\n{prompt}\n\n\
         First explain your reasoning in a few sentences. Then output a final \
         line containing exactly one word: {FACTUAL_LABEL} or {CREATIVE_LABEL}.",
        history = render_history(history),
    )
}

/// Build the synthesis prompt merging two independent drafts.
#[must_use]
pub fn synthesis_prompt(
    prompt: &str,
    draft_a: &str,
    draft_b: &str,
    constraint: Option<&str>,
    history: &[ChatTurn],
) -> String {
    format!(
        "You are an expert editor. Two independent assistants drafted answers \
         to the same request. Merge them into a single response that keeps the \
         strengths of both, resolves any contradictions, and reads as one \
         voice. Do not mention the drafts or the merging process.\n\n\
         Conversation so far:\n{history}\n\n\
         User request:\n{prompt}\n\n\
         Draft A:\n{draft_a}\n\n\
         Draft B:\n{draft_b}{constraint}",
        history = render_history(history),
        constraint = constraint_clause(constraint),
    )
}

/// Build the refinement prompt improving a single surviving draft.
///
/// Used whenever exactly one base provider failed.
#[must_use]
pub fn refinement_prompt(
    prompt: &str,
    draft: &str,
    constraint: Option<&str>,
    history: &[ChatTurn],
) -> String {
    format!(
        "You are an expert editor. An assistant drafted an answer to the \
         request below. Improve the draft in place: fix errors, tighten the \
         writing, and make it fully answer the request. Do not mention the \
         draft or the editing process.\n\n\
         Conversation so far:\n{history}\n\n\
         User request:\n{prompt}\n\n\
         Draft:\n{draft}{constraint}",
        history = render_history(history),
        constraint = constraint_clause(constraint),
    )
}
