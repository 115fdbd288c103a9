//! Outbound text templating: turn framing and system modifiers.
//!
//! Everything here is a fixed string or a pure function of the clarification
//! round number. The wording is part of the wire contract with the draft
//! service — the service distinguishes a fresh idea from a clarification
//! answer by the framing text, not by metadata — so changes here change
//! behavior, not cosmetics.

/// Fixed system instructions sent with every request.
///
/// The service prepends these to the model conversation; the per-call system
/// modifier (when present) is appended to them server-side.
pub const SYSTEM_INSTRUCTIONS: &str = "\
You are a product requirements assistant. The user will describe a product \
idea; your job is to produce a complete requirements document for it.

Reply with exactly one JSON object and nothing else. Two shapes are allowed:

1. When the idea is too vague to document, ask follow-up questions:
   {\"type\": \"clarification\", \"questions\": [\"...\"]}
   Ask 1-3 questions, each about a genuinely load-bearing unknown.

2. When you know enough, produce the document:
   {\"type\": \"prd\", \"prd\": { \"title\", \"summary\", \"problemStatement\", \
\"targetUsers\", \"features\" (3-5 of {\"name\", \"description\"}), \
\"functionalRequirements\", \"nonFunctionalRequirements\", \
\"userStories\" (at least 3 of {\"story\", \"acceptanceCriteria\"}), \
\"outOfScope\", \"technicalConsiderations\", \
\"roadmap\" (phases of {\"name\", \"items\"}), \"assumptions\" (optional) }}

Prefer generating the document over asking another round of questions. When \
you make an assumption instead of asking, record it in \"assumptions\".";

/// Frame the user's first message as a product idea.
pub fn frame_idea(text: &str) -> String {
    format!("I have a product idea I'd like to turn into a requirements document:\n\n{text}")
}

/// Frame a later message as an answer to the service's clarification questions.
pub fn frame_answer(text: &str) -> String {
    format!("Here are my answers to your clarification questions:\n\n{text}")
}

/// Modifier attached when the dialogue is one round away from the cap.
///
/// `round` is the round this exchange would become, not the stored counter.
pub fn cap_warning(round: u32, cap: u32) -> String {
    format!(
        "This is clarification round {round} of {cap}. If anything is still unclear \
after the user's answer, generate the document anyway and record your \
assumptions rather than asking again."
    )
}

/// Modifier attached once the clarification cap is reached.
pub fn force_generation() -> String {
    "The clarification limit has been reached. Generate the full requirements \
document now, filling any remaining gaps with reasonable assumptions. Respond \
with the prd JSON shape only."
        .to_owned()
}

/// One-shot instruction sent as an extra user turn after a malformed reply.
pub fn json_repair_notice() -> String {
    "Your previous reply was not valid JSON. Respond again with a single valid \
JSON object matching one of the two documented shapes — no prose, no code \
fences, nothing outside the object."
        .to_owned()
}
