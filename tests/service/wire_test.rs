//! Request assembly and reply parsing, no socket involved.

use std::time::Duration;

use draftsmith::conversation::state::{Role, Turn};
use draftsmith::service::{build_request, parse_reply, CallError, ModelReply, REQUEST_DEADLINE};

fn turn(role: Role, content: &str) -> Turn {
    Turn::new(role, content.to_owned())
}

#[test]
fn request_carries_full_transcript_in_order() {
    let turns = vec![
        turn(Role::User, "an idea"),
        turn(Role::Assistant, "a question"),
        turn(Role::User, "an answer"),
    ];

    let request = build_request(&turns, None);

    assert_eq!(request.messages.len(), 3);
    assert_eq!(request.messages[0].role, "user");
    assert_eq!(request.messages[1].role, "assistant");
    assert_eq!(request.messages[2].content, "an answer");
    assert!(request.system_modifier.is_none());
    assert!(!request.system.is_empty());
}

#[test]
fn modifier_serializes_under_camel_case_key_and_only_when_present() {
    let turns = vec![turn(Role::User, "idea")];

    let with = serde_json::to_value(build_request(&turns, Some("finish now")))
        .expect("request should serialize");
    assert_eq!(with["systemModifier"], "finish now");

    let without =
        serde_json::to_value(build_request(&turns, None)).expect("request should serialize");
    assert!(without.get("systemModifier").is_none());
}

#[test]
fn parses_clarification_reply() {
    let body = r#"{"type":"clarification","questions":["Who is it for?","What platform?"]}"#;
    match parse_reply(body).expect("should parse") {
        ModelReply::Clarification { questions } => assert_eq!(questions.len(), 2),
        other => panic!("expected clarification, got {other:?}"),
    }
}

#[test]
fn parses_document_reply() {
    let body = r#"{
        "type": "prd",
        "prd": {
            "title": "Doorbell",
            "summary": "s",
            "problemStatement": "p",
            "targetUsers": "u",
            "features": [{"name": "n", "description": "d"}],
            "functionalRequirements": ["fr"],
            "nonFunctionalRequirements": ["nfr"],
            "userStories": [{"story": "st", "acceptanceCriteria": ["ac"]}],
            "outOfScope": ["oos"],
            "technicalConsiderations": ["tc"],
            "roadmap": [{"name": "mvp", "items": ["i"]}]
        }
    }"#;
    match parse_reply(body).expect("should parse") {
        ModelReply::Prd { prd } => assert_eq!(prd.title, "Doorbell"),
        other => panic!("expected document, got {other:?}"),
    }
}

#[test]
fn rejects_unknown_tag_empty_questions_and_blank_title() {
    let cases = [
        r#"{"type":"poem","verse":"no"}"#,
        r#"{"type":"clarification","questions":[]}"#,
        r#"{"type":"clarification","questions":["   "]}"#,
        r#"{"type":"prd","prd":{"title":"  ","summary":"s","problemStatement":"p",
            "targetUsers":"u","features":[],"functionalRequirements":[],
            "nonFunctionalRequirements":[],"userStories":[],"outOfScope":[],
            "technicalConsiderations":[],"roadmap":[]}}"#,
        r#"not json at all"#,
    ];
    for body in cases {
        assert!(
            matches!(parse_reply(body), Err(CallError::Malformed(_))),
            "should reject: {body}"
        );
    }
}

#[test]
fn deadline_is_forty_five_seconds() {
    assert_eq!(REQUEST_DEADLINE, Duration::from_secs(45));
}
