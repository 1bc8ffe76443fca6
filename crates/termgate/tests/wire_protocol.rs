//! Wire-format checks for the WebSocket and control-channel messages.
//! The JSON shapes here are what browser clients and admin tooling
//! depend on; changing them is a breaking protocol change.

use termgate::web::protocol::{ClientMessage, CreateSessionRequest, ServerMessage};
use termgate_types::{BlockSource, ControlKind, ControlMessage, RiskLevel};
use uuid::Uuid;

#[test]
fn client_input_message_parses() {
    let id = Uuid::new_v4();
    let json = format!(
        r#"{{"type":"Input","data":{{"session_id":"{id}","data":"ls -la\n"}}}}"#
    );
    let msg: ClientMessage = serde_json::from_str(&json).unwrap();
    match msg {
        ClientMessage::Input { session_id, data } => {
            assert_eq!(session_id, id);
            assert_eq!(data, "ls -la\n");
        }
        other => panic!("parsed wrong variant: {other:?}"),
    }
}

#[test]
fn client_resize_message_parses() {
    let id = Uuid::new_v4();
    let json = format!(
        r#"{{"type":"Resize","data":{{"session_id":"{id}","cols":120,"rows":40}}}}"#
    );
    let msg: ClientMessage = serde_json::from_str(&json).unwrap();
    assert!(matches!(
        msg,
        ClientMessage::Resize {
            cols: 120,
            rows: 40,
            ..
        }
    ));
}

#[test]
fn blocked_message_carries_verdict_fields() {
    let msg = ServerMessage::Blocked {
        session_id: Uuid::new_v4(),
        block_id: Uuid::new_v4(),
        source: BlockSource::Analyzer,
        reason: "critical command matched rule recursive_root_delete".to_string(),
        risk_level: Some(RiskLevel::Critical),
        matched_rule: Some("recursive_root_delete".to_string()),
        suggestions: vec!["Target an explicit subdirectory instead".to_string()],
    };
    let json = serde_json::to_value(&msg).unwrap();
    assert_eq!(json["type"], "Blocked");
    assert_eq!(json["data"]["source"], "analyzer");
    assert_eq!(json["data"]["risk_level"], "critical");
    assert_eq!(json["data"]["matched_rule"], "recursive_root_delete");
}

#[test]
fn admin_blocked_message_omits_absent_verdict() {
    let msg = ServerMessage::Blocked {
        session_id: Uuid::new_v4(),
        block_id: Uuid::new_v4(),
        source: BlockSource::Admin,
        reason: "maintenance window".to_string(),
        risk_level: None,
        matched_rule: None,
        suggestions: Vec::new(),
    };
    let json = serde_json::to_value(&msg).unwrap();
    assert_eq!(json["data"]["source"], "admin");
    assert!(json["data"].get("risk_level").is_none());
    assert!(json["data"].get("matched_rule").is_none());
}

#[test]
fn control_directives_use_snake_case_kinds() {
    for (kind, expected) in [
        (ControlKind::BlockAll, "block_all"),
        (ControlKind::BlockOne, "block_one"),
        (ControlKind::UnblockOne, "unblock_one"),
    ] {
        let msg = ControlMessage {
            kind,
            target_session_id: None,
            reason: "r".to_string(),
            issuer: "ops".to_string(),
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["kind"], expected);
    }
}

#[test]
fn control_directive_parses_without_timestamp() {
    let id = Uuid::new_v4();
    let json = format!(
        r#"{{"kind":"block_one","target_session_id":"{id}","reason":"incident","issuer":"ops"}}"#
    );
    let msg: ControlMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(msg.kind, ControlKind::BlockOne);
    assert_eq!(msg.target_session_id, Some(id));
}

#[test]
fn create_session_request_defaults() {
    let request: CreateSessionRequest = serde_json::from_str("{}").unwrap();
    assert_eq!(request.owner, "anonymous");
    assert_eq!(request.cols, 80);
    assert_eq!(request.rows, 24);
}
