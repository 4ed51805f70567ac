use super::*;
use pretty_assertions::assert_eq;

#[test]
fn test_parse_click_with_string_bid() {
    let action = parse_action(r#"{"action": "CLICK", "bid": "5", "reasoning": "open the form"}"#)
        .unwrap();
    assert_eq!(action.kind, ActionKind::Click);
    assert_eq!(action.target, Some(ReferenceId(5)));
    assert_eq!(action.reasoning.as_deref(), Some("open the form"));
}

#[test]
fn test_parse_fenced_reply() {
    let raw = "```json\n{\"action\": \"TYPE\", \"bid\": 3, \"text\": \"hello\"}\n```";
    let action = parse_action(raw).unwrap();
    assert_eq!(action, ActionRequest::type_text(ReferenceId(3), "hello"));
}

#[test]
fn test_parse_prose_around_object() {
    let raw = "Sure, here is my answer: {\"action\": \"click\", \"x\": 120.6, \"y\": \"48\"} hope it helps";
    let action = parse_action(raw).unwrap();
    assert_eq!(action.target, None);
    assert_eq!(action.coordinates, Some(crate::types::Point { x: 121, y: 48 }));
}

#[test]
fn test_task_complete_is_finish() {
    let action = parse_action(r#"{"action": "TASK_COMPLETE", "bid": 4}"#).unwrap();
    assert_eq!(action.kind, ActionKind::Finish);
    assert_eq!(action.target, None);
    assert!(action.validate().is_ok());
}

#[test]
fn test_parse_scroll_defaults() {
    let action = parse_action(r#"{"action": "SCROLL"}"#).unwrap();
    assert_eq!(action.scroll(), (ScrollDirection::Down, 300));

    let action = parse_action(r#"{"action": "SCROLL", "direction": "UP", "amount": 500}"#).unwrap();
    assert_eq!(action.scroll(), (ScrollDirection::Up, 500));
}

#[test]
fn test_parse_scroll_amount_out_of_range() {
    assert!(matches!(
        parse_action(r#"{"action": "SCROLL", "amount": 4294967296}"#),
        Err(ActionParseError::InvalidField { field: "amount", .. })
    ));
    assert!(matches!(
        parse_action(r#"{"action": "SCROLL", "amount": 0}"#),
        Err(ActionParseError::InvalidField { field: "amount", .. })
    ));
}

#[test]
fn test_parse_press_key() {
    let action = parse_action(r#"{"action": "PRESS_KEY", "key": "Enter"}"#).unwrap();
    assert_eq!(action.key(), Some("Enter"));
}

#[test]
fn test_malformed_replies() {
    assert_eq!(parse_action("   "), Err(ActionParseError::Empty));
    assert!(matches!(
        parse_action("I think we are done"),
        Err(ActionParseError::NotJson(_))
    ));
    assert_eq!(
        parse_action(r#"{"bid": 2}"#),
        Err(ActionParseError::MissingAction)
    );
    assert_eq!(
        parse_action(r#"{"action": "DRAG", "bid": 2}"#),
        Err(ActionParseError::UnknownAction("DRAG".to_string()))
    );
    assert!(matches!(
        parse_action(r#"{"action": "CLICK", "x": 10}"#),
        Err(ActionParseError::InvalidField { field: "x/y", .. })
    ));
    assert!(matches!(
        parse_action(r#"{"action": "CLICK", "bid": "submit"}"#),
        Err(ActionParseError::InvalidField { field: "bid", .. })
    ));
}

#[test]
fn test_shape_violations_are_rejected() {
    assert_eq!(
        parse_action(r#"{"action": "CLICK"}"#),
        Err(ActionParseError::Invalid(InvalidAction::MissingTarget(
            ActionKind::Click
        )))
    );
    assert_eq!(
        parse_action(r#"{"action": "TYPE", "bid": 1}"#),
        Err(ActionParseError::Invalid(InvalidAction::MissingText))
    );
    assert_eq!(
        parse_action(r#"{"action": "PRESS_KEY"}"#),
        Err(ActionParseError::Invalid(InvalidAction::MissingKey))
    );
}

#[test]
fn test_contract_violation_classification() {
    let err = OracleError::from(ActionParseError::MissingAction);
    assert!(err.is_contract_violation());
    assert!(!OracleError::Timeout(Duration::from_secs(1)).is_contract_violation());
}

#[test]
fn test_http_oracle_rejects_bad_endpoint() {
    assert!(HttpOracle::new("not a url", Duration::from_secs(1)).is_err());
    assert!(HttpOracle::new("http://localhost:8000/decide", Duration::from_secs(1)).is_ok());
}
