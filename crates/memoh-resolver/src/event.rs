use memoh_core::error::{MemohError, Result};
use memoh_core::{ModelMessage, StreamEvent};
use serde_json::Value;

/// Parses one decoded SSE chunk into a `StreamEvent`, duck-typing the three
/// terminal envelope shapes the gateway may use (§4.4 "Event forwarding and
/// persistence", §9 "Duck-typed event envelopes"):
/// 1. `event: done` with body `{messages}`
/// 2. `{type: "agent_end"|"done", messages[...]}`
/// 3. a bare `{messages[...]}`
///
/// Any of these decode to `StreamEvent::AgentEnd`. Anything else is decoded
/// against the ordinary tagged union. Implemented as ordered fallbacks, never
/// interpreting an envelope partially.
pub fn parse_event(event_kind: Option<&str>, data: &str) -> Result<StreamEvent> {
    let value: Value = serde_json::from_str(data).map_err(|e| MemohError::GatewayParse(e.to_string()))?;

    if event_kind == Some("done") {
        return terminal_from_value(&value);
    }

    if let Value::Object(obj) = &value {
        let type_field = obj.get("type").and_then(Value::as_str);
        if matches!(type_field, Some("agent_end") | Some("done")) && obj.contains_key("messages") {
            return terminal_from_value(&value);
        }
        if type_field.is_none() && obj.contains_key("messages") {
            return terminal_from_value(&value);
        }
    }

    serde_json::from_value(value).map_err(|e| MemohError::GatewayParse(e.to_string()))
}

fn terminal_from_value(value: &Value) -> Result<StreamEvent> {
    let messages: Vec<ModelMessage> = value
        .get("messages")
        .cloned()
        .ok_or_else(|| MemohError::GatewayParse("terminal envelope missing messages".into()))
        .and_then(|v| serde_json::from_value(v).map_err(|e| MemohError::GatewayParse(e.to_string())))?;
    let reasoning = value.get("reasoning").and_then(Value::as_str).map(String::from);
    let usage = value.get("usage").cloned();
    let skills = value
        .get("skills")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();
    Ok(StreamEvent::AgentEnd { messages, reasoning, usage, skills })
}

/// True when an event is the stream's terminal (for the happens-before
/// persistence contract).
pub fn is_terminal(event: &StreamEvent) -> bool {
    event.is_terminal()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_done_with_bare_messages_is_terminal() {
        let evt = parse_event(Some("done"), r#"{"messages":[{"role":"assistant","content":"hi"}]}"#).unwrap();
        assert!(matches!(evt, StreamEvent::AgentEnd { .. }));
    }

    #[test]
    fn typed_done_body_is_terminal() {
        let evt = parse_event(None, r#"{"type":"done","messages":[{"role":"assistant","content":"hi"}]}"#).unwrap();
        assert!(matches!(evt, StreamEvent::AgentEnd { .. }));
    }

    #[test]
    fn typed_agent_end_body_is_terminal() {
        let evt = parse_event(None, r#"{"type":"agent_end","messages":[{"role":"assistant","content":"hi"}],"skills":["s1"]}"#).unwrap();
        match evt {
            StreamEvent::AgentEnd { skills, .. } => assert_eq!(skills, vec!["s1".to_string()]),
            _ => panic!("expected AgentEnd"),
        }
    }

    #[test]
    fn bare_messages_with_no_type_is_terminal() {
        let evt = parse_event(None, r#"{"messages":[{"role":"assistant","content":"hi"}]}"#).unwrap();
        assert!(matches!(evt, StreamEvent::AgentEnd { .. }));
    }

    #[test]
    fn ordinary_typed_event_is_not_confused_with_terminal() {
        let evt = parse_event(None, r#"{"type":"text_delta","delta":"hi"}"#).unwrap();
        assert!(matches!(evt, StreamEvent::TextDelta { .. }));
        assert!(!is_terminal(&evt));
    }

    #[test]
    fn malformed_json_is_gateway_parse_error() {
        let err = parse_event(None, "{not json").unwrap_err();
        assert_eq!(err.code(), "FAIL_GATEWAY_PARSE");
    }
}
