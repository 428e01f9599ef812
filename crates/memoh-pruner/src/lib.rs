use memoh_core::ModelMessage;
use serde_json::Value;

/// Literal marker every pruned string must contain (property 3).
pub const PRUNED_MARKER: &str = "[memoh pruned]";

pub const TOOL_RESULT_MAX: usize = 64 * 1024;
const TOOL_RESULT_HEAD: usize = 32 * 1024;
const TOOL_RESULT_TAIL: usize = 8 * 1024;

pub const TOOL_ARGS_MAX: usize = 16 * 1024;
const TOOL_ARGS_HEAD: usize = 8 * 1024;
const TOOL_ARGS_TAIL: usize = 2 * 1024;

/// Prunes the whole history in place. Returns the index of the earliest
/// altered message, if any — callers use it to apply the cache-coherence
/// rule (clear `usageInputTokens` from that index onward).
pub fn prune_history(messages: &mut [ModelMessage]) -> Option<usize> {
    let mut first_altered = None;

    for (i, msg) in messages.iter_mut().enumerate() {
        let altered = prune_message(msg);
        if altered && first_altered.is_none() {
            first_altered = Some(i);
        }
    }

    if let Some(from) = first_altered {
        for msg in messages.iter_mut().skip(from) {
            msg.usage_input_tokens = None;
        }
    }

    first_altered
}

fn prune_message(msg: &mut ModelMessage) -> bool {
    let mut altered = false;

    if msg.role == "tool" {
        match &mut msg.content {
            Value::Array(parts) => {
                for part in parts.iter_mut() {
                    altered |= prune_tool_result_part(part);
                }
            }
            Value::String(s) => {
                if let Some(replacement) = prune_string(s, TOOL_RESULT_MAX, TOOL_RESULT_HEAD, TOOL_RESULT_TAIL) {
                    *s = replacement;
                    altered = true;
                }
            }
            _ => {}
        }
    }

    if let Some(calls) = msg.tool_calls.as_mut() {
        for call in calls.iter_mut() {
            if let Some(replacement) = prune_string(
                &call.function.arguments,
                TOOL_ARGS_MAX,
                TOOL_ARGS_HEAD,
                TOOL_ARGS_TAIL,
            ) {
                call.function.arguments = replacement;
                altered = true;
            }
        }
    }

    altered
}

fn prune_tool_result_part(part: &mut Value) -> bool {
    let Value::Object(part_obj) = part else {
        return false;
    };
    if part_obj.get("type").and_then(Value::as_str) != Some("tool-result") {
        return false;
    }
    let Some(output) = part_obj.get_mut("output") else {
        return false;
    };
    prune_output(output)
}

fn prune_output(output: &mut Value) -> bool {
    let Value::Object(out_obj) = output else {
        return false;
    };
    let output_type = out_obj.get("type").and_then(Value::as_str).map(String::from);
    match output_type.as_deref() {
        Some("text") | Some("error-text") => prune_string_field(out_obj, "value"),
        // json/error-json carry a structured value (object/array), not a
        // string — serialize it first so an oversized tree is still bound.
        Some("json") | Some("error-json") => prune_json_field(out_obj, "value"),
        Some("content") => {
            let Some(Value::Array(items)) = out_obj.get_mut("value") else {
                return false;
            };
            let mut altered = false;
            for item in items.iter_mut() {
                if let Value::Object(item_obj) = item {
                    if item_obj.get("type").and_then(Value::as_str) == Some("text") {
                        altered |= prune_string_field(item_obj, "text");
                    }
                }
            }
            altered
        }
        // unrecognized output types pass through untouched (documented open question).
        _ => false,
    }
}

fn prune_string_field(obj: &mut serde_json::Map<String, Value>, field: &str) -> bool {
    let Some(Value::String(s)) = obj.get(field) else {
        return false;
    };
    match prune_string(s, TOOL_RESULT_MAX, TOOL_RESULT_HEAD, TOOL_RESULT_TAIL) {
        Some(replacement) => {
            obj.insert(field.to_string(), Value::String(replacement));
            true
        }
        None => false,
    }
}

/// Like `prune_string_field`, but `field` may hold a structured JSON tree
/// (object/array) rather than a string. Serializes it first, then prunes the
/// serialized form; the slot becomes a `Value::String` envelope when bound.
fn prune_json_field(obj: &mut serde_json::Map<String, Value>, field: &str) -> bool {
    let Some(value) = obj.get(field) else {
        return false;
    };
    if matches!(value, Value::String(_)) {
        return prune_string_field(obj, field);
    }
    let Ok(serialized) = serde_json::to_string(value) else {
        return false;
    };
    match prune_string(&serialized, TOOL_RESULT_MAX, TOOL_RESULT_HEAD, TOOL_RESULT_TAIL) {
        Some(replacement) => {
            obj.insert(field.to_string(), Value::String(replacement));
            true
        }
        None => false,
    }
}

/// Replaces `s` with a head…tail envelope if it exceeds `max` bytes.
/// Returns `None` when no pruning is needed.
fn prune_string(s: &str, max: usize, head: usize, tail: usize) -> Option<String> {
    if s.len() <= max {
        return None;
    }
    let head_part = safe_head(s, head);
    let tail_part = safe_tail(s, tail);
    Some(format!(
        "{head_part}\n{PRUNED_MARKER} (original length {} bytes)\n[...snip...]\n{tail_part}",
        s.len()
    ))
}

fn safe_head(s: &str, max_bytes: usize) -> &str {
    let mut end = max_bytes.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn safe_tail(s: &str, max_bytes: usize) -> &str {
    let len = s.len();
    let mut start = len.saturating_sub(max_bytes);
    while start < len && !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoh_core::{ToolCallEntry, ToolCallFunction};
    use serde_json::json;

    fn tool_message(content: Value) -> ModelMessage {
        ModelMessage {
            role: "tool".to_string(),
            content,
            tool_call_id: None,
            tool_calls: None,
            usage_input_tokens: Some(123),
        }
    }

    #[test]
    fn prune_bound_and_marker_present() {
        let big = "a".repeat(200 * 1024);
        let result = prune_string(&big, TOOL_RESULT_MAX, TOOL_RESULT_HEAD, TOOL_RESULT_TAIL).unwrap();
        assert!(result.contains(PRUNED_MARKER));
        assert!(result.len() <= TOOL_RESULT_MAX + 256);
    }

    #[test]
    fn small_strings_are_left_alone() {
        assert!(prune_string("short", TOOL_RESULT_MAX, TOOL_RESULT_HEAD, TOOL_RESULT_TAIL).is_none());
    }

    #[test]
    fn preserves_shape_and_type_and_provider_options() {
        let big = "x".repeat(100 * 1024);
        let mut messages = vec![tool_message(json!([
            {
                "type": "tool-result",
                "toolCallId": "t1",
                "providerOptions": {"foo": "bar"},
                "output": {"type": "text", "value": big, "providerOptions": {"baz": 1}}
            }
        ]))];

        prune_history(&mut messages);

        let Value::Array(parts) = &messages[0].content else { panic!("expected array") };
        assert_eq!(parts.len(), 1);
        let part = &parts[0];
        assert_eq!(part["type"], "tool-result");
        assert_eq!(part["toolCallId"], "t1");
        assert_eq!(part["providerOptions"]["foo"], "bar");
        assert_eq!(part["output"]["type"], "text");
        assert_eq!(part["output"]["providerOptions"]["baz"], 1);
        assert!(part["output"]["value"].as_str().unwrap().contains(PRUNED_MARKER));
    }

    #[test]
    fn s3_oversized_tool_result_triggers_cache_coherence() {
        let big = "y".repeat(200 * 1024);
        let mut messages = vec![
            tool_message(json!("ok")),
            tool_message(json!([
                {"type": "tool-result", "toolCallId": "t1", "output": {"type": "text", "value": big}}
            ])),
            tool_message(json!("also fine")),
        ];

        let first_altered = prune_history(&mut messages);
        assert_eq!(first_altered, Some(1));
        assert!(messages[0].usage_input_tokens.is_some());
        assert!(messages[1].usage_input_tokens.is_none());
        assert!(messages[2].usage_input_tokens.is_none());
    }

    #[test]
    fn legacy_plain_string_tool_content_is_pruned() {
        let big = "z".repeat(100 * 1024);
        let mut messages = vec![tool_message(Value::String(big))];
        prune_history(&mut messages);
        let Value::String(s) = &messages[0].content else { panic!("expected string") };
        assert!(s.contains(PRUNED_MARKER));
    }

    #[test]
    fn oversized_tool_call_arguments_are_pruned() {
        let big_args = "{".to_string() + &"a".repeat(20 * 1024) + "}";
        let mut messages = vec![ModelMessage {
            role: "assistant".to_string(),
            content: Value::Null,
            tool_call_id: None,
            tool_calls: Some(vec![ToolCallEntry {
                id: "t1".to_string(),
                call_type: "function".to_string(),
                function: ToolCallFunction {
                    name: "search".to_string(),
                    arguments: big_args,
                },
            }]),
            usage_input_tokens: Some(5),
        }];
        let first_altered = prune_history(&mut messages);
        assert_eq!(first_altered, Some(0));
        assert!(messages[0].tool_calls.as_ref().unwrap()[0].function.arguments.contains(PRUNED_MARKER));
    }

    #[test]
    fn oversized_structured_json_output_is_bound() {
        let big_items: Vec<Value> = (0..20_000).map(|i| json!({"i": i, "pad": "x"})).collect();
        let mut messages = vec![tool_message(json!([
            {"type": "tool-result", "toolCallId": "t1", "output": {"type": "json", "value": {"items": big_items}}}
        ]))];

        let first_altered = prune_history(&mut messages);
        assert_eq!(first_altered, Some(0));

        let Value::Array(parts) = &messages[0].content else { panic!("expected array") };
        let output_value = &parts[0]["output"]["value"];
        let pruned = output_value.as_str().expect("value must become a string envelope");
        assert!(pruned.contains(PRUNED_MARKER));
        assert!(pruned.len() <= TOOL_RESULT_MAX + 256);
    }

    #[test]
    fn small_structured_json_output_passes_through_as_json() {
        let mut messages = vec![tool_message(json!([
            {"type": "tool-result", "toolCallId": "t1", "output": {"type": "json", "value": {"ok": true}}}
        ]))];
        let first_altered = prune_history(&mut messages);
        assert_eq!(first_altered, None);
        let Value::Array(parts) = &messages[0].content else { panic!("expected array") };
        assert_eq!(parts[0]["output"]["value"], json!({"ok": true}));
    }

    #[test]
    fn unrecognized_output_type_passes_through_untouched() {
        let mut messages = vec![tool_message(json!([
            {"type": "tool-result", "toolCallId": "t1", "output": {"type": "binary", "value": "deadbeef"}}
        ]))];
        let first_altered = prune_history(&mut messages);
        assert_eq!(first_altered, None);
        assert_eq!(messages[0].content[0]["output"]["value"], "deadbeef");
    }

    #[test]
    fn utf8_boundaries_preserved_at_head_and_tail() {
        // multi-byte chars right at the truncation edges must not split.
        let mut s = "é".repeat(TOOL_RESULT_HEAD); // 2 bytes each, lands mid-char at odd offsets
        s.push_str(&"y".repeat(10));
        s.push_str(&"é".repeat(TOOL_RESULT_TAIL));
        let result = prune_string(&s, TOOL_RESULT_MAX, TOOL_RESULT_HEAD, TOOL_RESULT_TAIL);
        assert!(result.is_some());
        // if this didn't panic on a char boundary, from_utf8 validity is implied by &str ops.
    }
}
