use memoh_core::{MemoryItem, ModelMessage};
use serde_json::json;

const SNIPPET_MAX_CHARS: usize = 220;
const MAX_KEPT: usize = 8;

/// Implements §4.4 step 6: dedup by id then memory text, keep at most 8,
/// sort by descending score, render as one `system` message of bullet
/// points. Returns `None` when nothing survives (no message is emitted).
pub fn build_memory_context_message(results: Vec<MemoryItem>) -> Option<ModelMessage> {
    let mut seen_ids = std::collections::HashSet::new();
    let mut seen_text = std::collections::HashSet::new();
    let mut deduped = Vec::new();

    for item in results {
        if !seen_ids.insert(item.id.clone()) {
            continue;
        }
        if !seen_text.insert(item.memory.clone()) {
            continue;
        }
        deduped.push(item);
    }

    deduped.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    deduped.truncate(MAX_KEPT);

    if deduped.is_empty() {
        return None;
    }

    let mut text = String::from("Relevant memory:\n");
    for item in &deduped {
        text.push_str("- ");
        text.push_str(&truncate_chars(&item.memory, SNIPPET_MAX_CHARS));
        text.push('\n');
    }

    Some(ModelMessage {
        role: "system".to_string(),
        content: json!(text.trim_end()),
        tool_call_id: None,
        tool_calls: None,
        usage_input_tokens: None,
    })
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max).collect();
    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, memory: &str, score: f64) -> MemoryItem {
        MemoryItem {
            id: id.to_string(),
            memory: memory.to_string(),
            score,
            namespace: "bot".to_string(),
            scope_id: "b1".to_string(),
        }
    }

    #[test]
    fn no_message_when_empty() {
        assert!(build_memory_context_message(vec![]).is_none());
    }

    #[test]
    fn dedups_by_id_then_text() {
        let results = vec![
            item("1", "likes tea", 0.9),
            item("1", "likes tea", 0.9),
            item("2", "likes tea", 0.5),
            item("3", "likes coffee", 0.8),
        ];
        let msg = build_memory_context_message(results).unwrap();
        let text = msg.content.as_str().unwrap();
        assert_eq!(text.matches("likes tea").count(), 1);
        assert!(text.contains("likes coffee"));
    }

    #[test]
    fn sorts_descending_by_score() {
        let results = vec![item("1", "low", 0.1), item("2", "high", 0.9)];
        let msg = build_memory_context_message(results).unwrap();
        let text = msg.content.as_str().unwrap();
        assert!(text.find("high").unwrap() < text.find("low").unwrap());
    }

    #[test]
    fn keeps_at_most_eight() {
        let results: Vec<_> = (0..20).map(|i| item(&i.to_string(), &format!("memory {i}"), i as f64)).collect();
        let msg = build_memory_context_message(results).unwrap();
        let text = msg.content.as_str().unwrap();
        assert_eq!(text.lines().filter(|l| l.starts_with('-')).count(), 8);
    }

    #[test]
    fn truncates_snippet_to_220_chars() {
        let long = "x".repeat(500);
        let results = vec![item("1", &long, 1.0)];
        let msg = build_memory_context_message(results).unwrap();
        let text = msg.content.as_str().unwrap();
        let bullet_line = text.lines().find(|l| l.starts_with('-')).unwrap();
        assert!(bullet_line.chars().count() <= 220 + 2 + 3); // "- " + 220 + "..."
    }
}
