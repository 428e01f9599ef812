use crate::chunk::chunk_utf16;

/// Max chunk size per `data:` line, in UTF-16 code units.
pub const CHUNK: usize = 16 * 1024;

/// Frames a single SSE event. Splits `payload` into `CHUNK`-sized pieces
/// (surrogate-safe) and emits one `data:` line per piece, optionally preceded
/// by an `event:<kind>` line, terminated by a blank line.
pub fn frame_event(kind: Option<&str>, payload: &str) -> String {
    let mut out = String::new();
    if let Some(kind) = kind {
        out.push_str("event:");
        out.push_str(kind);
        out.push('\n');
    }
    for piece in chunk_utf16(payload, CHUNK) {
        out.push_str("data:");
        out.push_str(&piece);
        out.push('\n');
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_small_payload_as_single_data_line() {
        let framed = frame_event(None, "hello");
        assert_eq!(framed, "data:hello\n\n");
    }

    #[test]
    fn frames_event_kind_when_given() {
        let framed = frame_event(Some("done"), "{}");
        assert_eq!(framed, "event:done\ndata:{}\n\n");
    }

    #[test]
    fn splits_oversized_payload_across_multiple_data_lines() {
        let payload = "x".repeat(CHUNK * 2 + 5);
        let framed = frame_event(None, &payload);
        let data_lines: Vec<&str> = framed.lines().filter(|l| l.starts_with("data:")).collect();
        assert_eq!(data_lines.len(), 3);
        let rejoined: String = data_lines.iter().map(|l| &l[5..]).collect();
        assert_eq!(rejoined, payload);
    }
}
