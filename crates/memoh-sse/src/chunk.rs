/// Splits `s` into pieces of at most `n` UTF-16 code units, never cutting a
/// surrogate pair. A pair that straddles the boundary pushes the chunk to
/// `n + 1` code units rather than splitting it.
///
/// Grounded in the line-buffered, chunk-boundary-safe consumption pattern of
/// `skynet-agent/src/anthropic_stream.rs`, generalized into the inverse
/// (producer-side) operation.
pub fn chunk_utf16(s: &str, n: usize) -> Vec<String> {
    assert!(n > 0, "chunk size must be positive");

    let units: Vec<u16> = s.encode_utf16().collect();
    if units.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < units.len() {
        let mut end = (start + n).min(units.len());
        if end < units.len() && is_high_surrogate(units[end - 1]) && is_low_surrogate(units[end]) {
            end += 1;
        }
        let piece = String::from_utf16(&units[start..end]).expect("chunk boundary preserves surrogate pairs");
        chunks.push(piece);
        start = end;
    }
    chunks
}

fn is_high_surrogate(unit: u16) -> bool {
    (0xD800..=0xDBFF).contains(&unit)
}

fn is_low_surrogate(unit: u16) -> bool {
    (0xDC00..=0xDFFF).contains(&unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenation_is_lossless_for_ascii() {
        let s = "the quick brown fox jumps over the lazy dog";
        for n in 1..=64usize {
            let chunks = chunk_utf16(s, n);
            assert_eq!(chunks.concat(), s, "n={n}");
        }
    }

    #[test]
    fn concatenation_is_lossless_across_surrogate_pairs() {
        // each of these is a single astral-plane codepoint (surrogate pair).
        let s = "a\u{1F600}b\u{1F601}c\u{1F602}d\u{1F603}e";
        for n in 1..=8usize {
            let chunks = chunk_utf16(s, n);
            assert_eq!(chunks.concat(), s, "n={n}");
            for chunk in &chunks {
                // round-tripping through String guarantees no lone surrogate,
                // but assert encode_utf16 length bound explicitly too.
                let len = chunk.encode_utf16().count();
                assert!(len <= n + 1, "chunk exceeded n+1 units: {len} > {}", n + 1);
            }
        }
    }

    #[test]
    fn empty_string_yields_no_chunks() {
        assert!(chunk_utf16("", 16).is_empty());
    }

    #[test]
    fn single_chunk_when_smaller_than_n() {
        let chunks = chunk_utf16("hi", 16);
        assert_eq!(chunks, vec!["hi".to_string()]);
    }
}
