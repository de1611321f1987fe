//! Chunker (C3, spec.md §4.3): split oversized text into overlapping
//! windows aligned to the embedder's character budget.
//!
//! Applied to a code symbol's body once it exceeds `ChunkThreshold`
//! (default 1500 chars, spec.md §4.8 step 5) and to knowledge-base
//! documents analogously (spec.md §4.9).

/// Default threshold above which a symbol body is chunked rather than
/// embedded whole.
pub const DEFAULT_CHUNK_THRESHOLD: usize = 1500;

/// Default overlap between consecutive windows, in characters.
pub const DEFAULT_OVERLAP: usize = 60;

/// One text window, with the half-open char-index range `[start, end)`
/// it occupies in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Split `text` into overlapping windows of at most `max_chunk_size`
/// chars, stepping by `max_chunk_size - overlap` each time. The final
/// window is truncated at the end of the text; if it would be smaller
/// than `overlap`, it is merged into the previous window instead of
/// emitted on its own (spec.md §4.3).
///
/// Operates on `char` boundaries, not bytes, so multi-byte UTF-8 text is
/// never split mid-character.
pub fn chunk_text(text: &str, max_chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    if len == 0 {
        return Vec::new();
    }
    if len <= max_chunk_size {
        return vec![Chunk {
            text: text.to_string(),
            start: 0,
            end: len,
        }];
    }

    let max_chunk_size = max_chunk_size.max(1);
    let overlap = overlap.min(max_chunk_size.saturating_sub(1));
    let stride = (max_chunk_size - overlap).max(1);

    let mut windows = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + max_chunk_size).min(len);
        windows.push((start, end));
        if end >= len {
            break;
        }
        start += stride;
    }

    // Merge a trailing window smaller than `overlap` into its predecessor
    // rather than emitting a near-duplicate sliver.
    if windows.len() > 1 {
        let (last_start, last_end) = *windows.last().unwrap();
        if last_end - last_start < overlap {
            windows.pop();
            let prev = windows.last_mut().unwrap();
            prev.1 = last_end;
        }
    }

    windows
        .into_iter()
        .map(|(start, end)| Chunk {
            text: chars[start..end].iter().collect(),
            start,
            end,
        })
        .collect()
}

/// Assemble the text used to embed a code symbol (spec.md §4.8 "Symbol
/// text composition"): signature, name path, and a leading snippet of the
/// body, each capped at `max_chars / 3`, the whole then truncated at
/// `max_chars`.
pub fn compose_symbol_text(signature: &str, name_path: &str, body: &str, max_chars: usize) -> String {
    let part_budget = (max_chars / 3).max(1);
    let sig = truncate_chars(signature, part_budget);
    let path = truncate_chars(name_path, part_budget);
    let snippet = truncate_chars(body, part_budget);
    let composed = format!("{sig}\n{path}\n{snippet}");
    truncate_chars(&composed, max_chars)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_text("hello", 100, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello");
        assert_eq!((chunks[0].start, chunks[0].end), (0, 5));
    }

    #[test]
    fn long_text_produces_overlapping_windows() {
        let text = "a".repeat(250);
        let chunks = chunk_text(&text, 100, 20);
        assert!(chunks.len() >= 3);
        for pair in chunks.windows(2) {
            assert!(pair[0].end > pair[1].start, "windows must overlap");
        }
    }

    #[test]
    fn windows_reconstruct_original_length_coverage() {
        let text = "x".repeat(305);
        let chunks = chunk_text(&text, 100, 20);
        assert_eq!(chunks.last().unwrap().end, 305);
        assert_eq!(chunks.first().unwrap().start, 0);
    }

    #[test]
    fn trailing_sliver_merges_into_previous_window() {
        // 100-char window, 20 overlap -> stride 80. 170 chars: windows at
        // [0,100), [80,170) would be the naive result; with a tiny
        // trailing remainder it must merge instead of emitting a sliver
        // smaller than the overlap.
        let text = "y".repeat(165);
        let chunks = chunk_text(&text, 100, 20);
        assert!(chunks.iter().all(|c| c.end - c.start >= 20 || chunks.len() == 1));
        assert_eq!(chunks.last().unwrap().end, 165);
    }

    #[test]
    fn handles_multibyte_text_without_panicking() {
        let text = "héllo wörld ".repeat(50);
        let chunks = chunk_text(&text, 50, 10);
        assert!(!chunks.is_empty());
        let reassembled: String = chunks.iter().map(|c| c.text.clone()).collect::<Vec<_>>().join("");
        assert!(reassembled.len() >= text.len());
    }

    #[test]
    fn composes_symbol_text_within_budget() {
        let sig = "fn authenticate(user: &str) -> bool";
        let path = "AuthService/authenticate";
        let body = "let token = ...; verify(token)".repeat(20);
        let composed = compose_symbol_text(sig, path, &body, 90);
        assert!(composed.chars().count() <= 90);
        assert!(composed.contains("AuthService/authenticate"));
    }
}
