//! Shared helpers for streaming parser tests

use super::Segment;

/// Split text into chunks of `chunk_size` characters, to exercise marker
/// handling across arbitrary delivery boundaries.
pub fn chunk_str(s: &str, chunk_size: usize) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    chars
        .chunks(chunk_size)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Merge adjacent segments of the same kind, since chunked delivery may
/// split one logical segment into many.
pub fn merge_segments(segments: Vec<Segment>) -> Vec<Segment> {
    let mut merged: Vec<Segment> = Vec::new();
    for segment in segments {
        match (merged.last_mut(), &segment) {
            (Some(Segment::Text(last)), Segment::Text(new)) => last.push_str(new),
            (Some(Segment::Thinking(last)), Segment::Thinking(new)) => last.push_str(new),
            _ => merged.push(segment),
        }
    }
    merged
}
