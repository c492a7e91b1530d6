//! Cascading-separator text splitter with overlap and neighbor context.
//!
//! Splitting tries the coarsest separator first (`"\n\n"`) and recurses into
//! any piece still over the limit with progressively finer separators, down
//! to a hard character cut for pathological unbroken runs. Leaf pieces are
//! then merged greedily up to the size limit; when a chunk is emitted, the
//! trailing pieces that cover at least the configured overlap are retained
//! as the start of the next chunk, so consecutive chunks share a literal
//! suffix/prefix of at least `overlap_chars` characters.
//!
//! A second pass attaches each chunk's immediate neighbors' raw text as
//! metadata. It runs only after the full ordered sequence is known.

use std::collections::VecDeque;

use uuid::Uuid;

use crate::types::{Chunk, ChunkMetadata, Segment};

/// Separators tried in order, coarsest first.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", ", ", " "];

/// Size and overlap limits for the splitter.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Maximum chunk length in characters.
    pub max_chars: usize,
    /// Minimum characters shared between consecutive chunks.
    pub overlap_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chars: 1500,
            overlap_chars: 300,
        }
    }
}

/// Splits extracted segments into overlapping chunks with neighbor metadata.
pub fn chunk_segments(segments: &[Segment], config: &ChunkerConfig) -> Vec<Chunk> {
    let mut chunks: Vec<Chunk> = Vec::new();
    for segment in segments {
        for content in split_with_overlap(&segment.content, config) {
            chunks.push(Chunk {
                id: Uuid::new_v4(),
                content,
                metadata: ChunkMetadata {
                    source: segment.metadata.source.clone(),
                    page: segment.metadata.page,
                    prev_content: None,
                    next_content: None,
                },
            });
        }
    }
    attach_neighbors(&mut chunks);
    chunks
}

/// Attaches literal neighbor text to every chunk in the ordered sequence.
fn attach_neighbors(chunks: &mut [Chunk]) {
    let contents: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    for (i, chunk) in chunks.iter_mut().enumerate() {
        if i > 0 {
            chunk.metadata.prev_content = Some(contents[i - 1].clone());
        }
        if i + 1 < contents.len() {
            chunk.metadata.next_content = Some(contents[i + 1].clone());
        }
    }
}

/// Splits `text` into pieces of at most `max_chars` characters with at least
/// `overlap_chars` characters shared between consecutive pieces.
pub fn split_with_overlap(text: &str, config: &ChunkerConfig) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let leaves = split_recursive(text, 0, config.max_chars);
    merge_leaves(leaves, config.max_chars, config.overlap_chars)
}

/// A leaf piece with its cached character count.
struct Leaf {
    text: String,
    chars: usize,
}

fn leaf(text: String) -> Leaf {
    let chars = text.chars().count();
    Leaf { text, chars }
}

fn split_recursive(text: &str, sep_index: usize, max_chars: usize) -> Vec<Leaf> {
    if text.chars().count() <= max_chars {
        return vec![leaf(text.to_string())];
    }
    let Some(sep) = SEPARATORS.get(sep_index) else {
        return hard_cut(text, max_chars);
    };
    if !text.contains(sep) {
        return split_recursive(text, sep_index + 1, max_chars);
    }
    let mut leaves = Vec::new();
    // split_inclusive keeps the separator attached so rejoining chunks is a
    // pure concatenation and overlap suffixes stay literal.
    for piece in text.split_inclusive(sep) {
        if piece.chars().count() <= max_chars {
            leaves.push(leaf(piece.to_string()));
        } else {
            leaves.extend(split_recursive(piece, sep_index + 1, max_chars));
        }
    }
    leaves
}

/// Last resort for unbroken runs longer than the limit: cut at character
/// boundaries.
fn hard_cut(text: &str, max_chars: usize) -> Vec<Leaf> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars.max(1))
        .map(|window| leaf(window.iter().collect()))
        .collect()
}

fn merge_leaves(leaves: Vec<Leaf>, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut window: VecDeque<Leaf> = VecDeque::new();
    let mut window_chars = 0usize;
    let mut fresh_chars = 0usize; // chars added since the last emit

    for piece in leaves {
        if window_chars + piece.chars > max_chars && !window.is_empty() {
            out.push(join_window(&window));
            // Retain the minimal trailing run covering the overlap.
            let mut retained = 0usize;
            let mut keep_from = window.len();
            while keep_from > 0 && retained < overlap_chars {
                keep_from -= 1;
                retained += window[keep_from].chars;
            }
            window.drain(..keep_from);
            window_chars = retained;
            fresh_chars = 0;
            // The retained overlap plus an oversized piece could still blow
            // the limit; shed from the front until the new piece fits.
            while window_chars + piece.chars > max_chars && !window.is_empty() {
                if let Some(dropped) = window.pop_front() {
                    window_chars -= dropped.chars;
                }
            }
        }
        window_chars += piece.chars;
        fresh_chars += piece.chars;
        window.push_back(piece);
    }

    if fresh_chars > 0 && !window.is_empty() {
        out.push(join_window(&window));
    }
    out
}

fn join_window(window: &VecDeque<Leaf>) -> String {
    window.iter().map(|l| l.text.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SegmentMetadata;

    fn config(max_chars: usize, overlap_chars: usize) -> ChunkerConfig {
        ChunkerConfig {
            max_chars,
            overlap_chars,
        }
    }

    /// 3200 characters of word-separated text. "word0001 " is nine chars, so
    /// 355 words plus a 5-char tail.
    fn text_3200() -> String {
        let mut text = String::new();
        let mut i = 0usize;
        while text.len() + 9 <= 3200 {
            text.push_str(&format!("word{i:04} "));
            i += 1;
        }
        while text.len() < 3200 {
            text.push('x');
        }
        assert_eq!(text.len(), 3200);
        text
    }

    #[test]
    fn produces_three_chunks_for_3200_chars_at_1500_by_300() {
        let cfg = config(1500, 300);
        let chunks = split_with_overlap(&text_3200(), &cfg);
        assert_eq!(chunks.len(), 3, "chunks: {:?}", chunks.iter().map(String::len).collect::<Vec<_>>());
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 1500);
        }
    }

    #[test]
    fn consecutive_chunks_share_at_least_the_overlap() {
        let cfg = config(1500, 300);
        let chunks = split_with_overlap(&text_3200(), &cfg);
        for pair in chunks.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            // The next chunk starts with a literal suffix of the previous one.
            let shared = (1..=prev.len())
                .rev()
                .find(|&n| prev.is_char_boundary(prev.len() - n) && next.starts_with(&prev[prev.len() - n..]))
                .unwrap_or(0);
            assert!(
                shared >= 300,
                "chunks overlap by {shared} chars, expected >= 300"
            );
        }
    }

    #[test]
    fn every_chunk_respects_the_limit_on_messy_text() {
        let cfg = config(120, 30);
        let text = "First paragraph with several sentences. It keeps going, and going.\n\n\
                    Second paragraph here.\nA line inside it, and another clause, with commas.\n\n\
                    Third paragraph that is quite a bit longer than the others and will need to be \
                    broken at sentence or word boundaries to fit under the configured limit at all.";
        let chunks = split_with_overlap(text, &cfg);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 120, "over-limit chunk: {chunk:?}");
        }
    }

    #[test]
    fn unbroken_run_is_hard_cut() {
        let cfg = config(50, 10);
        let text = "x".repeat(180);
        let chunks = split_with_overlap(&text, &cfg);
        assert!(chunks.iter().all(|c| c.chars().count() <= 50));
        assert!(chunks.iter().map(String::len).sum::<usize>() >= 180);
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let cfg = ChunkerConfig::default();
        let chunks = split_with_overlap("short note", &cfg);
        assert_eq!(chunks, vec!["short note".to_string()]);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let cfg = ChunkerConfig::default();
        assert!(split_with_overlap("   \n\n  ", &cfg).is_empty());
    }

    #[test]
    fn neighbor_metadata_covers_interior_chunks_only() {
        let segment = Segment::new(text_3200(), SegmentMetadata::for_source("https://e.com/a.txt"));
        let chunks = chunk_segments(&[segment], &config(1500, 300));
        assert_eq!(chunks.len(), 3);

        assert!(chunks[0].metadata.prev_content.is_none());
        assert_eq!(
            chunks[0].metadata.next_content.as_deref(),
            Some(chunks[1].content.as_str())
        );
        assert_eq!(
            chunks[1].metadata.prev_content.as_deref(),
            Some(chunks[0].content.as_str())
        );
        assert_eq!(
            chunks[1].metadata.next_content.as_deref(),
            Some(chunks[2].content.as_str())
        );
        assert!(chunks[2].metadata.next_content.is_none());
    }

    #[test]
    fn neighbor_metadata_spans_segment_boundaries() {
        let a = Segment::new("alpha", SegmentMetadata::for_source("s").with_page(1));
        let b = Segment::new("beta", SegmentMetadata::for_source("s").with_page(2));
        let chunks = chunk_segments(&[a, b], &ChunkerConfig::default());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].metadata.next_content.as_deref(), Some("beta"));
        assert_eq!(chunks[1].metadata.prev_content.as_deref(), Some("alpha"));
        assert_eq!(chunks[1].metadata.page, Some(2));
    }
}
