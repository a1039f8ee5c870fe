//! C2 — Split text into overlapping, sentence-aligned token chunks.
//!
//! Grounded in `original_source/DataLoader.py`'s `chunk_text`: paragraphs are
//! atomic (never split mid-paragraph into a chunk), chunk boundaries snap
//! forward to a sentence terminator, and the overlap realignment snaps
//! backward to a sentence start when one exists in look-back.
//!
//! Token positions in this module follow the 1-based convention used
//! elsewhere in the data model (`Chunk.position`): "smallest index ≥
//! chunk_size" means the `chunk_size`-th token onward, i.e. 0-based index
//! `chunk_size - 1` onward.

use crate::tokenizer::Tokenizer;

/// Splits on any run of newlines, dropping empty paragraphs. Paragraphs carry
/// semantic boundaries and are never split mid-paragraph into a chunk.
pub fn split_paragraphs(text: &str) -> Vec<&str> {
    text.split(['\n', '\r'])
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Smallest 0-based index `i >= chunk_size - 1` whose token is a sentence
/// terminator; `chunk_size` tokens in if none exists in the look-ahead
/// window, or `tokens.len()` if the buffer itself is shorter. Returns an
/// exclusive upper bound usable directly as a slice end.
fn find_sentence_boundary_forward(tokens: &[String], chunk_size: usize, is_end: &impl Fn(&str) -> bool) -> usize {
    let start = chunk_size.saturating_sub(1).min(tokens.len());
    for (i, tok) in tokens.iter().enumerate().skip(start) {
        if is_end(tok) {
            return i + 1;
        }
    }
    tokens.len()
}

/// Scans backward from `start` (exclusive) down to 0 for a sentence
/// terminator; returns the index just after it (so the next chunk begins on
/// a fresh sentence), or `None` if no terminator exists in range.
fn find_sentence_boundary_backward(
    tokens: &[String],
    start: usize,
    is_end: &impl Fn(&str) -> bool,
) -> Option<usize> {
    let start = start.min(tokens.len());
    for i in (0..start).rev() {
        if is_end(&tokens[i]) {
            return Some(i + 1);
        }
    }
    None
}

/// Core chunking algorithm over already-tokenised, already-paragraph-split
/// input. Kept separate from `chunk_text` so it can be unit-tested without
/// depending on the word segmenter's actual output.
pub fn chunk_tokens(
    paragraphs: &[Vec<String>],
    chunk_size: usize,
    overlap: usize,
    is_end: impl Fn(&str) -> bool,
) -> Vec<Vec<String>> {
    assert!(overlap < chunk_size, "overlap must be less than chunk_size");
    assert!(chunk_size > 0, "chunk_size must be positive");

    let mut chunks: Vec<Vec<String>> = Vec::new();
    let mut buffer: Vec<String> = Vec::new();
    let mut i = 0usize;

    loop {
        while buffer.len() < chunk_size && i < paragraphs.len() {
            buffer.extend(paragraphs[i].iter().cloned());
            i += 1;
        }

        while buffer.len() >= chunk_size {
            let end = find_sentence_boundary_forward(&buffer, chunk_size, &is_end);
            chunks.push(buffer[..end].to_vec());

            let start_next = find_sentence_boundary_backward(&buffer, end.saturating_sub(overlap), &is_end)
                .or_else(|| find_sentence_boundary_backward(&buffer, end.saturating_sub(1), &is_end))
                .unwrap_or_else(|| end.saturating_sub(overlap));

            buffer.drain(..start_next);
        }

        if i >= paragraphs.len() {
            break;
        }
    }

    if !buffer.is_empty() {
        let is_pure_overlap = chunks.last().is_some_and(|last| {
            buffer.len() <= last.len() && last[last.len() - buffer.len()..] == buffer[..]
        });
        if !is_pure_overlap {
            chunks.push(buffer);
        }
    }

    chunks
}

/// Full pipeline entry point: paragraph-split, tokenise each paragraph, then
/// run the core algorithm.
pub fn chunk_text(text: &str, tokenizer: &Tokenizer, chunk_size: usize, overlap: usize) -> Vec<Vec<String>> {
    let paragraphs: Vec<Vec<String>> = split_paragraphs(text)
        .into_iter()
        .map(|p| tokenizer.tokenize(p))
        .collect();
    chunk_tokens(&paragraphs, chunk_size, overlap, |t| tokenizer.is_sentence_end(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &[&str]) -> Vec<String> {
        s.iter().map(|x| x.to_string()).collect()
    }

    fn is_end(t: &str) -> bool {
        t == "。"
    }

    /// "A。BB。CCC。DDDD。EEEEE。" chunk_size=4, overlap=2.
    #[test]
    fn chunker_sentence_boundary_ground_truth() {
        let paragraph = toks(&["A", "。", "BB", "。", "CCC", "。", "DDDD", "。", "EEEEE", "。"]);
        let chunks = chunk_tokens(&[paragraph], 4, 2, is_end);

        assert_eq!(
            chunks,
            vec![
                toks(&["A", "。", "BB", "。"]),
                toks(&["BB", "。", "CCC", "。"]),
                toks(&["CCC", "。", "DDDD", "。"]),
                toks(&["DDDD", "。", "EEEEE", "。"]),
            ]
        );

        for chunk in &chunks {
            assert_eq!(chunk.last().map(String::as_str), Some("。"));
            assert!(is_end(&chunk[0]) || chunk.len() == chunks[0].len());
        }
    }

    #[test]
    fn no_terminators_falls_back_to_buffer_boundaries() {
        let paragraph = toks(&["一", "二", "三", "四", "五", "六", "七", "八"]);
        let chunks = chunk_tokens(&[paragraph], 4, 2, is_end);
        assert!(!chunks.is_empty());
        // No crash, and every chunk is non-empty.
        assert!(chunks.iter().all(|c| !c.is_empty()));
    }

    #[test]
    fn paragraphs_are_never_split_mid_paragraph_into_a_chunk() {
        let short = toks(&["短", "句", "。"]);
        let long = toks(&["甲", "乙", "丙", "丁", "戊", "己", "庚", "辛", "。"]);
        let chunks = chunk_tokens(&[short.clone(), long], 4, 1, is_end);
        // The first paragraph's tokens are fully contained, contiguously, in
        // the first chunk produced (paragraph is atomic w.r.t. buffering).
        assert!(chunks[0].len() >= short.len());
        assert_eq!(&chunks[0][..short.len()], &short[..]);
    }

    #[test]
    fn split_paragraphs_drops_empties() {
        let out = split_paragraphs("一\n\n\n二\n三\n\n");
        assert_eq!(out, vec!["一", "二", "三"]);
    }
}
