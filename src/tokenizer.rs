//! C1 — Word-segment Chinese text and mark sentence terminators.
//!
//! Delegated to `jieba-rs`, the ecosystem's Chinese word-segmentation crate.
//! Punctuation is returned as its own token, so a configured sentence
//! terminator (default `。！？`) always appears as a standalone token the
//! chunker (C2) can scan for.

use jieba_rs::Jieba;

pub struct Tokenizer {
    jieba: Jieba,
    terminators: Vec<char>,
}

impl Tokenizer {
    pub fn new(terminators: Vec<char>) -> Self {
        Self {
            jieba: Jieba::new(),
            terminators,
        }
    }

    /// Word-segments `text`, preserving token order.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        self.jieba
            .cut(text, false)
            .into_iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// True when `token` is one of the configured sentence terminators.
    pub fn is_sentence_end(&self, token: &str) -> bool {
        let mut chars = token.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => self.terminators.contains(&c),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminator_is_recognised_as_its_own_token() {
        let tok = Tokenizer::new(vec!['。', '！', '？']);
        assert!(tok.is_sentence_end("。"));
        assert!(!tok.is_sentence_end("脑卒中"));
    }

    #[test]
    fn tokenize_splits_punctuation_from_words() {
        let tok = Tokenizer::new(vec!['。']);
        let tokens = tok.tokenize("脑卒中是一种脑血管疾病。");
        assert_eq!(tokens.last().map(String::as_str), Some("。"));
    }
}
