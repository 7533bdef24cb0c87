use crate::analysis::token::Token;
use unicode_segmentation::UnicodeSegmentation;

pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<Token>;

    fn name(&self) -> &str;

    fn clone_box(&self) -> Box<dyn Tokenizer>;
}

/// Standard Unicode tokenizer (UAX #29 word boundaries).
///
/// Case is preserved; lowercasing is a separate filter so callers can
/// still see whether the original word was capitalized.
#[derive(Clone)]
pub struct StandardTokenizer {
    pub max_token_length: usize,
}

impl Default for StandardTokenizer {
    fn default() -> Self {
        StandardTokenizer {
            max_token_length: 64,
        }
    }
}

impl StandardTokenizer {
    pub fn new(max_token_length: usize) -> Self {
        StandardTokenizer { max_token_length }
    }
}

impl Tokenizer for StandardTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut position = 0u32;

        for (offset, word) in text.unicode_word_indices() {
            // Over-long words are dropped but still consume a position
            if word.len() <= self.max_token_length {
                tokens.push(Token::new(word.to_string(), position, offset));
            }
            position += 1;
        }

        tokens
    }

    fn name(&self) -> &str {
        "standard"
    }

    fn clone_box(&self) -> Box<dyn Tokenizer> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::token::TokenType;

    #[test]
    fn splits_on_word_boundaries_with_offsets() {
        let tokens = StandardTokenizer::default().tokenize("The quick, brown fox!");
        let words: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(words, vec!["The", "quick", "brown", "fox"]);
        assert_eq!(tokens[1].offset, 4);
        assert_eq!(tokens[3].position, 3);
    }

    #[test]
    fn long_words_keep_their_position_slot() {
        let tokens = StandardTokenizer::new(5).tokenize("tiny enormousword end");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].text, "end");
        assert_eq!(tokens[1].position, 2);
    }

    #[test]
    fn ideographs_are_single_tokens() {
        let tokens = StandardTokenizer::default().tokenize("搜索引擎");
        assert_eq!(tokens.len(), 4);
        assert!(tokens.iter().all(|t| t.token_type == TokenType::Cjk));
    }
}
