use serde::{Serialize, Deserialize};

/// Token representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,      // The token text
    pub position: u32,     // Word index within the analysed text
    pub offset: usize,     // Byte offset in original text
    pub length: usize,     // Token length in bytes
    pub token_type: TokenType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    Word,
    Number,
    Cjk,       // Single CJK ideograph or kana
}

impl Token {
    pub fn new(text: String, position: u32, offset: usize) -> Self {
        let length = text.len();
        let token_type = classify(&text);
        Token {
            text,
            position,
            offset,
            length,
            token_type,
        }
    }

    /// Starts with an uppercase letter, used by the query parser to skip stemming.
    pub fn is_capitalized(&self) -> bool {
        self.text.chars().next().is_some_and(char::is_uppercase)
    }
}

fn classify(text: &str) -> TokenType {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if is_cjk(c) => TokenType::Cjk,
        _ if text.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',') => TokenType::Number,
        _ => TokenType::Word,
    }
}

pub fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x2E80..=0x2FDF       // radicals
        | 0x3040..=0x30FF     // hiragana, katakana
        | 0x3100..=0x312F     // bopomofo
        | 0x3400..=0x4DBF     // extension A
        | 0x4E00..=0x9FFF     // unified ideographs
        | 0xAC00..=0xD7AF     // hangul syllables
        | 0xF900..=0xFAFF
        | 0x20000..=0x2FA1F)
}
