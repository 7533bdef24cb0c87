use crate::analysis::filter::TokenFilter;
use crate::analysis::token::{Token, TokenType};

/// Turns runs of adjacent CJK characters into unigrams plus bigrams.
///
/// Word tokens pass through untouched. A bigram takes the position of its
/// first character, so "搜索" still matches as a phrase of "搜" "索".
pub struct CjkNGramFilter;

impl CjkNGramFilter {
    fn flush(run: &mut Vec<Token>, out: &mut Vec<Token>) {
        for (i, token) in run.iter().enumerate() {
            out.push(token.clone());
            if let Some(next) = run.get(i + 1) {
                let text = format!("{}{}", token.text, next.text);
                out.push(Token {
                    length: text.len(),
                    text,
                    position: token.position,
                    offset: token.offset,
                    token_type: TokenType::Cjk,
                });
            }
        }
        run.clear();
    }
}

impl TokenFilter for CjkNGramFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        let mut result = Vec::with_capacity(tokens.len());
        let mut run: Vec<Token> = Vec::new();

        for token in tokens {
            if token.token_type != TokenType::Cjk {
                Self::flush(&mut run, &mut result);
                result.push(token);
                continue;
            }
            let adjacent = run
                .last()
                .is_some_and(|prev| prev.offset + prev.length == token.offset);
            if !adjacent {
                Self::flush(&mut run, &mut result);
            }
            run.push(token);
        }
        Self::flush(&mut run, &mut result);

        result
    }

    fn name(&self) -> &str {
        "cjk_ngram"
    }

    fn clone_box(&self) -> Box<dyn TokenFilter> {
        Box::new(CjkNGramFilter)
    }
}
