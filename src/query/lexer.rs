use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_till, take_while1},
    character::complete::{char, multispace0, satisfy},
    combinator::{map, opt, peek, value},
    sequence::{delimited, terminated},
};
use crate::core::error::{Error, Result};

/// One lexical unit of a query string. Words are split into terms later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lexeme<'a> {
    Open,
    Close,
    Love,                                                   // `+` directly before a word
    Hate,                                                   // `-` directly before a word
    Word { field: Option<&'a str>, text: &'a str },
    Phrase { field: Option<&'a str>, text: &'a str },       // Contents of a "quoted" run
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | '"')
}

fn field_name(input: &str) -> IResult<&str, &str> {
    terminated(take_while1(|c: char| c.is_alphanumeric() || c == '_'), char(':')).parse(input)
}

fn phrase(input: &str) -> IResult<&str, Lexeme<'_>> {
    map(
        (opt(field_name), delimited(char('"'), take_till(|c: char| c == '"'), char('"'))),
        |(field, text)| Lexeme::Phrase { field, text },
    )
    .parse(input)
}

fn fielded_word(input: &str) -> IResult<&str, Lexeme<'_>> {
    map((field_name, take_while1(is_word_char)), |(field, text)| Lexeme::Word {
        field: Some(field),
        text,
    })
    .parse(input)
}

fn plain_word(input: &str) -> IResult<&str, Lexeme<'_>> {
    map(take_while1(is_word_char), |text| Lexeme::Word { field: None, text }).parse(input)
}

fn operand_start(input: &str) -> IResult<&str, char> {
    satisfy(|c| is_word_char(c) || c == '"').parse(input)
}

fn love_hate(input: &str) -> IResult<&str, Lexeme<'_>> {
    alt((
        value(Lexeme::Love, terminated(char('+'), peek(operand_start))),
        value(Lexeme::Hate, terminated(char('-'), peek(operand_start))),
    ))
    .parse(input)
}

fn lexeme(input: &str) -> IResult<&str, Lexeme<'_>> {
    alt((
        value(Lexeme::Open, char('(')),
        value(Lexeme::Close, char(')')),
        phrase,
        love_hate,
        fielded_word,
        plain_word,
    ))
    .parse(input)
}

/// Splits a query string into lexemes paired with their byte offsets.
pub fn lex(input: &str) -> Result<Vec<(usize, Lexeme<'_>)>> {
    let mut out = Vec::new();
    let mut rest = input;

    loop {
        let (after_space, _) = multispace0::<&str, nom::error::Error<&str>>(rest)
            .map_err(|e| Error::syntax(format!("Query lexing failed: {}", e)))?;
        rest = after_space;
        if rest.is_empty() {
            break;
        }

        let offset = input.len() - rest.len();
        match lexeme(rest) {
            Ok((next, lx)) => {
                out.push((offset, lx));
                rest = next;
            }
            Err(_) if rest.contains('"') => {
                return Err(Error::syntax(format!("Unbalanced quote at offset {}", offset)));
            }
            Err(_) => {
                return Err(Error::syntax(format!("Unexpected input at offset {}", offset)));
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    fn kinds(input: &str) -> Vec<Lexeme<'_>> {
        lex(input).unwrap().into_iter().map(|(_, l)| l).collect()
    }

    #[test]
    fn words_fields_and_parens() {
        assert_eq!(
            kinds("(title:Fox OR dog)"),
            vec![
                Lexeme::Open,
                Lexeme::Word { field: Some("title"), text: "Fox" },
                Lexeme::Word { field: None, text: "OR" },
                Lexeme::Word { field: None, text: "dog" },
                Lexeme::Close,
            ]
        );
    }

    #[test]
    fn phrases_keep_inner_text() {
        assert_eq!(
            kinds("author:\"jane doe\" \"quick fox\""),
            vec![
                Lexeme::Phrase { field: Some("author"), text: "jane doe" },
                Lexeme::Phrase { field: None, text: "quick fox" },
            ]
        );
    }

    #[test]
    fn love_hate_only_when_attached() {
        assert_eq!(
            kinds("+fox -dog a - b"),
            vec![
                Lexeme::Love,
                Lexeme::Word { field: None, text: "fox" },
                Lexeme::Hate,
                Lexeme::Word { field: None, text: "dog" },
                Lexeme::Word { field: None, text: "a" },
                Lexeme::Word { field: None, text: "-" },
                Lexeme::Word { field: None, text: "b" },
            ]
        );
    }

    #[test]
    fn field_without_value_is_a_word() {
        assert_eq!(kinds("title: fox")[0], Lexeme::Word { field: None, text: "title:" });
    }

    #[test]
    fn offsets_point_into_input() {
        let lexed = lex("  fox  dog").unwrap();
        assert_eq!(lexed[0].0, 2);
        assert_eq!(lexed[1].0, 7);
    }

    #[test]
    fn unbalanced_quote_is_syntax_error() {
        assert_eq!(lex("\"quick fox").unwrap_err().kind, ErrorKind::Syntax);
    }
}
