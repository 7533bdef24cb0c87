use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use crate::analysis::filters::stopword::Stopper;
use crate::analysis::stem::Stem;
use crate::analysis::term_generator::{StemStrategy, DEFAULT_MAX_WORD_LENGTH};
use crate::analysis::token::{Token, TokenType};
use crate::analysis::tokenizer::{StandardTokenizer, Tokenizer};
use crate::core::database::Database;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::TermPos;
use crate::index::state::IndexState;
use crate::query::ast::{Query, QueryOp};
use crate::query::lexer::{lex, Lexeme};

/// Recognise AND, OR, XOR, NOT, NEAR and parentheses.
pub const FLAG_BOOLEAN: u32 = 1;
/// Quoted text and hyphenated words become phrase queries.
pub const FLAG_PHRASE: u32 = 2;
/// `+term` is required and `-term` excluded.
pub const FLAG_LOVEHATE: u32 = 4;
/// Boolean operators in any case, not just upper case.
pub const FLAG_BOOLEAN_ANY_CASE: u32 = 8;
/// `prefix*` matches every indexed term starting with `prefix`.
pub const FLAG_WILDCARD: u32 = 16;
/// Expand terms with the synonyms stored in the attached database.
pub const FLAG_SYNONYM: u32 = 32;
/// Suggest corrections for unknown words from the spelling dictionary.
pub const FLAG_SPELLING_CORRECTION: u32 = 128;
pub const FLAG_DEFAULT: u32 = FLAG_BOOLEAN | FLAG_PHRASE | FLAG_LOVEHATE;

const DEFAULT_NEAR_WINDOW: u32 = 10;
const SPELLING_MAX_EDITS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    And,
    Or,
    Xor,
    Not,
    Near(Option<u32>),
}

fn keyword(text: &str, any_case: bool) -> Option<Keyword> {
    let upper;
    let word = if any_case {
        upper = text.to_uppercase();
        upper.as_str()
    } else {
        text
    };
    match word {
        "AND" => Some(Keyword::And),
        "OR" => Some(Keyword::Or),
        "XOR" => Some(Keyword::Xor),
        "NOT" => Some(Keyword::Not),
        "NEAR" => Some(Keyword::Near(None)),
        _ => word
            .strip_prefix("NEAR/")
            .and_then(|n| n.parse().ok())
            .map(|n| Keyword::Near(Some(n))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tok<'a> {
    Open,
    Close,
    Love,
    Hate,
    Op(Keyword),
    Word { field: Option<&'a str>, text: &'a str, offset: usize },
    Phrase { field: Option<&'a str>, text: &'a str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sign {
    Plain,
    Love,
    Hate,
}

/// Applies the flags to raw lexemes: operators become keywords, disabled
/// syntax is dropped.
fn classify(lexemes: Vec<(usize, Lexeme<'_>)>, flags: u32) -> Vec<Tok<'_>> {
    let boolean = flags & (FLAG_BOOLEAN | FLAG_BOOLEAN_ANY_CASE) != 0;
    let any_case = flags & FLAG_BOOLEAN_ANY_CASE != 0;
    let lovehate = flags & FLAG_LOVEHATE != 0;

    lexemes
        .into_iter()
        .filter_map(|(offset, lexeme)| match lexeme {
            Lexeme::Open if boolean => Some(Tok::Open),
            Lexeme::Close if boolean => Some(Tok::Close),
            Lexeme::Open | Lexeme::Close => None,
            Lexeme::Love if lovehate => Some(Tok::Love),
            Lexeme::Hate if lovehate => Some(Tok::Hate),
            Lexeme::Love | Lexeme::Hate => None,
            Lexeme::Word { field: None, text } if boolean && keyword(text, any_case).is_some() => {
                keyword(text, any_case).map(Tok::Op)
            }
            Lexeme::Word { field, text } => Some(Tok::Word {
                field,
                text,
                offset: offset + field.map_or(0, |f| f.len() + 1),
            }),
            Lexeme::Phrase { field, text } => Some(Tok::Phrase { field, text }),
        })
        .collect()
}

/// Turns user query strings into `Query` trees.
pub struct QueryParser {
    stemmer: Stem,
    stem_strategy: StemStrategy,
    stopper: Option<Arc<dyn Stopper>>,
    default_op: QueryOp,
    prefixes: HashMap<String, Vec<String>>,
    boolean_prefixes: HashMap<String, Vec<String>>,
    database: Option<Database>,
    max_expansion: Option<u32>,
    corrected: String,
    stoplist: Vec<String>,
    unstem: BTreeMap<String, Vec<String>>,
}

impl Default for QueryParser {
    fn default() -> Self {
        QueryParser::new()
    }
}

impl QueryParser {
    pub fn new() -> Self {
        QueryParser {
            stemmer: Stem::none(),
            stem_strategy: StemStrategy::StemSome,
            stopper: None,
            default_op: QueryOp::And,
            prefixes: HashMap::new(),
            boolean_prefixes: HashMap::new(),
            database: None,
            max_expansion: None,
            corrected: String::new(),
            stoplist: Vec::new(),
            unstem: BTreeMap::new(),
        }
    }

    pub fn set_stemmer(&mut self, stemmer: Stem) {
        self.stemmer = stemmer;
    }

    pub fn set_stemming_strategy(&mut self, strategy: StemStrategy) {
        self.stem_strategy = strategy;
    }

    pub fn set_stopper(&mut self, stopper: Option<Arc<dyn Stopper>>) {
        self.stopper = stopper;
    }

    /// Operator joining adjacent terms. Only `And` and `Or` make sense here.
    pub fn set_default_op(&mut self, op: QueryOp) -> Result<()> {
        match op {
            QueryOp::And | QueryOp::Or => {
                self.default_op = op;
                Ok(())
            }
            other => Err(Error::invalid_argument(format!(
                "Default operator must be And or Or, not {:?}",
                other
            ))),
        }
    }

    pub fn get_default_op(&self) -> QueryOp {
        self.default_op
    }

    /// Maps `field:` to a term prefix for free text. The same field may map
    /// to several prefixes, which are ORed together. Field `""` replaces the
    /// default prefix for unfielded text.
    pub fn add_prefix(&mut self, field: &str, prefix: &str) -> Result<()> {
        if self.boolean_prefixes.contains_key(field) {
            return Err(Error::invalid_argument(format!("Field '{}' is already a boolean prefix", field)));
        }
        self.prefixes.entry(field.to_string()).or_default().push(prefix.to_string());
        Ok(())
    }

    /// Maps `field:` to a term prefix used as a filter: the value is taken
    /// verbatim and never contributes weight.
    pub fn add_boolean_prefix(&mut self, field: &str, prefix: &str) -> Result<()> {
        if self.prefixes.contains_key(field) {
            return Err(Error::invalid_argument(format!("Field '{}' is already a free-text prefix", field)));
        }
        self.boolean_prefixes.entry(field.to_string()).or_default().push(prefix.to_string());
        Ok(())
    }

    pub fn set_database(&mut self, database: &Database) {
        self.database = Some(database.clone());
    }

    pub fn set_max_expansion(&mut self, max: u32) {
        self.max_expansion = Some(max);
    }

    pub fn parse_query(&mut self, text: &str, flags: u32, default_prefix: &str) -> Result<Query> {
        self.corrected.clear();
        self.stoplist.clear();
        self.unstem.clear();

        let tokens = classify(lex(text)?, flags);
        let index = match &self.database {
            Some(db) if flags & (FLAG_SYNONYM | FLAG_SPELLING_CORRECTION) != 0 => Some(db.state()?),
            _ => None,
        };
        let mut run = ParseRun::new(self, index, text, tokens, flags, default_prefix);
        let parsed = run.parse();
        let ParseRun { stoplist, unstem, corrections, .. } = run;

        self.stoplist = stoplist;
        self.unstem = unstem;
        self.corrected = apply_corrections(text, &corrections);
        parsed
    }

    /// The query string with misspelt words replaced, or empty if nothing changed.
    pub fn get_corrected_query_string(&self) -> &str {
        &self.corrected
    }

    /// Stopwords dropped by the last parse.
    pub fn stoplist(&self) -> &[String] {
        &self.stoplist
    }

    /// Words from the last query that produced `term`.
    pub fn unstem(&self, term: &str) -> &[String] {
        self.unstem.get(term).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn description(&self) -> String {
        format!(
            "QueryParser(stemmer={}, default_op={:?}, prefixes={}, boolean_prefixes={})",
            self.stemmer.description(),
            self.default_op,
            self.prefixes.len(),
            self.boolean_prefixes.len()
        )
    }

    fn is_stopword(&self, word: &str) -> bool {
        self.stopper.as_ref().is_some_and(|s| s.is_stopword(word))
    }

    fn stem_term(&self, prefix: &str, word: &str) -> String {
        match self.stem_strategy {
            StemStrategy::StemNone => format!("{}{}", prefix, word),
            StemStrategy::StemSome | StemStrategy::StemAllZ => format!("Z{}{}", prefix, self.stemmer.stem(word)),
            StemStrategy::StemAll => format!("{}{}", prefix, self.stemmer.stem(word)),
        }
    }

    fn effective_max_expansion(&self) -> u32 {
        self.max_expansion
            .or_else(|| self.database.as_ref().map(|db| db.config().max_wildcard_expansion))
            .unwrap_or(0)
    }
}

fn apply_corrections(input: &str, corrections: &[(usize, usize, String)]) -> String {
    if corrections.is_empty() {
        return String::new();
    }
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for (start, end, replacement) in corrections {
        out.push_str(&input[last..*start]);
        out.push_str(replacement);
        last = *end;
    }
    out.push_str(&input[last..]);
    out
}

/// State for one `parse_query` call. Recursive descent, lowest precedence
/// first: OR, XOR, AND, juxtaposition, NOT, NEAR, atoms.
struct ParseRun<'p, 'a> {
    parser: &'p QueryParser,
    index: Option<Arc<IndexState>>,
    input: &'a str,
    tokens: Vec<Tok<'a>>,
    pos: usize,
    flags: u32,
    default_prefixes: Vec<String>,
    tokenizer: StandardTokenizer,
    termpos: TermPos,
    filters: BTreeMap<String, Vec<Query>>,
    stoplist: Vec<String>,
    unstem: BTreeMap<String, Vec<String>>,
    corrections: Vec<(usize, usize, String)>,
}

impl<'p, 'a> ParseRun<'p, 'a> {
    fn new(parser: &'p QueryParser, index: Option<Arc<IndexState>>, input: &'a str, tokens: Vec<Tok<'a>>, flags: u32, default_prefix: &str) -> Self {
        let default_prefixes = parser
            .prefixes
            .get("")
            .cloned()
            .unwrap_or_else(|| vec![default_prefix.to_string()]);
        ParseRun {
            parser,
            index,
            input,
            tokens,
            pos: 0,
            flags,
            default_prefixes,
            tokenizer: StandardTokenizer::new(DEFAULT_MAX_WORD_LENGTH),
            termpos: 0,
            filters: BTreeMap::new(),
            stoplist: Vec::new(),
            unstem: BTreeMap::new(),
            corrections: Vec::new(),
        }
    }

    fn parse(&mut self) -> Result<Query> {
        if self.tokens.is_empty() {
            return Err(Error::new(ErrorKind::EmptyQuery, "Query string has no terms"));
        }

        let main = self.or_expr()?;
        if let Some(tok) = self.peek() {
            return Err(self.unexpected(Some(tok)));
        }

        let filters = std::mem::take(&mut self.filters);
        let filter = (!filters.is_empty()).then(|| Query::and(filters.into_values().map(|qs| Query::or(qs))));

        match (main, filter) {
            (Some(query), None) => Ok(query),
            (Some(query), Some(filter)) => Ok(Query::filter(query, filter)),
            (None, Some(filter)) => Ok(Query::filter(Query::MatchAll, filter)),
            (None, None) => Err(Error::new(ErrorKind::EmptyQuery, "No terms left after removing stopwords")),
        }
    }

    fn peek(&self) -> Option<Tok<'a>> {
        self.tokens.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<Tok<'a>> {
        self.tokens.get(self.pos + ahead).copied()
    }

    fn next(&mut self) -> Option<Tok<'a>> {
        let tok = self.peek();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kw: Keyword) -> bool {
        if self.peek() == Some(Tok::Op(kw)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(&self, tok: Option<Tok<'a>>) -> Error {
        match tok {
            None => Error::syntax("Query ends where a term was expected"),
            Some(Tok::Close) => Error::syntax("Unbalanced parenthesis: unexpected ')'"),
            Some(Tok::Op(kw)) => Error::syntax(format!("Operator {:?} is missing an operand", kw)),
            Some(other) => Error::syntax(format!("Unexpected {:?}", other)),
        }
    }

    fn starts_operand(&self) -> bool {
        matches!(
            self.peek(),
            Some(Tok::Word { .. } | Tok::Phrase { .. } | Tok::Open | Tok::Love | Tok::Hate)
        )
    }

    fn or_expr(&mut self) -> Result<Option<Query>> {
        let mut parts = vec![self.xor_expr()?];
        while self.eat(Keyword::Or) {
            parts.push(self.xor_expr()?);
        }
        Ok(present(parts, |qs| Query::or(qs)))
    }

    fn xor_expr(&mut self) -> Result<Option<Query>> {
        let mut parts = vec![self.and_expr()?];
        while self.eat(Keyword::Xor) {
            parts.push(self.and_expr()?);
        }
        Ok(present(parts, |qs| Query::xor(qs)))
    }

    fn and_expr(&mut self) -> Result<Option<Query>> {
        let mut parts = vec![self.group()?];
        while self.eat(Keyword::And) {
            parts.push(self.group()?);
        }
        Ok(present(parts, |qs| Query::and(qs)))
    }

    /// Adjacent items joined by the default operator, honouring `+` and `-`.
    fn group(&mut self) -> Result<Option<Query>> {
        let mut items = Vec::new();
        while self.starts_operand() {
            let sign = match self.peek() {
                Some(Tok::Love) => Sign::Love,
                Some(Tok::Hate) => Sign::Hate,
                _ => Sign::Plain,
            };
            if sign != Sign::Plain {
                self.pos += 1;
            }
            let query = self.not_expr(sign == Sign::Love)?;
            items.push((sign, query));
        }
        if items.is_empty() {
            return Err(self.unexpected(self.peek()));
        }
        Ok(self.combine_group(items))
    }

    fn combine_group(&self, items: Vec<(Sign, Option<Query>)>) -> Option<Query> {
        let mut required = Vec::new();
        let mut optional = Vec::new();
        let mut excluded = Vec::new();
        for (sign, query) in items {
            let Some(query) = query else { continue };
            match sign {
                Sign::Love => required.push(query),
                Sign::Hate => excluded.push(query),
                Sign::Plain => optional.push(query),
            }
        }

        let positive = if self.parser.default_op == QueryOp::And {
            required.extend(optional);
            (!required.is_empty()).then(|| Query::and(required))
        } else {
            match (required.is_empty(), optional.is_empty()) {
                (true, true) => None,
                (true, false) => Some(Query::or(optional)),
                (false, true) => Some(Query::and(required)),
                (false, false) => Some(Query::and_maybe(Query::and(required), Query::or(optional))),
            }
        };

        if excluded.is_empty() {
            return positive;
        }
        Some(Query::and_not(positive.unwrap_or(Query::MatchAll), Query::or(excluded)))
    }

    fn not_expr(&mut self, keep_stopwords: bool) -> Result<Option<Query>> {
        let mut left = self.near_expr(keep_stopwords)?;
        loop {
            let width = match (self.peek(), self.peek_at(1)) {
                (Some(Tok::Op(Keyword::Not)), _) => 1,
                (Some(Tok::Op(Keyword::And)), Some(Tok::Op(Keyword::Not))) => 2,
                _ => break,
            };
            self.pos += width;
            let right = self.near_expr(false)?;
            left = match (left, right) {
                (Some(l), Some(r)) => Some(Query::and_not(l, r)),
                (l, None) => l,
                (None, Some(r)) => Some(Query::and_not(Query::MatchAll, r)),
            };
        }
        Ok(left)
    }

    fn near_expr(&mut self, keep_stopwords: bool) -> Result<Option<Query>> {
        if !matches!(self.peek_at(1), Some(Tok::Op(Keyword::Near(_)))) {
            return self.atom(keep_stopwords, false);
        }

        let mut terms = vec![self.near_operand()?];
        let mut window = 0;
        while let Some(Tok::Op(Keyword::Near(n))) = self.peek() {
            self.pos += 1;
            window = window.max(n.unwrap_or(DEFAULT_NEAR_WINDOW));
            terms.push(self.near_operand()?);
        }
        Ok(Some(Query::near(terms, Some(window))))
    }

    fn near_operand(&mut self) -> Result<String> {
        match self.atom(true, true)? {
            Some(Query::Term(t)) => Ok(t.term),
            _ => Err(Error::syntax("NEAR needs a single term on each side")),
        }
    }

    /// `raw` terms are never stemmed, as in phrases and NEAR.
    fn atom(&mut self, keep_stopwords: bool, raw: bool) -> Result<Option<Query>> {
        match self.next() {
            Some(Tok::Open) => {
                let inner = self.or_expr()?;
                match self.next() {
                    Some(Tok::Close) => Ok(inner),
                    _ => Err(Error::syntax("Unbalanced parenthesis: missing ')'")),
                }
            }
            Some(Tok::Word { field, text, offset }) => self.word(field, text, offset, keep_stopwords, raw),
            Some(Tok::Phrase { field, text }) => self.phrase(field, text),
            other => Err(self.unexpected(other)),
        }
    }

    fn word(&mut self, field: Option<&'a str>, text: &'a str, offset: usize, keep_stopwords: bool, raw: bool) -> Result<Option<Query>> {
        let parser = self.parser;
        let (prefixes, text, offset) = match field {
            Some(name) => {
                if let Some(boolean) = parser.boolean_prefixes.get(name) {
                    self.add_filter(name, boolean, text);
                    return Ok(None);
                }
                match parser.prefixes.get(name) {
                    Some(prefixes) => (prefixes.clone(), text, offset),
                    None => {
                        // Unknown field: search for the whole `field:value` text
                        let input = self.input;
                        let start = offset - name.len() - 1;
                        (self.default_prefixes.clone(), &input[start..offset + text.len()], start)
                    }
                }
            }
            None => (self.default_prefixes.clone(), text, offset),
        };

        if self.flags & FLAG_WILDCARD != 0 && !raw {
            if let Some(stub) = text.strip_suffix('*').filter(|s| !s.is_empty() && !s.contains('*')) {
                let stub = stub.to_lowercase();
                let max = parser.effective_max_expansion();
                return Ok(Some(Query::or(
                    prefixes.iter().map(|p| Query::wildcard(format!("{}{}", p, stub), max)),
                )));
            }
        }

        let tokens = self.tokenizer.tokenize(text);
        if self.flags & FLAG_SPELLING_CORRECTION != 0 {
            self.check_spelling(&tokens, offset, &prefixes);
        }
        match tokens.len() {
            0 => Ok(None),
            1 => Ok(self.single_term(&tokens[0], &prefixes, keep_stopwords, raw)),
            _ => Ok(Some(self.multi_word(&tokens, &prefixes))),
        }
    }

    fn phrase(&mut self, field: Option<&'a str>, text: &'a str) -> Result<Option<Query>> {
        let parser = self.parser;
        let prefixes = match field {
            Some(name) => {
                if let Some(boolean) = parser.boolean_prefixes.get(name) {
                    self.add_filter(name, boolean, text);
                    return Ok(None);
                }
                parser.prefixes.get(name).cloned().unwrap_or_else(|| self.default_prefixes.clone())
            }
            None => self.default_prefixes.clone(),
        };

        let tokens = self.tokenizer.tokenize(text);
        match tokens.len() {
            0 => Ok(None),
            1 => Ok(self.single_term(&tokens[0], &prefixes, true, true)),
            _ => Ok(Some(self.multi_word(&tokens, &prefixes))),
        }
    }

    fn single_term(&mut self, token: &Token, prefixes: &[String], keep_stopwords: bool, raw: bool) -> Option<Query> {
        let parser = self.parser;
        let word = token.text.to_lowercase();
        if !keep_stopwords && parser.is_stopword(&word) {
            self.stoplist.push(word);
            return None;
        }

        self.termpos += 1;
        let pos = self.termpos;
        let stem = !raw
            && !token.is_capitalized()
            && token.token_type == TokenType::Word
            && !parser.stemmer.is_none();

        let mut alternatives = Vec::with_capacity(prefixes.len());
        for prefix in prefixes {
            let term = if stem { parser.stem_term(prefix, &word) } else { format!("{}{}", prefix, word) };
            let sources = self.unstem.entry(term.clone()).or_default();
            if !sources.contains(&word) {
                sources.push(word.clone());
            }
            let leaf = Query::term_at(term.clone(), 1, Some(pos));
            alternatives.push(self.with_synonyms(leaf, &term, &word));
        }
        Some(Query::or(alternatives))
    }

    /// Several words from one token: a phrase, or a conjunction without FLAG_PHRASE.
    fn multi_word(&mut self, tokens: &[Token], prefixes: &[String]) -> Query {
        let words: Vec<String> = tokens.iter().map(|t| t.text.to_lowercase()).collect();
        self.termpos += words.len() as TermPos;
        let phrase = self.flags & FLAG_PHRASE != 0;

        Query::or(prefixes.iter().map(|prefix| {
            let terms: Vec<String> = words.iter().map(|w| format!("{}{}", prefix, w)).collect();
            if phrase {
                Query::phrase(terms, None)
            } else {
                Query::and(terms.into_iter().map(Query::term))
            }
        }))
    }

    fn with_synonyms(&self, leaf: Query, term: &str, word: &str) -> Query {
        if self.flags & FLAG_SYNONYM == 0 {
            return leaf;
        }
        let Some(index) = self.index.as_ref() else {
            return leaf;
        };

        let mut keys = vec![term];
        if word != term {
            keys.push(word);
        }
        let mut alternatives = vec![leaf];
        for key in keys {
            alternatives.extend(index.synonyms(key).map(|entry| Query::term(entry.term)));
        }
        Query::or(alternatives)
    }

    fn check_spelling(&mut self, tokens: &[Token], offset: usize, prefixes: &[String]) {
        let Some(index) = self.index.clone() else {
            return;
        };
        for token in tokens {
            let word = token.text.to_lowercase();
            if prefixes.iter().any(|p| index.dictionary.contains(&format!("{}{}", p, word))) {
                continue;
            }
            if let Some(suggestion) = index.spelling_suggestion(&word, SPELLING_MAX_EDITS) {
                let start = offset + token.offset;
                self.corrections.push((start, start + token.length, suggestion));
            }
        }
    }

    fn add_filter(&mut self, field: &str, prefixes: &[String], value: &str) {
        self.filters
            .entry(field.to_string())
            .or_default()
            .extend(prefixes.iter().map(|p| Query::term(format!("{}{}", p, value))));
    }
}

fn present(parts: Vec<Option<Query>>, make: fn(Vec<Query>) -> Query) -> Option<Query> {
    let parts: Vec<Query> = parts.into_iter().flatten().collect();
    if parts.is_empty() {
        None
    } else {
        Some(make(parts))
    }
}
