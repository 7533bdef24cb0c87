use std::collections::BTreeMap;
use std::sync::Arc;
use serde::{Serialize, Deserialize};
use crate::analysis::analyzer::Analyzer;
use crate::analysis::filters::stopword::Stopper;
use crate::analysis::stem::Stem;
use crate::analysis::token::TokenType;
use crate::core::document::Document;
use crate::core::error::Result;
use crate::core::types::{TermCount, TermPos};

/// Collect indexed words for the spelling dictionary.
pub const FLAG_SPELLING: u32 = 128;
/// Index CJK text as unigrams and bigrams.
pub const FLAG_CJK_NGRAM: u32 = 2048;

/// Position gap inserted between fields by `index_fields`.
pub const FIELD_GAP: TermPos = 100;

pub const DEFAULT_MAX_WORD_LENGTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StemStrategy {
    /// Unstemmed terms only.
    StemNone,
    /// Unstemmed terms with positions, plus `Z`-prefixed stems without.
    #[default]
    StemSome,
    /// Stemmed terms only, with positions.
    StemAll,
    /// `Z`-prefixed stemmed terms only, with positions.
    StemAllZ,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StopStrategy {
    StopNone,
    /// Drop stopwords entirely.
    StopAll,
    /// Index stopwords unstemmed, but never generate their stemmed form.
    #[default]
    StopStemmed,
}

/// Turns free text into terms on a `Document`.
pub struct TermGenerator {
    stemmer: Stem,
    stopper: Option<Arc<dyn Stopper>>,
    stop_strategy: StopStrategy,
    stem_strategy: StemStrategy,
    flags: u32,
    max_word_length: usize,
    document: Document,
    termpos: TermPos,
    spellings: BTreeMap<String, TermCount>,
}

impl Default for TermGenerator {
    fn default() -> Self {
        TermGenerator::new()
    }
}

impl TermGenerator {
    pub fn new() -> Self {
        TermGenerator {
            stemmer: Stem::none(),
            stopper: None,
            stop_strategy: StopStrategy::default(),
            stem_strategy: StemStrategy::default(),
            flags: 0,
            max_word_length: DEFAULT_MAX_WORD_LENGTH,
            document: Document::new(),
            termpos: 0,
            spellings: BTreeMap::new(),
        }
    }

    pub fn set_stemmer(&mut self, stemmer: Stem) {
        self.stemmer = stemmer;
    }

    pub fn set_stopper(&mut self, stopper: Option<Arc<dyn Stopper>>) {
        self.stopper = stopper;
    }

    pub fn set_stopper_strategy(&mut self, strategy: StopStrategy) {
        self.stop_strategy = strategy;
    }

    pub fn set_stemming_strategy(&mut self, strategy: StemStrategy) {
        self.stem_strategy = strategy;
    }

    /// Replaces the flags, returning the previous value.
    pub fn set_flags(&mut self, flags: u32) -> u32 {
        std::mem::replace(&mut self.flags, flags)
    }

    pub fn get_flags(&self) -> u32 {
        self.flags
    }

    pub fn set_max_word_length(&mut self, len: usize) {
        self.max_word_length = len;
    }

    /// Binds a document to add terms to; the term position restarts at 0.
    pub fn set_document(&mut self, document: Document) {
        self.document = document;
        self.termpos = 0;
    }

    pub fn get_document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    /// Hands the document back and starts a fresh one.
    pub fn take_document(&mut self) -> Document {
        self.termpos = 0;
        std::mem::take(&mut self.document)
    }

    pub fn get_termpos(&self) -> TermPos {
        self.termpos
    }

    pub fn set_termpos(&mut self, termpos: TermPos) {
        self.termpos = termpos;
    }

    pub fn increase_termpos(&mut self, delta: TermPos) {
        self.termpos = self.termpos.saturating_add(delta);
    }

    pub fn index_text(&mut self, text: &str, wdf_inc: TermCount, prefix: &str) -> Result<()> {
        self.index(text, wdf_inc, prefix, true).map(|_| ())
    }

    pub fn index_text_without_positions(&mut self, text: &str, wdf_inc: TermCount, prefix: &str) -> Result<()> {
        self.index(text, wdf_inc, prefix, false).map(|_| ())
    }

    /// Indexes several `(prefix, text, weight)` fields, separated by `FIELD_GAP`
    /// positions so phrases cannot match across a field boundary.
    /// Returns every positional term written, in order.
    pub fn index_fields(&mut self, fields: &[(&str, &str, TermCount)]) -> Result<Vec<(String, TermPos)>> {
        let mut written = Vec::new();
        for (i, (prefix, text, weight)) in fields.iter().enumerate() {
            if i > 0 {
                self.increase_termpos(FIELD_GAP);
            }
            written.extend(self.index(text, *weight, prefix, true)?);
        }
        Ok(written)
    }

    /// Words seen since the last call, with how often each occurred.
    pub fn take_spelling_words(&mut self) -> Vec<(String, TermCount)> {
        std::mem::take(&mut self.spellings).into_iter().collect()
    }

    fn index(&mut self, text: &str, wdf_inc: TermCount, prefix: &str, positional: bool) -> Result<Vec<(String, TermPos)>> {
        let analyzer = Analyzer::standard(self.max_word_length, self.flags & FLAG_CJK_NGRAM != 0);
        let tokens = analyzer.analyze(text);
        let base = self.termpos;
        let mut consumed = 0;
        let mut written = Vec::new();

        for token in tokens {
            consumed = consumed.max(token.position + 1);
            let word = token.text;
            let pos = base + token.position + 1;

            let is_stop = self.stop_strategy != StopStrategy::StopNone
                && self.stopper.as_ref().is_some_and(|s| s.is_stopword(&word));
            if is_stop && self.stop_strategy == StopStrategy::StopAll {
                continue;
            }

            if self.flags & FLAG_SPELLING != 0 && prefix.is_empty() {
                *self.spellings.entry(word.clone()).or_insert(0) += 1;
            }

            let stemmable = !self.stemmer.is_none() && !is_stop && token.token_type == TokenType::Word;
            let strategy = if stemmable { self.stem_strategy } else { StemStrategy::StemNone };

            match strategy {
                StemStrategy::StemNone | StemStrategy::StemSome => {
                    let term = format!("{}{}", prefix, word);
                    self.write(&term, pos, wdf_inc, positional, &mut written)?;
                    if strategy == StemStrategy::StemSome {
                        let stemmed = format!("Z{}{}", prefix, self.stemmer.stem(&word));
                        self.document.add_term(stemmed, wdf_inc)?;
                    }
                }
                StemStrategy::StemAll => {
                    let term = format!("{}{}", prefix, self.stemmer.stem(&word));
                    self.write(&term, pos, wdf_inc, positional, &mut written)?;
                }
                StemStrategy::StemAllZ => {
                    let term = format!("Z{}{}", prefix, self.stemmer.stem(&word));
                    self.write(&term, pos, wdf_inc, positional, &mut written)?;
                }
            }
        }

        self.termpos = base + consumed;
        Ok(written)
    }

    fn write(&mut self, term: &str, pos: TermPos, wdf_inc: TermCount, positional: bool, written: &mut Vec<(String, TermPos)>) -> Result<()> {
        if positional {
            self.document.add_posting(term, pos, wdf_inc)?;
            written.push((term.to_string(), pos));
        } else {
            self.document.add_term(term, wdf_inc)?;
        }
        Ok(())
    }
}
