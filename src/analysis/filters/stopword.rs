use std::collections::HashSet;

/// Decides whether a word is too common to be worth indexing or searching.
pub trait Stopper: Send + Sync {
    fn is_stopword(&self, word: &str) -> bool;

    fn description(&self) -> String {
        "Stopper()".to_string()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimpleStopper {
    pub stop_words: HashSet<String>,
}

impl SimpleStopper {
    pub fn new<I, S>(stop_words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SimpleStopper {
            stop_words: stop_words.into_iter().map(Into::into).collect(),
        }
    }

    pub fn english() -> Self {
        SimpleStopper::new([
            "a", "an", "and", "are", "as", "at", "be", "by", "for",
            "from", "has", "he", "in", "is", "it", "its", "of", "on",
            "that", "the", "to", "was", "will", "with",
        ])
    }

    pub fn add(&mut self, word: impl Into<String>) {
        self.stop_words.insert(word.into());
    }
}

impl Stopper for SimpleStopper {
    fn is_stopword(&self, word: &str) -> bool {
        self.stop_words.contains(word)
    }

    fn description(&self) -> String {
        format!("SimpleStopper({} words)", self.stop_words.len())
    }
}
