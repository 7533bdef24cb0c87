pub mod lowercase;
pub mod ngram;
pub mod stopword;
