pub mod analyzer;
pub mod filter;
pub mod filters;
pub mod stem;
pub mod term_generator;
pub mod token;
pub mod tokenizer;
