pub mod core;
pub mod storage;
pub mod analysis;
pub mod index;
pub mod scoring;
pub mod search;
pub mod query;
pub mod mvcc;
pub mod writer;
pub mod compression;

pub use crate::core::database::Database;
pub use crate::core::writable_database::WritableDatabase;
pub use crate::core::document::Document;
pub use crate::search::enquire::Enquire;
pub use crate::search::results::{MSet, MSetIterator};
pub use crate::search::term_iterator::TermIterator;
pub use crate::analysis::term_generator::TermGenerator;
pub use crate::analysis::stem::Stem;
pub use crate::query::ast::Query;
pub use crate::query::parser::QueryParser;

pub use crate::core::config::{Config, OpenMode, DB_CREATE, DB_CREATE_OR_OPEN, DB_CREATE_OR_OVERWRITE, DB_OPEN};
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::types::{DocId, ValueSlot};
pub use crate::query::ast::QueryOp;
pub use crate::storage::wal::SyncMode;
pub use crate::analysis::term_generator::{StemStrategy, StopStrategy, FLAG_CJK_NGRAM, FLAG_SPELLING};
pub use crate::analysis::filters::stopword::SimpleStopper;
pub use crate::query::parser::{
    FLAG_BOOLEAN, FLAG_BOOLEAN_ANY_CASE, FLAG_DEFAULT, FLAG_LOVEHATE, FLAG_PHRASE,
    FLAG_SPELLING_CORRECTION, FLAG_SYNONYM, FLAG_WILDCARD,
};
