pub mod enquire;
pub mod matcher;
pub mod postlist;
pub mod results;
pub mod term_iterator;
