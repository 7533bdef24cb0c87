pub mod doc_store;
pub mod inverted;
pub mod posting;
pub mod state;
