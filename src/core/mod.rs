pub mod types;
pub mod config;
pub mod database;
pub mod document;
pub mod error;
pub mod stats;
pub mod writable_database;
