use std::fmt;
use serde::{Serialize, Deserialize};

/// Document identifier. Zero is never a valid id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(pub u32);

impl DocId {
    pub fn new(id: u32) -> Self {
        DocId(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl From<u32> for DocId {
    fn from(id: u32) -> Self {
        DocId(id)
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Numeric slot a stored value lives in.
pub type ValueSlot = u32;

/// Position of a term within a document.
pub type TermPos = u32;

/// Within-document frequency of a term.
pub type TermCount = u32;

pub type DocCount = u32;

/// Sentinel slot meaning "no slot".
pub const BAD_VALUENO: ValueSlot = u32::MAX;
