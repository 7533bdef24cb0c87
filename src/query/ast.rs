use std::fmt;
use serde::{Serialize, Deserialize};
use crate::core::error::{Error, Result};
use crate::core::types::{TermCount, TermPos, ValueSlot};

/// Query tree. Immutable once built; share it by cloning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Query {
    MatchAll,                               // Every live document
    MatchNothing,                           // The empty query
    Term(TermQuery),                        // Single term search
    And(Vec<Query>),
    Or(Vec<Query>),
    AndNot(Box<Query>, Box<Query>),         // Left, minus anything matching right
    Xor(Vec<Query>),                        // Odd number of children match
    AndMaybe(Box<Query>, Box<Query>),       // Left; right only adds weight
    Filter(Box<Query>, Box<Query>),         // Left, restricted by right; right adds no weight
    Phrase(PhraseQuery),                    // Terms in order within a window
    Near(PhraseQuery),                      // Terms in any order within a window
    ScaleWeight(Box<Query>, f64),
    Wildcard(WildcardQuery),                // Every term starting with a prefix
    ValueRange { slot: ValueSlot, begin: String, end: String },
    ValueGe { slot: ValueSlot, limit: String },
    ValueLe { slot: ValueSlot, limit: String },
}

/// Single term query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermQuery {
    pub term: String,
    pub wqf: TermCount,          // Within-query frequency
    pub pos: Option<TermPos>,    // Position in the query string
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhraseQuery {
    pub terms: Vec<String>,
    pub window: Option<u32>,     // Max span in positions; None = number of terms
}

impl PhraseQuery {
    pub fn effective_window(&self) -> u32 {
        self.window.unwrap_or(0).max(self.terms.len() as u32)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WildcardQuery {
    pub prefix: String,
    pub max_expansion: u32,      // 0 = unlimited
}

/// Operator tags matching the query node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryOp {
    MatchAll,
    MatchNothing,
    Leaf,
    And,
    Or,
    AndNot,
    Xor,
    AndMaybe,
    Filter,
    Near,
    Phrase,
    ScaleWeight,
    Wildcard,
    ValueRange,
    ValueGe,
    ValueLe,
}

fn collapse(children: Vec<Query>, make: fn(Vec<Query>) -> Query) -> Query {
    let mut children = children;
    match children.len() {
        0 => Query::MatchNothing,
        1 => children.remove(0),
        _ => make(children),
    }
}

impl Query {
    pub fn term(term: impl Into<String>) -> Self {
        Query::Term(TermQuery { term: term.into(), wqf: 1, pos: None })
    }

    pub fn term_at(term: impl Into<String>, wqf: TermCount, pos: Option<TermPos>) -> Self {
        Query::Term(TermQuery { term: term.into(), wqf, pos })
    }

    pub fn and(children: impl IntoIterator<Item = Query>) -> Self {
        collapse(children.into_iter().collect(), Query::And)
    }

    pub fn or(children: impl IntoIterator<Item = Query>) -> Self {
        collapse(children.into_iter().collect(), Query::Or)
    }

    pub fn xor(children: impl IntoIterator<Item = Query>) -> Self {
        collapse(children.into_iter().collect(), Query::Xor)
    }

    pub fn and_not(positive: Query, negative: Query) -> Self {
        Query::AndNot(Box::new(positive), Box::new(negative))
    }

    pub fn and_maybe(required: Query, optional: Query) -> Self {
        Query::AndMaybe(Box::new(required), Box::new(optional))
    }

    pub fn filter(query: Query, filter: Query) -> Self {
        Query::Filter(Box::new(query), Box::new(filter))
    }

    pub fn phrase<S: Into<String>>(terms: impl IntoIterator<Item = S>, window: Option<u32>) -> Self {
        Query::Phrase(PhraseQuery { terms: terms.into_iter().map(Into::into).collect(), window })
    }

    pub fn near<S: Into<String>>(terms: impl IntoIterator<Item = S>, window: Option<u32>) -> Self {
        Query::Near(PhraseQuery { terms: terms.into_iter().map(Into::into).collect(), window })
    }

    /// Multiplies the weight of `query` by `factor`, which must be finite and non-negative.
    pub fn scale_weight(query: Query, factor: f64) -> Result<Self> {
        if !factor.is_finite() || factor < 0.0 {
            return Err(Error::invalid_argument(format!("Scale factor {} must be >= 0", factor)));
        }
        Ok(Query::ScaleWeight(Box::new(query), factor))
    }

    pub fn wildcard(prefix: impl Into<String>, max_expansion: u32) -> Self {
        Query::Wildcard(WildcardQuery { prefix: prefix.into(), max_expansion })
    }

    pub fn value_range(slot: ValueSlot, begin: impl Into<String>, end: impl Into<String>) -> Self {
        Query::ValueRange { slot, begin: begin.into(), end: end.into() }
    }

    pub fn value_ge(slot: ValueSlot, limit: impl Into<String>) -> Self {
        Query::ValueGe { slot, limit: limit.into() }
    }

    pub fn value_le(slot: ValueSlot, limit: impl Into<String>) -> Self {
        Query::ValueLe { slot, limit: limit.into() }
    }

    /// Builds a node from an operator and subqueries.
    pub fn combine(op: QueryOp, mut subqueries: Vec<Query>) -> Result<Self> {
        let binary = |subqueries: &mut Vec<Query>| -> Result<(Query, Query)> {
            if subqueries.len() != 2 {
                return Err(Error::invalid_argument(format!("{:?} takes exactly two subqueries", op)));
            }
            let right = subqueries.pop().unwrap_or(Query::MatchNothing);
            let left = subqueries.pop().unwrap_or(Query::MatchNothing);
            Ok((left, right))
        };

        match op {
            QueryOp::And => Ok(Query::and(subqueries)),
            QueryOp::Or => Ok(Query::or(subqueries)),
            QueryOp::Xor => Ok(Query::xor(subqueries)),
            QueryOp::AndNot => binary(&mut subqueries).map(|(l, r)| Query::and_not(l, r)),
            QueryOp::AndMaybe => binary(&mut subqueries).map(|(l, r)| Query::and_maybe(l, r)),
            QueryOp::Filter => binary(&mut subqueries).map(|(l, r)| Query::filter(l, r)),
            QueryOp::Phrase | QueryOp::Near => {
                let mut terms = Vec::with_capacity(subqueries.len());
                for q in subqueries {
                    match q {
                        Query::Term(t) => terms.push(t.term),
                        other => {
                            return Err(Error::invalid_argument(format!(
                                "{:?} only takes terms, got {}", op, other
                            )))
                        }
                    }
                }
                Ok(if op == QueryOp::Phrase { Query::phrase(terms, None) } else { Query::near(terms, None) })
            }
            _ => Err(Error::invalid_argument(format!("{:?} cannot combine subqueries", op))),
        }
    }

    pub fn op(&self) -> QueryOp {
        match self {
            Query::MatchAll => QueryOp::MatchAll,
            Query::MatchNothing => QueryOp::MatchNothing,
            Query::Term(_) => QueryOp::Leaf,
            Query::And(_) => QueryOp::And,
            Query::Or(_) => QueryOp::Or,
            Query::AndNot(..) => QueryOp::AndNot,
            Query::Xor(_) => QueryOp::Xor,
            Query::AndMaybe(..) => QueryOp::AndMaybe,
            Query::Filter(..) => QueryOp::Filter,
            Query::Phrase(_) => QueryOp::Phrase,
            Query::Near(_) => QueryOp::Near,
            Query::ScaleWeight(..) => QueryOp::ScaleWeight,
            Query::Wildcard(_) => QueryOp::Wildcard,
            Query::ValueRange { .. } => QueryOp::ValueRange,
            Query::ValueGe { .. } => QueryOp::ValueGe,
            Query::ValueLe { .. } => QueryOp::ValueLe,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Query::MatchNothing)
    }

    /// Distinct terms in the order they first appear.
    pub fn terms(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_terms(&mut out);
        let mut seen = std::collections::HashSet::new();
        out.retain(|t| seen.insert(t.clone()));
        out
    }

    fn collect_terms(&self, out: &mut Vec<String>) {
        match self {
            Query::Term(t) => out.push(t.term.clone()),
            Query::Phrase(p) | Query::Near(p) => out.extend(p.terms.iter().cloned()),
            Query::And(c) | Query::Or(c) | Query::Xor(c) => c.iter().for_each(|q| q.collect_terms(out)),
            Query::AndNot(l, r) | Query::AndMaybe(l, r) | Query::Filter(l, r) => {
                l.collect_terms(out);
                r.collect_terms(out);
            }
            Query::ScaleWeight(q, _) => q.collect_terms(out),
            _ => {}
        }
    }

    /// Sum of wqf over leaf terms, the default query length for weighting.
    pub fn length(&self) -> TermCount {
        match self {
            Query::Term(t) => t.wqf,
            Query::Phrase(p) | Query::Near(p) => p.terms.len() as TermCount,
            Query::And(c) | Query::Or(c) | Query::Xor(c) => c.iter().map(Query::length).sum(),
            Query::AndNot(l, r) | Query::AndMaybe(l, r) | Query::Filter(l, r) => l.length() + r.length(),
            Query::ScaleWeight(q, _) => q.length(),
            _ => 0,
        }
    }

    pub fn serialise(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn unserialise(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn description(&self) -> String {
        format!("Query({})", self)
    }
}

impl Default for Query {
    fn default() -> Self {
        Query::MatchNothing
    }
}

fn join(f: &mut fmt::Formatter, children: &[Query], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            write!(f, " {} ", sep)?;
        }
        write!(f, "{}", child)?;
    }
    write!(f, ")")
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Query::MatchAll => write!(f, "<alldocuments>"),
            Query::MatchNothing => write!(f, "<nodocuments>"),
            Query::Term(t) => {
                write!(f, "{}", t.term)?;
                if t.wqf != 1 {
                    write!(f, "#{}", t.wqf)?;
                }
                if let Some(pos) = t.pos {
                    write!(f, "@{}", pos)?;
                }
                Ok(())
            }
            Query::And(c) => join(f, c, "AND"),
            Query::Or(c) => join(f, c, "OR"),
            Query::Xor(c) => join(f, c, "XOR"),
            Query::AndNot(l, r) => write!(f, "({} AND_NOT {})", l, r),
            Query::AndMaybe(l, r) => write!(f, "({} AND_MAYBE {})", l, r),
            Query::Filter(l, r) => write!(f, "({} FILTER {})", l, r),
            Query::Phrase(p) => write!(f, "({})", p.terms.join(&format!(" PHRASE {} ", p.effective_window()))),
            Query::Near(p) => write!(f, "({})", p.terms.join(&format!(" NEAR {} ", p.effective_window()))),
            Query::ScaleWeight(q, factor) => write!(f, "{} * {}", factor, q),
            Query::Wildcard(w) => write!(f, "(WILDCARD {}*)", w.prefix),
            Query::ValueRange { slot, begin, end } => write!(f, "VALUE_RANGE {} {} {}", slot, begin, end),
            Query::ValueGe { slot, limit } => write!(f, "VALUE_GE {} {}", slot, limit),
            Query::ValueLe { slot, limit } => write!(f, "VALUE_LE {} {}", slot, limit),
        }
    }
}
