use crate::core::types::{DocCount, TermCount};

/// Scorer trait
pub trait Scorer: Send + Sync {
    /// Contribution of one matching term to one document.
    fn score(&self, wdf: TermCount, doc_length: u64, term: &TermWeightStats, collection: &CollectionStats) -> f64;

    /// Upper bound of `score` over every possible document.
    fn max_score(&self, term: &TermWeightStats, collection: &CollectionStats) -> f64;

    fn name(&self) -> &str;
}

/// Per-term statistics for scoring
#[derive(Debug, Clone, Copy)]
pub struct TermWeightStats {
    pub doc_freq: DocCount,     // Documents containing the term
    pub wqf: TermCount,         // Within-query frequency
}

/// Collection statistics for scoring, plus the length of the query being run
#[derive(Debug, Clone, Copy)]
pub struct CollectionStats {
    pub doc_count: u64,
    pub avg_doc_length: f64,
    pub query_length: TermCount,
}

impl CollectionStats {
    /// A term's share of the query. Zero query length means unnormalised wqf.
    pub fn query_share(&self, wqf: TermCount) -> f64 {
        if self.query_length == 0 {
            wqf as f64
        } else {
            wqf as f64 / self.query_length as f64
        }
    }

    fn length_ratio(&self, doc_length: u64) -> f64 {
        if self.avg_doc_length > 0.0 {
            doc_length as f64 / self.avg_doc_length
        } else {
            1.0
        }
    }
}

/// Probabilistic IDF, floored so it never goes negative for very common terms.
pub fn idf(doc_freq: DocCount, doc_count: u64) -> f64 {
    let n = doc_count as f64;
    let df = (doc_freq as f64).min(n);
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

/// TF-IDF Scorer, with tf normalised by document length
#[derive(Debug, Clone, Copy, Default)]
pub struct TfIdfScorer;

impl Scorer for TfIdfScorer {
    fn score(&self, wdf: TermCount, doc_length: u64, term: &TermWeightStats, collection: &CollectionStats) -> f64 {
        if wdf == 0 || doc_length == 0 {
            return 0.0;
        }
        let tf = wdf as f64 / doc_length as f64;
        tf * idf(term.doc_freq, collection.doc_count) * collection.query_share(term.wqf)
    }

    fn max_score(&self, term: &TermWeightStats, collection: &CollectionStats) -> f64 {
        idf(term.doc_freq, collection.doc_count) * collection.query_share(term.wqf)
    }

    fn name(&self) -> &str {
        "tfidf"
    }
}

/// BM25 Scorer
#[derive(Debug, Clone, Copy)]
pub struct BM25Scorer {
    pub k1: f64,  // Term frequency saturation (default: 1.2)
    pub b: f64,   // Length normalization strength (default: 0.75)
}

impl Default for BM25Scorer {
    fn default() -> Self {
        BM25Scorer {
            k1: 1.2,
            b: 0.75,
        }
    }
}

impl BM25Scorer {
    pub fn new(k1: f64, b: f64) -> Self {
        BM25Scorer { k1, b }
    }
}

impl Scorer for BM25Scorer {
    fn score(&self, wdf: TermCount, doc_length: u64, term: &TermWeightStats, collection: &CollectionStats) -> f64 {
        if wdf == 0 {
            return 0.0;
        }
        let tf = wdf as f64;
        let norm = 1.0 - self.b + self.b * collection.length_ratio(doc_length);

        // BM25 formula
        let numerator = idf(term.doc_freq, collection.doc_count) * tf * (self.k1 + 1.0);
        let denominator = tf + self.k1 * norm;

        collection.query_share(term.wqf) * numerator / denominator
    }

    fn max_score(&self, term: &TermWeightStats, collection: &CollectionStats) -> f64 {
        // tf / (tf + c) tends to 1 as tf grows
        collection.query_share(term.wqf) * idf(term.doc_freq, collection.doc_count) * (self.k1 + 1.0)
    }

    fn name(&self) -> &str {
        "bm25"
    }
}

/// Every match weighs zero; results come back in docid order.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoolScorer;

impl Scorer for BoolScorer {
    fn score(&self, _wdf: TermCount, _doc_length: u64, _term: &TermWeightStats, _collection: &CollectionStats) -> f64 {
        0.0
    }

    fn max_score(&self, _term: &TermWeightStats, _collection: &CollectionStats) -> f64 {
        0.0
    }

    fn name(&self) -> &str {
        "bool"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLLECTION: CollectionStats = CollectionStats { doc_count: 10, avg_doc_length: 5.0, query_length: 0 };

    fn term(doc_freq: u32) -> TermWeightStats {
        TermWeightStats { doc_freq, wqf: 1 }
    }

    #[test]
    fn rarer_terms_weigh_more() {
        let bm25 = BM25Scorer::default();
        let rare = bm25.score(1, 5, &term(1), &COLLECTION);
        let common = bm25.score(1, 5, &term(9), &COLLECTION);
        assert!(rare > common);
        assert!(common > 0.0);
    }

    #[test]
    fn shorter_documents_weigh_more() {
        let bm25 = BM25Scorer::default();
        assert!(bm25.score(1, 2, &term(3), &COLLECTION) > bm25.score(1, 20, &term(3), &COLLECTION));
    }

    #[test]
    fn score_never_exceeds_bound() {
        for scorer in [&BM25Scorer::default() as &dyn Scorer, &TfIdfScorer, &BoolScorer] {
            let bound = scorer.max_score(&term(2), &COLLECTION);
            for wdf in [1, 3, 50, 1000] {
                for len in [1u64, 5, 50, 5000] {
                    let s = scorer.score(wdf, len.max(wdf as u64), &term(2), &COLLECTION);
                    assert!(s <= bound + 1e-9, "{} {} {}", scorer.name(), wdf, len);
                }
            }
        }
    }

    #[test]
    fn longer_queries_share_the_weight() {
        let bm25 = BM25Scorer::default();
        let alone = CollectionStats { query_length: 1, ..COLLECTION };
        let shared = CollectionStats { query_length: 4, ..COLLECTION };
        let full = bm25.score(2, 5, &term(3), &alone);
        assert!((bm25.score(2, 5, &term(3), &shared) * 4.0 - full).abs() < 1e-9);
        assert_eq!(bm25.score(2, 5, &term(3), &COLLECTION), full);
    }

    #[test]
    fn boolean_postings_score_zero() {
        assert_eq!(BM25Scorer::default().score(0, 5, &term(1), &COLLECTION), 0.0);
    }
}
