use std::sync::Arc;
use tracing::debug;
use crate::core::database::Database;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocId, TermCount, ValueSlot};
use crate::index::state::IndexState;
use crate::query::ast::Query;
use crate::scoring::scorer::{BM25Scorer, Scorer};
use crate::search::matcher::{run_match, MatchOptions, Plan};
use crate::search::results::{DocidOrder, MSet, RankOrder, SortOrder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnquireState {
    Idle,
    QuerySet,
    /// Query compiled against a snapshot; no results handed out yet.
    Executed,
    ResultsAvailable,
}

/// Runs queries against a database and returns ranked result windows.
pub struct Enquire {
    database: Database,
    query: Option<Query>,
    state: EnquireState,
    snapshot: Option<Arc<IndexState>>,
    plan: Option<Plan>,
    options: MatchOptions,
}

impl Enquire {
    pub fn new(database: &Database) -> Self {
        Enquire {
            database: database.clone(),
            query: None,
            state: EnquireState::Idle,
            snapshot: None,
            plan: None,
            options: MatchOptions {
                scorer: Arc::new(BM25Scorer::default()),
                order: RankOrder::default(),
                collapse_key: None,
                percent_cutoff: 0,
                weight_cutoff: 0.0,
                check_at_most: None,
                query_length: 0,
            },
        }
    }

    /// Sets the query; `qlen` 0 means the sum of the query's wqfs. Term
    /// weights are scaled by their share of `qlen`.
    pub fn set_query(&mut self, query: Query, qlen: TermCount) {
        self.options.query_length = if qlen == 0 { query.length() } else { qlen };
        self.query = Some(query);
        self.plan = None;
        self.snapshot = None;
        self.state = EnquireState::QuerySet;
    }

    pub fn get_query(&self) -> Option<&Query> {
        self.query.as_ref()
    }

    pub fn get_qlen(&self) -> TermCount {
        self.options.query_length
    }

    pub fn state(&self) -> EnquireState {
        self.state
    }

    pub fn set_weighting_scheme(&mut self, scorer: impl Scorer + 'static) {
        self.options.scorer = Arc::new(scorer);
    }

    pub fn set_docid_order(&mut self, order: DocidOrder) {
        self.options.order.docid_order = order;
    }

    pub fn set_sort_by_relevance(&mut self) {
        self.options.order.sort = SortOrder::Relevance;
    }

    pub fn set_sort_by_value(&mut self, slot: ValueSlot, reverse: bool) {
        self.options.order.sort = SortOrder::Value { slot, reverse };
    }

    pub fn set_sort_by_value_then_relevance(&mut self, slot: ValueSlot, reverse: bool) {
        self.options.order.sort = SortOrder::ValueThenRelevance { slot, reverse };
    }

    /// At most one hit per distinct value in `slot`; `None` turns collapsing off.
    pub fn set_collapse_key(&mut self, slot: Option<ValueSlot>) {
        self.options.collapse_key = slot;
    }

    /// Drops hits scoring under `percent` of the best hit, or under `weight`.
    pub fn set_cutoff(&mut self, percent: u32, weight: f64) -> Result<()> {
        if percent > 100 {
            return Err(Error::invalid_argument(format!("Percent cutoff {} is over 100", percent)));
        }
        if !weight.is_finite() || weight < 0.0 {
            return Err(Error::invalid_argument(format!("Weight cutoff {} must be >= 0", weight)));
        }
        self.options.percent_cutoff = percent;
        self.options.weight_cutoff = weight;
        Ok(())
    }

    /// Stop after examining this many candidates; statistics become estimates.
    pub fn set_check_at_most(&mut self, limit: Option<usize>) {
        self.options.check_at_most = limit;
    }

    /// Compiles the query on first use, then returns ranks `[first, first + max_items)`.
    pub fn get_mset(&mut self, first: usize, max_items: usize) -> Result<MSet> {
        let Some(query) = self.query.as_ref() else {
            return Err(Error::new(ErrorKind::InvalidState, "get_mset called before set_query"));
        };
        if first.checked_add(max_items).is_none() {
            return Err(Error::new(ErrorKind::InvalidRange, "first + max_items overflows"));
        }

        if self.plan.is_none() {
            let snapshot = self.database.state()?;
            let plan = Plan::compile(query, &snapshot)?;
            debug!(query = %query, revision = snapshot.revision, "compiled query");
            self.plan = Some(plan);
            self.snapshot = Some(snapshot);
            self.state = EnquireState::Executed;
        }

        let (Some(plan), Some(snapshot)) = (self.plan.as_ref(), self.snapshot.as_ref()) else {
            return Err(Error::new(ErrorKind::InvalidState, "Query was not compiled"));
        };
        let mset = run_match(plan, snapshot, query.terms(), &self.options, first, max_items)?;
        self.state = EnquireState::ResultsAvailable;
        Ok(mset)
    }

    /// Query terms indexed by `docid`, in query order.
    pub fn get_matching_terms(&self, docid: DocId) -> Result<Vec<String>> {
        let Some(query) = self.query.as_ref() else {
            return Err(Error::new(ErrorKind::InvalidState, "No query set"));
        };
        let snapshot = match &self.snapshot {
            Some(snapshot) => Arc::clone(snapshot),
            None => self.database.state()?,
        };
        let doc = snapshot.store.get(docid)?;
        Ok(query.terms().into_iter().filter(|t| doc.term(t).is_some()).collect())
    }

    pub fn description(&self) -> String {
        match &self.query {
            Some(query) => format!("Enquire({}, {})", query.description(), self.options.scorer.name()),
            None => format!("Enquire(<no query>, {})", self.options.scorer.name()),
        }
    }
}
