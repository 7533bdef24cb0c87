use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocCount, DocId, TermCount, ValueSlot};
use crate::index::doc_store::DocumentStore;
use crate::index::posting::PostingList;
use crate::index::state::IndexState;
use crate::query::ast::Query;
use crate::scoring::scorer::{CollectionStats, Scorer, TermWeightStats};
use crate::search::postlist::{
    AndMaybePostList, AndNotPostList, AndPostList, BoxedPostList, DocListPostList, EmptyPostList,
    OrPostList, PositionalPostList, ScalePostList, TermPostList, XorPostList,
};
use crate::search::results::{Candidate, MSet, MSetItem, RankOrder, TopKCollector};

/// A query resolved against one snapshot: terms bound to their posting
/// lists, wildcards expanded, value ranges evaluated. Built once per query
/// and reused for every result window.
#[derive(Debug, Clone)]
pub enum Plan {
    Nothing,
    Docs(Vec<DocId>),
    Term { list: Arc<PostingList>, stats: TermWeightStats },
    And(Vec<Plan>),
    Or(Vec<Plan>),
    Xor(Vec<Plan>),
    AndNot(Box<Plan>, Box<Plan>),
    AndMaybe(Box<Plan>, Box<Plan>),
    Filter(Box<Plan>, Box<Plan>),
    Positional { terms: Vec<(Arc<PostingList>, TermWeightStats)>, window: u32, ordered: bool },
    Scale(Box<Plan>, f64),
}

impl Plan {
    pub fn compile(query: &Query, state: &IndexState) -> Result<Plan> {
        let plan = match query {
            Query::MatchNothing => Plan::Nothing,
            Query::MatchAll => docs(state.store.live().iter().map(DocId).collect()),
            Query::Term(t) => term_plan(state, &t.term, t.wqf),
            Query::And(children) => {
                let plans = compile_all(children, state)?;
                if plans.is_empty() || plans.iter().any(|p| matches!(p, Plan::Nothing)) {
                    Plan::Nothing
                } else {
                    Plan::And(plans)
                }
            }
            Query::Or(children) => any_of(compile_all(children, state)?, Plan::Or),
            Query::Xor(children) => any_of(compile_all(children, state)?, Plan::Xor),
            Query::AndNot(left, right) => match (Plan::compile(left, state)?, Plan::compile(right, state)?) {
                (Plan::Nothing, _) => Plan::Nothing,
                (left, Plan::Nothing) => left,
                (left, right) => Plan::AndNot(Box::new(left), Box::new(right)),
            },
            Query::AndMaybe(left, right) => match (Plan::compile(left, state)?, Plan::compile(right, state)?) {
                (Plan::Nothing, _) => Plan::Nothing,
                (left, Plan::Nothing) => left,
                (left, right) => Plan::AndMaybe(Box::new(left), Box::new(right)),
            },
            Query::Filter(left, right) => match (Plan::compile(left, state)?, Plan::compile(right, state)?) {
                (Plan::Nothing, _) | (_, Plan::Nothing) => Plan::Nothing,
                (left, right) => Plan::Filter(Box::new(left), Box::new(right)),
            },
            Query::Phrase(p) => positional_plan(state, &p.terms, p.effective_window(), true),
            Query::Near(p) => positional_plan(state, &p.terms, p.effective_window(), false),
            Query::ScaleWeight(inner, factor) => match Plan::compile(inner, state)? {
                Plan::Nothing => Plan::Nothing,
                inner => Plan::Scale(Box::new(inner), *factor),
            },
            Query::Wildcard(w) => {
                let terms: Vec<&str> = state.dictionary.prefixed(&w.prefix).map(|(term, _)| term).collect();
                if w.max_expansion > 0 && terms.len() > w.max_expansion as usize {
                    return Err(Error::invalid_argument(format!(
                        "Wildcard {}* expands to {} terms, more than the limit of {}",
                        w.prefix,
                        terms.len(),
                        w.max_expansion
                    )));
                }
                debug!(prefix = %w.prefix, terms = terms.len(), "expanded wildcard");
                any_of(terms.into_iter().map(|term| term_plan(state, term, 1)).collect(), Plan::Or)
            }
            Query::ValueRange { slot, begin, end } => {
                value_plan(&state.store, *slot, |v| begin.as_str() <= v && v <= end.as_str())
            }
            Query::ValueGe { slot, limit } => value_plan(&state.store, *slot, |v| v >= limit.as_str()),
            Query::ValueLe { slot, limit } => value_plan(&state.store, *slot, |v| v <= limit.as_str()),
        };
        Ok(plan)
    }

    /// Opens a fresh set of cursors over this plan.
    pub fn open<'p>(&'p self, ctx: &CursorContext<'p>) -> BoxedPostList<'p> {
        match self {
            Plan::Nothing => Box::new(EmptyPostList),
            Plan::Docs(ids) => Box::new(DocListPostList::new(ids)),
            Plan::Term { list, stats } => Box::new(ctx.term(list, *stats)),
            Plan::And(children) => Box::new(AndPostList::new(open_all(children, ctx))),
            Plan::Or(children) => Box::new(OrPostList::new(open_all(children, ctx))),
            Plan::Xor(children) => Box::new(XorPostList::new(open_all(children, ctx))),
            Plan::AndNot(l, r) => Box::new(AndNotPostList::new(l.open(ctx), r.open(ctx))),
            Plan::AndMaybe(l, r) => Box::new(AndMaybePostList::new(l.open(ctx), r.open(ctx))),
            Plan::Filter(l, r) => Box::new(AndPostList::filter(l.open(ctx), r.open(ctx))),
            Plan::Positional { terms, window, ordered } => {
                let cursors = terms.iter().map(|(list, stats)| ctx.term(list, *stats)).collect();
                Box::new(PositionalPostList::new(cursors, *window, *ordered))
            }
            Plan::Scale(inner, factor) => Box::new(ScalePostList::new(inner.open(ctx), *factor)),
        }
    }
}

fn docs(ids: Vec<DocId>) -> Plan {
    if ids.is_empty() { Plan::Nothing } else { Plan::Docs(ids) }
}

fn compile_all(children: &[Query], state: &IndexState) -> Result<Vec<Plan>> {
    children.iter().map(|q| Plan::compile(q, state)).collect()
}

fn any_of(plans: Vec<Plan>, make: fn(Vec<Plan>) -> Plan) -> Plan {
    let mut plans: Vec<Plan> = plans.into_iter().filter(|p| !matches!(p, Plan::Nothing)).collect();
    match plans.len() {
        0 => Plan::Nothing,
        1 => plans.remove(0),
        _ => make(plans),
    }
}

fn term_plan(state: &IndexState, term: &str, wqf: u32) -> Plan {
    match state.dictionary.shared(term) {
        Some(list) => {
            let stats = TermWeightStats { doc_freq: list.doc_freq(), wqf };
            Plan::Term { list, stats }
        }
        None => Plan::Nothing,
    }
}

fn positional_plan(state: &IndexState, terms: &[String], window: u32, ordered: bool) -> Plan {
    if terms.len() == 1 {
        return term_plan(state, &terms[0], 1);
    }
    let mut resolved = Vec::with_capacity(terms.len());
    for term in terms {
        match state.dictionary.shared(term) {
            Some(list) => {
                let stats = TermWeightStats { doc_freq: list.doc_freq(), wqf: 1 };
                resolved.push((list, stats));
            }
            None => return Plan::Nothing,
        }
    }
    if resolved.is_empty() {
        return Plan::Nothing;
    }
    Plan::Positional { terms: resolved, window, ordered }
}

fn value_plan(store: &DocumentStore, slot: ValueSlot, accept: impl Fn(&str) -> bool) -> Plan {
    let ids = store
        .value_stream(slot)
        .map(|stream| stream.iter().filter(|(_, v)| accept(v.as_str())).map(|(id, _)| *id).collect())
        .unwrap_or_default();
    docs(ids)
}

fn open_all<'p>(children: &'p [Plan], ctx: &CursorContext<'p>) -> Vec<BoxedPostList<'p>> {
    children.iter().map(|child| child.open(ctx)).collect()
}

/// Everything a cursor needs to weigh documents.
pub struct CursorContext<'p> {
    pub scorer: &'p dyn Scorer,
    pub collection: CollectionStats,
    pub store: &'p DocumentStore,
}

impl<'p> CursorContext<'p> {
    fn term(&self, list: &'p PostingList, stats: TermWeightStats) -> TermPostList<'p> {
        TermPostList::new(list, stats, self.scorer, self.collection, self.store)
    }
}

/// Knobs `Enquire` passes down to a match run.
#[derive(Clone)]
pub struct MatchOptions {
    pub scorer: Arc<dyn Scorer>,
    pub order: RankOrder,
    pub collapse_key: Option<ValueSlot>,
    pub percent_cutoff: u32,
    pub weight_cutoff: f64,
    pub check_at_most: Option<usize>,
    /// Handed to the scorer; 0 leaves term weights unnormalised.
    pub query_length: TermCount,
}

fn percent(weight: f64, max_attained: f64) -> u32 {
    if max_attained <= 0.0 {
        return 100;
    }
    ((weight / max_attained) * 100.0).round().clamp(0.0, 100.0) as u32
}

/// Collapses hits by key and feeds the survivors to the top-K heap.
struct Funnel {
    collector: TopKCollector,
    collapsed: HashMap<String, Candidate>,
    matched: DocCount,
}

impl Funnel {
    fn new(k: usize) -> Self {
        Funnel { collector: TopKCollector::new(k), collapsed: HashMap::new(), matched: 0 }
    }

    fn admit(&mut self, candidate: Candidate, key: Option<String>) {
        let Some(key) = key else {
            self.matched += 1;
            self.collector.collect(candidate);
            return;
        };
        match self.collapsed.entry(key) {
            Entry::Vacant(entry) => {
                let key = entry.key().clone();
                entry.insert(Candidate { collapse_key: Some(key), collapse_count: 0, ..candidate });
            }
            Entry::Occupied(mut entry) => {
                let slot = entry.get_mut();
                slot.collapse_count += 1;
                if candidate < *slot {
                    let (key, count) = (slot.collapse_key.take(), slot.collapse_count);
                    *slot = Candidate { collapse_key: key, collapse_count: count, ..candidate };
                }
            }
        }
    }

    /// Best first, with the number of distinct hits admitted.
    fn finish(mut self) -> (Vec<Candidate>, DocCount) {
        for (_, winner) in self.collapsed.drain() {
            self.matched += 1;
            self.collector.collect(winner);
        }
        (self.collector.into_sorted(), self.matched)
    }
}

/// Runs `plan` against `state` and returns ranks `[first, first + max_items)`.
pub fn run_match(
    plan: &Plan,
    state: &Arc<IndexState>,
    terms: Vec<String>,
    options: &MatchOptions,
    first: usize,
    max_items: usize,
) -> Result<MSet> {
    let wanted = first
        .checked_add(max_items)
        .ok_or_else(|| Error::new(ErrorKind::InvalidRange, "first + max_items overflows"))?;

    let ctx = CursorContext {
        scorer: options.scorer.as_ref(),
        collection: CollectionStats {
            doc_count: state.doc_count(),
            avg_doc_length: state.avlength(),
            query_length: options.query_length,
        },
        store: &state.store,
    };
    let mut root = plan.open(&ctx);
    let max_possible = root.max_weight();

    let mut funnel = Funnel::new(wanted);
    // Hits held back until the best weight is known.
    let mut deferred: Vec<(Candidate, Option<String>)> = Vec::new();
    let mut examined = 0usize;
    let mut max_attained = 0.0f64;
    let mut exhausted = false;

    while options.check_at_most.is_none_or(|limit| examined < limit) {
        let Some(docid) = root.advance() else {
            exhausted = true;
            break;
        };
        examined += 1;

        let weight = root.weight();
        if weight < options.weight_cutoff {
            continue;
        }
        max_attained = max_attained.max(weight);

        let value = |slot: ValueSlot| {
            state.store.value_stream(slot).and_then(|stream| stream.get(&docid)).cloned()
        };
        let candidate = Candidate {
            docid,
            weight,
            sort_key: options.order.sort.slot().map(|slot| value(slot).unwrap_or_default()),
            collapse_key: None,
            collapse_count: 0,
            order: options.order,
        };
        let key = options.collapse_key.and_then(|slot| value(slot));

        if options.percent_cutoff > 0 {
            deferred.push((candidate, key));
        } else {
            funnel.admit(candidate, key);
        }
    }

    if options.percent_cutoff > 0 {
        let threshold = max_attained * options.percent_cutoff as f64 / 100.0;
        for (candidate, key) in deferred {
            if candidate.weight >= threshold {
                funnel.admit(candidate, key);
            }
        }
    }
    let (ranked, matched) = funnel.finish();

    let (lower, estimated, upper) = if exhausted {
        (matched, matched, matched)
    } else {
        let upper = (root.estimate().min(state.doc_count()) as DocCount).max(matched);
        let estimated = if examined == 0 {
            matched
        } else {
            let scaled = upper as f64 * matched as f64 / examined as f64;
            (scaled.round() as DocCount).clamp(matched, upper)
        };
        (matched, estimated, upper)
    };

    let items: Vec<MSetItem> = ranked
        .into_iter()
        .enumerate()
        .skip(first)
        .take(max_items)
        .map(|(rank, c)| MSetItem {
            docid: c.docid,
            weight: c.weight,
            rank,
            percent: percent(c.weight, max_attained),
            collapse_key: c.collapse_key,
            collapse_count: c.collapse_count,
            sort_key: c.sort_key,
        })
        .collect();

    debug!(examined, matched, returned = items.len(), exhausted, "match complete");

    Ok(MSet {
        items,
        firstitem: first,
        matches_lower_bound: lower,
        matches_estimated: estimated,
        matches_upper_bound: upper,
        max_possible,
        max_attained,
        terms,
        state: Arc::clone(state),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document::Document;
    use crate::scoring::scorer::BM25Scorer;
    use crate::search::results::{DocidOrder, SortOrder};

    fn state() -> Arc<IndexState> {
        let mut state = IndexState::new();
        let texts = ["the quick fox", "the slow fox runs", "a quick dog", "slow dog slow"];
        for (i, text) in texts.iter().enumerate() {
            let mut doc = Document::new();
            for (pos, word) in text.split(' ').enumerate() {
                doc.add_posting(word, pos as u32 + 1, 1).unwrap();
            }
            doc.add_value(0, if i % 2 == 0 { "even" } else { "odd" });
            doc.add_value(1, format!("{}", 9 - i));
            state.replace_document(DocId(i as u32 + 1), doc);
        }
        Arc::new(state)
    }

    fn options() -> MatchOptions {
        MatchOptions {
            scorer: Arc::new(BM25Scorer::default()),
            order: RankOrder::default(),
            collapse_key: None,
            percent_cutoff: 0,
            weight_cutoff: 0.0,
            check_at_most: None,
            query_length: 0,
        }
    }

    fn search(query: &Query, options: &MatchOptions, first: usize, max: usize) -> MSet {
        let state = state();
        let plan = Plan::compile(query, &state).unwrap();
        run_match(&plan, &state, query.terms(), options, first, max).unwrap()
    }

    fn ids(mset: &MSet) -> Vec<u32> {
        mset.docids().iter().map(|d| d.0).collect()
    }

    #[test]
    fn missing_terms_compile_to_nothing() {
        let state = state();
        let q = Query::and([Query::term("fox"), Query::term("zebra")]);
        assert!(matches!(Plan::compile(&q, &state).unwrap(), Plan::Nothing));
        let q = Query::or([Query::term("fox"), Query::term("zebra")]);
        assert!(matches!(Plan::compile(&q, &state).unwrap(), Plan::Term { .. }));
    }

    #[test]
    fn matches_and_statistics() {
        let mset = search(&Query::term("fox"), &options(), 0, 10);
        assert_eq!(mset.size(), 2);
        assert_eq!(mset.get_matches_estimated(), 2);
        assert_eq!(mset.items()[0].percent, 100);
        assert!(mset.get_max_possible() >= mset.get_max_attained());
    }

    #[test]
    fn pages_concatenate() {
        let q = Query::or([Query::term("quick"), Query::term("slow"), Query::term("dog")]);
        let all = ids(&search(&q, &options(), 0, 4));
        let mut paged = ids(&search(&q, &options(), 0, 2));
        paged.extend(ids(&search(&q, &options(), 2, 2)));
        assert_eq!(all, paged);
    }

    #[test]
    fn phrase_and_wildcard() {
        assert_eq!(ids(&search(&Query::phrase(["quick", "fox"], None), &options(), 0, 10)), vec![1]);
        assert_eq!(ids(&search(&Query::phrase(["fox", "quick"], None), &options(), 0, 10)), Vec::<u32>::new());

        let mset = search(&Query::wildcard("s", 0), &options(), 0, 10);
        assert_eq!(mset.get_matches_estimated(), 2);

        let state = state();
        let err = Plan::compile(&Query::wildcard("", 2), &state).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn near_with_a_repeated_term() {
        assert_eq!(ids(&search(&Query::near(["slow", "slow"], Some(3)), &options(), 0, 10)), vec![4]);
        assert!(search(&Query::near(["fox", "fox"], Some(5)), &options(), 0, 10).is_empty());
    }

    #[test]
    fn percent_cutoff_applies_before_value_sort_window() {
        let mut opts = options();
        opts.order = RankOrder { sort: SortOrder::Value { slot: 1, reverse: true }, docid_order: DocidOrder::Ascending };
        opts.percent_cutoff = 90;
        // doc 2 sorts first but scores well under doc 4
        let q = Query::term("slow");
        assert_eq!(ids(&search(&q, &opts, 0, 1)), vec![4]);
        assert_eq!(ids(&search(&q, &opts, 0, 10)), vec![4]);
        assert!(search(&q, &opts, 1, 1).is_empty());
        assert_eq!(search(&q, &opts, 0, 1).get_matches_estimated(), 1);
    }

    #[test]
    fn value_ranges_and_sorting() {
        let q = Query::value_range(1, "7", "8");
        assert_eq!(ids(&search(&q, &options(), 0, 10)), vec![2, 3]);

        let mut opts = options();
        opts.order = RankOrder { sort: SortOrder::Value { slot: 1, reverse: false }, docid_order: DocidOrder::Ascending };
        assert_eq!(ids(&search(&Query::MatchAll, &opts, 0, 10)), vec![4, 3, 2, 1]);
    }

    #[test]
    fn collapse_keeps_one_per_key() {
        let mut opts = options();
        opts.collapse_key = Some(0);
        let mset = search(&Query::MatchAll, &opts, 0, 10);
        assert_eq!(mset.size(), 2);
        assert!(mset.items().iter().all(|item| item.collapse_count == 1));
        assert_eq!(ids(&mset), vec![1, 2]);
    }

    #[test]
    fn check_at_most_stops_early() {
        let mut opts = options();
        opts.check_at_most = Some(1);
        let mset = search(&Query::MatchAll, &opts, 0, 10);
        assert_eq!(mset.size(), 1);
        assert_eq!(mset.get_matches_lower_bound(), 1);
        assert_eq!(mset.get_matches_upper_bound(), 4);
    }

    #[test]
    fn window_overflow_is_invalid_range() {
        let state = state();
        let err = run_match(&Plan::Nothing, &state, Vec::new(), &options(), usize::MAX, 1).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRange);
    }
}
