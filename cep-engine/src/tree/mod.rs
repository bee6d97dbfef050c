//! Live evaluation trees
//!
//! A [`Tree`] instantiates a [`TreePlan`] against a [`Pattern`]. Every positive
//! leaf and every join of the plan becomes a node in a flat arena; each node
//! stores the partial matches it has produced so far. A new event enters at
//! its leaf, is joined upwards against the sibling stores, and full matches
//! reaching the root are checked against the negated occurrences before they
//! are released.
//!
//! Expiry is continuous: whenever the tree clock moves forward, every store
//! drops the partial matches whose oldest event left the window.

mod storage;

use crate::config::TreeStorageParameters;
use crate::pattern::{NegationBounds, Pattern};
use crate::plan::{TreePlan, TreePlanNode};
use crate::types::{MatchedEvent, PatternMatch, Result, SharedEvent, Timestamp};
use itertools::Itertools;
use std::collections::VecDeque;
use std::sync::Arc;
use storage::{PartialMatch, PartialMatchStore};

/// A leaf of a live tree, bound to one primitive occurrence
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    index: usize,
    name: Arc<str>,
    event_type: Arc<str>,
    negated: bool,
}

impl Leaf {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn event_type(&self) -> &Arc<str> {
        &self.event_type
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }
}

#[derive(Debug, Clone, Copy)]
enum NodeKind {
    Leaf,
    Join { left: usize, right: usize },
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    parent: Option<usize>,
    /// Positive leaves covered by this node, sorted
    leaves: Vec<usize>,
    /// Ordering pairs with one side under each child
    ordering: Vec<(usize, usize)>,
    /// Conditions first fully covered at this node
    conditions: Vec<usize>,
    store: PartialMatchStore,
}

impl Node {
    fn new(kind: NodeKind, leaves: Vec<usize>, capacity: Option<usize>) -> Self {
        Self {
            kind,
            parent: None,
            leaves,
            ordering: Vec::new(),
            conditions: Vec::new(),
            store: PartialMatchStore::new(capacity),
        }
    }

    fn covers(&self, leaf: usize) -> bool {
        self.leaves.binary_search(&leaf).is_ok()
    }
}

/// Buffered events of one negated occurrence
#[derive(Debug)]
struct NegationFilter {
    leaf: usize,
    bounds: NegationBounds,
    /// Conditions on the negated event alone
    local_conditions: Vec<usize>,
    /// Conditions linking the negated event to positive ones
    conditions: Vec<usize>,
    buffer: PartialMatchStore,
}

/// A live instantiation of a tree plan
#[derive(Debug)]
pub struct Tree {
    pattern: Arc<Pattern>,
    plan: TreePlan,
    leaves: Vec<Leaf>,
    nodes: Vec<Node>,
    leaf_nodes: Vec<usize>,
    leaf_conditions: Vec<Vec<usize>>,
    root: usize,
    negations: Vec<NegationFilter>,
    /// Full matches waiting for a trailing negation to expire
    pending: Vec<PartialMatch>,
    ready: VecDeque<PatternMatch>,
    clock: Option<Timestamp>,
}

impl Tree {
    /// Build the node graph for `plan`
    pub fn instantiate(
        plan: TreePlan,
        pattern: Arc<Pattern>,
        storage: &TreeStorageParameters,
    ) -> Result<Tree> {
        let positive_count = pattern.positive_events().len();
        plan.validate(positive_count)?;

        let capacity = storage.max_partial_matches;
        let mut nodes = Vec::new();
        let mut leaf_nodes = vec![0; positive_count];
        let root = add_node(plan.root(), &mut nodes, &mut leaf_nodes, capacity);

        for node in 0..nodes.len() {
            if let NodeKind::Join { left, right } = nodes[node].kind {
                let ordering = pattern
                    .ordering()
                    .iter()
                    .copied()
                    .filter(|(a, b)| {
                        (nodes[left].covers(*a) && nodes[right].covers(*b))
                            || (nodes[right].covers(*a) && nodes[left].covers(*b))
                    })
                    .collect();
                nodes[node].ordering = ordering;
            }
        }

        let mut leaf_conditions = vec![Vec::new(); positive_count];
        let mut negations: Vec<NegationFilter> = pattern
            .negated_events()
            .iter()
            .map(|negated| NegationFilter {
                leaf: negated.index,
                bounds: negated.negation.clone().unwrap_or_default(),
                local_conditions: Vec::new(),
                conditions: Vec::new(),
                buffer: PartialMatchStore::new(None),
            })
            .collect();

        for (index, condition) in pattern.conditions().iter().enumerate() {
            let referenced = condition.leaves();
            if let Some(negated) = referenced.iter().find(|leaf| **leaf >= positive_count) {
                let filter = &mut negations[*negated - positive_count];
                if referenced.len() == 1 {
                    filter.local_conditions.push(index);
                } else {
                    filter.conditions.push(index);
                }
            } else if let [leaf] = referenced {
                leaf_conditions[*leaf].push(index);
            } else if let Some(node) = (0..nodes.len()).find(|node| {
                let covered = |n: usize| condition.is_covered_by(&nodes[n].leaves);
                match nodes[*node].kind {
                    NodeKind::Join { left, right } => {
                        covered(*node) && !covered(left) && !covered(right)
                    }
                    NodeKind::Leaf => false,
                }
            }) {
                nodes[node].conditions.push(index);
            }
        }

        let leaves = pattern
            .primitives()
            .iter()
            .map(|primitive| Leaf {
                index: primitive.index,
                name: Arc::clone(&primitive.name),
                event_type: Arc::clone(&primitive.event_type),
                negated: primitive.index >= positive_count,
            })
            .collect();

        log::debug!("Instantiated tree {}", plan.describe(&pattern));

        Ok(Tree {
            pattern,
            plan,
            leaves,
            nodes,
            leaf_nodes,
            leaf_conditions,
            root,
            negations,
            pending: Vec::new(),
            ready: VecDeque::new(),
            clock: None,
        })
    }

    /// All leaves, positive first, indexed by leaf index
    pub fn leaves(&self) -> &[Leaf] {
        &self.leaves
    }

    pub fn leaf(&self, index: usize) -> Option<&Leaf> {
        self.leaves.get(index)
    }

    pub fn plan(&self) -> &TreePlan {
        &self.plan
    }

    pub fn pattern(&self) -> &Arc<Pattern> {
        &self.pattern
    }

    /// Short description of the tree shape
    pub fn structure_summary(&self) -> String {
        let mut summary = self.plan.describe(&self.pattern);
        for filter in &self.negations {
            summary.push_str(&format!(" NOT({})", self.leaves[filter.leaf].name));
        }
        summary
    }

    /// Partial matches dropped because a node store was full
    pub fn evicted_count(&self) -> u64 {
        self.nodes.iter().map(|n| n.store.evicted()).sum()
    }

    /// Number of partial matches held across all nodes and negation buffers
    pub fn partial_match_count(&self) -> usize {
        self.nodes.iter().map(|n| n.store.len()).sum::<usize>()
            + self.negations.iter().map(|n| n.buffer.len()).sum::<usize>()
    }

    /// Deliver an event to one leaf
    ///
    /// Unknown leaf indices are ignored.
    pub fn handle_event(&mut self, leaf: usize, event: SharedEvent) {
        self.advance_clock(event.timestamp);
        let positive_count = self.leaf_nodes.len();
        if leaf < positive_count {
            self.handle_positive(leaf, event);
        } else if leaf < self.leaves.len() {
            self.handle_negated(leaf - positive_count, event);
        }
    }

    /// Move the tree clock forward, releasing due matches and purging expired state
    pub fn advance_clock(&mut self, now: Timestamp) {
        if self.clock.is_some_and(|clock| clock >= now) {
            return;
        }
        self.clock = Some(now);

        let window = self.pattern.window();
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|pm| now - pm.first() > window);
        self.pending = waiting;
        for pm in due {
            self.emit(&pm);
        }

        let Some(horizon) = now.checked_sub_signed(window) else {
            return;
        };
        let mut purged = 0;
        for node in &mut self.nodes {
            purged += node.store.purge_older_than(horizon);
        }
        for filter in &mut self.negations {
            purged += filter.buffer.purge_older_than(horizon);
        }
        if purged > 0 {
            log::trace!("Purged {} expired partial matches", purged);
        }
    }

    /// Newly completed matches since the previous call
    pub fn get_matches(&mut self) -> impl Iterator<Item = PatternMatch> + '_ {
        self.ready.drain(..)
    }

    /// Release every pending match, then drain
    ///
    /// Used at end of input: a trailing negation can no longer be violated.
    pub fn get_last_matches(&mut self) -> impl Iterator<Item = PatternMatch> + '_ {
        for pm in std::mem::take(&mut self.pending) {
            self.emit(&pm);
        }
        self.ready.drain(..)
    }

    /// Drop completed matches without reporting them
    pub fn discard_ready(&mut self) -> usize {
        let discarded = self.ready.len();
        self.ready.clear();
        discarded
    }

    /// Every buffered leaf event as `(leaf, event)`, in stream order
    ///
    /// Each leaf buffer is already ordered, so this is a k-way merge.
    pub fn buffered_events(&self) -> Vec<(usize, SharedEvent)> {
        self.leaves
            .iter()
            .map(|leaf| {
                let index = leaf.index;
                self.leaf_buffer(index)
                    .into_iter()
                    .flat_map(|store| store.iter())
                    .filter_map(move |pm| pm.single_event().map(|e| (index, Arc::clone(e))))
            })
            .kmerge_by(|a, b| (a.1.order_key(), a.0) < (b.1.order_key(), b.0))
            .collect()
    }

    fn leaf_buffer(&self, leaf: usize) -> Option<&PartialMatchStore> {
        match self.leaf_nodes.get(leaf) {
            Some(node) => Some(&self.nodes[*node].store),
            None => self
                .negations
                .get(leaf - self.leaf_nodes.len())
                .map(|filter| &filter.buffer),
        }
    }

    fn handle_positive(&mut self, leaf: usize, event: SharedEvent) {
        let conditions = self.pattern.conditions();
        let accepted = self.leaf_conditions[leaf]
            .iter()
            .all(|c| conditions[*c].holds(|l| (l == leaf).then_some(event.as_ref())));
        if !accepted {
            return;
        }

        let pm = PartialMatch::single(leaf, event);
        let node = self.leaf_nodes[leaf];
        self.nodes[node].store.insert(pm.clone());
        self.propagate(node, pm);
    }

    fn handle_negated(&mut self, position: usize, event: SharedEvent) {
        let pattern = Arc::clone(&self.pattern);
        let filter = &mut self.negations[position];
        let leaf = filter.leaf;
        let accepted = filter.local_conditions.iter().all(|c| {
            pattern.conditions()[*c].holds(|l| (l == leaf).then_some(event.as_ref()))
        });
        if !accepted {
            return;
        }

        filter.buffer.insert(PartialMatch::single(leaf, Arc::clone(&event)));
        let before = self.pending.len();
        let filter = &self.negations[position];
        self.pending.retain(|pm| !violates(&pattern, filter, &event, pm));
        if self.pending.len() < before {
            log::debug!(
                "{} pending match(es) invalidated by {}",
                before - self.pending.len(),
                event
            );
        }
    }

    fn propagate(&mut self, node: usize, pm: PartialMatch) {
        if node == self.root {
            self.complete(pm);
            return;
        }
        let Some(parent) = self.nodes[node].parent else {
            return;
        };
        let NodeKind::Join { left, right } = self.nodes[parent].kind else {
            return;
        };
        let (sibling, from_left) = if left == node {
            (right, true)
        } else {
            (left, false)
        };

        let joined: Vec<PartialMatch> = self.nodes[sibling]
            .store
            .iter()
            .filter_map(|other| {
                let (l, r) = if from_left { (&pm, other) } else { (other, &pm) };
                try_join(&self.pattern, &self.nodes[parent], l, r)
            })
            .collect();

        for merged in joined {
            if parent != self.root {
                self.nodes[parent].store.insert(merged.clone());
            }
            self.propagate(parent, merged);
        }
    }

    fn complete(&mut self, pm: PartialMatch) {
        let violated = self.negations.iter().any(|filter| {
            filter
                .buffer
                .iter()
                .filter_map(PartialMatch::single_event)
                .any(|negative| violates(&self.pattern, filter, negative, &pm))
        });
        if violated {
            return;
        }

        let trailing = self
            .negations
            .iter()
            .any(|filter| filter.bounds.following.is_empty());
        if trailing {
            self.pending.push(pm);
        } else {
            self.emit(&pm);
        }
    }

    fn emit(&mut self, pm: &PartialMatch) {
        let events = pm
            .bindings()
            .iter()
            .map(|(leaf, event)| MatchedEvent {
                name: Arc::clone(&self.leaves[*leaf].name),
                event: Arc::clone(event),
            })
            .collect();
        if let Some(complete) = PatternMatch::new(events) {
            self.ready.push_back(complete);
        }
    }
}

fn add_node(
    plan: &TreePlanNode,
    nodes: &mut Vec<Node>,
    leaf_nodes: &mut [usize],
    capacity: Option<usize>,
) -> usize {
    match plan {
        TreePlanNode::Leaf(leaf) => {
            let id = nodes.len();
            nodes.push(Node::new(NodeKind::Leaf, vec![*leaf], capacity));
            leaf_nodes[*leaf] = id;
            id
        }
        TreePlanNode::Join(left, right) => {
            let left = add_node(left, nodes, leaf_nodes, capacity);
            let right = add_node(right, nodes, leaf_nodes, capacity);
            let mut leaves: Vec<usize> = nodes[left]
                .leaves
                .iter()
                .chain(&nodes[right].leaves)
                .copied()
                .collect();
            leaves.sort_unstable();

            let id = nodes.len();
            nodes.push(Node::new(NodeKind::Join { left, right }, leaves, capacity));
            nodes[left].parent = Some(id);
            nodes[right].parent = Some(id);
            id
        }
    }
}

fn try_join(
    pattern: &Pattern,
    node: &Node,
    left: &PartialMatch,
    right: &PartialMatch,
) -> Option<PartialMatch> {
    if left.shares_event_with(right) {
        return None;
    }
    let first = left.first().min(right.first());
    let last = left.last().max(right.last());
    if last - first > pattern.window() {
        return None;
    }

    let lookup = |leaf: usize| left.event(leaf).or_else(|| right.event(leaf));
    let ordered = node.ordering.iter().all(|(a, b)| match (lookup(*a), lookup(*b)) {
        (Some(a), Some(b)) => a.precedes(b),
        _ => false,
    });
    if !ordered {
        return None;
    }

    let merged = left.merge(right);
    let conditions = pattern.conditions();
    node.conditions
        .iter()
        .all(|c| conditions[*c].holds(|leaf| merged.event(leaf).map(|e| e.as_ref())))
        .then_some(merged)
}

/// True if `negative` invalidates the full match `pm`
fn violates(
    pattern: &Pattern,
    filter: &NegationFilter,
    negative: &SharedEvent,
    pm: &PartialMatch,
) -> bool {
    let first = pm.first().min(negative.timestamp);
    let last = pm.last().max(negative.timestamp);
    if last - first > pattern.window() {
        return false;
    }

    let after_preceding = filter
        .bounds
        .preceding
        .iter()
        .all(|leaf| pm.event(*leaf).is_some_and(|e| e.precedes(negative)));
    let before_following = filter
        .bounds
        .following
        .iter()
        .all(|leaf| pm.event(*leaf).is_some_and(|e| negative.precedes(e)));
    if !(after_preceding && before_following) {
        return false;
    }

    let conditions = pattern.conditions();
    filter.conditions.iter().all(|c| {
        conditions[*c].holds(|leaf| {
            if leaf == filter.leaf {
                Some(negative.as_ref())
            } else {
                pm.event(leaf).map(|e| e.as_ref())
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{CompareOp, Condition, Operand, PatternStructure};
    use crate::types::{Event, Payload};
    use chrono::{DateTime, Duration};
    use serde_json::json;

    fn event(id: u64, event_type: &str, secs: i64, value: i64) -> SharedEvent {
        let mut payload = Payload::new();
        payload.insert("value".to_string(), json!(value));
        Arc::new(Event::new(
            id,
            event_type,
            payload,
            DateTime::from_timestamp(secs, 0).unwrap(),
        ))
    }

    fn seq_ab(window: i64) -> Arc<Pattern> {
        let structure = PatternStructure::seq(vec![
            PatternStructure::primitive("A", "a"),
            PatternStructure::primitive("B", "b"),
        ]);
        Arc::new(Pattern::new(structure, Vec::new(), Duration::seconds(window)).unwrap())
    }

    fn tree(pattern: &Arc<Pattern>, order: &[usize]) -> Tree {
        let plan = TreePlan::left_deep(order).unwrap();
        Tree::instantiate(plan, Arc::clone(pattern), &TreeStorageParameters::default()).unwrap()
    }

    fn ids(tree: &mut Tree) -> Vec<Vec<u64>> {
        tree.get_matches().map(|m| m.event_ids()).collect()
    }

    #[test]
    fn test_sequence_match_within_window() {
        let pattern = seq_ab(10);
        let mut tree = tree(&pattern, &[0, 1]);
        tree.handle_event(0, event(1, "A", 0, 0));
        tree.handle_event(1, event(2, "B", 5, 0));
        assert_eq!(ids(&mut tree), vec![vec![1, 2]]);
        assert!(ids(&mut tree).is_empty());
    }

    #[test]
    fn test_sequence_order_is_enforced() {
        let pattern = seq_ab(10);
        let mut tree = tree(&pattern, &[1, 0]);
        tree.handle_event(1, event(1, "B", 0, 0));
        tree.handle_event(0, event(2, "A", 1, 0));
        assert!(ids(&mut tree).is_empty());

        tree.handle_event(1, event(3, "B", 2, 0));
        assert_eq!(ids(&mut tree), vec![vec![2, 3]]);
    }

    #[test]
    fn test_window_boundary() {
        let pattern = seq_ab(10);
        let mut tree = tree(&pattern, &[0, 1]);
        tree.handle_event(0, event(1, "A", 0, 0));
        tree.handle_event(1, event(2, "B", 10, 0));
        assert_eq!(ids(&mut tree).len(), 1);

        tree.handle_event(1, event(3, "B", 11, 0));
        assert!(ids(&mut tree).is_empty());
    }

    #[test]
    fn test_expired_partial_matches_are_purged() {
        let pattern = seq_ab(10);
        let mut tree = tree(&pattern, &[0, 1]);
        tree.handle_event(0, event(1, "A", 0, 0));
        tree.handle_event(0, event(2, "A", 5, 0));
        assert_eq!(tree.partial_match_count(), 2);

        tree.advance_clock(DateTime::from_timestamp(12, 0).unwrap());
        assert_eq!(tree.partial_match_count(), 1);
    }

    #[test]
    fn test_conditions_are_checked() {
        let structure = PatternStructure::seq(vec![
            PatternStructure::primitive("A", "a"),
            PatternStructure::primitive("B", "b"),
        ]);
        let conditions = vec![
            Condition::compare(Operand::field("a", "value"), CompareOp::Lt, Operand::field("b", "value")),
            Condition::compare(Operand::field("a", "value"), CompareOp::Gt, Operand::value(0)),
        ];
        let pattern =
            Arc::new(Pattern::new(structure, conditions, Duration::seconds(10)).unwrap());
        let mut tree = tree(&pattern, &[0, 1]);

        tree.handle_event(0, event(1, "A", 0, 0));
        tree.handle_event(0, event(2, "A", 1, 5));
        tree.handle_event(1, event(3, "B", 2, 3));
        tree.handle_event(1, event(4, "B", 3, 7));
        assert_eq!(ids(&mut tree), vec![vec![2, 4]]);
    }

    #[test]
    fn test_and_binds_distinct_events() {
        let structure = PatternStructure::and(vec![
            PatternStructure::primitive("A", "a1"),
            PatternStructure::primitive("A", "a2"),
        ]);
        let pattern = Arc::new(Pattern::new(structure, Vec::new(), Duration::seconds(10)).unwrap());
        let mut tree = tree(&pattern, &[0, 1]);

        let first = event(1, "A", 0, 0);
        tree.handle_event(0, Arc::clone(&first));
        tree.handle_event(1, first);
        assert!(ids(&mut tree).is_empty());

        let second = event(2, "A", 1, 0);
        tree.handle_event(0, Arc::clone(&second));
        tree.handle_event(1, second);
        let mut found = ids(&mut tree);
        found.sort();
        assert_eq!(found, vec![vec![1, 2], vec![2, 1]]);
    }

    #[test]
    fn test_middle_negation_blocks_match() {
        let structure = PatternStructure::seq(vec![
            PatternStructure::primitive("A", "a"),
            PatternStructure::not("X", "x"),
            PatternStructure::primitive("B", "b"),
        ]);
        let pattern = Arc::new(Pattern::new(structure, Vec::new(), Duration::seconds(10)).unwrap());
        let mut tree = tree(&pattern, &[0, 1]);

        tree.handle_event(0, event(1, "A", 0, 0));
        tree.handle_event(2, event(2, "X", 1, 0));
        tree.handle_event(1, event(3, "B", 2, 0));
        assert!(ids(&mut tree).is_empty());

        tree.handle_event(0, event(4, "A", 3, 0));
        tree.handle_event(1, event(5, "B", 4, 0));
        assert_eq!(ids(&mut tree), vec![vec![4, 5]]);
    }

    #[test]
    fn test_negation_buffer_ignores_storage_limit() {
        let structure = PatternStructure::seq(vec![
            PatternStructure::primitive("A", "a"),
            PatternStructure::not("X", "x"),
            PatternStructure::primitive("B", "b"),
        ]);
        let same_value = Condition::compare(
            Operand::field("x", "value"),
            CompareOp::Eq,
            Operand::field("a", "value"),
        );
        let pattern = Arc::new(
            Pattern::new(structure, vec![same_value], Duration::seconds(10)).unwrap(),
        );
        let storage = TreeStorageParameters {
            max_partial_matches: Some(1),
        };
        let plan = TreePlan::left_deep(&[0, 1]).unwrap();
        let mut tree = Tree::instantiate(plan, pattern, &storage).unwrap();

        tree.handle_event(0, event(1, "A", 0, 1));
        tree.handle_event(2, event(2, "X", 1, 1));
        tree.handle_event(2, event(3, "X", 2, 2));
        tree.handle_event(1, event(4, "B", 3, 0));
        assert!(ids(&mut tree).is_empty());
        assert_eq!(tree.evicted_count(), 0);
    }

    #[test]
    fn test_node_store_limit_evicts_oldest() {
        let pattern = seq_ab(10);
        let storage = TreeStorageParameters {
            max_partial_matches: Some(1),
        };
        let plan = TreePlan::left_deep(&[0, 1]).unwrap();
        let mut tree = Tree::instantiate(plan, pattern, &storage).unwrap();

        tree.handle_event(0, event(1, "A", 0, 0));
        tree.handle_event(0, event(2, "A", 1, 0));
        tree.handle_event(1, event(3, "B", 2, 0));
        assert_eq!(ids(&mut tree), vec![vec![2, 3]]);
        assert_eq!(tree.evicted_count(), 1);
    }

    #[test]
    fn test_completed_matches_are_not_stored_at_root() {
        let pattern = seq_ab(10);
        let mut tree = tree(&pattern, &[0, 1]);
        tree.handle_event(0, event(1, "A", 0, 0));
        tree.handle_event(1, event(2, "B", 1, 0));
        assert_eq!(ids(&mut tree), vec![vec![1, 2]]);
        // Only the two leaf buffers hold state
        assert_eq!(tree.partial_match_count(), 2);
    }

    #[test]
    fn test_trailing_negation_waits_for_window() {
        let structure = PatternStructure::seq(vec![
            PatternStructure::primitive("A", "a"),
            PatternStructure::primitive("B", "b"),
            PatternStructure::not("X", "x"),
        ]);
        let pattern = Arc::new(Pattern::new(structure, Vec::new(), Duration::seconds(10)).unwrap());
        let mut tree = tree(&pattern, &[0, 1]);

        tree.handle_event(0, event(1, "A", 0, 0));
        tree.handle_event(1, event(2, "B", 1, 0));
        assert!(ids(&mut tree).is_empty());

        tree.advance_clock(DateTime::from_timestamp(10, 0).unwrap());
        assert!(ids(&mut tree).is_empty());
        tree.advance_clock(DateTime::from_timestamp(11, 0).unwrap());
        assert_eq!(ids(&mut tree), vec![vec![1, 2]]);

        tree.handle_event(0, event(3, "A", 20, 0));
        tree.handle_event(1, event(4, "B", 21, 0));
        tree.handle_event(2, event(5, "X", 22, 0));
        let last: Vec<Vec<u64>> = tree.get_last_matches().map(|m| m.event_ids()).collect();
        assert!(last.is_empty());
    }

    #[test]
    fn test_get_last_matches_releases_pending() {
        let structure = PatternStructure::seq(vec![
            PatternStructure::primitive("A", "a"),
            PatternStructure::not("X", "x"),
        ]);
        let pattern = Arc::new(Pattern::new(structure, Vec::new(), Duration::seconds(10)).unwrap());
        let mut tree = tree(&pattern, &[0]);

        tree.handle_event(0, event(1, "A", 0, 0));
        assert!(ids(&mut tree).is_empty());
        let last: Vec<Vec<u64>> = tree.get_last_matches().map(|m| m.event_ids()).collect();
        assert_eq!(last, vec![vec![1]]);
    }

    #[test]
    fn test_buffered_events_are_merged_in_stream_order() {
        let pattern = seq_ab(10);
        let mut tree = tree(&pattern, &[1, 0]);
        tree.handle_event(0, event(1, "A", 0, 0));
        tree.handle_event(1, event(2, "B", 0, 0));
        tree.handle_event(0, event(3, "A", 3, 0));
        tree.handle_event(1, event(4, "B", 4, 0));

        let replay: Vec<(usize, u64)> = tree
            .buffered_events()
            .into_iter()
            .map(|(leaf, e)| (leaf, e.id))
            .collect();
        assert_eq!(replay, vec![(0, 1), (1, 2), (0, 3), (1, 4)]);
    }

    #[test]
    fn test_invalid_plan_is_rejected() {
        let pattern = seq_ab(10);
        let plan = TreePlan::left_deep(&[0]).unwrap();
        assert!(Tree::instantiate(plan, pattern, &TreeStorageParameters::default()).is_err());
    }

    #[test]
    fn test_structure_summary_uses_names() {
        let pattern = seq_ab(10);
        let tree = tree(&pattern, &[1, 0]);
        assert_eq!(tree.structure_summary(), "(b ⋈ a)");
        assert_eq!(tree.leaves().len(), 2);
        assert_eq!(&**tree.leaf(1).unwrap().event_type(), "B");
    }
}
