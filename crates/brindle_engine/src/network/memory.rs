//! Per-session network state and fact propagation.
//!
//! Alpha memories hold the facts that passed every test down to a node. Beta
//! memories hold the tokens (ordered fact-handle tuples) a join or eval node
//! has produced. Negated joins also remember, per left token, the set of right
//! facts currently blocking it, so a retraction can unblock a token without
//! rescanning anything.
//!
//! Propagation is depth-first and synchronous. Memories are sets and only
//! newly added tokens travel further, so a fact that reaches two joins of the
//! same rule (self-joins) yields each match once.
//!
//! A [`MemoryRecord`] is the persistent form of these memories. Rebuilding
//! from one does not evaluate any test: the record says what matched, and it
//! is only checked for fitting the network's shape and the live facts.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use brindle_foundation::{Error, FactHandle, Object, Result};
use brindle_language::{CompiledExpr, Evaluator, FactView, FunctionTable, Scope};
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{Network, NodeId, NodeKind, TerminalInfo};
use crate::rule::RuleId;

/// An ordered tuple of fact handles: a partial or complete match.
pub type Token = Vec<FactHandle>;

/// Receives the changes terminal nodes make to the set of complete matches.
pub trait ActivationSink {
    /// A complete match of a rule appeared.
    fn activate(&mut self, info: TerminalInfo, tuple: &[FactHandle]);

    /// Every match of `rule` whose tuple starts with `prefix` disappeared.
    fn deactivate(&mut self, rule: RuleId, prefix: &[FactHandle]);
}

/// Session-owned memories for one [`Network`].
#[derive(Clone, Debug, Default)]
pub struct NetworkMemory {
    seeded: bool,
    alpha: BTreeMap<NodeId, BTreeSet<FactHandle>>,
    beta: BTreeMap<NodeId, BTreeSet<Token>>,
    blockers: BTreeMap<NodeId, BTreeMap<Token, BTreeSet<FactHandle>>>,
}

impl NetworkMemory {
    /// Creates empty memories.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes the root's empty token into the network.
    ///
    /// This activates rules with no conditions and primes negations and evals
    /// that come first in a rule. Seeding twice is a no-op.
    ///
    /// # Errors
    ///
    /// Any error raised while evaluating a test.
    pub fn seed(
        &mut self,
        network: &Network,
        view: &dyn FactView,
        sink: &mut dyn ActivationSink,
        max_call_depth: usize,
    ) -> Result<()> {
        if self.seeded {
            return Ok(());
        }
        self.seeded = true;
        let mut propagator = Propagator {
            network,
            memory: self,
            view,
            sink,
            max_call_depth,
        };
        for child in network.root_children() {
            propagator.left_activate(*child, &Vec::new())?;
        }
        Ok(())
    }

    /// Propagates a fact that was just added to (or changed in) the view.
    ///
    /// # Errors
    ///
    /// `UnknownFact` if the view does not hold the fact, or any error raised
    /// while evaluating a test. Memories keep the changes made before the
    /// error.
    pub fn assert_fact(
        &mut self,
        network: &Network,
        handle: FactHandle,
        view: &dyn FactView,
        sink: &mut dyn ActivationSink,
        max_call_depth: usize,
    ) -> Result<()> {
        let fact = view.fact(handle).ok_or_else(|| Error::unknown_fact(handle))?;
        let Some(entry) = network.object_type(fact.type_name()) else {
            trace!(fact = %handle, type_name = fact.type_name(), "no rules match type");
            return Ok(());
        };
        let mut propagator = Propagator {
            network,
            memory: self,
            view,
            sink,
            max_call_depth,
        };
        let mut passed = Vec::new();
        propagator.alpha_pass(entry, handle, fact, &mut passed)?;
        for node in passed {
            propagator.right_activate(node, handle, fact)?;
        }
        Ok(())
    }

    /// Removes every trace of a fact that is about to leave the view.
    ///
    /// The fact must still be readable through `view`.
    ///
    /// # Errors
    ///
    /// `UnknownFact` if the view does not hold the fact, or any error raised
    /// while evaluating tests for tokens the retraction unblocks.
    pub fn retract_fact(
        &mut self,
        network: &Network,
        handle: FactHandle,
        view: &dyn FactView,
        sink: &mut dyn ActivationSink,
        max_call_depth: usize,
    ) -> Result<()> {
        let fact = view.fact(handle).ok_or_else(|| Error::unknown_fact(handle))?;
        let Some(entry) = network.object_type(fact.type_name()) else {
            return Ok(());
        };
        let mut propagator = Propagator {
            network,
            memory: self,
            view,
            sink,
            max_call_depth,
        };

        let mut holding = Vec::new();
        propagator.alpha_holders(entry, handle, &mut holding);
        let mut unblocked = Vec::new();
        for node in holding {
            propagator.right_retract(node, handle, &mut unblocked);
        }
        for (join, token) in unblocked {
            propagator.unblock(join, token)?;
        }
        Ok(())
    }

    /// Returns the facts held in an alpha memory.
    #[must_use]
    pub fn alpha_memory(&self, node: NodeId) -> Option<&BTreeSet<FactHandle>> {
        self.alpha.get(&node)
    }

    /// Returns the tokens held in a beta memory.
    #[must_use]
    pub fn beta_memory(&self, node: NodeId) -> Option<&BTreeSet<Token>> {
        self.beta.get(&node)
    }

    /// Returns the total number of stored tokens, for diagnostics.
    #[must_use]
    pub fn token_count(&self) -> usize {
        self.beta.values().map(BTreeSet::len).sum()
    }

    /// Copies the memories out in their persistent form.
    #[must_use]
    pub fn to_record(&self) -> MemoryRecord {
        MemoryRecord {
            seeded: self.seeded,
            alpha: self
                .alpha
                .iter()
                .filter(|(_, facts)| !facts.is_empty())
                .map(|(node, facts)| (*node, facts.iter().copied().collect()))
                .collect(),
            beta: self
                .beta
                .iter()
                .filter(|(_, tokens)| !tokens.is_empty())
                .map(|(node, tokens)| (*node, tokens.iter().cloned().collect()))
                .collect(),
            blockers: self
                .blockers
                .iter()
                .filter(|(_, blocked)| !blocked.is_empty())
                .map(|(node, blocked)| {
                    let blocked = blocked
                        .iter()
                        .map(|(token, set)| (token.clone(), set.iter().copied().collect()))
                        .collect();
                    (*node, blocked)
                })
                .collect(),
        }
    }

    /// Rebuilds memories from a record.
    ///
    /// # Errors
    ///
    /// `SnapshotMismatch` if the record names a node the network lacks, a
    /// node of the wrong kind, or a fact `view` does not hold.
    pub fn from_record(
        record: &MemoryRecord,
        network: &Network,
        view: &dyn FactView,
    ) -> Result<Self> {
        let mut memory = Self {
            seeded: record.seeded,
            ..Self::default()
        };
        for (node, facts) in &record.alpha {
            expect_node(network, *node, &["object-type", "alpha"])?;
            expect_live(view, facts)?;
            memory.alpha.insert(*node, facts.iter().copied().collect());
        }
        for (node, tokens) in &record.beta {
            expect_node(network, *node, &["join", "not", "eval"])?;
            for token in tokens {
                expect_live(view, token)?;
            }
            memory.beta.insert(*node, tokens.iter().cloned().collect());
        }
        for (node, blocked) in &record.blockers {
            expect_node(network, *node, &["not"])?;
            let mut map = BTreeMap::new();
            for (token, set) in blocked {
                expect_live(view, token)?;
                expect_live(view, set)?;
                if set.is_empty() {
                    return Err(Error::snapshot_mismatch(format!(
                        "node {node} records an unblocked token as blocked"
                    )));
                }
                map.insert(token.clone(), set.iter().copied().collect());
            }
            memory.blockers.insert(*node, map);
        }
        Ok(memory)
    }
}

/// The persistent form of a [`NetworkMemory`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Whether the root token has been pushed.
    pub seeded: bool,
    /// Facts held per alpha-level node.
    pub alpha: Vec<(NodeId, Vec<FactHandle>)>,
    /// Tokens held per beta node.
    pub beta: Vec<(NodeId, Vec<Token>)>,
    /// Per negated join, the blocked left tokens and what blocks them.
    pub blockers: Vec<(NodeId, Vec<(Token, Vec<FactHandle>)>)>,
}

fn expect_node(network: &Network, id: NodeId, labels: &[&str]) -> Result<()> {
    let Some(node) = network.node(id) else {
        return Err(Error::snapshot_mismatch(format!("node {id} is not in the network")));
    };
    let label = node.kind.label();
    if labels.contains(&label) {
        Ok(())
    } else {
        Err(Error::snapshot_mismatch(format!(
            "node {id} is a {label} node, expected one of {labels:?}"
        )))
    }
}

fn expect_live(view: &dyn FactView, handles: &[FactHandle]) -> Result<()> {
    match handles.iter().find(|h| view.fact(**h).is_none()) {
        Some(missing) => Err(Error::snapshot_mismatch(format!(
            "fact {missing} is matched but not stored"
        ))),
        None => Ok(()),
    }
}

// =============================================================================
// Propagation
// =============================================================================

struct Propagator<'a> {
    network: &'a Network,
    memory: &'a mut NetworkMemory,
    view: &'a dyn FactView,
    sink: &'a mut dyn ActivationSink,
    max_call_depth: usize,
}

impl Propagator<'_> {
    fn test(
        &self,
        test: &CompiledExpr,
        functions: &FunctionTable,
        scope: Scope<'_>,
    ) -> Result<bool> {
        Evaluator::new(functions)
            .with_max_depth(self.max_call_depth)
            .test(test, scope, self.view)
    }

    fn tests_pass(
        &self,
        tests: &[CompiledExpr],
        functions: &FunctionTable,
        token: &[FactHandle],
        fact: &Object,
    ) -> Result<bool> {
        for test in tests {
            if !self.test(test, functions, Scope::tuple(token).with_current(fact))? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Tokens flowing out of `left` (the root holds one empty token).
    fn left_tokens(&self, left: Option<NodeId>) -> Vec<Token> {
        match left {
            None if self.memory.seeded => vec![Vec::new()],
            None => Vec::new(),
            Some(node) => self
                .memory
                .beta
                .get(&node)
                .map(|tokens| tokens.iter().cloned().collect())
                .unwrap_or_default(),
        }
    }

    fn left_holds(&self, left: Option<NodeId>, token: &Token) -> bool {
        match left {
            None => self.memory.seeded && token.is_empty(),
            Some(node) => self
                .memory
                .beta
                .get(&node)
                .is_some_and(|tokens| tokens.contains(token)),
        }
    }

    fn right_facts(&self, node: NodeId) -> Vec<FactHandle> {
        self.memory
            .alpha
            .get(&node)
            .map(|facts| facts.iter().copied().collect())
            .unwrap_or_default()
    }

    // -------------------------------------------------------------------------
    // Alpha network
    // -------------------------------------------------------------------------

    /// Records `handle` in every alpha memory it reaches; `passed` collects
    /// those nodes in depth-first order.
    fn alpha_pass(
        &mut self,
        node_id: NodeId,
        handle: FactHandle,
        fact: &Object,
        passed: &mut Vec<NodeId>,
    ) -> Result<()> {
        let network = self.network;
        let Some(node) = network.node(node_id) else {
            return Ok(());
        };
        if let NodeKind::Alpha { test, functions } = &node.kind {
            if !self.test(test, functions, Scope::empty().with_current(fact))? {
                return Ok(());
            }
        }
        self.memory.alpha.entry(node_id).or_default().insert(handle);
        passed.push(node_id);
        for child in &node.children {
            self.alpha_pass(*child, handle, fact, passed)?;
        }
        Ok(())
    }

    /// Removes `handle` from every alpha memory; `holding` collects the nodes
    /// that held it.
    fn alpha_holders(&mut self, node_id: NodeId, handle: FactHandle, holding: &mut Vec<NodeId>) {
        let removed = self
            .memory
            .alpha
            .get_mut(&node_id)
            .is_some_and(|facts| facts.remove(&handle));
        if !removed {
            return;
        }
        holding.push(node_id);
        if let Some(node) = self.network.node(node_id) {
            for child in &node.children {
                self.alpha_holders(*child, handle, holding);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Beta network
    // -------------------------------------------------------------------------

    fn right_activate(&mut self, alpha: NodeId, handle: FactHandle, fact: &Object) -> Result<()> {
        let network = self.network;
        let Some(node) = network.node(alpha) else {
            return Ok(());
        };
        for join_id in &node.right_children {
            let Some(join) = network.node(*join_id) else {
                continue;
            };
            let NodeKind::Join {
                left,
                tests,
                negated,
                functions,
                ..
            } = &join.kind
            else {
                continue;
            };
            for token in self.left_tokens(*left) {
                if !self.tests_pass(tests, functions, &token, fact)? {
                    continue;
                }
                if *negated {
                    self.block(*join_id, token, handle);
                } else {
                    let mut joined = token;
                    joined.push(handle);
                    self.emit(*join_id, joined)?;
                }
            }
        }
        Ok(())
    }

    fn left_activate(&mut self, node_id: NodeId, token: &Token) -> Result<()> {
        let network = self.network;
        let Some(node) = network.node(node_id) else {
            return Ok(());
        };
        match &node.kind {
            NodeKind::Join {
                right,
                tests,
                negated,
                functions,
                ..
            } => {
                let mut blocking = BTreeSet::new();
                for handle in self.right_facts(*right) {
                    let view = self.view;
                    let fact = view.fact(handle).ok_or_else(|| Error::unknown_fact(handle))?;
                    if !self.tests_pass(tests, functions, token, fact)? {
                        continue;
                    }
                    if *negated {
                        blocking.insert(handle);
                    } else {
                        let mut joined = token.clone();
                        joined.push(handle);
                        self.emit(node_id, joined)?;
                    }
                }
                if *negated {
                    if blocking.is_empty() {
                        self.emit(node_id, token.clone())?;
                    } else {
                        self.memory
                            .blockers
                            .entry(node_id)
                            .or_default()
                            .insert(token.clone(), blocking);
                    }
                }
                Ok(())
            }
            NodeKind::Eval { test, functions, .. } => {
                if self.test(test, functions, Scope::tuple(token))? {
                    self.emit(node_id, token.clone())?;
                }
                Ok(())
            }
            NodeKind::Terminal { info, .. } => {
                trace!(rule = %info.rule, tuple = ?token, "match");
                self.sink.activate(*info, token);
                Ok(())
            }
            NodeKind::ObjectType { .. } | NodeKind::Alpha { .. } => Err(Error::internal(format!(
                "alpha node {node_id} used as a left input"
            ))),
        }
    }

    /// Stores a token produced by a beta node and passes it on if it is new.
    fn emit(&mut self, node_id: NodeId, token: Token) -> Result<()> {
        let added = self
            .memory
            .beta
            .entry(node_id)
            .or_default()
            .insert(token.clone());
        if !added {
            return Ok(());
        }
        let network = self.network;
        if let Some(node) = network.node(node_id) {
            for child in &node.children {
                self.left_activate(*child, &token)?;
            }
        }
        Ok(())
    }

    /// Adds a blocker to a negated join's token, withdrawing the token if it
    /// was passing.
    fn block(&mut self, join: NodeId, token: Token, handle: FactHandle) {
        let blockers = self
            .memory
            .blockers
            .entry(join)
            .or_default()
            .entry(token.clone())
            .or_default();
        let was_free = blockers.is_empty();
        blockers.insert(handle);
        if was_free {
            self.retract_output(join, &token);
        }
    }

    /// Withdraws every left token starting with `prefix` from `node` and
    /// everything derived from it below.
    fn withdraw(&mut self, node_id: NodeId, prefix: &[FactHandle]) {
        let network = self.network;
        let Some(node) = network.node(node_id) else {
            return;
        };
        if let NodeKind::Terminal { info, .. } = &node.kind {
            self.sink.deactivate(info.rule, prefix);
            return;
        }
        if let Some(blockers) = self.memory.blockers.get_mut(&node_id) {
            remove_prefixed(blockers, prefix);
        }
        self.retract_output(node_id, prefix);
    }

    /// Removes the tokens starting with `prefix` that `node` produced.
    fn retract_output(&mut self, node_id: NodeId, prefix: &[FactHandle]) {
        let network = self.network;
        let Some(node) = network.node(node_id) else {
            return;
        };
        let removed = self
            .memory
            .beta
            .get_mut(&node_id)
            .is_some_and(|tokens| remove_prefixed_set(tokens, prefix));
        if removed {
            for child in &node.children {
                self.withdraw(*child, prefix);
            }
        }
    }

    /// Undoes what `handle` contributed through one alpha memory.
    fn right_retract(
        &mut self,
        alpha: NodeId,
        handle: FactHandle,
        unblocked: &mut Vec<(NodeId, Token)>,
    ) {
        let network = self.network;
        let Some(node) = network.node(alpha) else {
            return;
        };
        for join_id in &node.right_children {
            let Some(join) = network.node(*join_id) else {
                continue;
            };
            let NodeKind::Join { negated, .. } = &join.kind else {
                continue;
            };
            if *negated {
                let Some(blockers) = self.memory.blockers.get_mut(join_id) else {
                    continue;
                };
                let mut freed = Vec::new();
                for (token, set) in blockers.iter_mut() {
                    if set.remove(&handle) && set.is_empty() {
                        freed.push(token.clone());
                    }
                }
                for token in freed {
                    blockers.remove(&token);
                    unblocked.push((*join_id, token));
                }
            } else {
                let doomed: Vec<Token> = self
                    .memory
                    .beta
                    .get(join_id)
                    .map(|tokens| {
                        tokens
                            .iter()
                            .filter(|token| token.last() == Some(&handle))
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                for token in doomed {
                    self.retract_output(*join_id, &token);
                }
            }
        }
    }

    /// Passes a token a negated join no longer blocks, if it is still live.
    fn unblock(&mut self, join: NodeId, token: Token) -> Result<()> {
        let network = self.network;
        let Some(NodeKind::Join { left, .. }) = network.node(join).map(|n| &n.kind) else {
            return Ok(());
        };
        if !self.left_holds(*left, &token) {
            return Ok(());
        }
        let still_blocked = self
            .memory
            .blockers
            .get(&join)
            .is_some_and(|b| b.get(&token).is_some_and(|set| !set.is_empty()));
        if still_blocked {
            return Ok(());
        }
        trace!(node = %join, token = ?token, "unblocked");
        self.emit(join, token)
    }
}

fn remove_prefixed_set(tokens: &mut BTreeSet<Token>, prefix: &[FactHandle]) -> bool {
    let doomed: Vec<Token> = tokens
        .range::<[FactHandle], _>((Bound::Included(prefix), Bound::Unbounded))
        .take_while(|token| token.starts_with(prefix))
        .cloned()
        .collect();
    for token in &doomed {
        tokens.remove(token);
    }
    !doomed.is_empty()
}

fn remove_prefixed(map: &mut BTreeMap<Token, BTreeSet<FactHandle>>, prefix: &[FactHandle]) {
    let doomed: Vec<Token> = map
        .range::<[FactHandle], _>((Bound::Included(prefix), Bound::Unbounded))
        .take_while(|(token, _)| token.starts_with(prefix))
        .map(|(token, _)| token.clone())
        .collect();
    for token in &doomed {
        map.remove(token);
    }
}
