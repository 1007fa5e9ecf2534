//! The matching network.
//!
//! Compiled rules are turned into a graph of shared nodes stored in an arena:
//!
//! - `ObjectType` nodes, one per fact type, are the entry points for facts.
//! - `Alpha` nodes hang below them and test single facts.
//! - `Join` nodes combine tokens from their left input with facts from an
//!   alpha memory on their right. A negated join passes a token through only
//!   while no right fact matches it.
//! - `Eval` nodes test whole tokens.
//! - `Terminal` nodes, one per rule, turn complete tokens into activations.
//!
//! Nodes are keyed structurally, so two rules with the same leading
//! conditions share those nodes. Every node counts the rules that use it and
//! is freed when the count drops to zero; freed ids are reused.
//!
//! The network itself holds no facts. Per-session state lives in
//! [`NetworkMemory`].

pub mod memory;

pub use memory::{ActivationSink, MemoryRecord, NetworkMemory};

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use brindle_language::{CompileError, CompileErrorKind, CompiledExpr, FunctionTable};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::rule::{CompiledCondition, CompiledRule, RuleId};

// =============================================================================
// Nodes
// =============================================================================

/// Index of a node in the network arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    /// Returns the raw index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// What a terminal node needs to create activations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TerminalInfo {
    /// The rule.
    pub rule: RuleId,
    /// Its salience.
    pub salience: i32,
    /// Its no-loop flag.
    pub no_loop: bool,
}

/// The kind and payload of a node.
#[derive(Clone, Debug)]
pub enum NodeKind {
    /// Entry point for facts of one type.
    ObjectType {
        /// Fully-qualified type name.
        type_name: Arc<str>,
    },
    /// A single-fact test.
    Alpha {
        /// The test.
        test: CompiledExpr,
        /// Functions the test may call.
        functions: Arc<FunctionTable>,
    },
    /// Tokens from the left joined with facts from the right.
    Join {
        /// Left input; `None` is the root, which holds one empty token.
        left: Option<NodeId>,
        /// The alpha memory on the right.
        right: NodeId,
        /// Tests over the left token and the right fact.
        tests: Vec<CompiledExpr>,
        /// Pass tokens only while nothing on the right matches.
        negated: bool,
        /// Functions the tests may call.
        functions: Arc<FunctionTable>,
    },
    /// A test over the whole token.
    Eval {
        /// Left input; `None` is the root.
        left: Option<NodeId>,
        /// The test.
        test: CompiledExpr,
        /// Functions the test may call.
        functions: Arc<FunctionTable>,
    },
    /// Complete matches of one rule.
    Terminal {
        /// Left input; `None` for rules with no conditions.
        left: Option<NodeId>,
        /// The rule.
        info: TerminalInfo,
    },
}

impl NodeKind {
    /// Short name of the kind, as used in diagnostics and snapshots.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::ObjectType { .. } => "object-type",
            Self::Alpha { .. } => "alpha",
            Self::Join { negated: false, .. } => "join",
            Self::Join { negated: true, .. } => "not",
            Self::Eval { .. } => "eval",
            Self::Terminal { .. } => "terminal",
        }
    }
}

/// One node in the arena.
#[derive(Clone, Debug)]
pub struct Node {
    /// Kind and payload.
    pub kind: NodeKind,
    /// Number of rules using this node.
    pub refs: u32,
    /// Alpha children of alpha-level nodes, or left children of beta nodes.
    pub children: Vec<NodeId>,
    /// Joins reading this node as their right input.
    pub right_children: Vec<NodeId>,
    key: Option<NodeKey>,
}

/// Structural identity used for node sharing.
///
/// Expressions that call package-local functions are only shared within the
/// package, since function indices are package-relative.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum NodeKey {
    ObjectType(Arc<str>),
    Alpha {
        parent: NodeId,
        test: CompiledExpr,
        scope: Option<Arc<str>>,
    },
    Join {
        left: Option<NodeId>,
        right: NodeId,
        tests: Vec<CompiledExpr>,
        negated: bool,
        scope: Option<Arc<str>>,
    },
    Eval {
        left: Option<NodeId>,
        test: CompiledExpr,
        scope: Option<Arc<str>>,
    },
}

fn scope_for<'e>(
    exprs: impl IntoIterator<Item = &'e CompiledExpr>,
    functions: &FunctionTable,
) -> Option<Arc<str>> {
    exprs
        .into_iter()
        .any(CompiledExpr::calls_local)
        .then(|| Arc::from(functions.package()))
}

#[derive(Clone, Debug)]
struct RuleEntry {
    rule: Arc<CompiledRule>,
    terminal: NodeId,
    path: Vec<NodeId>,
}

// =============================================================================
// Network
// =============================================================================

/// The shared, rule-derived part of the matching network.
#[derive(Clone, Debug, Default)]
pub struct Network {
    nodes: Vec<Option<Node>>,
    free: Vec<NodeId>,
    keys: HashMap<NodeKey, NodeId>,
    object_types: BTreeMap<Arc<str>, NodeId>,
    root_children: Vec<NodeId>,
    rules: BTreeMap<RuleId, RuleEntry>,
    names: BTreeMap<(Arc<str>, Arc<str>), RuleId>,
    next_rule: u32,
}

impl Network {
    /// Creates an empty network.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule, sharing every node an existing rule already has.
    ///
    /// # Errors
    ///
    /// `BuildError` if a rule with the same package and name is present.
    pub fn add_rule(&mut self, rule: Arc<CompiledRule>) -> Result<RuleId, CompileError> {
        let name_key = (Arc::clone(&rule.package), Arc::clone(&rule.name));
        if self.names.contains_key(&name_key) {
            return Err(CompileError::new(
                CompileErrorKind::BuildError,
                format!("rule '{}' is already in the network", rule.qualified_name()),
            )
            .with_package(&*rule.package)
            .with_rule(&*rule.name));
        }

        let id = RuleId::new(self.next_rule);
        self.next_rule += 1;
        let mut path = Vec::new();
        let mut left: Option<NodeId> = None;

        for condition in &rule.conditions {
            match condition {
                CompiledCondition::Pattern(pattern) => {
                    let mut right = self.object_type_node(pattern.type_name(), &mut path);
                    for test in &pattern.alpha {
                        right = self.alpha_node(right, test, &rule.functions, &mut path);
                    }
                    let key = NodeKey::Join {
                        left,
                        right,
                        tests: pattern.beta.clone(),
                        negated: pattern.negated,
                        scope: scope_for(&pattern.beta, &rule.functions),
                    };
                    let kind = NodeKind::Join {
                        left,
                        right,
                        tests: pattern.beta.clone(),
                        negated: pattern.negated,
                        functions: Arc::clone(&rule.functions),
                    };
                    left = Some(self.shared_beta_node(key, kind, left, Some(right), &mut path));
                }
                CompiledCondition::Eval(test) => {
                    let key = NodeKey::Eval {
                        left,
                        test: test.clone(),
                        scope: scope_for([test], &rule.functions),
                    };
                    let kind = NodeKind::Eval {
                        left,
                        test: test.clone(),
                        functions: Arc::clone(&rule.functions),
                    };
                    left = Some(self.shared_beta_node(key, kind, left, None, &mut path));
                }
            }
        }

        let info = TerminalInfo {
            rule: id,
            salience: rule.salience,
            no_loop: rule.no_loop,
        };
        let terminal = self.insert_node(NodeKind::Terminal { left, info }, None);
        self.link_left(left, terminal);
        path.push(terminal);

        debug!(
            rule = %rule.qualified_name(),
            id = %id,
            nodes = self.node_count(),
            "added rule to network"
        );
        self.names.insert(name_key, id);
        self.rules.insert(id, RuleEntry { rule, terminal, path });
        Ok(id)
    }

    /// Removes a rule and prunes every node no other rule uses.
    ///
    /// Returns the removed rule, or `None` if the id is unknown.
    pub fn remove_rule(&mut self, id: RuleId) -> Option<Arc<CompiledRule>> {
        let entry = self.rules.remove(&id)?;
        self.names
            .remove(&(Arc::clone(&entry.rule.package), Arc::clone(&entry.rule.name)));
        for node_id in entry.path.iter().rev() {
            self.release(*node_id);
        }
        debug!(
            rule = %entry.rule.qualified_name(),
            id = %id,
            terminal = %entry.terminal,
            nodes = self.node_count(),
            "removed rule from network"
        );
        Some(entry.rule)
    }

    /// Returns a rule by id.
    #[must_use]
    pub fn rule(&self, id: RuleId) -> Option<&Arc<CompiledRule>> {
        self.rules.get(&id).map(|entry| &entry.rule)
    }

    /// Looks up a rule id by package and rule name.
    #[must_use]
    pub fn rule_id(&self, package: &str, name: &str) -> Option<RuleId> {
        self.names
            .iter()
            .find(|((p, n), _)| &**p == package && &**n == name)
            .map(|(_, id)| *id)
    }

    /// Iterates over all rules in id order.
    pub fn rules(&self) -> impl Iterator<Item = (RuleId, &Arc<CompiledRule>)> {
        self.rules.iter().map(|(id, entry)| (*id, &entry.rule))
    }

    /// Returns the number of rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Returns the number of live nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Returns a live node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize).and_then(Option::as_ref)
    }

    /// Iterates over live nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, node)| Some((NodeId(u32::try_from(i).ok()?), node.as_ref()?)))
    }

    /// Returns the entry node for a fact type.
    #[must_use]
    pub fn object_type(&self, type_name: &str) -> Option<NodeId> {
        self.object_types.get(type_name).copied()
    }

    /// Returns the nodes fed directly by the root token.
    #[must_use]
    pub fn root_children(&self) -> &[NodeId] {
        &self.root_children
    }

    /// Returns the number of nodes of each kind, for diagnostics.
    #[must_use]
    pub fn node_summary(&self) -> BTreeMap<&'static str, usize> {
        let mut summary = BTreeMap::new();
        for node in self.nodes.iter().flatten() {
            *summary.entry(node.kind.label()).or_insert(0) += 1;
        }
        summary
    }

    // -------------------------------------------------------------------------
    // Building
    // -------------------------------------------------------------------------

    fn object_type_node(&mut self, type_name: &Arc<str>, path: &mut Vec<NodeId>) -> NodeId {
        let key = NodeKey::ObjectType(Arc::clone(type_name));
        let id = match self.keys.get(&key) {
            Some(id) => *id,
            None => {
                let id = self.insert_node(
                    NodeKind::ObjectType {
                        type_name: Arc::clone(type_name),
                    },
                    Some(key),
                );
                self.object_types.insert(Arc::clone(type_name), id);
                id
            }
        };
        self.retain(id, path);
        id
    }

    fn alpha_node(
        &mut self,
        parent: NodeId,
        test: &CompiledExpr,
        functions: &Arc<FunctionTable>,
        path: &mut Vec<NodeId>,
    ) -> NodeId {
        let key = NodeKey::Alpha {
            parent,
            test: test.clone(),
            scope: scope_for([test], functions),
        };
        let id = match self.keys.get(&key) {
            Some(id) => *id,
            None => {
                let kind = NodeKind::Alpha {
                    test: test.clone(),
                    functions: Arc::clone(functions),
                };
                let id = self.insert_node(kind, Some(key));
                if let Some(node) = self.node_mut(parent) {
                    node.children.push(id);
                }
                id
            }
        };
        self.retain(id, path);
        id
    }

    fn shared_beta_node(
        &mut self,
        key: NodeKey,
        kind: NodeKind,
        left: Option<NodeId>,
        right: Option<NodeId>,
        path: &mut Vec<NodeId>,
    ) -> NodeId {
        let id = match self.keys.get(&key) {
            Some(id) => *id,
            None => {
                let id = self.insert_node(kind, Some(key));
                self.link_left(left, id);
                if let Some(right) = right.and_then(|r| self.node_mut(r)) {
                    right.right_children.push(id);
                }
                id
            }
        };
        self.retain(id, path);
        id
    }

    fn insert_node(&mut self, kind: NodeKind, key: Option<NodeKey>) -> NodeId {
        trace!(kind = kind.label(), "creating node");
        let node = Node {
            kind,
            refs: 0,
            children: Vec::new(),
            right_children: Vec::new(),
            key: key.clone(),
        };
        let id = if let Some(id) = self.free.pop() {
            self.nodes[id.0 as usize] = Some(node);
            id
        } else {
            let id = NodeId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
            self.nodes.push(Some(node));
            id
        };
        if let Some(key) = key {
            self.keys.insert(key, id);
        }
        id
    }

    fn link_left(&mut self, left: Option<NodeId>, child: NodeId) {
        match left {
            Some(left) => {
                if let Some(node) = self.node_mut(left) {
                    node.children.push(child);
                }
            }
            None => self.root_children.push(child),
        }
    }

    fn retain(&mut self, id: NodeId, path: &mut Vec<NodeId>) {
        if let Some(node) = self.node_mut(id) {
            node.refs += 1;
        }
        path.push(id);
    }

    fn release(&mut self, id: NodeId) {
        let Some(node) = self.node_mut(id) else {
            return;
        };
        node.refs = node.refs.saturating_sub(1);
        if node.refs > 0 {
            return;
        }
        let Some(node) = self.nodes[id.0 as usize].take() else {
            return;
        };
        trace!(node = %id, kind = node.kind.label(), "pruning node");
        if let Some(key) = &node.key {
            self.keys.remove(key);
        }
        match &node.kind {
            NodeKind::ObjectType { type_name } => {
                self.object_types.remove(type_name);
            }
            NodeKind::Alpha { .. } => {
                if let Some(NodeKey::Alpha { parent, .. }) = &node.key {
                    self.unlink(*parent, id);
                }
            }
            NodeKind::Join { left, right, .. } => {
                self.unlink_left(*left, id);
                if let Some(right) = self.node_mut(*right) {
                    right.right_children.retain(|c| *c != id);
                }
            }
            NodeKind::Eval { left, .. } | NodeKind::Terminal { left, .. } => {
                self.unlink_left(*left, id);
            }
        }
        self.free.push(id);
    }

    fn unlink(&mut self, parent: NodeId, child: NodeId) {
        if let Some(node) = self.node_mut(parent) {
            node.children.retain(|c| *c != child);
        }
    }

    fn unlink_left(&mut self, left: Option<NodeId>, child: NodeId) {
        match left {
            Some(left) => self.unlink(left, child),
            None => self.root_children.retain(|c| *c != child),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0 as usize).and_then(Option::as_mut)
    }
}
