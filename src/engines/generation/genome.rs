//! Genome representation for grammar-driven evolution
//!
//! A genome is a directed multigraph rooted at `NODE_ZERO`, stored in a
//! petgraph `StableGraph`. `FRAMEWORK` edges record how grammar elements
//! were expanded and must form a tree spanning every node; `LINK` edges
//! materialize structural parameters and are keyed by the owning
//! parameter's key.
//!
//! Successor order matters: every framework edge carries a rank, the
//! framework children of a node are listed by rank, and rendering follows
//! that order.
use crate::engines::generation::grammar::{ElementId, Grammar, MACRO_ZERO};
use crate::engines::generation::parameter::{Parameter, SharedId};
use crate::error::{EvoError, Result};
use crate::types::{Ids, NodeId, ParamKey, Value, NODE_ZERO};
use petgraph::stable_graph::{EdgeIndex, EdgeReference, NodeIndex, StableGraph};
use petgraph::visit::{Bfs, EdgeFiltered, EdgeRef, IntoEdgeReferences};
use petgraph::Direction::{Incoming, Outgoing};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Macro,
    Frame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    Framework,
    Link,
}

#[derive(Debug, Clone)]
pub struct NodeData {
    pub kind: NodeKind,
    pub element: ElementId,
    pub parameters: BTreeMap<String, Parameter>,
}

/// Flat view of one edge, as returned by [`Genome::edges`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
    /// Set on `LINK` edges only.
    pub key: Option<ParamKey>,
}

/// Result of copying a subtree from another genome.
#[derive(Debug, Clone)]
pub struct SubtreeCopy {
    pub root: NodeId,
    /// Old id (in the source genome) to new id.
    pub mapping: BTreeMap<NodeId, NodeId>,
    /// Structural parameters whose target lay outside the copied subtree;
    /// they are left without a link and must be re-targeted.
    pub dangling: Vec<(NodeId, String)>,
}

#[derive(Debug, Clone)]
struct NodeSlot {
    id: NodeId,
    data: NodeData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GenomeEdge {
    Framework { rank: u64 },
    Link { key: ParamKey },
}

impl GenomeEdge {
    fn kind(&self) -> EdgeKind {
        match self {
            GenomeEdge::Framework { .. } => EdgeKind::Framework,
            GenomeEdge::Link { .. } => EdgeKind::Link,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Genome {
    graph: StableGraph<NodeSlot, GenomeEdge>,
    index: BTreeMap<NodeId, NodeIndex>,
    links: BTreeMap<ParamKey, EdgeIndex>,
    next_rank: u64,
    shared_values: BTreeMap<SharedId, Value>,
}

impl Default for Genome {
    fn default() -> Self {
        Self::new()
    }
}

impl Genome {
    /// A genome holding only `NODE_ZERO`.
    pub fn new() -> Self {
        let mut genome = Self {
            graph: StableGraph::new(),
            index: BTreeMap::new(),
            links: BTreeMap::new(),
            next_rank: 0,
            shared_values: BTreeMap::new(),
        };
        genome.add_node(
            NODE_ZERO,
            NodeData {
                kind: NodeKind::Macro,
                element: MACRO_ZERO,
                parameters: BTreeMap::new(),
            },
        );
        genome
    }

    pub fn node_count(&self) -> usize {
        self.index.len()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.index.contains_key(&node)
    }

    pub fn node(&self, node: NodeId) -> Option<&NodeData> {
        let ix = self.index.get(&node)?;
        self.graph.node_weight(*ix).map(|slot| &slot.data)
    }

    pub fn node_mut(&mut self, node: NodeId) -> Option<&mut NodeData> {
        let ix = self.index.get(&node)?;
        self.graph.node_weight_mut(*ix).map(|slot| &mut slot.data)
    }

    /// Every node, by ascending id.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &NodeData)> {
        self.index
            .iter()
            .filter_map(move |(id, ix)| self.graph.node_weight(*ix).map(|slot| (*id, &slot.data)))
    }

    /// Every edge, grouped by source; framework children keep their order.
    pub fn edges(&self) -> Vec<Edge> {
        let mut edges: Vec<(u64, Edge)> = self
            .graph
            .edge_references()
            .map(|e| {
                let (rank, key) = match *e.weight() {
                    GenomeEdge::Framework { rank } => (rank, None),
                    GenomeEdge::Link { key } => (0, Some(key)),
                };
                let edge = Edge {
                    source: self.id_at(e.source()),
                    target: self.id_at(e.target()),
                    kind: e.weight().kind(),
                    key,
                };
                (rank, edge)
            })
            .collect();
        edges.sort_by_key(|(rank, e)| (e.source, e.kind, *rank, e.target, e.key));
        edges.into_iter().map(|(_, e)| e).collect()
    }

    pub fn element_of(&self, node: NodeId) -> Option<ElementId> {
        self.node(node).map(|d| d.element)
    }

    /// Insert `node`, or replace its data if it already exists.
    pub fn add_node(&mut self, node: NodeId, data: NodeData) {
        match self.index.get(&node) {
            Some(ix) => {
                if let Some(slot) = self.graph.node_weight_mut(*ix) {
                    slot.data = data;
                }
            }
            None => {
                let ix = self.graph.add_node(NodeSlot { id: node, data });
                self.index.insert(node, ix);
            }
        }
    }

    /// Remove a node together with every incident edge.
    pub fn remove_node(&mut self, node: NodeId) -> Option<NodeData> {
        let ix = self.index.remove(&node)?;
        let keys: Vec<ParamKey> = self
            .graph
            .edges_directed(ix, Outgoing)
            .chain(self.graph.edges_directed(ix, Incoming))
            .filter_map(|e| match *e.weight() {
                GenomeEdge::Link { key } => Some(key),
                GenomeEdge::Framework { .. } => None,
            })
            .collect();
        for key in keys {
            self.links.remove(&key);
        }
        self.graph.remove_node(ix).map(|slot| slot.data)
    }

    /// Append `target` as the last framework child of `source`. Both nodes
    /// must already exist.
    pub fn add_framework_edge(&mut self, source: NodeId, target: NodeId) {
        if let (Some(s), Some(t)) = (self.ix(source), self.ix(target)) {
            let rank = self.take_rank();
            self.graph.add_edge(s, t, GenomeEdge::Framework { rank });
        }
    }

    pub fn remove_framework_edge(&mut self, source: NodeId, target: NodeId) -> bool {
        match self.framework_edge(source, target) {
            Some((edge, _)) => self.graph.remove_edge(edge).is_some(),
            None => false,
        }
    }

    /// Point the link keyed `key` (owned by `source`) at `target`.
    pub fn set_link(&mut self, source: NodeId, key: ParamKey, target: NodeId) {
        self.remove_link(key);
        if let (Some(s), Some(t)) = (self.ix(source), self.ix(target)) {
            let edge = self.graph.add_edge(s, t, GenomeEdge::Link { key });
            self.links.insert(key, edge);
        }
    }

    pub fn remove_link(&mut self, key: ParamKey) {
        if let Some(edge) = self.links.remove(&key) {
            self.graph.remove_edge(edge);
        }
    }

    pub fn link_target(&self, key: ParamKey) -> Option<NodeId> {
        let edge = self.links.get(&key)?;
        self.graph
            .edge_endpoints(*edge)
            .map(|(_, target)| self.id_at(target))
    }

    /// Links pointing at `node`, as `(source, key)`, by ascending key.
    pub fn links_into(&self, node: NodeId) -> Vec<(NodeId, ParamKey)> {
        let Some(ix) = self.ix(node) else {
            return Vec::new();
        };
        let mut links: Vec<(NodeId, ParamKey)> = self
            .graph
            .edges_directed(ix, Incoming)
            .filter_map(|e| match *e.weight() {
                GenomeEdge::Link { key } => Some((self.id_at(e.source()), key)),
                GenomeEdge::Framework { .. } => None,
            })
            .collect();
        links.sort_by_key(|(_, key)| *key);
        links
    }

    /// Framework children of `node`, in order.
    pub fn successors(&self, node: NodeId) -> Vec<NodeId> {
        let Some(ix) = self.ix(node) else {
            return Vec::new();
        };
        let mut children: Vec<(u64, NodeId)> = self
            .graph
            .edges_directed(ix, Outgoing)
            .filter_map(|e| match *e.weight() {
                GenomeEdge::Framework { rank } => Some((rank, self.id_at(e.target()))),
                GenomeEdge::Link { .. } => None,
            })
            .collect();
        children.sort_unstable();
        children.into_iter().map(|(_, child)| child).collect()
    }

    pub fn predecessor(&self, node: NodeId) -> Option<NodeId> {
        let ix = self.ix(node)?;
        self.graph
            .edges_directed(ix, Incoming)
            .find(|e| e.weight().kind() == EdgeKind::Framework)
            .map(|e| self.id_at(e.source()))
    }

    /// Framework children of the parent of `node`, `node` included.
    pub fn siblings(&self, node: NodeId) -> Vec<NodeId> {
        self.predecessor(node)
            .map(|parent| self.successors(parent))
            .unwrap_or_default()
    }

    pub fn framework_out_degree(&self, node: NodeId) -> usize {
        self.degree(node, Outgoing, Some(EdgeKind::Framework))
    }

    /// Outgoing edges of any kind.
    pub fn out_degree(&self, node: NodeId) -> usize {
        self.degree(node, Outgoing, None)
    }

    /// Incoming edges of any kind.
    pub fn in_degree(&self, node: NodeId) -> usize {
        self.degree(node, Incoming, None)
    }

    pub fn link_in_degree(&self, node: NodeId) -> usize {
        self.degree(node, Incoming, Some(EdgeKind::Link))
    }

    /// Rewrite the order of the framework children of `parent`; `order` must
    /// be a permutation of the current children.
    pub fn set_successors(&mut self, parent: NodeId, order: &[NodeId]) -> Result<()> {
        let mut current = self.successors(parent);
        let mut wanted = order.to_vec();
        current.sort();
        wanted.sort();
        if current != wanted {
            return Err(EvoError::Invariant(format!(
                "new successor order of {} is not a permutation of its children",
                parent
            )));
        }
        let Some(ix) = self.ix(parent) else {
            return Ok(());
        };
        let stale: Vec<EdgeIndex> = self
            .graph
            .edges_directed(ix, Outgoing)
            .filter(|e| e.weight().kind() == EdgeKind::Framework)
            .map(|e| e.id())
            .collect();
        for edge in stale {
            self.graph.remove_edge(edge);
        }
        for child in order {
            self.add_framework_edge(parent, *child);
        }
        Ok(())
    }

    /// Replace `old` with `new` in the framework children of `parent`,
    /// keeping its position.
    pub fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) -> Result<()> {
        let (edge, rank) = self
            .framework_edge(parent, old)
            .ok_or_else(|| EvoError::Invariant(format!("{} is not a child of {}", old, parent)))?;
        let (Some(source), Some(target)) = (self.ix(parent), self.ix(new)) else {
            return Err(EvoError::Invariant(format!("{} is not in the genome", new)));
        };
        self.graph.remove_edge(edge);
        self.graph.add_edge(source, target, GenomeEdge::Framework { rank });
        Ok(())
    }

    pub fn count_instances(&self, element: ElementId) -> usize {
        self.nodes().filter(|(_, d)| d.element == element).count()
    }

    // Parameters

    /// Observable value: stored value, shared value, or link target.
    pub fn parameter_value(&self, node: NodeId, name: &str) -> Option<Value> {
        let parameter = self.node(node)?.parameters.get(name)?;
        if parameter.is_structural() {
            return self.link_target(parameter.key).map(Value::Node);
        }
        match parameter.shared_id() {
            Some(id) => self.shared_values.get(&id).cloned(),
            None => parameter.value.clone(),
        }
    }

    pub fn set_parameter_value(&mut self, node: NodeId, name: &str, value: Value) {
        if let Some(parameter) = self.node_mut(node).and_then(|d| d.parameters.get_mut(name)) {
            parameter.value = Some(value);
        }
    }

    /// Every `(node, parameter name)` pair, nodes in framework preorder.
    pub fn parameter_slots(&self) -> Vec<(NodeId, String)> {
        self.dfs_preorder()
            .into_iter()
            .filter_map(|n| self.node(n).map(|d| (n, d)))
            .flat_map(|(n, d)| d.parameters.keys().map(move |name| (n, name.clone())))
            .collect()
    }

    pub fn shared_value(&self, id: SharedId) -> Option<&Value> {
        self.shared_values.get(&id)
    }

    pub fn set_shared_value(&mut self, id: SharedId, value: Value) {
        self.shared_values.insert(id, value);
    }

    /// The owner of a shared parameter is its oldest live instance.
    pub fn shared_owner(&self, id: SharedId) -> Option<ParamKey> {
        self.nodes()
            .flat_map(|(_, d)| d.parameters.values())
            .filter(|p| p.shared_id() == Some(id))
            .map(|p| p.key)
            .min()
    }

    // Traversal

    /// Framework preorder starting at `NODE_ZERO`.
    pub fn dfs_preorder(&self) -> Vec<NodeId> {
        self.subtree(NODE_ZERO)
    }

    /// Framework preorder of the subtree rooted at `root`.
    pub fn subtree(&self, root: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if !self.contains(node) || !seen.insert(node) {
                continue;
            }
            order.push(node);
            stack.extend(self.successors(node).into_iter().rev());
        }
        order
    }

    /// Fails unless the framework edges form a tree rooted at `NODE_ZERO`
    /// and spanning every node.
    pub fn check_tree(&self) -> Result<()> {
        let zero = self
            .ix(NODE_ZERO)
            .ok_or_else(|| EvoError::NotATree("NODE_ZERO is missing".to_string()))?;

        for (id, ix) in &self.index {
            let incoming = self
                .graph
                .edges_directed(*ix, Incoming)
                .filter(|e| e.weight().kind() == EdgeKind::Framework)
                .count();
            let expected = if *id == NODE_ZERO { 0 } else { 1 };
            if incoming != expected {
                return Err(EvoError::NotATree(format!(
                    "{} has {} incoming framework edges",
                    id, incoming
                )));
            }
        }

        let framework = EdgeFiltered::from_fn(&self.graph, |e: EdgeReference<'_, GenomeEdge>| {
            e.weight().kind() == EdgeKind::Framework
        });
        let mut reached = 0;
        let mut bfs = Bfs::new(&framework, zero);
        while bfs.next(&framework).is_some() {
            reached += 1;
        }
        if reached != self.index.len() {
            return Err(EvoError::NotATree(format!(
                "{} of {} nodes unreachable from NODE_ZERO",
                self.index.len().saturating_sub(reached),
                self.index.len()
            )));
        }
        Ok(())
    }

    /// Graph-only invariants: framework tree, one link per structural
    /// parameter, every link owned by the node holding the parameter.
    pub fn check_structure(&self) -> Result<()> {
        self.check_tree()?;

        let mut link_keys = BTreeSet::new();
        for edge in self.graph.edge_references() {
            let GenomeEdge::Link { key } = *edge.weight() else {
                continue;
            };
            if !link_keys.insert(key) || self.links.get(&key) != Some(&edge.id()) {
                return Err(EvoError::Invariant(format!("duplicate link key {}", key)));
            }
            let owned = self.graph[edge.source()]
                .data
                .parameters
                .values()
                .any(|p| p.key == key && p.is_structural());
            if !owned {
                return Err(EvoError::Invariant(format!(
                    "link {} is not fastened to a structural parameter of {}",
                    key,
                    self.id_at(edge.source())
                )));
            }
        }

        let structural_keys: BTreeSet<ParamKey> = self
            .nodes()
            .flat_map(|(_, d)| d.parameters.values())
            .filter(|p| p.is_structural())
            .map(|p| p.key)
            .collect();
        if structural_keys != link_keys {
            return Err(EvoError::Invariant(format!(
                "{} structural parameters but {} links",
                structural_keys.len(),
                link_keys.len()
            )));
        }
        Ok(())
    }

    /// Structural invariants plus agreement between node kinds, elements and
    /// declared parameters.
    pub fn check_invariants(&self, grammar: &Grammar) -> Result<()> {
        self.check_structure()?;
        for (id, data) in self.nodes() {
            let is_macro = grammar.is_macro(data.element);
            if grammar.element(data.element).is_none()
                || (data.kind == NodeKind::Macro) != is_macro
            {
                return Err(EvoError::Invariant(format!(
                    "{} is tagged {:?} but holds {}",
                    id,
                    data.kind,
                    grammar.name(data.element)
                )));
            }
            if let Some(def) = grammar.macro_def(data.element) {
                let declared = def.parameters.iter().map(|(n, _)| n);
                if !declared.eq(data.parameters.keys()) {
                    return Err(EvoError::Invariant(format!(
                        "{} does not carry the parameters declared by {}",
                        id, def.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Remove every node not connected to the main tree.
    ///
    /// Connectivity ignores edge direction and disregards `NODE_ZERO` except
    /// for its first child, so frames hanging off `NODE_ZERO` survive only if
    /// something links into them.
    pub fn discard_useless_components(&mut self) -> usize {
        let Some(anchor) = self.successors(NODE_ZERO).first().copied() else {
            return 0;
        };
        let (Some(zero), Some(anchor)) = (self.ix(NODE_ZERO), self.ix(anchor)) else {
            return 0;
        };

        let mut keep: HashSet<NodeIndex> = [zero, anchor].into_iter().collect();
        let mut queue = VecDeque::from([anchor]);
        while let Some(ix) = queue.pop_front() {
            for next in self.graph.neighbors_undirected(ix) {
                if keep.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        let useless: Vec<NodeId> = self
            .index
            .iter()
            .filter(|(_, ix)| !keep.contains(ix))
            .map(|(id, _)| *id)
            .collect();
        for node in &useless {
            self.remove_node(*node);
        }
        self.retain_live_shared_values();
        useless.len()
    }

    /// Copy the subtree rooted at `root` of `other` into this genome with
    /// fresh node ids and parameter keys. The copy is left detached.
    pub fn copy_subtree_from(&mut self, other: &Genome, root: NodeId) -> Result<SubtreeCopy> {
        let nodes = other.subtree(root);
        if nodes.is_empty() {
            return Err(EvoError::Invariant(format!("{} is not in the source genome", root)));
        }
        let mapping: BTreeMap<NodeId, NodeId> = nodes.iter().map(|n| (*n, Ids::node())).collect();

        let mut dangling = Vec::new();
        let mut links = Vec::new();
        for old in &nodes {
            let Some(data) = other.node(*old) else { continue };
            let new = mapping[old];
            let mut copy = data.clone();
            for (name, parameter) in copy.parameters.iter_mut() {
                let old_key = parameter.key;
                parameter.key = Ids::key();
                if parameter.is_structural() {
                    match other.link_target(old_key).and_then(|t| mapping.get(&t)) {
                        Some(target) => links.push((new, parameter.key, *target)),
                        None => dangling.push((new, name.clone())),
                    }
                }
                if let Some(id) = parameter.shared_id() {
                    if !self.shared_values.contains_key(&id) {
                        if let Some(value) = other.shared_value(id) {
                            self.shared_values.insert(id, value.clone());
                        }
                    }
                }
            }
            self.add_node(new, copy);
        }
        for old in &nodes {
            for child in other.successors(*old) {
                if let Some(new_child) = mapping.get(&child) {
                    self.add_framework_edge(mapping[old], *new_child);
                }
            }
        }
        for (source, key, target) in links {
            self.set_link(source, key, target);
        }

        Ok(SubtreeCopy {
            root: mapping[&root],
            mapping,
            dangling,
        })
    }

    /// Remove the subtree rooted at `root` and return the removed ids.
    pub fn remove_subtree(&mut self, root: NodeId) -> Vec<NodeId> {
        let doomed = self.subtree(root);
        for node in &doomed {
            self.remove_node(*node);
        }
        self.retain_live_shared_values();
        doomed
    }

    /// Copy with nodes renumbered `0, 1, 2, ...` in framework preorder.
    ///
    /// Two genomes with the same structure and values have identical
    /// canonical forms, whatever ids they were built with.
    pub fn canonical(&self) -> Genome {
        let order = self.dfs_preorder();
        let mapping: BTreeMap<NodeId, NodeId> = order
            .iter()
            .enumerate()
            .map(|(i, n)| (*n, NodeId(i as u64)))
            .collect();
        let remap = |n: NodeId| mapping.get(&n).copied().unwrap_or(n);

        let mut canonical = Genome {
            graph: StableGraph::with_capacity(self.graph.node_count(), self.graph.edge_count()),
            index: BTreeMap::new(),
            links: BTreeMap::new(),
            next_rank: 0,
            shared_values: self.shared_values.clone(),
        };
        let unreachable = self.index.keys().filter(|n| !mapping.contains_key(n));
        let parents: Vec<NodeId> = order.iter().chain(unreachable).copied().collect();
        for node in &parents {
            if let Some(data) = self.node(*node) {
                canonical.add_node(remap(*node), data.clone());
            }
        }
        for node in &parents {
            for child in self.successors(*node) {
                canonical.add_framework_edge(remap(*node), remap(child));
            }
        }
        for (key, edge) in &self.links {
            if let Some((source, target)) = self.graph.edge_endpoints(*edge) {
                canonical.set_link(remap(self.id_at(source)), *key, remap(self.id_at(target)));
            }
        }
        canonical
    }

    /// Content signature of one node, used for diversity measures.
    pub fn node_signature(&self, node: NodeId, grammar: &Grammar) -> u64 {
        let mut hasher = DefaultHasher::new();
        let Some(data) = self.node(node) else {
            return 0;
        };
        grammar.signature(data.element).hash(&mut hasher);
        for name in data.parameters.keys() {
            name.hash(&mut hasher);
            match self.parameter_value(node, name) {
                // link targets are identified by what they hold, not by id
                Some(Value::Node(target)) => grammar
                    .name(self.element_of(target).unwrap_or(MACRO_ZERO))
                    .hash(&mut hasher),
                Some(value) => value.to_string().hash(&mut hasher),
                None => 0u8.hash(&mut hasher),
            }
        }
        hasher.finish()
    }

    fn ix(&self, node: NodeId) -> Option<NodeIndex> {
        self.index.get(&node).copied()
    }

    fn id_at(&self, ix: NodeIndex) -> NodeId {
        self.graph[ix].id
    }

    fn take_rank(&mut self) -> u64 {
        self.next_rank += 1;
        self.next_rank
    }

    fn framework_edge(&self, source: NodeId, target: NodeId) -> Option<(EdgeIndex, u64)> {
        let (s, t) = (self.ix(source)?, self.ix(target)?);
        self.graph
            .edges_directed(s, Outgoing)
            .find_map(|e| match *e.weight() {
                GenomeEdge::Framework { rank } if e.target() == t => Some((e.id(), rank)),
                _ => None,
            })
    }

    fn degree(&self, node: NodeId, direction: petgraph::Direction, kind: Option<EdgeKind>) -> usize {
        self.ix(node).map_or(0, |ix| {
            self.graph
                .edges_directed(ix, direction)
                .filter(|e| kind.map_or(true, |k| e.weight().kind() == k))
                .count()
        })
    }

    fn retain_live_shared_values(&mut self) {
        let live: BTreeSet<SharedId> = self
            .nodes()
            .flat_map(|(_, d)| d.parameters.values())
            .filter_map(Parameter::shared_id)
            .collect();
        self.shared_values.retain(|id, _| live.contains(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(element: usize) -> NodeData {
        NodeData {
            kind: NodeKind::Frame,
            element: ElementId(element),
            parameters: BTreeMap::new(),
        }
    }

    /// NODE_ZERO -> a -> (b, c)
    fn small_tree() -> (Genome, NodeId, NodeId, NodeId) {
        let mut genome = Genome::new();
        let (a, b, c) = (Ids::node(), Ids::node(), Ids::node());
        genome.add_node(a, frame(1));
        genome.add_node(b, frame(2));
        genome.add_node(c, frame(2));
        genome.add_framework_edge(NODE_ZERO, a);
        genome.add_framework_edge(a, b);
        genome.add_framework_edge(a, c);
        (genome, a, b, c)
    }

    #[test]
    fn test_tree_is_valid() {
        let (genome, a, b, c) = small_tree();
        assert!(genome.check_tree().is_ok());
        assert_eq!(genome.dfs_preorder(), vec![NODE_ZERO, a, b, c]);
        assert_eq!(genome.siblings(c), vec![b, c]);
        assert_eq!(genome.predecessor(b), Some(a));
        assert_eq!(genome.framework_out_degree(a), 2);
    }

    #[test]
    fn test_orphan_is_not_a_tree() {
        let (mut genome, _, _, _) = small_tree();
        genome.add_node(Ids::node(), frame(2));
        assert!(matches!(genome.check_tree(), Err(EvoError::NotATree(_))));
    }

    #[test]
    fn test_two_parents_is_not_a_tree() {
        let (mut genome, _, b, c) = small_tree();
        genome.add_framework_edge(b, c);
        assert!(genome.check_tree().is_err());
    }

    #[test]
    fn test_set_successors_reorders() {
        let (mut genome, a, b, c) = small_tree();
        genome.set_successors(a, &[c, b]).unwrap();
        assert_eq!(genome.successors(a), vec![c, b]);
        assert!(genome.set_successors(a, &[c]).is_err());
    }

    #[test]
    fn test_discard_useless_components() {
        let (mut genome, _, _, _) = small_tree();
        // detached subtree hanging off NODE_ZERO with nothing linking into it
        let lonely = Ids::node();
        let leaf = Ids::node();
        genome.add_node(lonely, frame(1));
        genome.add_node(leaf, frame(2));
        genome.add_framework_edge(NODE_ZERO, lonely);
        genome.add_framework_edge(lonely, leaf);

        assert_eq!(genome.discard_useless_components(), 2);
        assert!(!genome.contains(lonely) && !genome.contains(leaf));
        assert_eq!(genome.node_count(), 4);
    }

    #[test]
    fn test_canonical_is_id_independent() {
        let (first, _, _, _) = small_tree();
        let (second, _, _, _) = small_tree();
        let c1 = first.canonical();
        let c2 = second.canonical();
        assert_eq!(c1.dfs_preorder(), c2.dfs_preorder());
        assert_eq!(c1.edges(), c2.edges());
    }

    #[test]
    fn test_replace_child_keeps_position() {
        let (mut genome, a, b, c) = small_tree();
        let d = Ids::node();
        genome.add_node(d, frame(2));
        genome.replace_child(a, b, d).unwrap();
        genome.remove_node(b);
        assert_eq!(genome.successors(a), vec![d, c]);
        assert!(genome.check_tree().is_ok());
        assert!(genome.replace_child(a, b, d).is_err());
    }

    #[test]
    fn test_degrees_count_links() {
        let (mut genome, a, b, c) = small_tree();
        let key = Ids::key();
        genome.set_link(b, key, c);
        assert_eq!(genome.link_target(key), Some(c));
        assert_eq!(genome.links_into(c), vec![(b, key)]);
        assert_eq!(genome.in_degree(c), 2);
        assert_eq!(genome.link_in_degree(c), 1);
        assert_eq!(genome.out_degree(b), 1);
        assert_eq!(genome.framework_out_degree(b), 0);

        genome.set_link(b, key, a);
        assert_eq!(genome.link_in_degree(c), 0);
        assert_eq!(genome.edge_count(), 4);

        genome.remove_node(a);
        assert_eq!(genome.link_target(key), None);
    }

    #[test]
    fn test_deep_chain_preorder() {
        let mut genome = Genome::new();
        let mut parent = NODE_ZERO;
        let mut chain = vec![NODE_ZERO];
        for _ in 0..2000 {
            let node = Ids::node();
            genome.add_node(node, frame(1));
            genome.add_framework_edge(parent, node);
            chain.push(node);
            parent = node;
        }
        assert_eq!(genome.dfs_preorder(), chain);
        assert!(genome.check_tree().is_ok());
        assert_eq!(genome.remove_subtree(chain[1]).len(), 2000);
        assert_eq!(genome.node_count(), 1);
    }

    #[test]
    fn test_copy_subtree_uses_fresh_ids() {
        let (source, a, _, _) = small_tree();
        let mut target = Genome::new();
        let copy = target.copy_subtree_from(&source, a).unwrap();
        target.add_framework_edge(NODE_ZERO, copy.root);

        assert_eq!(target.node_count(), 4);
        assert!(copy.mapping.values().all(|n| !source.contains(*n)));
        assert!(copy.dangling.is_empty());
        assert!(target.check_tree().is_ok());
    }
}
