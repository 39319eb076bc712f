//! Grammar expansion ("unroll").
//!
//! Unrolling instantiates an element into fresh graph nodes, attaches the new
//! subtree and gives every parameter a first random value. The operation is
//! all-or-nothing: it works on a scratch copy of the genome and commits only
//! when every structural parameter found a target.

use crate::engines::generation::genome::{Genome, NodeData, NodeKind};
use crate::engines::generation::grammar::{ElementId, Grammar, SElement};
use crate::engines::generation::parameter::{mutate_parameter, Parameter};
use crate::error::{OperatorAbort, OperatorResult};
use crate::random::Randy;
use crate::types::{Ids, NodeId};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Maximum nesting of frames in one expansion.
pub const MAX_UNROLL_DEPTH: usize = 256;

/// Maximum nesting of unrolls triggered by structural parameters while
/// initializing another unroll.
pub const MAX_NESTED_UNROLLS: usize = 32;

thread_local! {
    static NESTING: Cell<usize> = Cell::new(0);
}

struct NestingGuard;

impl NestingGuard {
    fn enter() -> OperatorResult<Self> {
        NESTING.with(|level| {
            let next = level.get() + 1;
            if next > MAX_NESTED_UNROLLS {
                return Err(OperatorAbort::DepthExceeded(MAX_NESTED_UNROLLS));
            }
            level.set(next);
            Ok(NestingGuard)
        })
    }
}

impl Drop for NestingGuard {
    fn drop(&mut self) {
        NESTING.with(|level| level.set(level.get().saturating_sub(1)));
    }
}

/// Expand `element`, attach it under `parent` (at `position`, or last) and
/// initialize it. Returns the root of the new subtree.
///
/// On failure `genome` is untouched.
pub fn unroll_into(
    genome: &mut Genome,
    grammar: &Grammar,
    element: ElementId,
    parent: NodeId,
    position: Option<usize>,
    rng: &mut Randy,
) -> OperatorResult<NodeId> {
    let _guard = NestingGuard::enter()?;

    let mut scratch = genome.clone();
    let (root, created) = unroll_selement(&mut scratch, grammar, element, rng)?;

    let mut order = scratch.successors(parent);
    let position = position.unwrap_or(order.len()).min(order.len());
    order.insert(position, root);
    scratch.add_framework_edge(parent, root);
    scratch
        .set_successors(parent, &order)
        .map_err(|e| OperatorAbort::InvalidOffspring(e.to_string()))?;

    initialize_subtree(&mut scratch, grammar, &created, rng)?;

    *genome = scratch;
    Ok(root)
}

/// Create the nodes and framework edges for `element` without attaching or
/// initializing them. Returns the root and every created node in preorder.
pub fn unroll_selement(
    genome: &mut Genome,
    grammar: &Grammar,
    element: ElementId,
    rng: &mut Randy,
) -> OperatorResult<(NodeId, Vec<NodeId>)> {
    let mut created = Vec::new();
    let root = expand(genome, grammar, element, 0, rng, &mut created)?;
    Ok((root, created))
}

fn expand(
    genome: &mut Genome,
    grammar: &Grammar,
    element: ElementId,
    depth: usize,
    rng: &mut Randy,
    created: &mut Vec<NodeId>,
) -> OperatorResult<NodeId> {
    if depth > MAX_UNROLL_DEPTH {
        return Err(OperatorAbort::DepthExceeded(MAX_UNROLL_DEPTH));
    }
    let node = Ids::node();
    match grammar.element(element) {
        Some(SElement::Macro(def)) => {
            let parameters = def
                .parameters
                .iter()
                .map(|(name, spec)| (name.clone(), Parameter::new(Arc::clone(spec))))
                .collect();
            genome.add_node(
                node,
                NodeData {
                    kind: NodeKind::Macro,
                    element,
                    parameters,
                },
            );
            created.push(node);
        }
        Some(SElement::Frame(_)) => {
            genome.add_node(
                node,
                NodeData {
                    kind: NodeKind::Frame,
                    element,
                    parameters: BTreeMap::new(),
                },
            );
            created.push(node);
            for child in grammar.successors(element, rng) {
                let child_node = expand(genome, grammar, child, depth + 1, rng, created)?;
                genome.add_framework_edge(node, child_node);
            }
        }
        None => return Err(OperatorAbort::NoCandidates),
    }
    Ok(node)
}

/// Structural parameters of `nodes`, bound to the node holding them.
///
/// Run only once the whole subtree exists: a reference may target any node
/// created alongside it.
pub fn fasten_subtree(genome: &Genome, nodes: &[NodeId]) -> Vec<(NodeId, String)> {
    nodes
        .iter()
        .filter_map(|n| genome.node(*n).map(|d| (*n, d)))
        .flat_map(|(n, d)| {
            d.parameters
                .iter()
                .filter(|(_, p)| p.is_structural())
                .map(move |(name, _)| (n, name.clone()))
        })
        .collect()
}

/// Give every parameter of `nodes` its first value: value parameters first,
/// then the fastened structural ones.
pub fn initialize_subtree(
    genome: &mut Genome,
    grammar: &Grammar,
    nodes: &[NodeId],
    rng: &mut Randy,
) -> OperatorResult<()> {
    let values: Vec<(NodeId, String)> = nodes
        .iter()
        .filter_map(|n| genome.node(*n).map(|d| (*n, d)))
        .flat_map(|(n, d)| {
            d.parameters
                .iter()
                .filter(|(_, p)| !p.is_structural())
                .map(move |(name, _)| (n, name.clone()))
        })
        .collect();
    for (node, name) in values {
        mutate_parameter(genome, grammar, node, &name, 1.0, rng)?;
    }

    for (node, name) in fasten_subtree(genome, nodes) {
        mutate_parameter(genome, grammar, node, &name, 1.0, rng)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::generation::grammar::{GrammarBuilder, Symbol};
    use crate::engines::generation::parameter::ParameterSpec;
    use crate::types::NODE_ZERO;

    #[test]
    fn test_unroll_builds_valid_tree() {
        let mut builder = GrammarBuilder::new();
        let a = builder.add_macro("a", "a {v}", [("v", ParameterSpec::float(0.0, 1.0))]);
        let body = builder.add_bunch("body", &[a], 2..6);
        let top = builder.add_sequence("top", &[a, body]);
        let grammar = builder.build().unwrap();

        let mut rng = Randy::new(42);
        let mut genome = Genome::new();
        let root = unroll_into(&mut genome, &grammar, top, NODE_ZERO, None, &mut rng).unwrap();

        assert_eq!(genome.successors(NODE_ZERO), vec![root]);
        assert!(genome.check_invariants(&grammar).is_ok());
        for (node, name) in genome.parameter_slots() {
            assert!(genome.parameter_value(node, &name).is_some());
        }
    }

    #[test]
    fn test_failed_unroll_leaves_genome_untouched() {
        let mut builder = GrammarBuilder::new();
        let ret = builder.add_macro("ret", "ret", Vec::<(&str, ParameterSpec)>::new());
        builder.add_sequence("sub", &[ret]);
        let call = builder.add_macro(
            "call",
            "call {t}",
            [(
                "t",
                ParameterSpec::global_reference("sub", false, crate::engines::generation::parameter::CreativeZeal::Never),
            )],
        );
        let top = builder.add_sequence("top", &[call]);
        let grammar = builder.build().unwrap();

        let mut rng = Randy::new(1);
        let mut genome = Genome::new();
        assert!(unroll_into(&mut genome, &grammar, top, NODE_ZERO, None, &mut rng).is_err());
        assert_eq!(genome.node_count(), 1);
        assert_eq!(genome.edge_count(), 0);
    }

    #[test]
    fn test_unbounded_recursion_is_cut() {
        let mut builder = GrammarBuilder::new();
        let x = builder.add_macro("x", "x", Vec::<(&str, ParameterSpec)>::new());
        let forever = builder.add_bnf("forever", &[vec![Symbol::Element(x), Symbol::SelfRef]]);
        let grammar = builder.build().unwrap();

        let mut rng = Randy::new(1);
        let mut genome = Genome::new();
        assert_eq!(
            unroll_into(&mut genome, &grammar, forever, NODE_ZERO, None, &mut rng),
            Err(OperatorAbort::DepthExceeded(MAX_UNROLL_DEPTH))
        );
    }

    #[test]
    fn test_insert_position() {
        let mut builder = GrammarBuilder::new();
        let a = builder.add_macro("a", "a", Vec::<(&str, ParameterSpec)>::new());
        let top = builder.add_sequence("top", &[a, a]);
        let grammar = builder.build().unwrap();

        let mut rng = Randy::new(1);
        let mut genome = Genome::new();
        let root = unroll_into(&mut genome, &grammar, top, NODE_ZERO, None, &mut rng).unwrap();
        let new = unroll_into(&mut genome, &grammar, a, root, Some(1), &mut rng).unwrap();
        assert_eq!(genome.successors(root)[1], new);
        assert_eq!(genome.successors(root).len(), 3);
    }
}
