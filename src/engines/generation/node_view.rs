use crate::engines::generation::genome::{Genome, NodeKind};
use crate::engines::generation::grammar::{ElementId, Grammar};
use crate::types::{NodeId, Value, NODE_ZERO};
use std::fmt;

/// Read-only handle to one node of a genome.
///
/// Views borrow the genome, so they cannot outlive a mutation; every
/// property is computed on access.
#[derive(Clone, Copy)]
pub struct NodeView<'a> {
    genome: &'a Genome,
    grammar: &'a Grammar,
    node: NodeId,
}

impl<'a> NodeView<'a> {
    pub fn new(genome: &'a Genome, grammar: &'a Grammar, node: NodeId) -> Self {
        Self { genome, grammar, node }
    }

    pub fn id(&self) -> NodeId {
        self.node
    }

    pub fn genome(&self) -> &'a Genome {
        self.genome
    }

    pub fn grammar(&self) -> &'a Grammar {
        self.grammar
    }

    pub fn element(&self) -> Option<ElementId> {
        self.genome.element_of(self.node)
    }

    pub fn kind(&self) -> Option<NodeKind> {
        self.genome.node(self.node).map(|d| d.kind)
    }

    /// Name of the grammar element held by the node.
    pub fn name(&self) -> &'a str {
        self.element().map_or("?", |e| self.grammar.name(e))
    }

    /// Node ids from `NODE_ZERO` down to this node along framework edges.
    pub fn path(&self) -> Vec<NodeId> {
        let mut path = vec![self.node];
        let mut current = self.node;
        while current != NODE_ZERO {
            match self.genome.predecessor(current) {
                Some(parent) if !path.contains(&parent) => {
                    path.push(parent);
                    current = parent;
                }
                _ => break,
            }
        }
        path.reverse();
        path
    }

    /// Dotted path below `NODE_ZERO`, e.g. `n3.n7.n9`.
    pub fn pathname(&self) -> String {
        self.path()
            .iter()
            .skip(1)
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn successors(&self) -> Vec<NodeId> {
        self.genome.successors(self.node)
    }

    pub fn predecessor(&self) -> Option<NodeId> {
        self.genome.predecessor(self.node)
    }

    pub fn siblings(&self) -> Vec<NodeId> {
        self.genome.siblings(self.node)
    }

    pub fn framework_out_degree(&self) -> usize {
        self.genome.framework_out_degree(self.node)
    }

    pub fn out_degree(&self) -> usize {
        self.genome.out_degree(self.node)
    }

    pub fn in_degree(&self) -> usize {
        self.genome.in_degree(self.node)
    }

    pub fn link_in_degree(&self) -> usize {
        self.genome.link_in_degree(self.node)
    }

    pub fn parameter(&self, name: &str) -> Option<Value> {
        self.genome.parameter_value(self.node, name)
    }

    pub fn view(&self, node: NodeId) -> NodeView<'a> {
        NodeView::new(self.genome, self.grammar, node)
    }
}

impl fmt::Display for NodeView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.node)
    }
}

impl fmt::Debug for NodeView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeView({} {})", self.node, self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::generation::grammar::GrammarBuilder;
    use crate::engines::generation::individual::Individual;
    use crate::engines::generation::parameter::ParameterSpec;
    use crate::random::Randy;

    #[test]
    fn test_view_properties() {
        let mut builder = GrammarBuilder::new();
        let op = builder.add_macro("op", "op {x}", [("x", ParameterSpec::integer(0, 10))]);
        let body = builder.add_sequence("body", &[op, op]);
        let top = builder.add_sequence("top", &[body]);
        let grammar = builder.build().unwrap();

        let mut rng = Randy::new(42);
        let individual = Individual::random(&grammar, top, &mut rng).unwrap();
        let genome = &individual.genome;
        let top_node = genome.successors(NODE_ZERO)[0];
        let body_node = genome.successors(top_node)[0];
        let second = genome.successors(body_node)[1];

        let view = NodeView::new(genome, &grammar, second);
        assert_eq!(view.name(), "op");
        assert_eq!(view.path(), vec![NODE_ZERO, top_node, body_node, second]);
        assert_eq!(view.pathname(), format!("{}.{}.{}", top_node, body_node, second));
        assert_eq!(view.predecessor(), Some(body_node));
        assert_eq!(view.siblings().len(), 2);
        assert_eq!(view.framework_out_degree(), 0);
        assert_eq!(view.in_degree(), 1);
        assert!(view.parameter("x").and_then(|v| v.as_integer()).is_some());
        assert_eq!(view.view(body_node).framework_out_degree(), 2);
    }
}
