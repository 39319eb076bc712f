use crate::engines::evaluation::fitness::Fitness;
use crate::engines::evaluation::render::{render, RenderOptions};
use crate::engines::generation::genome::Genome;
use crate::engines::generation::grammar::{ElementId, Grammar};
use crate::engines::generation::node_view::NodeView;
use crate::engines::generation::unroll::unroll_into;
use crate::error::{EvoError, OperatorResult, Result};
use crate::random::Randy;
use crate::types::{Ids, IndividualId, NODE_ZERO};
use log::debug;
use std::collections::BTreeSet;
use std::fmt;

/// Operator that produced an individual and the ids of its parents.
///
/// Parents are referenced by id only; they may have left the population.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lineage {
    pub operator: Option<String>,
    pub parents: Vec<IndividualId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Age {
    /// Generation in which the individual entered the population.
    pub birth: usize,
    /// Generations survived since then (or since the last reset).
    pub apparent_age: u64,
}

/// How an offspring compares with its parents once evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Dominates at least one parent.
    Success,
    /// Dominated by at least one parent.
    Failure,
    Neutral,
}

impl Outcome {
    pub fn assess(fitness: &Fitness, parents: &[&Fitness]) -> Outcome {
        if parents.iter().any(|p| fitness.is_dominant(p)) {
            Outcome::Success
        } else if parents.iter().any(|p| p.is_dominant(fitness)) {
            Outcome::Failure
        } else {
            Outcome::Neutral
        }
    }
}

#[derive(Debug, Clone)]
pub struct Individual {
    pub id: IndividualId,
    pub top_frame: ElementId,
    pub genome: Genome,
    pub lineage: Lineage,
    pub age: Age,
    fitness: Option<Fitness>,
}

impl Individual {
    pub fn new(top_frame: ElementId, genome: Genome) -> Self {
        Self {
            id: Ids::individual(),
            top_frame,
            genome,
            lineage: Lineage::default(),
            age: Age::default(),
            fitness: None,
        }
    }

    /// One attempt at a fresh random individual rooted at `top_frame`.
    pub fn random(grammar: &Grammar, top_frame: ElementId, rng: &mut Randy) -> OperatorResult<Self> {
        let mut genome = Genome::new();
        unroll_into(&mut genome, grammar, top_frame, NODE_ZERO, None, rng)?;
        genome.discard_useless_components();
        Ok(Self::new(top_frame, genome))
    }

    /// Unfinalized copy with a new id, ready to be modified by an operator.
    pub fn clone_for_offspring(&self) -> Self {
        Self::new(self.top_frame, self.genome.clone())
    }

    pub fn fitness(&self) -> Option<&Fitness> {
        self.fitness.as_ref()
    }

    pub fn is_finalized(&self) -> bool {
        self.fitness.is_some()
    }

    /// Finalize the individual; a fitness can be assigned only once.
    pub fn set_fitness(&mut self, fitness: Fitness) -> Result<()> {
        if let Some(current) = &self.fitness {
            return Err(EvoError::Fitness(format!(
                "{} already finalized with fitness {}",
                self.id, current
            )));
        }
        debug!("Fitness of {} is {}", self.id, fitness);
        self.fitness = Some(fitness);
        Ok(())
    }

    /// Genome invariants plus every element check.
    pub fn validate(&self, grammar: &Grammar) -> Result<()> {
        self.genome.check_invariants(grammar)?;
        for (node, _) in self.genome.nodes() {
            if node == NODE_ZERO {
                continue;
            }
            let view = NodeView::new(&self.genome, grammar, node);
            if !grammar.check_node(&view) {
                return Err(EvoError::Invariant(format!(
                    "{} ({}) fails the checks of its element",
                    node,
                    view.name()
                )));
            }
        }
        Ok(())
    }

    pub fn is_valid(&self, grammar: &Grammar) -> bool {
        self.validate(grammar).is_ok()
    }

    /// Set of node signatures, the "message" used for population entropy.
    pub fn message(&self, grammar: &Grammar) -> BTreeSet<u64> {
        self.genome
            .dfs_preorder()
            .into_iter()
            .filter(|n| *n != NODE_ZERO)
            .map(|n| self.genome.node_signature(n, grammar))
            .collect()
    }

    pub fn phenotype(&self, grammar: &Grammar, options: &RenderOptions) -> Result<String> {
        render(&self.genome, grammar, options)
    }

    /// One-line summary.
    pub fn describe(&self, include_lineage: bool) -> String {
        let mut line = format!("{}", self.id);
        match &self.fitness {
            Some(fitness) => line.push_str(&format!(" fitness: {}", fitness)),
            None => line.push_str(" (not evaluated)"),
        }
        line.push_str(&format!(
            " [{} nodes, born gen {}, age {}]",
            self.genome.node_count(),
            self.age.birth,
            self.age.apparent_age
        ));
        if include_lineage {
            if let Some(operator) = &self.lineage.operator {
                let parents: Vec<String> = self.lineage.parents.iter().map(|p| p.to_string()).collect();
                line.push_str(&format!(" <- {}({})", operator, parents.join(", ")));
            }
        }
        line
    }
}

impl fmt::Display for Individual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe(false))
    }
}
