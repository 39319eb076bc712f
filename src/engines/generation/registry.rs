//! Operator registry and the uniform wrapper around every genetic operator.

use crate::engines::generation::grammar::{ElementId, Grammar};
use crate::engines::generation::individual::{Individual, Lineage, Outcome};
use crate::engines::generation::monitor::FailureRate;
use crate::engines::generation::operators;
use crate::error::{EvoError, OperatorResult, Result};
use crate::random::Randy;
use log::{debug, info};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Creates individuals from scratch.
    Initializer,
    /// Mutation (1) or crossover (2 or more).
    Parents(usize),
}

/// What an operator needs besides its parents.
#[derive(Debug, Clone, Copy)]
pub struct OperatorContext<'a> {
    pub grammar: &'a Grammar,
    pub top_frame: ElementId,
    pub strength: f64,
}

pub type OperatorFn =
    Arc<dyn Fn(&[&Individual], &OperatorContext<'_>, &mut Randy) -> OperatorResult<Vec<Individual>> + Send + Sync>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperatorStats {
    pub calls: u64,
    pub aborts: u64,
    /// Valid offspring produced.
    pub offspring: u64,
    /// Offspring discarded by validation.
    pub invalid: u64,
    pub successes: u64,
    pub failures: u64,
}

impl fmt::Display for OperatorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} calls, {} aborted, {} offspring ({} invalid discarded), {} successes, {} failures",
            self.calls, self.aborts, self.offspring, self.invalid, self.successes, self.failures
        )
    }
}

pub struct GeneticOperator {
    pub name: String,
    pub arity: Arity,
    func: OperatorFn,
    pub stats: OperatorStats,
    failure_rate: FailureRate,
}

impl fmt::Debug for GeneticOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneticOperator")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("stats", &self.stats)
            .finish()
    }
}

impl GeneticOperator {
    pub fn new<F>(name: &str, arity: Arity, func: F) -> Self
    where
        F: Fn(&[&Individual], &OperatorContext<'_>, &mut Randy) -> OperatorResult<Vec<Individual>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.to_string(),
            arity,
            func: Arc::new(func),
            stats: OperatorStats::default(),
            failure_rate: FailureRate::default(),
        }
    }

    pub fn is_initializer(&self) -> bool {
        self.arity == Arity::Initializer
    }

    pub fn num_parents(&self) -> usize {
        match self.arity {
            Arity::Initializer => 0,
            Arity::Parents(n) => n,
        }
    }
}

#[derive(Debug, Default)]
pub struct OperatorRegistry {
    operators: Vec<GeneticOperator>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in operator.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(GeneticOperator::new(
            "random_individual",
            Arity::Initializer,
            operators::random_individual,
        ));
        registry.register(GeneticOperator::new(
            "single_parameter_mutation",
            Arity::Parents(1),
            operators::single_parameter_mutation,
        ));
        registry.register(GeneticOperator::new(
            "single_element_array_parameter_mutation",
            Arity::Parents(1),
            operators::single_element_array_parameter_mutation,
        ));
        registry.register(GeneticOperator::new(
            "add_macro_to_bunch",
            Arity::Parents(1),
            operators::add_macro_to_bunch,
        ));
        registry.register(GeneticOperator::new(
            "remove_macro_from_bunch",
            Arity::Parents(1),
            operators::remove_macro_from_bunch,
        ));
        registry.register(GeneticOperator::new(
            "node_swap_crossover",
            Arity::Parents(2),
            operators::node_swap_crossover,
        ));
        registry.register(GeneticOperator::new(
            "linked_node_crossover",
            Arity::Parents(2),
            operators::linked_node_crossover,
        ));
        registry.register(GeneticOperator::new(
            "leaf_crossover",
            Arity::Parents(2),
            operators::leaf_crossover,
        ));
        registry.register(GeneticOperator::new(
            "array_parameter_uniform_crossover",
            Arity::Parents(2),
            operators::array_parameter_uniform_crossover,
        ));
        registry
    }

    /// Add an operator, replacing any operator with the same name.
    pub fn register(&mut self, operator: GeneticOperator) {
        match self.operators.iter_mut().find(|o| o.name == operator.name) {
            Some(existing) => *existing = operator,
            None => self.operators.push(operator),
        }
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&GeneticOperator> {
        self.operators.iter().find(|o| o.name == name)
    }

    pub fn operators(&self) -> &[GeneticOperator] {
        &self.operators
    }

    pub fn initializers(&self) -> impl Iterator<Item = &GeneticOperator> {
        self.operators.iter().filter(|o| o.is_initializer())
    }

    pub fn variation_operators(&self) -> impl Iterator<Item = &GeneticOperator> {
        self.operators.iter().filter(|o| !o.is_initializer())
    }

    /// Run an operator through the wrapper.
    ///
    /// Aborts and invalid offspring are absorbed into the statistics; the
    /// only errors are misuse: unknown operator, wrong number of parents,
    /// or parents built on different top frames.
    pub fn apply(
        &mut self,
        name: &str,
        parents: &[&Individual],
        ctx: &OperatorContext<'_>,
        rng: &mut Randy,
    ) -> Result<Vec<Individual>> {
        let operator = self
            .operators
            .iter_mut()
            .find(|o| o.name == name)
            .ok_or_else(|| EvoError::Operator(format!("unknown operator '{}'", name)))?;

        if parents.len() != operator.num_parents() {
            return Err(EvoError::Operator(format!(
                "{} expects {} parents, got {}",
                name,
                operator.num_parents(),
                parents.len()
            )));
        }
        if parents.iter().any(|p| p.top_frame != ctx.top_frame) {
            return Err(EvoError::Operator(format!(
                "{}: parents do not share the top frame {}",
                name,
                ctx.grammar.name(ctx.top_frame)
            )));
        }

        operator.stats.calls += 1;
        let produced = match (operator.func)(parents, ctx, rng) {
            Ok(offspring) => offspring,
            Err(abort) => {
                debug!("{} aborted: {}", name, abort);
                operator.stats.aborts += 1;
                operator.failure_rate.record(name, true);
                return Ok(Vec::new());
            }
        };

        let lineage = Lineage {
            operator: Some(name.to_string()),
            parents: parents.iter().map(|p| p.id).collect(),
        };
        let mut valid = Vec::with_capacity(produced.len());
        for mut individual in produced {
            individual.genome.discard_useless_components();
            if let Err(e) = individual.validate(ctx.grammar) {
                debug!("{} produced an invalid offspring: {}", name, e);
                operator.stats.invalid += 1;
                continue;
            }
            individual.lineage = lineage.clone();
            valid.push(individual);
        }
        operator.stats.offspring += valid.len() as u64;
        operator.failure_rate.record(name, valid.is_empty());
        Ok(valid)
    }

    /// Credit the operator that produced an offspring once it is evaluated.
    pub fn credit(&mut self, name: &str, outcome: Outcome) {
        if let Some(operator) = self.operators.iter_mut().find(|o| o.name == name) {
            match outcome {
                Outcome::Success => operator.stats.successes += 1,
                Outcome::Failure => operator.stats.failures += 1,
                Outcome::Neutral => {}
            }
        }
    }

    pub fn log_statistics(&self) {
        info!("Genetic operators statistics:");
        for operator in &self.operators {
            info!("* {}: {}", operator.name, operator.stats);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::generation::grammar::GrammarBuilder;
    use crate::engines::generation::parameter::ParameterSpec;
    use crate::error::OperatorAbort;

    fn grammar() -> (Grammar, ElementId) {
        let mut builder = GrammarBuilder::new();
        let m = builder.add_macro("m", "{v}", [("v", ParameterSpec::integer(0, 100))]);
        let top = builder.add_bunch("top", &[m], 1..4);
        (builder.build().unwrap(), top)
    }

    #[test]
    fn test_apply_stamps_lineage() {
        let (grammar, top) = grammar();
        let ctx = OperatorContext { grammar: &grammar, top_frame: top, strength: 1.0 };
        let mut registry = OperatorRegistry::with_defaults();
        let mut rng = Randy::new(42);

        let parent = registry.apply("random_individual", &[], &ctx, &mut rng).unwrap().remove(0);
        assert_eq!(parent.lineage.operator.as_deref(), Some("random_individual"));

        let offspring = registry
            .apply("single_parameter_mutation", &[&parent], &ctx, &mut rng)
            .unwrap();
        assert_eq!(offspring[0].lineage.parents, vec![parent.id]);
        let stats = registry.get("single_parameter_mutation").unwrap().stats;
        assert_eq!((stats.calls, stats.offspring), (1, 1));
    }

    #[test]
    fn test_abort_yields_no_offspring() {
        let (grammar, top) = grammar();
        let ctx = OperatorContext { grammar: &grammar, top_frame: top, strength: 1.0 };
        let mut registry = OperatorRegistry::new();
        registry.register(GeneticOperator::new("always_aborts", Arity::Parents(1), |_, _, _| {
            Err(OperatorAbort::NoCandidates)
        }));
        let mut rng = Randy::new(42);
        let parent = Individual::random(&grammar, top, &mut rng).unwrap();

        assert!(registry.apply("always_aborts", &[&parent], &ctx, &mut rng).unwrap().is_empty());
        assert_eq!(registry.get("always_aborts").unwrap().stats.aborts, 1);
    }

    #[test]
    fn test_invalid_offspring_is_filtered() {
        let (grammar, top) = grammar();
        let ctx = OperatorContext { grammar: &grammar, top_frame: top, strength: 1.0 };
        let mut registry = OperatorRegistry::new();
        registry.register(GeneticOperator::new("breaks_tree", Arity::Parents(1), |parents, _, _| {
            let mut child = parents[0].clone_for_offspring();
            let top_node = child.genome.successors(crate::types::NODE_ZERO)[0];
            for node in child.genome.successors(top_node) {
                child.genome.remove_subtree(node);
            }
            Ok(vec![child])
        }));
        let mut rng = Randy::new(42);
        let parent = Individual::random(&grammar, top, &mut rng).unwrap();

        assert!(registry.apply("breaks_tree", &[&parent], &ctx, &mut rng).unwrap().is_empty());
        let stats = registry.get("breaks_tree").unwrap().stats;
        assert_eq!((stats.calls, stats.invalid, stats.offspring), (1, 1, 0));
    }

    #[test]
    fn test_misuse_is_an_error() {
        let (grammar, top) = grammar();
        let ctx = OperatorContext { grammar: &grammar, top_frame: top, strength: 1.0 };
        let mut registry = OperatorRegistry::with_defaults();
        let mut rng = Randy::new(42);
        let parent = Individual::random(&grammar, top, &mut rng).unwrap();

        assert!(registry.apply("missing", &[&parent], &ctx, &mut rng).is_err());
        assert!(registry.apply("node_swap_crossover", &[&parent], &ctx, &mut rng).is_err());

        let mut stranger = parent.clone_for_offspring();
        stranger.top_frame = ElementId(1);
        assert!(registry
            .apply("single_parameter_mutation", &[&stranger], &ctx, &mut rng)
            .is_err());
    }

    #[test]
    fn test_credit() {
        let mut registry = OperatorRegistry::with_defaults();
        registry.credit("leaf_crossover", Outcome::Success);
        registry.credit("leaf_crossover", Outcome::Failure);
        registry.credit("leaf_crossover", Outcome::Neutral);
        let stats = registry.get("leaf_crossover").unwrap().stats;
        assert_eq!((stats.successes, stats.failures), (1, 1));
    }
}
