use crate::engines::evaluation::fitness::Fitness;
use crate::engines::evaluation::render::strip_phenotype;
use crate::engines::generation::grammar::Grammar;
use crate::engines::generation::population::Population;
use crate::error::{EvoError, Result};
use log::debug;
use rayon::prelude::*;
use std::sync::Arc;

/// Assigns a fitness to every individual of a population that lacks one.
///
/// Implementations may parallelize internally but must be done (or fail)
/// when `evaluate` returns.
pub trait Evaluator: Send {
    fn evaluate(&mut self, population: &mut Population, grammar: &Grammar) -> Result<()>;

    /// Number of fitness computations performed so far.
    fn fitness_calls(&self) -> usize;
}

pub type FitnessFn = Arc<dyn Fn(&str) -> anyhow::Result<Fitness> + Send + Sync>;

/// Evaluates phenotypes with a plain function.
pub struct FunctionEvaluator {
    function: FitnessFn,
    parallel: bool,
    strip_phenotypes: bool,
    calls: usize,
}

impl FunctionEvaluator {
    pub fn new<F>(function: F) -> Self
    where
        F: Fn(&str) -> anyhow::Result<Fitness> + Send + Sync + 'static,
    {
        Self {
            function: Arc::new(function),
            parallel: false,
            strip_phenotypes: false,
            calls: 0,
        }
    }

    /// Evaluate the individuals of one generation on the rayon thread pool.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Hand the function phenotypes without header, indentation and blank lines.
    pub fn strip_phenotypes(mut self, strip: bool) -> Self {
        self.strip_phenotypes = strip;
        self
    }
}

impl Evaluator for FunctionEvaluator {
    fn evaluate(&mut self, population: &mut Population, grammar: &Grammar) -> Result<()> {
        let pending = population.not_finalized();
        if pending.is_empty() {
            return Ok(());
        }

        let mut phenotypes = Vec::with_capacity(pending.len());
        for &index in &pending {
            let text = population.phenotype(index, grammar)?;
            phenotypes.push(if self.strip_phenotypes { strip_phenotype(&text) } else { text });
        }

        let function = &self.function;
        let results: Vec<anyhow::Result<Fitness>> = if self.parallel {
            phenotypes.par_iter().map(|p| function(p.as_str())).collect()
        } else {
            phenotypes.iter().map(|p| function(p.as_str())).collect()
        };
        self.calls += results.len();

        let individuals = population.individuals_mut();
        for (index, result) in pending.into_iter().zip(results) {
            let individual = &mut individuals[index];
            let fitness = result
                .map_err(|e| EvoError::Evaluator(format!("evaluating {}: {:#}", individual.id, e)))?;
            debug!("Evaluated {}: {}", individual.id, fitness);
            individual.set_fitness(fitness)?;
        }
        Ok(())
    }

    fn fitness_calls(&self) -> usize {
        self.calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::generation::grammar::GrammarBuilder;
    use crate::engines::generation::individual::Individual;
    use crate::engines::generation::parameter::ParameterSpec;
    use crate::random::Randy;

    fn population(size: usize) -> (Grammar, Population) {
        let mut builder = GrammarBuilder::new();
        let bit = builder.add_macro("bit", "{b}", [("b", ParameterSpec::integer(0, 2))]);
        let top = builder.add_bunch("word", &[bit], 8..9);
        let grammar = builder.build().unwrap();
        let mut rng = Randy::new(42);
        let mut population = Population::new(top);
        let individuals = (0..size)
            .map(|_| Individual::random(&grammar, top, &mut rng).unwrap())
            .collect();
        population.add(individuals).unwrap();
        (grammar, population)
    }

    fn onemax(text: &str) -> anyhow::Result<Fitness> {
        Ok(Fitness::Integer(text.matches('1').count() as i64))
    }

    #[test]
    fn test_evaluates_pending_only() {
        let (grammar, mut population) = population(4);
        let mut evaluator = FunctionEvaluator::new(onemax).strip_phenotypes(true);
        evaluator.evaluate(&mut population, &grammar).unwrap();
        assert!(population.not_finalized().is_empty());
        assert_eq!(evaluator.fitness_calls(), 4);

        evaluator.evaluate(&mut population, &grammar).unwrap();
        assert_eq!(evaluator.fitness_calls(), 4);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let (grammar, mut first) = population(16);
        let mut second = first.clone();
        FunctionEvaluator::new(onemax).evaluate(&mut first, &grammar).unwrap();
        FunctionEvaluator::new(onemax)
            .parallel(true)
            .evaluate(&mut second, &grammar)
            .unwrap();
        let a: Vec<_> = first.iter().filter_map(|i| i.fitness().cloned()).collect();
        let b: Vec<_> = second.iter().filter_map(|i| i.fitness().cloned()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_failure_is_reported() {
        let (grammar, mut population) = population(2);
        let mut evaluator = FunctionEvaluator::new(|_| anyhow::bail!("simulator crashed"));
        let err = evaluator.evaluate(&mut population, &grammar).unwrap_err();
        assert!(matches!(err, EvoError::Evaluator(_)));
        assert!(err.to_string().contains("simulator crashed"));
    }
}
