use crate::config::{AppConfig, EvolutionConfig, OperatorSelection, SelectorConfig};
use crate::engines::evaluation::evaluator::Evaluator;
use crate::engines::evaluation::fitness::Fitness;
use crate::engines::generation::grammar::{ElementId, Grammar, MACRO_ZERO};
use crate::engines::generation::individual::{Individual, Outcome};
use crate::engines::generation::operators::tournament_selection;
use crate::engines::generation::population::Population;
use crate::engines::generation::registry::{OperatorContext, OperatorRegistry};
use crate::engines::generation::selector::OperatorSelector;
use crate::error::{EvoError, Result};
use crate::random::Randy;
use crate::types::IndividualId;
use log::{debug, info};
use std::collections::HashMap;

pub type StopCondition = Box<dyn Fn(&Population) -> bool + Send>;

/// End-of-generation snapshot handed to the progress callback.
#[derive(Debug, Clone)]
pub struct GenerationSummary {
    pub generation: usize,
    pub best_fitness: Option<Fitness>,
    pub population_size: usize,
    pub entropy: f64,
    pub fitness_calls: usize,
    /// Mutation strength used to breed this generation.
    pub strength: f64,
}

pub trait ProgressCallback: Send {
    fn on_generation_start(&mut self, generation: usize);
    fn on_generation_complete(&mut self, summary: &GenerationSummary);
    fn on_new_best(&mut self, individual: &Individual, phenotype: &str);
}

#[derive(Debug)]
pub struct RunResult {
    /// Final population, sorted.
    pub population: Population,
    /// Best individual ever seen, even if it has since been culled.
    pub best: Option<Individual>,
    pub generations: usize,
}

pub struct EvolutionEngine {
    config: EvolutionConfig,
    selector_config: SelectorConfig,
    grammar: Grammar,
    top_frame: ElementId,
    registry: OperatorRegistry,
    rng: Randy,
    target: Option<Fitness>,
    stop_when: Option<StopCondition>,
}

impl EvolutionEngine {
    /// Engine with the built-in operators; fails on an invalid configuration.
    pub fn new(grammar: Grammar, top_frame: ElementId, config: AppConfig) -> Result<Self> {
        config.validate()?;
        if grammar.element(top_frame).is_none() || top_frame == MACRO_ZERO {
            return Err(EvoError::Grammar(format!("invalid top frame {:?}", top_frame)));
        }
        let rng = Randy::new(config.evolution.seed);
        Ok(Self {
            config: config.evolution,
            selector_config: config.selector,
            grammar,
            top_frame,
            registry: OperatorRegistry::with_defaults(),
            rng,
            target: None,
            stop_when: None,
        })
    }

    pub fn with_registry(mut self, registry: OperatorRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Stop as soon as the best individual reaches `target`.
    pub fn with_target(mut self, target: Fitness) -> Self {
        self.target = Some(target);
        self
    }

    /// Stop when `predicate` holds; checked once per generation.
    pub fn with_stop_condition<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Population) -> bool + Send + 'static,
    {
        self.stop_when = Some(Box::new(predicate));
        self
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn registry(&self) -> &OperatorRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut OperatorRegistry {
        &mut self.registry
    }

    pub fn rng_mut(&mut self) -> &mut Randy {
        &mut self.rng
    }

    /// Run the (mu + lambda) evolution loop.
    pub fn run<E, C>(&mut self, evaluator: &mut E, mut callback: C) -> Result<RunResult>
    where
        E: Evaluator + ?Sized,
        C: ProgressCallback,
    {
        let ctx = OperatorContext {
            grammar: &self.grammar,
            top_frame: self.top_frame,
            strength: self.config.strength,
        };
        let variation: Vec<String> = self.registry.variation_operators().map(|o| o.name.clone()).collect();
        if variation.is_empty() {
            return Err(EvoError::NoOperatorsAvailable(
                "no mutation or crossover registered".to_string(),
            ));
        }
        let mut selector = match self.config.operator_selection {
            OperatorSelection::Adaptive => Some(OperatorSelector::new(
                &self.registry,
                self.selector_config.clone(),
                self.config.max_generation,
            )),
            OperatorSelection::Uniform => None,
        };

        info!(
            "Starting evolution: mu={}, lambda={}, max_generation={}, {:?} operator selection",
            self.config.mu, self.config.lambda, self.config.max_generation, self.config.operator_selection
        );

        let initial = initial_individuals(&mut self.registry, &ctx, &self.config, &mut self.rng)?;
        let mut population = Population::new(self.top_frame);
        population.add(initial)?;
        evaluator.evaluate(&mut population, ctx.grammar)?;
        population.sort()?;

        let mut best = population.best().cloned();
        if let Some(individual) = &best {
            announce_best(individual, ctx.grammar, &population, &mut callback)?;
        }

        let mut generations = 0;
        while generations < self.config.max_generation && !self.should_stop(&population) {
            callback.on_generation_start(population.generation());

            let strength = selector.as_ref().map_or(self.config.strength, OperatorSelector::sigma);
            let generation_ctx = OperatorContext { strength, ..ctx };
            let offspring = collect_offspring(
                &mut self.registry,
                &generation_ctx,
                &population,
                selector.as_ref(),
                &variation,
                &self.config,
                &mut self.rng,
            )?;
            let parent_fitness: HashMap<IndividualId, Fitness> = population
                .iter()
                .filter_map(|i| i.fitness().map(|f| (i.id, f.clone())))
                .collect();

            if let Some(lifespan) = self.config.lifespan {
                population.life_cycle(lifespan, self.config.top_n);
            }
            population.add(offspring)?;
            evaluator.evaluate(&mut population, ctx.grammar)?;
            credit_operators(&mut self.registry, &population, &parent_fitness);

            population.sort()?;
            population.truncate(self.config.mu);
            if let Some(selector) = selector.as_mut() {
                selector.update(&self.registry);
            }
            generations += 1;

            if let Some(leader) = population.best() {
                let improved = match best.as_ref().and_then(Individual::fitness) {
                    Some(current) => leader.fitness().map_or(false, |f| f.is_fitter(current)),
                    None => true,
                };
                if improved {
                    announce_best(leader, ctx.grammar, &population, &mut callback)?;
                    best = Some(leader.clone());
                }
            }

            callback.on_generation_complete(&GenerationSummary {
                generation: population.generation(),
                best_fitness: best.as_ref().and_then(|b| b.fitness().cloned()),
                population_size: population.len(),
                entropy: population.entropy(ctx.grammar),
                fitness_calls: evaluator.fitness_calls(),
                strength,
            });
        }

        info!(
            "Evolution finished after {} generations, {} fitness calls",
            generations,
            evaluator.fitness_calls()
        );
        self.registry.log_statistics();
        Ok(RunResult {
            population,
            best,
            generations,
        })
    }

    fn should_stop(&self, population: &Population) -> bool {
        if let (Some(target), Some(fitness)) = (&self.target, population.best().and_then(Individual::fitness)) {
            if fitness.is_fitter(target) || !fitness.is_distinguishable(target) {
                info!("Target fitness {} reached", target);
                return true;
            }
        }
        self.stop_when.as_ref().map_or(false, |stop| stop(population))
    }
}

fn announce_best<C: ProgressCallback>(
    individual: &Individual,
    grammar: &Grammar,
    population: &Population,
    callback: &mut C,
) -> Result<()> {
    let phenotype = individual.phenotype(grammar, population.render_options())?;
    info!("New best individual at generation {}: {}", population.generation(), individual.describe(true));
    callback.on_new_best(individual, &phenotype);
    Ok(())
}

fn initial_individuals(
    registry: &mut OperatorRegistry,
    ctx: &OperatorContext<'_>,
    config: &EvolutionConfig,
    rng: &mut Randy,
) -> Result<Vec<Individual>> {
    let initializers: Vec<String> = registry.initializers().map(|o| o.name.clone()).collect();
    if initializers.is_empty() {
        return Err(EvoError::NoOperatorsAvailable("no initializer registered".to_string()));
    }

    let max_attempts = config.mu * config.max_attempts_factor;
    let mut individuals = Vec::with_capacity(config.mu);
    let mut attempts = 0;
    while individuals.len() < config.mu {
        if attempts >= max_attempts {
            return Err(EvoError::OffspringExhausted {
                requested: config.mu,
                collected: individuals.len(),
                attempts,
            });
        }
        attempts += 1;
        let name = rng
            .choice(&initializers)
            .cloned()
            .ok_or_else(|| EvoError::NoOperatorsAvailable("no initializer registered".to_string()))?;
        individuals.extend(registry.apply(&name, &[], ctx, rng)?);
    }
    debug!("Initial population built with {} operator calls", attempts);
    Ok(individuals)
}

fn collect_offspring(
    registry: &mut OperatorRegistry,
    ctx: &OperatorContext<'_>,
    population: &Population,
    selector: Option<&OperatorSelector>,
    variation: &[String],
    config: &EvolutionConfig,
    rng: &mut Randy,
) -> Result<Vec<Individual>> {
    let max_attempts = config.lambda * config.max_attempts_factor;
    let mut offspring = Vec::with_capacity(config.lambda);
    let mut attempts = 0;
    while offspring.len() < config.lambda {
        if attempts >= max_attempts {
            return Err(EvoError::OffspringExhausted {
                requested: config.lambda,
                collected: offspring.len(),
                attempts,
            });
        }
        attempts += 1;

        let name = match selector {
            Some(selector) => selector.take(rng).map(str::to_string),
            None => rng.choice(variation).cloned(),
        }
        .ok_or_else(|| EvoError::NoOperatorsAvailable("the operator selector is empty".to_string()))?;
        let arity = registry
            .get(&name)
            .map(|o| o.num_parents())
            .ok_or_else(|| EvoError::NoOperatorsAvailable(format!("unknown operator '{}'", name)))?;

        let parents = (0..arity)
            .map(|_| tournament_selection(population.individuals(), config.tournament_size, rng))
            .collect::<Option<Vec<&Individual>>>()
            .ok_or_else(|| EvoError::Operator("cannot select parents from an empty population".to_string()))?;
        offspring.extend(registry.apply(&name, &parents, ctx, rng)?);
    }
    debug!(
        "Collected {} offspring with {} operator calls",
        offspring.len(),
        attempts
    );
    Ok(offspring)
}

/// Compare every newly evaluated offspring with its parents and credit the
/// operator that produced it.
fn credit_operators(
    registry: &mut OperatorRegistry,
    population: &Population,
    parent_fitness: &HashMap<IndividualId, Fitness>,
) {
    let newborn = population.generation();
    for individual in population.iter().filter(|i| i.age.birth == newborn) {
        let (Some(operator), Some(fitness)) = (&individual.lineage.operator, individual.fitness()) else {
            continue;
        };
        let parents: Vec<&Fitness> = individual
            .lineage
            .parents
            .iter()
            .filter_map(|id| parent_fitness.get(id))
            .collect();
        if parents.is_empty() {
            continue;
        }
        registry.credit(operator, Outcome::assess(fitness, &parents));
    }
}
