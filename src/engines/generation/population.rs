use crate::engines::evaluation::render::RenderOptions;
use crate::engines::generation::grammar::{ElementId, Grammar};
use crate::engines::generation::individual::Individual;
use crate::engines::generation::pareto::fast_non_dominated_sort;
use crate::error::{EvoError, Result};
use log::debug;
use std::cmp::Reverse;
use std::collections::HashMap;

/// Individuals sharing a top frame, plus the generation counter.
#[derive(Debug, Clone)]
pub struct Population {
    top_frame: ElementId,
    individuals: Vec<Individual>,
    generation: usize,
    render_options: RenderOptions,
}

impl Population {
    pub fn new(top_frame: ElementId) -> Self {
        Self {
            top_frame,
            individuals: Vec::new(),
            generation: 0,
            render_options: RenderOptions::default(),
        }
    }

    /// Population-wide extra parameters used when rendering.
    pub fn with_render_options(mut self, options: RenderOptions) -> Self {
        self.render_options = options;
        self
    }

    pub fn top_frame(&self) -> ElementId {
        self.top_frame
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    pub fn individuals(&self) -> &[Individual] {
        &self.individuals
    }

    pub fn individuals_mut(&mut self) -> &mut [Individual] {
        &mut self.individuals
    }

    pub fn iter(&self) -> impl Iterator<Item = &Individual> {
        self.individuals.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Individual> {
        self.individuals.get(index)
    }

    pub fn render_options(&self) -> &RenderOptions {
        &self.render_options
    }

    /// Add a batch of newcomers: the generation counter advances and every
    /// newcomer is born in the new generation.
    pub fn add(&mut self, newcomers: Vec<Individual>) -> Result<()> {
        if let Some(stranger) = newcomers.iter().find(|i| i.top_frame != self.top_frame) {
            return Err(EvoError::Operator(format!(
                "{} does not share the population top frame",
                stranger.id
            )));
        }
        self.generation += 1;
        for mut individual in newcomers {
            individual.age.birth = self.generation;
            individual.age.apparent_age = 0;
            self.individuals.push(individual);
        }
        Ok(())
    }

    /// Indices of individuals still waiting for a fitness.
    pub fn not_finalized(&self) -> Vec<usize> {
        self.individuals
            .iter()
            .enumerate()
            .filter(|(_, i)| !i.is_finalized())
            .map(|(n, _)| n)
            .collect()
    }

    /// Order by Pareto front; inside a front newer individuals come first.
    ///
    /// Fails if some individual has not been evaluated.
    pub fn sort(&mut self) -> Result<()> {
        let fitnesses = self
            .individuals
            .iter()
            .map(|i| {
                i.fitness()
                    .ok_or_else(|| EvoError::Fitness(format!("{} has not been evaluated", i.id)))
            })
            .collect::<Result<Vec<_>>>()?;

        let fronts = fast_non_dominated_sort(&fitnesses);
        let mut slots: Vec<Option<Individual>> = std::mem::take(&mut self.individuals)
            .into_iter()
            .map(Some)
            .collect();
        for mut front in fronts {
            front.sort_by_key(|&i| Reverse(slots[i].as_ref().map(|ind| ind.id)));
            self.individuals
                .extend(front.into_iter().filter_map(|i| slots[i].take()));
        }
        Ok(())
    }

    /// Keep the first `size` individuals.
    pub fn truncate(&mut self, size: usize) {
        self.individuals.truncate(size);
    }

    /// Age everybody by one generation and cull those older than `lifespan`;
    /// the first `top_n` individuals are exempt.
    pub fn life_cycle(&mut self, lifespan: u64, top_n: usize) -> usize {
        let before = self.individuals.len();
        let mut position = 0;
        self.individuals.retain_mut(|individual| {
            individual.age.apparent_age += 1;
            let keep = position < top_n || individual.age.apparent_age <= lifespan;
            position += 1;
            keep
        });
        let culled = before - self.individuals.len();
        if culled > 0 {
            debug!("Life cycle removed {} individuals", culled);
        }
        culled
    }

    /// Shannon entropy of the node signatures across the population.
    pub fn entropy(&self, grammar: &Grammar) -> f64 {
        let mut counts: HashMap<u64, usize> = HashMap::new();
        for individual in &self.individuals {
            for symbol in individual.message(grammar) {
                *counts.entry(symbol).or_default() += 1;
            }
        }
        let total: usize = counts.values().sum();
        if total == 0 {
            return 0.0;
        }
        let total = total as f64;
        -counts
            .values()
            .map(|&c| {
                let p = c as f64 / total;
                p * p.ln()
            })
            .sum::<f64>()
    }

    /// First individual; the best one once sorted.
    pub fn best(&self) -> Option<&Individual> {
        self.individuals.first()
    }

    pub fn phenotype(&self, index: usize, grammar: &Grammar) -> Result<String> {
        let individual = self
            .individuals
            .get(index)
            .ok_or_else(|| EvoError::Operator(format!("no individual at position {}", index)))?;
        individual.phenotype(grammar, &self.render_options)
    }

    pub fn describe(&self) -> String {
        let mut lines = vec![format!(
            "Population at generation {} ({} individuals)",
            self.generation,
            self.individuals.len()
        )];
        lines.extend(self.individuals.iter().map(|i| format!("* {}", i.describe(true))));
        lines.join("\n")
    }
}
