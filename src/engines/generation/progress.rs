use super::evolution_engine::{GenerationSummary, ProgressCallback};
use super::individual::Individual;
use log::info;

/// Reports progress through the `log` facade.
pub struct LoggingProgressCallback {
    /// Log every `every`-th generation; new bests are always logged.
    every: usize,
    show_phenotype: bool,
}

impl Default for LoggingProgressCallback {
    fn default() -> Self {
        Self::new(1)
    }
}

impl LoggingProgressCallback {
    pub fn new(every: usize) -> Self {
        Self {
            every: every.max(1),
            show_phenotype: false,
        }
    }

    pub fn show_phenotype(mut self, show: bool) -> Self {
        self.show_phenotype = show;
        self
    }
}

impl ProgressCallback for LoggingProgressCallback {
    fn on_generation_start(&mut self, _generation: usize) {}

    fn on_generation_complete(&mut self, summary: &GenerationSummary) {
        if summary.generation % self.every != 0 {
            return;
        }
        let best = summary
            .best_fitness
            .as_ref()
            .map_or_else(|| "-".to_string(), |f| f.to_string());
        info!(
            "Generation {} complete. Best fitness: {}, population: {}, entropy: {:.4}, strength: {:.3}, fitness calls: {}",
            summary.generation,
            best,
            summary.population_size,
            summary.entropy,
            summary.strength,
            summary.fitness_calls
        );
    }

    fn on_new_best(&mut self, individual: &Individual, phenotype: &str) {
        info!("New best: {}", individual.describe(true));
        if self.show_phenotype {
            info!("Phenotype of {}:\n{}", individual.id, phenotype);
        }
    }
}

/// Collects the summaries, for tests and post-run analysis.
#[derive(Debug, Default)]
pub struct HistoryProgressCallback {
    pub history: Vec<GenerationSummary>,
    pub new_bests: usize,
}

impl ProgressCallback for &mut HistoryProgressCallback {
    fn on_generation_start(&mut self, _generation: usize) {}

    fn on_generation_complete(&mut self, summary: &GenerationSummary) {
        self.history.push(summary.clone());
    }

    fn on_new_best(&mut self, _individual: &Individual, _phenotype: &str) {
        self.new_bests += 1;
    }
}
