//! Grammar-driven evolutionary program synthesis.
//!
//! A [`Grammar`] of macros and frames describes the space of programs;
//! individuals are multigraphs unrolled from it and rendered to text, and
//! an [`EvolutionEngine`] improves them against a user fitness function.

pub mod config;
pub mod engines;
pub mod error;
pub mod random;
pub mod types;

pub use config::{AppConfig, ConfigManager};
pub use engines::evaluation::{Evaluator, Fitness, FunctionEvaluator, RenderOptions};
pub use engines::generation::{
    EvolutionEngine, Grammar, GrammarBuilder, Individual, LoggingProgressCallback, ParameterSpec, Population,
};
pub use error::{EvoError, Result};
pub use random::Randy;
