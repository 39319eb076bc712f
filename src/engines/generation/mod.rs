pub mod grammar;
pub mod parameter;
pub mod genome;
pub mod node_view;
pub mod unroll;
pub mod individual;
pub mod operators;
pub mod registry;
pub mod monitor;
pub mod selector;
pub mod population;
pub mod pareto;
pub mod evolution_engine;
pub mod progress;

pub use evolution_engine::{EvolutionEngine, GenerationSummary, ProgressCallback, RunResult, StopCondition};
pub use genome::Genome;
pub use grammar::{ElementId, FrameKind, Grammar, GrammarBuilder, SElement, MACRO_ZERO};
pub use individual::{Individual, Outcome};
pub use node_view::NodeView;
pub use parameter::{CreativeZeal, ParameterSpec};
pub use population::Population;
pub use progress::{HistoryProgressCallback, LoggingProgressCallback};
pub use registry::{Arity, GeneticOperator, OperatorContext, OperatorRegistry, OperatorStats};
pub use selector::OperatorSelector;
