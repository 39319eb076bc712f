use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvoError {
    #[error("Grammar error: {0}")]
    Grammar(String),

    #[error("Invariant violation: {0}")]
    Invariant(String),

    #[error("Genome is not a tree: {0}")]
    NotATree(String),

    #[error("Fitness error: {0}")]
    Fitness(String),

    #[error("Evaluator error: {0}")]
    Evaluator(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Operator error: {0}")]
    Operator(String),

    #[error("No genetic operators available: {0}")]
    NoOperatorsAvailable(String),

    #[error("Unable to collect offspring: {collected} of {requested} after {attempts} operator calls")]
    OffspringExhausted {
        requested: usize,
        collected: usize,
        attempts: usize,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EvoError>;

/// Expected, recoverable failure inside a genetic operator.
///
/// An abort yields zero offspring and is only ever recorded in the operator
/// statistics; it never reaches the caller of the operator wrapper.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperatorAbort {
    #[error("no candidate for the operator")]
    NoCandidates,

    #[error("no legal target for structural parameter {0}")]
    NoTarget(String),

    #[error("range exhausted: {0}")]
    RangeExhausted(String),

    #[error("unroll exceeded the maximum depth of {0}")]
    DepthExceeded(usize),

    #[error("offspring violates genome invariants: {0}")]
    InvalidOffspring(String),
}

pub type OperatorResult<T> = std::result::Result<T, OperatorAbort>;
