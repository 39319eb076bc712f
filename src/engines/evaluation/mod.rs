pub mod fitness;
pub mod render;
pub mod evaluator;

pub use evaluator::{Evaluator, FitnessFn, FunctionEvaluator};
pub use fitness::Fitness;
pub use render::{render, RenderOptions};
