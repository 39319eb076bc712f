pub mod traits;
pub mod evolution;
pub mod selector;
pub mod manager;

pub use manager::{AppConfig, ConfigManager};
pub use evolution::{EvolutionConfig, OperatorSelection};
pub use selector::SelectorConfig;
pub use traits::{ConfigManifest, ConfigSection, FieldManifest};
