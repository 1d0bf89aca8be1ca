// Configuration loading

pub mod ai;
pub mod settings;

pub use ai::{AIConfigStatus, KeyLookup, KeySource, ResolvedAIConfig};
pub use settings::{AIProvider, ConfigError, ResponseFormat, ResponseStructure, Settings, StatusChannel};
