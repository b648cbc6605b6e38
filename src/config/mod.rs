// Configuration management: TOML settings and their console rendering

pub mod display;
pub mod settings;


pub use display::show_config;
pub use settings::{BackendKind, Config, ConfigError, EmbeddingConfig, RetrievalConfig};
