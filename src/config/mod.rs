pub mod loader;
pub mod sources;
pub mod types;

pub use loader::{discover_config_file, load_config, load_layers};
pub use sources::{
    BuildTimeSource, ConfigLayers, ConfigSource, EnvSource, ResolvedValue, RuntimeSource,
};
pub use types::{AuthConfig, ConfigKey};
