pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_from_str, load_config_or_default};
pub use schema::{CompilerConfig, Config, PackagerConfig};
