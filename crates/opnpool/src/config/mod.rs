mod config;
mod partial;

pub use config::*;
pub use partial::PartialConfig;
pub use partial::PartialEntityConfig;
pub use partial::PartialLoggingConfig;
pub use partial::PartialRs485Config;
