pub mod catalog;
pub mod codegen;
pub mod config;
pub mod fs;
pub mod sync;

pub use catalog::Catalog;
pub use catalog::Category;
pub use codegen::generate;
pub use codegen::CodegenTarget;
pub use codegen::CppTarget;
pub use config::Config;
pub use config::LogLevel;
pub use sync::check;
pub use sync::synchronize;
pub use sync::DriftReport;
pub use sync::SyncReport;
