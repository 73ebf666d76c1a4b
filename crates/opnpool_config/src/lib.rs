mod diagnostics;
mod finalize;
mod located;
mod mergeable;
mod validate;

// Re-export diagnostic types
pub use diagnostics::Diagnostic;
pub use diagnostics::Diagnostics;
pub use diagnostics::Error;
pub use diagnostics::LoadError;
pub use diagnostics::MergeConflictLocation;
pub use diagnostics::MergeError;
pub use diagnostics::SourceInfo;
pub use diagnostics::ValidationError;
pub use diagnostics::Warning;
pub use diagnostics::format_diagnostics;
pub use diagnostics::render_diagnostics;
pub use finalize::TryFromPartial;
pub use located::Located;
pub use mergeable::PartialMergeableConfig;
pub use mergeable::load_config;
pub use validate::Validate;
