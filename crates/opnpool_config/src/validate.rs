use crate::Diagnostic;

/// Cross-field checks run after a config has been built from its partial form.
///
/// Field-level problems (missing values, bad types) are reported while
/// converting; this hook is for relationships between fields, such as two
/// entities claiming the same id.
pub trait Validate {
    fn validate(&self) -> Vec<Diagnostic> {
        Vec::new()
    }
}
