use crate::Diagnostic;

/// Conversion from a merged partial config into the final config.
///
/// Unlike `TryFrom`, all problems are collected and returned together so a
/// user sees every mistake in one run rather than one per run.
pub trait TryFromPartial: Sized {
    type Partial;

    fn try_from_partial(partial: Self::Partial) -> Result<Self, Vec<Diagnostic>>;
}
