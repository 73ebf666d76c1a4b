use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

use serde::de::DeserializeOwned;

use crate::Diagnostic;
use crate::Diagnostics;
use crate::LoadError;
use crate::SourceInfo;
use crate::TryFromPartial;
use crate::Validate;

/// A configuration file as written, before merging and validation.
///
/// Implementors only describe how to reach their imports, how to stamp
/// source information onto their `Located` fields, and how to merge; file
/// loading and import resolution are shared.
pub trait PartialMergeableConfig: DeserializeOwned + Sized {
    /// Paths listed in this file's `imports`, as written
    fn imports(&self) -> &[String];

    /// Record the file this partial config was read from
    fn attach_source(&mut self, source: SourceInfo);

    /// Merge multiple partial configs with first-wins semantics.
    ///
    /// Every later definition of an already-set field is reported as a merge
    /// error, and merging continues so all conflicts are found in one pass.
    fn merge<I>(configs: I) -> (Self, Vec<Diagnostic>)
    where
        I: IntoIterator<Item = Self>;

    /// Load a single TOML file without processing imports
    fn from_file(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let mut config: Self = toml::from_str(&content).map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        config.attach_source(SourceInfo {
            file_path: path.to_path_buf(),
            content,
        });

        Ok(config)
    }

    /// Load config files with import resolution
    ///
    /// Returns every loaded file in order, imports before the file that
    /// imports them. Relative imports resolve against the importing file.
    fn load_with_imports(paths: &[PathBuf]) -> Result<Vec<Self>, LoadError> {
        let mut visiting = HashSet::new();
        let mut all_configs = Vec::new();

        for path in paths {
            load_recursive(path, &mut visiting, &mut all_configs)?;
        }

        Ok(all_configs)
    }
}

fn load_recursive<C: PartialMergeableConfig>(
    path: &Path,
    visiting: &mut HashSet<PathBuf>,
    configs: &mut Vec<C>,
) -> Result<(), LoadError> {
    let canonical_path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

    if visiting.contains(&canonical_path) {
        return Err(LoadError::ImportCycle {
            path: canonical_path,
            cycle: visiting.iter().cloned().collect(),
        });
    }

    visiting.insert(canonical_path.clone());

    let config = C::from_file(path)?;

    for import in config.imports() {
        let import_path = PathBuf::from(import);
        let resolved_path = if import_path.is_absolute() {
            import_path
        } else {
            let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
            parent_dir.join(import_path)
        };

        load_recursive(&resolved_path, visiting, configs)?;
    }

    configs.push(config);

    // Only ancestors count towards a cycle; siblings may share an import
    visiting.remove(&canonical_path);

    Ok(())
}

/// Load, merge, convert and validate a configuration from TOML files.
///
/// Returns `Ok((config, diagnostics))` when there are no errors (warnings
/// are fine), and `Err(diagnostics)` with every error found otherwise.
pub fn load_config<C>(paths: &[PathBuf]) -> Result<(C, Diagnostics), Diagnostics>
where
    C: TryFromPartial + Validate,
    C::Partial: PartialMergeableConfig,
{
    let configs = <C::Partial as PartialMergeableConfig>::load_with_imports(paths)
        .map_err(|e| Diagnostics(vec![Diagnostic::Error(crate::Error::Load(e))]))?;

    let (partial, mut diagnostics) = <C::Partial as PartialMergeableConfig>::merge(configs);

    let config = match C::try_from_partial(partial) {
        Ok(config) => config,
        Err(errors) => {
            diagnostics.extend(errors);
            return Err(Diagnostics(diagnostics));
        }
    };

    diagnostics.extend(config.validate());

    let diagnostics = Diagnostics(diagnostics);
    if diagnostics.has_errors() {
        Err(diagnostics)
    } else {
        Ok((config, diagnostics))
    }
}
