use std::fs;

use opnpool_config::Diagnostic;
use opnpool_config::Error;
use opnpool_config::LoadError;
use opnpool_config::Located;
use opnpool_config::MergeError;
use opnpool_config::PartialMergeableConfig;
use opnpool_config::SourceInfo;
use opnpool_config::TryFromPartial;
use opnpool_config::Validate;
use opnpool_config::ValidationError;
use opnpool_config::load_config;
use serde::Deserialize;
use tempfile::TempDir;

#[derive(Debug, Default, Deserialize)]
struct PartialPumpConfig {
    #[serde(default)]
    imports: Vec<String>,
    speed: Option<Located<u32>>,
    #[serde(skip)]
    source: Option<SourceInfo>,
}

impl PartialMergeableConfig for PartialPumpConfig {
    fn imports(&self) -> &[String] {
        &self.imports
    }

    fn attach_source(&mut self, source: SourceInfo) {
        if let Some(speed) = self.speed.as_mut() {
            speed.set_source(&source);
        }
        self.source = Some(source);
    }

    fn merge<I>(configs: I) -> (Self, Vec<Diagnostic>)
    where
        I: IntoIterator<Item = Self>,
    {
        let mut result = PartialPumpConfig::default();
        let mut diagnostics = Vec::new();

        for config in configs {
            if let Some(speed) = config.speed {
                match result.speed.as_ref() {
                    Some(first) => diagnostics.push(Diagnostic::Error(Error::Merge(MergeError {
                        field_path: "speed".to_string(),
                        message: "speed defined in multiple config files".to_string(),
                        conflicts: vec![first.to_conflict_location(), speed.to_conflict_location()],
                    }))),
                    None => result.speed = Some(speed),
                }
            }
        }

        (result, diagnostics)
    }
}

#[derive(Debug)]
struct PumpConfig {
    speed: u32,
}

impl TryFromPartial for PumpConfig {
    type Partial = PartialPumpConfig;

    fn try_from_partial(partial: PartialPumpConfig) -> Result<Self, Vec<Diagnostic>> {
        match partial.speed {
            Some(speed) if *speed > 3450 => Err(vec![Diagnostic::Error(Error::Validation(
                speed.error("speed", "pump speed above 3450 RPM"),
            ))]),
            Some(speed) => Ok(PumpConfig {
                speed: speed.into_inner(),
            }),
            None => Err(vec![Diagnostic::Error(Error::Validation(ValidationError {
                field_path: "speed".to_string(),
                message: "speed is required".to_string(),
                span: None,
                source: partial.source,
            }))]),
        }
    }
}

impl Validate for PumpConfig {}

#[test]
fn test_imports_load_before_importer() {
    let temp_dir = TempDir::new().unwrap();
    let base = temp_dir.path().join("base.toml");
    let pump = temp_dir.path().join("pump.toml");

    fs::write(&base, "imports = [\"pump.toml\"]\n").unwrap();
    fs::write(&pump, "speed = 2400\n").unwrap();

    let configs = PartialPumpConfig::load_with_imports(&[base.clone()]).unwrap();
    assert_eq!(configs.len(), 2);
    assert_eq!(configs[0].source.as_ref().unwrap().file_path, pump);
    assert_eq!(configs[1].source.as_ref().unwrap().file_path, base);
}

#[test]
fn test_import_cycle_is_a_load_error() {
    let temp_dir = TempDir::new().unwrap();
    let a = temp_dir.path().join("a.toml");
    let b = temp_dir.path().join("b.toml");

    fs::write(&a, "imports = [\"b.toml\"]\n").unwrap();
    fs::write(&b, "imports = [\"a.toml\"]\n").unwrap();

    let result = PartialPumpConfig::load_with_imports(&[a]);
    assert!(matches!(result, Err(LoadError::ImportCycle { .. })));
}

#[test]
fn test_shared_import_is_not_a_cycle() {
    let temp_dir = TempDir::new().unwrap();
    let common = temp_dir.path().join("common.toml");
    let left = temp_dir.path().join("left.toml");
    let right = temp_dir.path().join("right.toml");

    fs::write(&common, "speed = 1800\n").unwrap();
    fs::write(&left, "imports = [\"common.toml\"]\n").unwrap();
    fs::write(&right, "imports = [\"common.toml\"]\n").unwrap();

    let configs = PartialPumpConfig::load_with_imports(&[left, right]).unwrap();
    assert_eq!(configs.len(), 4);
}

#[test]
fn test_load_config_success() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("pump.toml");
    fs::write(&path, "speed = 3000\n").unwrap();

    let (config, diagnostics) = load_config::<PumpConfig>(&[path]).unwrap();
    assert_eq!(config.speed, 3000);
    assert!(diagnostics.0.is_empty());
}

#[test]
fn test_load_config_reports_conflict() {
    let temp_dir = TempDir::new().unwrap();
    let first = temp_dir.path().join("first.toml");
    let second = temp_dir.path().join("second.toml");
    fs::write(&first, "speed = 3000\n").unwrap();
    fs::write(&second, "speed = 1200\n").unwrap();

    let diagnostics = load_config::<PumpConfig>(&[first.clone(), second.clone()]).unwrap_err();
    assert_eq!(diagnostics.0.len(), 1);

    match &diagnostics.0[0] {
        Diagnostic::Error(Error::Merge(merge)) => {
            assert_eq!(merge.conflicts[0].file_path, first);
            assert_eq!(merge.conflicts[1].file_path, second);
        }
        other => panic!("expected merge error, got {:?}", other),
    }
}

#[test]
fn test_load_config_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("missing.toml");

    let diagnostics = load_config::<PumpConfig>(&[path]).unwrap_err();
    assert!(matches!(
        diagnostics.0[0],
        Diagnostic::Error(Error::Load(LoadError::Io { .. }))
    ));
}

#[test]
fn test_load_config_validation_span() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("pump.toml");
    fs::write(&path, "speed = 9000\n").unwrap();

    let diagnostics = load_config::<PumpConfig>(&[path.clone()]).unwrap_err();
    match &diagnostics.0[0] {
        Diagnostic::Error(Error::Validation(error)) => {
            assert_eq!(error.span, Some(8..12));
            assert_eq!(error.source.as_ref().unwrap().file_path, path);
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}
