use std::collections::HashMap;
use std::ops::Range;

use opnpool_config::Diagnostic;
use opnpool_config::Error;
use opnpool_config::Located;
use opnpool_config::MergeConflictLocation;
use opnpool_config::MergeError;
use opnpool_config::PartialMergeableConfig;
use opnpool_config::SourceInfo;
use opnpool_config::Warning;
use serde::Deserialize;

use super::LogLevel;

/// One configuration file as written, every field optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    #[serde(default)]
    pub imports: Vec<String>,

    pub id: Option<Located<String>>,
    pub flash_size: Option<Located<String>>,
    pub logging: Option<PartialLoggingConfig>,
    pub rs485: Option<PartialRs485Config>,

    #[serde(default)]
    pub entities: HashMap<String, PartialEntityConfig>,

    /// Source information for error reporting (not deserialized)
    #[serde(skip)]
    pub source: Option<SourceInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialLoggingConfig {
    pub level: Option<Located<LogLevel>>,
    pub overrides: Option<HashMap<String, Located<LogLevel>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialRs485Config {
    pub rx_pin: Option<Located<i64>>,
    pub tx_pin: Option<Located<i64>>,
    pub rts_pin: Option<Located<i64>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialEntityConfig {
    pub name: Option<Located<String>>,
    pub id: Option<Located<String>>,
    pub unit_of_measurement: Option<Located<String>>,
    pub device_class: Option<Located<String>>,
    pub state_class: Option<Located<String>>,

    /// Where the entity's table starts (not deserialized)
    #[serde(skip)]
    pub header: Option<MergeConflictLocation>,
}

impl PartialEntityConfig {
    fn located_fields_mut(&mut self) -> [&mut Option<Located<String>>; 5] {
        [
            &mut self.name,
            &mut self.id,
            &mut self.unit_of_measurement,
            &mut self.device_class,
            &mut self.state_class,
        ]
    }

    /// Fields only analog sensors accept, with their names
    pub fn sensor_fields(&self) -> [(&'static str, &Option<Located<String>>); 3] {
        [
            ("unit_of_measurement", &self.unit_of_measurement),
            ("device_class", &self.device_class),
            ("state_class", &self.state_class),
        ]
    }
}

/// Best-effort span of an entity's table: `[entities.<key>]` or a dotted `entities.<key>.` key
fn entity_header_span(content: &str, key: &str) -> Range<usize> {
    let candidates = [
        format!("[entities.{}]", key),
        format!("entities.{}.", key),
        format!("{} =", key),
    ];

    candidates
        .iter()
        .find_map(|needle| content.find(needle.as_str()).map(|start| start..start + needle.len()))
        .unwrap_or(0..0)
}

fn merge_field<T>(
    slot: &mut Option<Located<T>>,
    incoming: Option<Located<T>>,
    field_path: &str,
    what: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let Some(incoming) = incoming else {
        return;
    };

    match slot {
        Some(first) => diagnostics.push(Diagnostic::Error(Error::Merge(MergeError {
            field_path: field_path.to_string(),
            message: format!("{} defined in multiple config files", what),
            conflicts: vec![first.to_conflict_location(), incoming.to_conflict_location()],
        }))),
        None => *slot = Some(incoming),
    }
}

impl PartialMergeableConfig for PartialConfig {
    fn imports(&self) -> &[String] {
        &self.imports
    }

    fn attach_source(&mut self, source: SourceInfo) {
        let stamp = |field: &mut Option<Located<String>>| {
            if let Some(value) = field.as_mut() {
                value.set_source(&source);
            }
        };

        stamp(&mut self.id);
        stamp(&mut self.flash_size);

        if let Some(logging) = self.logging.as_mut() {
            if let Some(level) = logging.level.as_mut() {
                level.set_source(&source);
            }
            for level in logging.overrides.iter_mut().flat_map(|o| o.values_mut()) {
                level.set_source(&source);
            }
        }

        if let Some(rs485) = self.rs485.as_mut() {
            for pin in [&mut rs485.rx_pin, &mut rs485.tx_pin, &mut rs485.rts_pin] {
                if let Some(pin) = pin.as_mut() {
                    pin.set_source(&source);
                }
            }
        }

        for (key, entity) in self.entities.iter_mut() {
            for field in entity.located_fields_mut() {
                stamp(field);
            }
            entity.header = Some(MergeConflictLocation {
                file_path: source.file_path.clone(),
                span: entity_header_span(&source.content, key),
                content: source.content.clone(),
            });
        }

        self.source = Some(source);
    }

    fn merge<I>(configs: I) -> (Self, Vec<Diagnostic>)
    where
        I: IntoIterator<Item = Self>,
    {
        let mut result = PartialConfig::default();
        let mut diagnostics = Vec::new();
        let mut imports = Vec::new();

        for config in configs {
            imports.extend(config.imports.iter().cloned());

            let is_empty = config.id.is_none()
                && config.flash_size.is_none()
                && config.logging.is_none()
                && config.rs485.is_none()
                && config.entities.is_empty()
                && config.imports.is_empty();

            if is_empty {
                if let Some(source) = config.source.as_ref() {
                    diagnostics.push(Diagnostic::Warning(Warning::EmptyConfig {
                        file_path: source.file_path.clone(),
                    }));
                }
            }

            // The first file to load provides the source used for
            // diagnostics that are not tied to a single value
            if result.source.is_none() {
                result.source = config.source.clone();
            }

            merge_field(&mut result.id, config.id, "id", "Component id", &mut diagnostics);
            merge_field(
                &mut result.flash_size,
                config.flash_size,
                "flash_size",
                "Flash size",
                &mut diagnostics,
            );

            if let Some(logging) = config.logging {
                let result_logging = result.logging.get_or_insert_with(Default::default);

                merge_field(
                    &mut result_logging.level,
                    logging.level,
                    "logging.level",
                    "Logging level",
                    &mut diagnostics,
                );

                if let Some(overrides) = logging.overrides {
                    let result_overrides = result_logging.overrides.get_or_insert_with(HashMap::new);
                    for (target, level) in overrides {
                        let mut slot = result_overrides.remove(&target);
                        merge_field(
                            &mut slot,
                            Some(level),
                            &format!("logging.overrides.{}", target),
                            &format!("Logging override for '{}'", target),
                            &mut diagnostics,
                        );
                        if let Some(level) = slot {
                            result_overrides.insert(target, level);
                        }
                    }
                }
            }

            if let Some(rs485) = config.rs485 {
                let result_rs485 = result.rs485.get_or_insert_with(Default::default);
                merge_field(
                    &mut result_rs485.rx_pin,
                    rs485.rx_pin,
                    "rs485.rx_pin",
                    "RS-485 RX pin",
                    &mut diagnostics,
                );
                merge_field(
                    &mut result_rs485.tx_pin,
                    rs485.tx_pin,
                    "rs485.tx_pin",
                    "RS-485 TX pin",
                    &mut diagnostics,
                );
                merge_field(
                    &mut result_rs485.rts_pin,
                    rs485.rts_pin,
                    "rs485.rts_pin",
                    "RS-485 RTS pin",
                    &mut diagnostics,
                );
            }

            // Entity tables merge field by field, so one file can name an
            // entity and another can give it an id
            for (key, entity) in config.entities {
                let result_entity = result.entities.entry(key.clone()).or_default();
                if result_entity.header.is_none() {
                    result_entity.header = entity.header.clone();
                }

                let PartialEntityConfig {
                    name,
                    id,
                    unit_of_measurement,
                    device_class,
                    state_class,
                    header: _,
                } = entity;

                let incoming = [
                    ("name", name),
                    ("id", id),
                    ("unit_of_measurement", unit_of_measurement),
                    ("device_class", device_class),
                    ("state_class", state_class),
                ];
                for ((field, value), slot) in incoming.into_iter().zip(result_entity.located_fields_mut()) {
                    merge_field(
                        slot,
                        value,
                        &format!("entities.{}.{}", key, field),
                        &format!("'{}' of entity '{}'", field, key),
                        &mut diagnostics,
                    );
                }
            }
        }

        result.imports = imports;

        (result, diagnostics)
    }
}
