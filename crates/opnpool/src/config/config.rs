use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use opnpool_config::Diagnostic;
use opnpool_config::Diagnostics;
use opnpool_config::Error;
use opnpool_config::Located;
use opnpool_config::SourceInfo;
use opnpool_config::TryFromPartial;
use opnpool_config::Validate;
use opnpool_config::ValidationError;
use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;

use super::partial::PartialConfig;
use super::partial::PartialEntityConfig;
use crate::catalog::default_name;
use crate::catalog::Catalog;
use crate::catalog::Category;
use crate::catalog::SensorDefaults;

/// Highest GPIO number on the ESP32 family
pub const MAX_GPIO: i64 = 48;

const DEFAULT_ID: &str = "opnpool";

/// Loading failed; `diagnostics` holds every error and warning found
#[derive(Debug, thiserror::Error)]
#[error("configuration has {count} error(s)")]
pub struct ConfigError {
    pub count: usize,
    pub diagnostics: Diagnostics,
}

impl From<Diagnostics> for ConfigError {
    fn from(diagnostics: Diagnostics) -> Self {
        Self {
            count: diagnostics.errors().count(),
            diagnostics,
        }
    }
}

/// Validated component configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Variable id of the `OpnPool` component in generated code
    pub id: String,
    pub flash_size: FlashSize,
    pub logging: LoggingConfig,
    pub rs485: Rs485Config,
    /// Per-entity overrides, keyed by catalog key. Entities without an
    /// entry use their defaults.
    pub entities: HashMap<String, EntityConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            id: DEFAULT_ID.to_string(),
            flash_size: FlashSize::default(),
            logging: LoggingConfig::default(),
            rs485: Rs485Config::default(),
            entities: HashMap::new(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        })
    }
}

#[derive(Debug, Default, Clone)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: LogLevel,

    /// Per-target levels, e.g. `"opnpool::sync" = "debug"`
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// `EnvFilter` directives for this configuration, e.g. `info,opnpool::sync=debug`
    pub fn filter_directives(&self) -> String {
        let mut overrides: Vec<_> = self.overrides.iter().collect();
        overrides.sort();

        std::iter::once(self.level.to_string())
            .chain(overrides.into_iter().map(|(target, level)| format!("{}={}", target, level)))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// GPIO assignment of the RS-485 transceiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rs485Config {
    pub rx_pin: u8,
    pub tx_pin: u8,
    /// Driver enable (RTS) pin
    pub rts_pin: u8,
}

impl Default for Rs485Config {
    fn default() -> Self {
        Self {
            rx_pin: 22,
            tx_pin: 21,
            rts_pin: 23,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlashSize {
    #[serde(rename = "4MB")]
    Mb4,
    #[default]
    #[serde(rename = "8MB")]
    Mb8,
    #[serde(rename = "16MB")]
    Mb16,
}

impl FlashSize {
    pub fn as_str(self) -> &'static str {
        match self {
            FlashSize::Mb4 => "4MB",
            FlashSize::Mb8 => "8MB",
            FlashSize::Mb16 => "16MB",
        }
    }

    pub fn bytes(self) -> u64 {
        match self {
            FlashSize::Mb4 => 4 * 1024 * 1024,
            FlashSize::Mb8 => 8 * 1024 * 1024,
            FlashSize::Mb16 => 16 * 1024 * 1024,
        }
    }
}

impl FromStr for FlashSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "4MB" => Ok(FlashSize::Mb4),
            "8MB" => Ok(FlashSize::Mb8),
            "16MB" => Ok(FlashSize::Mb16),
            _ => Err(format!("unknown flash size '{}', expected one of 4MB, 8MB, 16MB", s)),
        }
    }
}

impl fmt::Display for FlashSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overrides for one entity. `None` means "use the default".
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EntityConfig {
    pub name: Option<String>,
    pub id: Option<String>,
    pub unit_of_measurement: Option<String>,
    pub device_class: Option<String>,
    pub state_class: Option<String>,
}

/// An entity with every default filled in, ready for code generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntity {
    pub key: String,
    pub category: Category,
    pub id: String,
    pub name: String,
    /// Analog sensors only
    pub sensor: Option<SensorDefaults>,
}

impl Config {
    /// Load, merge and validate configuration files against the built-in catalog
    pub fn from_files(paths: &[PathBuf]) -> Result<(Self, Diagnostics), ConfigError> {
        opnpool_config::load_config::<Config>(paths).map_err(ConfigError::from)
    }

    /// Convert a merged partial config, checking entity keys against `catalog`
    pub fn from_partial(partial: PartialConfig, catalog: &Catalog) -> Result<Self, Vec<Diagnostic>> {
        let mut diagnostics = Vec::new();
        let source = partial.source.clone();
        let mut config = Config::default();

        if let Some(id) = partial.id {
            if is_cpp_identifier(&id) {
                config.id = id.into_inner();
            } else {
                diagnostics.push(validation(id.error("id", "not a valid C++ identifier")));
            }
        }

        if let Some(flash_size) = partial.flash_size {
            match flash_size.parse::<FlashSize>() {
                Ok(size) => config.flash_size = size,
                Err(message) => diagnostics.push(validation(flash_size.error("flash_size", message))),
            }
        }

        if let Some(logging) = partial.logging {
            config.logging = LoggingConfig {
                level: logging.level.map(Located::into_inner).unwrap_or_default(),
                overrides: logging
                    .overrides
                    .map(|hm| hm.into_iter().map(|(k, v)| (k, v.into_inner())).collect())
                    .unwrap_or_default(),
            };
        }

        if let Some(rs485) = partial.rs485 {
            let defaults = Rs485Config::default();
            let mut pin = |field: &str, value: Option<Located<i64>>, default: u8| match value {
                None => default,
                Some(value) => match u8::try_from(*value) {
                    Ok(gpio) if i64::from(gpio) <= MAX_GPIO => gpio,
                    _ => {
                        diagnostics.push(validation(value.error(
                            format!("rs485.{}", field),
                            format!("GPIO {} is outside 0..={}", *value, MAX_GPIO),
                        )));
                        default
                    }
                },
            };

            config.rs485 = Rs485Config {
                rx_pin: pin("rx_pin", rs485.rx_pin, defaults.rx_pin),
                tx_pin: pin("tx_pin", rs485.tx_pin, defaults.tx_pin),
                rts_pin: pin("rts_pin", rs485.rts_pin, defaults.rts_pin),
            };
        }

        let mut keys: Vec<_> = partial.entities.keys().cloned().collect();
        keys.sort();
        let mut entities = partial.entities;

        for key in keys {
            let Some(entity) = entities.remove(&key) else {
                continue;
            };
            match Self::convert_entity(&key, entity, catalog, &source) {
                Ok(entity) => {
                    config.entities.insert(key, entity);
                }
                Err(errors) => diagnostics.extend(errors),
            }
        }

        if diagnostics.is_empty() {
            Ok(config)
        } else {
            Err(diagnostics)
        }
    }

    fn convert_entity(
        key: &str,
        entity: PartialEntityConfig,
        catalog: &Catalog,
        source: &Option<SourceInfo>,
    ) -> Result<EntityConfig, Vec<Diagnostic>> {
        let field_path = format!("entities.{}", key);

        let Some(category) = catalog.category_of(key) else {
            let error = match &entity.header {
                Some(header) => ValidationError {
                    field_path,
                    message: format!("'{}' is not an OPNpool entity", key),
                    span: Some(header.span.clone()),
                    source: Some(SourceInfo {
                        file_path: header.file_path.clone(),
                        content: header.content.clone(),
                    }),
                },
                None => ValidationError {
                    field_path,
                    message: format!("'{}' is not an OPNpool entity", key),
                    span: None,
                    source: source.clone(),
                },
            };
            return Err(vec![validation(error)]);
        };

        let mut errors = Vec::new();

        if category != Category::Sensor {
            for (field, value) in entity.sensor_fields() {
                if let Some(value) = value {
                    errors.push(validation(value.error(
                        format!("{}.{}", field_path, field),
                        format!("'{}' only applies to analog sensors, '{}' is a {}", field, key, category),
                    )));
                }
            }
        }

        if let Some(id) = &entity.id {
            if !is_cpp_identifier(id) {
                errors.push(validation(
                    id.error(format!("{}.id", field_path), "not a valid C++ identifier"),
                ));
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(EntityConfig {
            name: entity.name.map(Located::into_inner),
            id: entity.id.map(Located::into_inner),
            unit_of_measurement: entity.unit_of_measurement.map(Located::into_inner),
            device_class: entity.device_class.map(Located::into_inner),
            state_class: entity.state_class.map(Located::into_inner),
        })
    }

    /// Fill in defaults for `key`, which must belong to `category` in `catalog`
    pub fn resolve_entity(&self, catalog: &Catalog, category: Category, key: &str) -> ResolvedEntity {
        let overrides = self.entities.get(key).cloned().unwrap_or_default();

        let sensor = (category == Category::Sensor).then(|| {
            let defaults = catalog
                .sensor_defaults(key)
                .cloned()
                .unwrap_or_else(|| SensorDefaults::new("", "", "measurement"));
            SensorDefaults {
                unit: overrides.unit_of_measurement.unwrap_or(defaults.unit),
                device_class: overrides.device_class.unwrap_or(defaults.device_class),
                state_class: overrides.state_class.unwrap_or(defaults.state_class),
            }
        });

        ResolvedEntity {
            key: key.to_string(),
            category,
            id: overrides.id.unwrap_or_else(|| key.to_string()),
            name: overrides.name.unwrap_or_else(|| default_name(key)),
            sensor,
        }
    }
}

impl TryFromPartial for Config {
    type Partial = PartialConfig;

    fn try_from_partial(partial: PartialConfig) -> Result<Self, Vec<Diagnostic>> {
        Config::from_partial(partial, Catalog::builtin())
    }
}

impl Validate for Config {
    fn validate(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        let pins = [
            ("rx_pin", self.rs485.rx_pin),
            ("tx_pin", self.rs485.tx_pin),
            ("rts_pin", self.rs485.rts_pin),
        ];
        for (i, (field, pin)) in pins.iter().enumerate() {
            if let Some((other, _)) = pins[..i].iter().find(|(_, p)| p == pin) {
                diagnostics.push(validation(ValidationError {
                    field_path: format!("rs485.{}", field),
                    message: format!("GPIO {} is already used as {}", pin, other),
                    span: None,
                    source: None,
                }));
            }
        }

        // Entity ids share one C++ scope with the component itself
        let mut ids: Vec<(&str, &str)> = self
            .entities
            .iter()
            .filter_map(|(key, entity)| entity.id.as_deref().map(|id| (id, key.as_str())))
            .collect();
        ids.sort();

        // Entities without an override keep their key as id
        let mut owners: HashMap<&str, &str> = HashMap::new();
        for key in Catalog::builtin().categories().flat_map(|(_, keys)| keys) {
            if !self.entities.get(key).is_some_and(|e| e.id.is_some()) {
                owners.insert(key.as_str(), key.as_str());
            }
        }

        if let Some(owner) = owners.insert(self.id.as_str(), "the OpnPool component") {
            diagnostics.push(validation(ValidationError {
                field_path: "id".to_string(),
                message: format!("id '{}' is already used by {}", self.id, owner),
                span: None,
                source: None,
            }));
        }

        for (id, key) in ids {
            if let Some(owner) = owners.insert(id, key) {
                diagnostics.push(validation(ValidationError {
                    field_path: format!("entities.{}.id", key),
                    message: format!("id '{}' is already used by {}", id, owner),
                    span: None,
                    source: None,
                }));
            }
        }

        diagnostics
    }
}

fn validation(error: ValidationError) -> Diagnostic {
    Diagnostic::Error(Error::Validation(error))
}

/// C++ keywords, plus names the generated setup code already uses
const RESERVED_IDS: &[&str] = &[
    "alignas", "alignof", "and", "and_eq", "asm", "auto", "bitand", "bitor", "bool", "break",
    "case", "catch", "char", "char8_t", "char16_t", "char32_t", "class", "compl", "concept",
    "const", "consteval", "constexpr", "constinit", "const_cast", "continue", "co_await",
    "co_return", "co_yield", "decltype", "default", "delete", "do", "double", "dynamic_cast",
    "else", "enum", "explicit", "export", "extern", "false", "float", "for", "friend", "goto",
    "if", "inline", "int", "long", "mutable", "namespace", "new", "noexcept", "not", "not_eq",
    "nullptr", "operator", "or", "or_eq", "private", "protected", "public", "register",
    "reinterpret_cast", "requires", "return", "short", "signed", "sizeof", "static",
    "static_assert", "static_cast", "struct", "switch", "template", "this", "thread_local",
    "throw", "true", "try", "typedef", "typeid", "typename", "union", "unsigned", "using",
    "virtual", "void", "volatile", "wchar_t", "while", "xor", "xor_eq",
    "App", "esphome", "sensor", "setup_opnpool",
];

fn is_cpp_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !RESERVED_IDS.contains(&s)
}
