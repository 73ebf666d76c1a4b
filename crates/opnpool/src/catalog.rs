//! The entity catalog.
//!
//! Every entity the pool controller exposes is listed here, grouped by
//! category. A key's position within its category is its ordinal: the value
//! passed to the entity's constructor during code generation and the value
//! of the matching member in `opnpool_ids.h`. Both are derived from this one
//! definition, so reordering a list here reorders both.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::LazyLock;

use heck::ToTitleCase;
use heck::ToUpperCamelCase;
use serde::Serialize;
use strum::Display;
use strum::EnumIter;
use strum::IntoEnumIterator;

/// Ordinals are stored as `uint8_t` on the firmware side
pub const MAX_MEMBERS: usize = 256;

/// Entity categories, in the order code generation visits them
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Display,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Category {
    Climate,
    Switch,
    Sensor,
    BinarySensor,
    TextSensor,
}

impl Category {
    /// Name of the C++ enum holding this category's ids, e.g. `switch_id_t`
    pub fn enum_name(self) -> String {
        format!("{}_id_t", self)
    }

    /// Names the enum had before the header switched to snake case:
    /// `SwitchId` and the flattened `Switchid`, `Binarysensorid`
    pub fn legacy_enum_names(self) -> [String; 2] {
        let flat: String = self.to_string().split('_').collect();
        let mut chars = flat.chars();
        let flat = match chars.next() {
            Some(first) => format!("{}{}id", first.to_ascii_uppercase(), chars.as_str()),
            None => String::new(),
        };
        [format!("{}Id", self.to_string().to_upper_camel_case()), flat]
    }

    /// C++ class implementing entities of this category
    pub fn class_name(self) -> &'static str {
        match self {
            Category::Climate => "OpnPoolClimate",
            Category::Switch => "OpnPoolSwitch",
            Category::Sensor => "OpnPoolSensor",
            Category::BinarySensor => "OpnPoolBinarySensor",
            Category::TextSensor => "OpnPoolTextSensor",
        }
    }

    /// Setter on the `OpnPool` component that receives the entity
    pub fn setter(self, key: &str) -> String {
        match self {
            Category::Climate => format!("set_{}", key),
            other => format!("set_{}_{}", key, other),
        }
    }
}

/// Schema defaults for an analog sensor. Not involved in ordinal assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorDefaults {
    pub unit: String,
    pub device_class: String,
    pub state_class: String,
}

impl SensorDefaults {
    pub fn new(unit: &str, device_class: &str, state_class: &str) -> Self {
        Self {
            unit: unit.to_string(),
            device_class: device_class.to_string(),
            state_class: state_class.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("invalid {category} key '{key}': keys are lowercase letters, digits and underscores")]
    InvalidKey { category: Category, key: String },

    #[error("key '{key}' appears more than once")]
    DuplicateKey { key: String },

    #[error("category {0} is declared more than once")]
    DuplicateCategory(Category),

    #[error("category {category} has {count} entries, at most {max} fit an 8-bit ordinal", max = MAX_MEMBERS)]
    TooManyMembers { category: Category, count: usize },
}

/// An ordered catalog of entity keys per category.
///
/// Immutable once built. Keys are unique across the whole catalog because
/// they also name the entity's table in the configuration file.
#[derive(Debug, Clone)]
pub struct Catalog {
    sections: Vec<(Category, Vec<String>)>,
    sensor_defaults: HashMap<String, SensorDefaults>,
}

static BUILTIN: LazyLock<Catalog> = LazyLock::new(|| {
    let measurement = "measurement";

    Catalog::builder()
        // same order as network_pool_thermo_t
        .category(Category::Climate, ["pool_climate", "spa_climate"])
        // same order as network_pool_circuit_t
        .category(
            Category::Switch,
            [
                "spa", "aux1", "aux2", "aux3", "feature1", "pool", "feature2", "feature3",
                "feature4",
            ],
        )
        .sensor("air_temperature", SensorDefaults::new("°C", "temperature", measurement))
        .sensor("water_temperature", SensorDefaults::new("°C", "temperature", measurement))
        .sensor("primary_pump_power", SensorDefaults::new("W", "power", measurement))
        .sensor("primary_pump_flow", SensorDefaults::new("gal/min", "volume_flow_rate", measurement))
        .sensor("primary_pump_speed", SensorDefaults::new("RPM", "", measurement))
        .sensor("chlorinator_level", SensorDefaults::new("%", "", measurement))
        .sensor("chlorinator_salt", SensorDefaults::new("ppm", "", measurement))
        .sensor("primary_pump_error", SensorDefaults::new("", "", measurement))
        .category(
            Category::BinarySensor,
            [
                "primary_pump_running",
                "mode_service",
                "mode_temperature_inc",
                "mode_freeze_protection",
                "mode_timeout",
            ],
        )
        .category(
            Category::TextSensor,
            [
                "pool_sched",
                "spa_sched",
                "primary_pump_mode",
                "primary_pump_state",
                "chlorinator_name",
                "chlorinator_status",
                "system_time",
                "controller_type",
                "interface_firmware",
            ],
        )
        .build()
        .expect("built-in catalog is well formed")
});

impl Catalog {
    /// The catalog of the OPNpool interface board
    pub fn builtin() -> &'static Catalog {
        &BUILTIN
    }

    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Categories and their ordered keys, always in `Category` order.
    ///
    /// Categories that were never declared are not yielded.
    pub fn categories(&self) -> impl Iterator<Item = (Category, &[String])> {
        self.sections
            .iter()
            .map(|(category, keys)| (*category, keys.as_slice()))
    }

    pub fn keys(&self, category: Category) -> Option<&[String]> {
        self.sections
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, keys)| keys.as_slice())
    }

    /// Position of `key` within `category`
    pub fn ordinal(&self, category: Category, key: &str) -> Option<u8> {
        self.keys(category)?
            .iter()
            .position(|k| k == key)
            .and_then(|i| u8::try_from(i).ok())
    }

    pub fn category_of(&self, key: &str) -> Option<Category> {
        self.categories()
            .find(|(_, keys)| keys.iter().any(|k| k == key))
            .map(|(category, _)| category)
    }

    pub fn sensor_defaults(&self, key: &str) -> Option<&SensorDefaults> {
        self.sensor_defaults.get(key)
    }

    pub fn len(&self) -> usize {
        self.sections.iter().map(|(_, keys)| keys.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Friendly name used when the configuration does not set one: `pool_climate` -> `Pool Climate`
pub fn default_name(key: &str) -> String {
    key.to_title_case()
}

/// Member name of `key` in the C++ enum: `primary_pump_power` -> `PRIMARY_PUMP_POWER`
pub fn member_name(key: &str) -> String {
    key.to_ascii_uppercase()
}

#[derive(Debug, Default)]
pub struct CatalogBuilder {
    sections: Vec<(Category, Vec<String>)>,
    sensor_defaults: HashMap<String, SensorDefaults>,
    duplicate_category: Option<Category>,
}

impl CatalogBuilder {
    /// Declare a category and its keys in ordinal order
    pub fn category<I, S>(mut self, category: Category, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.sections.iter().any(|(c, _)| *c == category) {
            self.duplicate_category.get_or_insert(category);
        } else {
            self.sections
                .push((category, keys.into_iter().map(Into::into).collect()));
        }
        self
    }

    /// Append an analog sensor with its schema defaults
    pub fn sensor(mut self, key: &str, defaults: SensorDefaults) -> Self {
        match self.sections.iter_mut().find(|(c, _)| *c == Category::Sensor) {
            Some((_, keys)) => keys.push(key.to_string()),
            None => self
                .sections
                .push((Category::Sensor, vec![key.to_string()])),
        }
        self.sensor_defaults.insert(key.to_string(), defaults);
        self
    }

    pub fn build(mut self) -> Result<Catalog, CatalogError> {
        if let Some(category) = self.duplicate_category {
            return Err(CatalogError::DuplicateCategory(category));
        }

        let mut seen = HashSet::new();
        for (category, keys) in &self.sections {
            if keys.len() > MAX_MEMBERS {
                return Err(CatalogError::TooManyMembers {
                    category: *category,
                    count: keys.len(),
                });
            }
            for key in keys {
                if !is_valid_key(key) {
                    return Err(CatalogError::InvalidKey {
                        category: *category,
                        key: key.clone(),
                    });
                }
                if !seen.insert(key.as_str()) {
                    return Err(CatalogError::DuplicateKey { key: key.clone() });
                }
            }
        }

        let order: Vec<Category> = Category::iter().collect();
        self.sections
            .sort_by_key(|(category, _)| order.iter().position(|c| c == category));

        Ok(Catalog {
            sections: self.sections,
            sensor_defaults: self.sensor_defaults,
        })
    }
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
