use std::fmt::Write as _;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use heck::ToShoutySnakeCase;
use tracing::info;

use super::Arg;
use super::CodegenTarget;
use super::EntityInstance;
use super::Library;
use super::OptionValue;
use crate::fs::replace_atomically;

pub const SETUP_FILE: &str = "opnpool_setup.cpp";
pub const PLATFORMIO_FILE: &str = "platformio_opnpool.ini";

const BANNER: &str = "Generated by opnpool. Do not edit.";

/// Renders the wiring as a C++ setup function and a `platformio.ini` fragment
#[derive(Debug, Default)]
pub struct CppTarget {
    statements: Vec<String>,
    libraries: Vec<String>,
    build_flags: Vec<String>,
    options: Vec<(String, OptionValue)>,
}

/// Paths written by [`CppTarget::write`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFiles {
    pub setup: PathBuf,
    pub platformio: PathBuf,
}

impl CppTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render_setup(&self) -> String {
        let mut out = String::new();
        writeln!(out, "// {}", BANNER).ok();
        writeln!(out, "#include \"esphome.h\"").ok();
        writeln!(out).ok();
        writeln!(out, "namespace esphome {{").ok();
        writeln!(out, "namespace opnpool {{").ok();
        writeln!(out).ok();
        writeln!(out, "void setup_opnpool() {{").ok();
        for statement in &self.statements {
            writeln!(out, "  {}", statement).ok();
        }
        writeln!(out, "}}").ok();
        writeln!(out).ok();
        writeln!(out, "}}  // namespace opnpool").ok();
        writeln!(out, "}}  // namespace esphome").ok();
        out
    }

    pub fn render_platformio(&self) -> String {
        let mut out = String::new();
        writeln!(out, "; {}", BANNER).ok();
        writeln!(out, "[opnpool]").ok();

        let list = |out: &mut String, key: &str, items: &[String]| {
            if items.is_empty() {
                return;
            }
            writeln!(out, "{} =", key).ok();
            for item in items {
                writeln!(out, "    {}", item).ok();
            }
        };
        list(&mut out, "lib_deps", &self.libraries);
        list(&mut out, "build_flags", &self.build_flags);

        for (key, value) in &self.options {
            match value {
                OptionValue::Str(s) => {
                    writeln!(out, "{} = {}", key, s).ok();
                }
                OptionValue::Int(n) => {
                    writeln!(out, "{} = {}", key, n).ok();
                }
                OptionValue::List(items) => list(&mut out, key, items),
            }
        }

        out
    }

    /// Write both files into `out_dir`, each replaced atomically
    pub fn write(&self, out_dir: &Path) -> io::Result<GeneratedFiles> {
        std::fs::create_dir_all(out_dir)?;

        let files = GeneratedFiles {
            setup: out_dir.join(SETUP_FILE),
            platformio: out_dir.join(PLATFORMIO_FILE),
        };
        replace_atomically(&files.setup, &self.render_setup())?;
        replace_atomically(&files.platformio, &self.render_platformio())?;

        info!(
            "Wrote {} and {}",
            files.setup.display(),
            files.platformio.display()
        );
        Ok(files)
    }

    fn push(&mut self, statement: String) {
        self.statements.push(statement);
    }
}

#[async_trait]
impl CodegenTarget for CppTarget {
    async fn new_component(&mut self, id: &str, class: &str) -> anyhow::Result<()> {
        self.push(format!("auto *{} = new {}();", id, class));
        self.push(format!("App.register_component({});", id));
        Ok(())
    }

    async fn add_library(&mut self, library: Library) -> anyhow::Result<()> {
        let dep = library.as_lib_dep();
        if !self.libraries.contains(&dep) {
            self.libraries.push(dep);
        }
        Ok(())
    }

    async fn add_build_flag(&mut self, flag: &str) -> anyhow::Result<()> {
        if !self.build_flags.iter().any(|f| f == flag) {
            self.build_flags.push(flag.to_string());
        }
        Ok(())
    }

    async fn add_platformio_option(&mut self, key: &str, value: OptionValue) -> anyhow::Result<()> {
        match self.options.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.options.push((key.to_string(), value)),
        }
        Ok(())
    }

    async fn call(&mut self, target: &str, method: &str, args: &[Arg]) -> anyhow::Result<()> {
        let args: Vec<String> = args
            .iter()
            .map(|arg| match arg {
                Arg::Int(n) => n.to_string(),
                Arg::Var(v) => v.clone(),
            })
            .collect();
        self.push(format!("{}->{}({});", target, method, args.join(", ")));
        Ok(())
    }

    async fn new_entity(&mut self, instance: &EntityInstance) -> anyhow::Result<()> {
        self.push(format!(
            "auto *{} = new {}({}, {});",
            instance.entity.id, instance.class, instance.parent, instance.ordinal
        ));
        Ok(())
    }

    async fn register_entity(&mut self, instance: &EntityInstance) -> anyhow::Result<()> {
        let entity = &instance.entity;
        self.push(format!("App.register_{}({});", entity.category, entity.id));
        self.push(format!("{}->set_name({});", entity.id, string_literal(&entity.name)));

        if let Some(sensor) = &entity.sensor {
            if !sensor.unit.is_empty() {
                self.push(format!(
                    "{}->set_unit_of_measurement({});",
                    entity.id,
                    string_literal(&sensor.unit)
                ));
            }
            if !sensor.device_class.is_empty() {
                self.push(format!(
                    "{}->set_device_class({});",
                    entity.id,
                    string_literal(&sensor.device_class)
                ));
            }
            let state_class = if sensor.state_class.is_empty() {
                "NONE".to_string()
            } else {
                sensor.state_class.to_shouty_snake_case()
            };
            self.push(format!(
                "{}->set_state_class(sensor::STATE_CLASS_{});",
                entity.id, state_class
            ));
        }

        Ok(())
    }
}

fn string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::catalog::Catalog;
    use crate::catalog::Category;
    use crate::catalog::SensorDefaults;
    use crate::codegen::generate;
    use crate::codegen::CodegenContext;
    use crate::config::Config;
    use crate::config::EntityConfig;

    async fn generated(config: &Config) -> CppTarget {
        let catalog = Catalog::builder()
            .category(Category::Climate, ["pool_climate"])
            .sensor("water_temperature", SensorDefaults::new("°C", "temperature", "measurement"))
            .category(Category::BinarySensor, ["mode_service"])
            .build()
            .unwrap();
        let ctx = CodegenContext {
            catalog: &catalog,
            component_dir: PathBuf::from("/opt/opnpool/component"),
            header: None,
            version: "git-abc1234".to_string(),
        };

        let mut target = CppTarget::new();
        generate(config, &ctx, &mut target).await.unwrap();
        target
    }

    #[tokio::test]
    async fn test_render_setup() {
        let mut config = Config::default();
        config.entities.insert(
            "mode_service".to_string(),
            EntityConfig {
                name: Some("Service \"Mode\"".to_string()),
                ..Default::default()
            },
        );

        let target = generated(&config).await;
        insta::assert_snapshot!(target.render_setup(), @r#"
        // Generated by opnpool. Do not edit.
        #include "esphome.h"

        namespace esphome {
        namespace opnpool {

        void setup_opnpool() {
          auto *opnpool = new OpnPool();
          App.register_component(opnpool);
          opnpool->set_rs485_pins(22, 21, 23);
          auto *pool_climate = new OpnPoolClimate(opnpool, 0);
          App.register_climate(pool_climate);
          pool_climate->set_name("Pool Climate");
          opnpool->set_pool_climate(pool_climate);
          auto *water_temperature = new OpnPoolSensor(opnpool, 0);
          App.register_sensor(water_temperature);
          water_temperature->set_name("Water Temperature");
          water_temperature->set_unit_of_measurement("°C");
          water_temperature->set_device_class("temperature");
          water_temperature->set_state_class(sensor::STATE_CLASS_MEASUREMENT);
          opnpool->set_water_temperature_sensor(water_temperature);
          auto *mode_service = new OpnPoolBinarySensor(opnpool, 0);
          App.register_binary_sensor(mode_service);
          mode_service->set_name("Service \"Mode\"");
          opnpool->set_mode_service_binary_sensor(mode_service);
        }

        }  // namespace opnpool
        }  // namespace esphome
        "#);
    }

    #[tokio::test]
    async fn test_render_platformio() {
        let target = generated(&Config::default()).await;
        insta::assert_snapshot!(target.render_platformio(), @r#"
        ; Generated by opnpool. Do not edit.
        [opnpool]
        lib_deps =
            ESP32=freertos
        build_flags =
            -I/opt/opnpool/component
            -fmax-errors=5
            -Wl,-Map=output.map
            -DGIT_HASH=\"git-abc1234\"
        build_src_filter =
            +<*>
            +</opt/opnpool/component/core/*.cpp>
            +</opt/opnpool/component/entities/*.cpp>
            +</opt/opnpool/component/ipc/*.cpp>
            +</opt/opnpool/component/pool_task/*.cpp>
            +</opt/opnpool/component/utils/*.cpp>
        board_build.partitions = /opt/opnpool/component/core/partitions.csv
        board_build.flash_size = 8MB
        board_upload.flash_size = 8MB
        board_upload.maximum_size = 8388608
        "#);
    }

    #[tokio::test]
    async fn test_options_replace_and_flags_dedupe() {
        let mut target = CppTarget::new();
        target.add_build_flag("-DX").await.unwrap();
        target.add_build_flag("-DX").await.unwrap();
        target.add_platformio_option("k", "a".into()).await.unwrap();
        target.add_platformio_option("k", 2u64.into()).await.unwrap();

        let ini = target.render_platformio();
        assert_eq!(ini.matches("-DX").count(), 1);
        assert!(ini.ends_with("k = 2\n"));
    }

    #[tokio::test]
    async fn test_write_files() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("generated");
        let target = generated(&Config::default()).await;

        let files = target.write(&out).unwrap();

        assert_eq!(files.setup, out.join(SETUP_FILE));
        assert_eq!(std::fs::read_to_string(&files.setup).unwrap(), target.render_setup());
        assert_eq!(
            std::fs::read_to_string(&files.platformio).unwrap(),
            target.render_platformio()
        );
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 2);
    }

    #[test]
    fn test_string_literal_escapes() {
        assert_eq!(string_literal(r"a\b"), r#""a\\b""#);
        assert_eq!(string_literal("x\ny"), r#""x\ny""#);
    }
}
