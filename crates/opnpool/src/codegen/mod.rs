//! Build wiring for the OPNpool component.
//!
//! [`generate`] walks the configuration and the catalog and describes the
//! build to a [`CodegenTarget`]: the component instance, libraries, build
//! flags and PlatformIO options, then every entity with its ordinal.

mod cpp;
mod ordinals;
mod version;

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;
use tracing::info;

pub use cpp::CppTarget;
pub use cpp::GeneratedFiles;
pub use ordinals::assignments;
pub use ordinals::OrdinalAssignment;
pub use version::discover_version;
pub use version::git_version;
pub use version::pick_version;

use crate::catalog::Catalog;
use crate::catalog::Category;
use crate::config::Config;
use crate::config::ResolvedEntity;
use crate::sync::check;
use crate::sync::SyncError;

/// C++ class of the top-level component
pub const COMPONENT_CLASS: &str = "OpnPool";

/// Component subdirectories whose sources are compiled alongside the generated code
pub const SOURCE_DIRS: [&str; 5] = ["core", "entities", "ipc", "pool_task", "utils"];

#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    #[error(
        "opnpool_ids.h does not match the catalog for: {}",
        categories.iter().map(|c| c.enum_name()).collect::<Vec<_>>().join(", ")
    )]
    OrdinalDrift { categories: Vec<Category> },

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Target(#[from] anyhow::Error),
}

/// Value of a PlatformIO option
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Str(String),
    Int(u64),
    List(Vec<String>),
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        OptionValue::Str(s.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(s: String) -> Self {
        OptionValue::Str(s)
    }
}

impl From<u64> for OptionValue {
    fn from(n: u64) -> Self {
        OptionValue::Int(n)
    }
}

/// A PlatformIO library dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Library {
    pub name: String,
    pub version: Option<String>,
    pub repository: Option<String>,
}

impl Library {
    /// Entry for `lib_deps`: `name=repository`, `name@version` or `name`
    pub fn as_lib_dep(&self) -> String {
        match (&self.repository, &self.version) {
            (Some(repository), _) => format!("{}={}", self.name, repository),
            (None, Some(version)) => format!("{}@{}", self.name, version),
            (None, None) => self.name.clone(),
        }
    }
}

/// An argument of a generated method call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Int(i64),
    Var(String),
}

/// An entity constructed with its parent and ordinal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityInstance {
    pub entity: ResolvedEntity,
    pub class: &'static str,
    /// Variable id of the owning component
    pub parent: String,
    pub ordinal: u8,
}

/// The build system the wiring is emitted into.
///
/// Calls arrive strictly in order and each one is awaited before the next
/// is made. An error aborts generation.
#[async_trait]
pub trait CodegenTarget: Send {
    /// Construct the component and register it with the application
    async fn new_component(&mut self, id: &str, class: &str) -> anyhow::Result<()>;

    async fn add_library(&mut self, library: Library) -> anyhow::Result<()>;

    async fn add_build_flag(&mut self, flag: &str) -> anyhow::Result<()>;

    async fn add_platformio_option(&mut self, key: &str, value: OptionValue) -> anyhow::Result<()>;

    /// Call `method` on the variable `target`
    async fn call(&mut self, target: &str, method: &str, args: &[Arg]) -> anyhow::Result<()>;

    /// Construct an entity with its parent and ordinal
    async fn new_entity(&mut self, instance: &EntityInstance) -> anyhow::Result<()>;

    /// Register an entity of its category, applying name and sensor attributes
    async fn register_entity(&mut self, instance: &EntityInstance) -> anyhow::Result<()>;
}

/// Inputs to [`generate`] other than the configuration
pub struct CodegenContext<'a> {
    pub catalog: &'a Catalog,
    /// Component sources, used for include paths and the source filter
    pub component_dir: PathBuf,
    /// Header to verify against the catalog before emitting anything
    pub header: Option<PathBuf>,
    /// Firmware version baked in as `GIT_HASH`
    pub version: String,
}

/// What [`generate`] emitted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateSummary {
    /// Entity count per category, in generation order
    pub entities: Vec<(Category, usize)>,
}

impl GenerateSummary {
    pub fn total(&self) -> usize {
        self.entities.iter().map(|(_, n)| n).sum()
    }
}

/// Describe the whole build to `target`
pub async fn generate<T>(
    config: &Config,
    ctx: &CodegenContext<'_>,
    target: &mut T,
) -> Result<GenerateSummary, CodegenError>
where
    T: CodegenTarget + ?Sized,
{
    if let Some(header) = &ctx.header {
        let report = check(header, ctx.catalog)?;
        if !report.is_in_sync() {
            return Err(CodegenError::OrdinalDrift {
                categories: report.drifted(),
            });
        }
    }

    target.new_component(&config.id, COMPONENT_CLASS).await?;

    emit_build_options(config, ctx, target).await?;

    let rs485 = config.rs485;
    target
        .call(
            &config.id,
            "set_rs485_pins",
            &[
                Arg::Int(rs485.rx_pin.into()),
                Arg::Int(rs485.tx_pin.into()),
                Arg::Int(rs485.rts_pin.into()),
            ],
        )
        .await?;

    let mut summary = GenerateSummary::default();

    for assignment in assignments(ctx.catalog) {
        let category = assignment.category();
        for (key, ordinal) in assignment.iter() {
            let instance = EntityInstance {
                entity: config.resolve_entity(ctx.catalog, category, key),
                class: category.class_name(),
                parent: config.id.clone(),
                ordinal,
            };

            target.new_entity(&instance).await?;
            target.register_entity(&instance).await?;
            target
                .call(
                    &config.id,
                    &category.setter(key),
                    &[Arg::Var(instance.entity.id.clone())],
                )
                .await?;

            debug!(
                "Emitted {} {} as {} (ordinal {})",
                category, key, instance.entity.id, ordinal
            );
        }

        summary.entities.push((category, assignment.len()));
    }

    info!(
        "Generated wiring for {} entities, firmware version {}",
        summary.total(),
        ctx.version
    );

    Ok(summary)
}

async fn emit_build_options<T>(
    config: &Config,
    ctx: &CodegenContext<'_>,
    target: &mut T,
) -> Result<(), CodegenError>
where
    T: CodegenTarget + ?Sized,
{
    // PlatformIO wants forward slashes even on Windows
    let component_dir = ctx.component_dir.to_string_lossy().replace('\\', "/");

    target
        .add_library(Library {
            name: "ESP32".to_string(),
            version: None,
            repository: Some("freertos".to_string()),
        })
        .await?;

    target
        .add_build_flag(&format!("-I{}", component_dir))
        .await?;

    let mut filter = vec!["+<*>".to_string()];
    filter.extend(
        SOURCE_DIRS
            .iter()
            .map(|dir| format!("+<{}/{}/*.cpp>", component_dir, dir)),
    );
    target
        .add_platformio_option("build_src_filter", OptionValue::List(filter))
        .await?;
    target
        .add_platformio_option(
            "board_build.partitions",
            format!("{}/core/partitions.csv", component_dir).into(),
        )
        .await?;

    let flash_size = config.flash_size;
    target
        .add_platformio_option("board_build.flash_size", flash_size.as_str().into())
        .await?;
    target
        .add_platformio_option("board_upload.flash_size", flash_size.as_str().into())
        .await?;
    target
        .add_platformio_option("board_upload.maximum_size", flash_size.bytes().into())
        .await?;

    target.add_build_flag("-fmax-errors=5").await?;
    target.add_build_flag("-Wl,-Map=output.map").await?;
    target
        .add_build_flag(&format!("-DGIT_HASH=\\\"{}\\\"", ctx.version))
        .await?;

    Ok(())
}
