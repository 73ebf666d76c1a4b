use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use clap::Subcommand;
use opnpool::catalog::Catalog;
use opnpool::codegen::discover_version;
use opnpool::codegen::generate;
use opnpool::codegen::CodegenContext;
use opnpool::codegen::CppTarget;
use opnpool::config::Config;
use opnpool::config::LogLevel;
use opnpool::config::LoggingConfig;
use opnpool::sync::check;
use opnpool::sync::synchronize;
use opnpool::sync::Drift;
use opnpool_config::render_diagnostics;
use opnpool_config::Diagnostic;
use tracing_subscriber::EnvFilter;

/// Component sources shipped with this crate
const COMPONENT_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/component");

#[derive(Parser, Debug)]
#[command(name = "opnpool")]
#[command(version, about = "Entity catalog, id header sync and build wiring for the OPNpool component")]
struct Args {
    /// Log level when no config file sets one (overridden by RUST_LOG)
    #[arg(long, value_enum, global = true)]
    log_level: Option<CliLogLevel>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Regenerate the id enums in opnpool_ids.h from the catalog (default)
    Sync {
        /// Header to rewrite
        #[arg(long, value_name = "PATH")]
        header: Option<PathBuf>,
    },

    /// Report whether opnpool_ids.h matches the catalog, without changing it
    Check {
        #[arg(long, value_name = "PATH")]
        header: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Emit the C++ setup code and PlatformIO options for a configuration
    Generate {
        /// Configuration files; imports are followed from each
        #[arg(short, long = "config", value_name = "FILE", required = true)]
        configs: Vec<PathBuf>,

        /// Directory to write opnpool_setup.cpp and platformio_opnpool.ini into
        #[arg(short, long, value_name = "DIR")]
        out: PathBuf,

        /// Header verified against the catalog before generating
        #[arg(long, value_name = "PATH")]
        header: Option<PathBuf>,

        /// Component sources referenced by the build options
        #[arg(long, value_name = "DIR")]
        component_dir: Option<PathBuf>,

        /// Host framework version, used when git is unavailable (default: $ESPHOME_VERSION)
        #[arg(long, value_name = "VERSION")]
        host_version: Option<String>,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum CliLogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<CliLogLevel> for LogLevel {
    fn from(level: CliLogLevel) -> Self {
        match level {
            CliLogLevel::Trace => LogLevel::Trace,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Error => LogLevel::Error,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    let cli_level = args.log_level.map(LogLevel::from);

    match args.command.unwrap_or(Command::Sync { header: None }) {
        Command::Sync { header } => {
            init_tracing(&logging_for(cli_level));
            run_sync(header)
        }
        Command::Check { header, json } => {
            init_tracing(&logging_for(cli_level));
            run_check(header, json)
        }
        Command::Generate {
            configs,
            out,
            header,
            component_dir,
            host_version,
        } => {
            let (config, diagnostics) = match Config::from_files(&configs) {
                Ok(loaded) => loaded,
                Err(e) => {
                    print_diagnostics(&e.diagnostics.0);
                    return Err(e).context("failed to load configuration");
                }
            };
            if !diagnostics.0.is_empty() {
                print_diagnostics(&diagnostics.0);
            }

            let mut logging = config.logging.clone();
            if let Some(level) = cli_level {
                logging.level = level;
            }
            init_tracing(&logging);

            let component_dir = component_dir.unwrap_or_else(|| PathBuf::from(COMPONENT_DIR));
            let header = header.unwrap_or_else(default_header);
            let host_version = host_version.or_else(|| std::env::var("ESPHOME_VERSION").ok());

            let ctx = CodegenContext {
                catalog: Catalog::builtin(),
                version: discover_version(&component_dir, host_version.as_deref()).await,
                component_dir,
                header: Some(header),
            };

            let mut target = CppTarget::new();
            generate(&config, &ctx, &mut target)
                .await
                .context("code generation failed")?;
            target
                .write(&out)
                .with_context(|| format!("failed to write generated files to {}", out.display()))?;

            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_sync(header: Option<PathBuf>) -> anyhow::Result<ExitCode> {
    let header = header.unwrap_or_else(default_header);
    let report = synchronize(&header, Catalog::builtin())
        .with_context(|| format!("failed to synchronize {}", header.display()))?;

    if !report.rewritten {
        tracing::info!("{} is up to date", header.display());
    }
    Ok(ExitCode::SUCCESS)
}

fn run_check(header: Option<PathBuf>, json: bool) -> anyhow::Result<ExitCode> {
    let header = header.unwrap_or_else(default_header);
    let report = check(&header, Catalog::builtin())
        .with_context(|| format!("failed to check {}", header.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for (category, drift) in &report.categories {
            let status = match drift {
                Drift::InSync => "in sync",
                Drift::OutOfSync { .. } => "out of sync",
                Drift::Missing => "missing",
            };
            println!("{:<20} {}", category.enum_name(), status);
        }
    }

    if report.is_in_sync() {
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::warn!("{} is out of sync, run `opnpool sync`", header.display());
        Ok(ExitCode::FAILURE)
    }
}

fn print_diagnostics(diagnostics: &[Diagnostic]) {
    eprint!("{}", render_diagnostics(diagnostics, std::io::stderr().is_terminal()));
}

fn default_header() -> PathBuf {
    PathBuf::from(COMPONENT_DIR).join("core").join("opnpool_ids.h")
}

fn logging_for(level: Option<LogLevel>) -> LoggingConfig {
    LoggingConfig {
        level: level.unwrap_or_default(),
        ..Default::default()
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.filter_directives()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
