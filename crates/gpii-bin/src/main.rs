//! `--mode install/uninstall/service/foreground` driver: resolves
//! configuration, sets up logging, and either manages the Windows service
//! registration or hands off to the supervisor event loop.

mod driver;
mod install;
#[cfg(target_os = "windows")]
mod service_mode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use gpii_core::config::{ConfigFile, DEFAULT_SERVICE_NAME};
use gpii_core::SupervisorConfig;
use tracing::info;

#[derive(Parser, Debug, Clone)]
#[command(name = "gpii-service")]
#[command(about = "Supervises the per-user helper process across session boundaries")]
#[command(version)]
pub struct Cli {
    /// Selects install/uninstall/service dispatch, or foreground dev mode
    /// when omitted.
    #[arg(long, value_enum, env = "GPII_SERVICE_MODE")]
    mode: Option<Mode>,

    /// Comma-separated extra args appended to the helper command line.
    #[arg(long, env = "GPII_SERVICE_PROGRAM_ARGS", value_delimiter = ',')]
    program_args: Vec<String>,

    /// Comma-separated extra args for the host runtime, if any.
    #[arg(long, env = "GPII_SERVICE_NODE_ARGS", value_delimiter = ',')]
    node_args: Vec<String>,

    /// Path to the user-mode application to launch.
    #[arg(long, env = "GPII_SERVICE_GPII")]
    gpii: Option<String>,

    /// Service name used for SCM registration and `sc.exe` lookups.
    #[arg(long, env = "GPII_SERVICE_SERVICE_NAME")]
    service_name: Option<String>,

    /// `tracing` env-filter directive. `RUST_LOG` takes precedence.
    #[arg(long, env = "GPII_SERVICE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Optional TOML overlay, applied below environment and CLI flags.
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Install,
    Uninstall,
    Service,
}

fn resolve_config(cli: &Cli) -> Result<SupervisorConfig> {
    let mut config = SupervisorConfig::default();

    if let Some(path) = &cli.config {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let file: ConfigFile = toml::from_str(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config = config.apply_file(file);
    }

    if let Some(name) = &cli.service_name {
        config.service_name = name.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }

    Ok(config)
}

fn init_logging(config: &SupervisorConfig, foreground: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    if foreground {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
        return None;
    }

    let log_dir = directories::ProjectDirs::from("", "", &config.product_name)
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| std::path::PathBuf::from(r"C:\ProgramData").join(&config.product_name));
    let _ = std::fs::create_dir_all(&log_dir);

    let file_name = format!("{}.log", config.service_name);
    let file_appender = tracing_appender::rolling::daily(&log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();

    Some(guard)
}

fn helper_command(cli: &Cli) -> String {
    let mut parts = Vec::new();
    if let Some(gpii) = &cli.gpii {
        parts.push(format!("\"{}\"", gpii));
    }
    for arg in &cli.node_args {
        parts.push(arg.clone());
    }
    for arg in &cli.program_args {
        parts.push(arg.clone());
    }
    parts.join(" ")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    match cli.mode {
        Some(Mode::Install) => {
            let _guard = init_logging(&config, true);
            install::run_install(&config, cli.gpii.as_deref(), &cli.node_args, &cli.program_args)
        }
        Some(Mode::Uninstall) => {
            let _guard = init_logging(&config, true);
            install::run_uninstall(&config)
        }
        Some(Mode::Service) => run_service_mode(config, cli),
        None => run_foreground_mode(config, cli),
    }
}

#[cfg(target_os = "windows")]
fn run_service_mode(config: SupervisorConfig, cli: Cli) -> Result<()> {
    let _guard = init_logging(&config, false);
    info!("starting in service mode: {}", config.service_name);
    service_mode::run(config, helper_command(&cli))
}

#[cfg(not(target_os = "windows"))]
fn run_service_mode(_config: SupervisorConfig, _cli: Cli) -> Result<()> {
    anyhow::bail!("service mode is only available on Windows")
}

fn run_foreground_mode(config: SupervisorConfig, cli: Cli) -> Result<()> {
    let _guard = init_logging(&config, true);
    info!(
        "gpii-service v{} starting in foreground mode",
        env!("CARGO_PKG_VERSION")
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build async runtime")?;

    runtime.block_on(driver::run_foreground(config, helper_command(&cli)))
}

#[allow(dead_code)]
fn default_service_name() -> &'static str {
    DEFAULT_SERVICE_NAME
}
