use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use tokenmenu::{ConfigError, ModuleConfig, ModuleError};
use tracing::info;
use tracing_subscriber::EnvFilter;

const CONFIG_ENV_VAR: &str = "TOKENMENU_CONFIG";
const SNAPSHOT_DIR_ENV_VAR: &str = "TOKENMENU_SNAPSHOT_DIR";

#[derive(Debug, Error)]
pub(crate) enum DemoError {
    #[error("failed to read config file {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Module(#[from] ModuleError),
    #[error("unknown scenario '{0}'")]
    UnknownScenario(String),
    #[error("failed to create snapshot directory {path}: {source}")]
    SnapshotDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write snapshot {path}: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to encode report: {0}")]
    Report(#[from] serde_json::Error),
    #[error("{failed} of {total} scenarios failed")]
    ScenariosFailed { failed: usize, total: usize },
}

#[derive(Debug, Clone)]
pub(crate) struct DemoOptions {
    pub(crate) config: ModuleConfig,
    pub(crate) scenario_filter: Vec<String>,
    pub(crate) snapshot_dir: Option<PathBuf>,
    pub(crate) json_report: bool,
}

pub(crate) fn build_options() -> Result<DemoOptions, DemoError> {
    init_tracing();
    info!("=== Token Menu Demo ===");

    let config = load_config_from_env()?;
    let (scenario_filter, json_report) = parse_args(std::env::args().skip(1));
    let snapshot_dir = std::env::var(SNAPSHOT_DIR_ENV_VAR)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .map(PathBuf::from);

    Ok(DemoOptions {
        config,
        scenario_filter,
        snapshot_dir,
        json_report,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn load_config_from_env() -> Result<ModuleConfig, DemoError> {
    let Some(path) = std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from) else {
        return Ok(ModuleConfig::default());
    };
    let raw = fs::read_to_string(&path).map_err(|source| DemoError::ReadConfig {
        path: path.clone(),
        source,
    })?;
    let config = ModuleConfig::from_json_str(&raw)?;
    info!(path = %path.display(), "config_loaded");
    Ok(config)
}

/// Splits argv into scenario names and the `--json` flag.
fn parse_args(args: impl Iterator<Item = String>) -> (Vec<String>, bool) {
    let mut names = Vec::new();
    let mut json = false;
    for arg in args {
        match arg.trim() {
            "" => {}
            "--json" => json = true,
            name => names.push(name.to_string()),
        }
    }
    (names, json)
}
