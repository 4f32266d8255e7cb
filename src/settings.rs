use std::path::{Path, PathBuf};

use clap::Parser;
use config::{builder::DefaultState, ConfigBuilder, ConfigError, File};
use jiff::civil::Date;
use serde::Deserialize;
use tracing::Level;

use crate::engine::EngineOptions;

const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Parser, Debug)]
#[command(version)]
pub struct Args {
    /// Path to the local configuration TOML file.
    #[arg(short, value_name = "CONFIG_PATH")]
    pub config: PathBuf,

    /// Print the records behind the tile with this key instead of the tiles.
    #[arg(long, value_name = "TILE_KEY")]
    pub drill_down: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    #[serde(deserialize_with = "deserialize_level")]
    pub level: Level,
}

/// Which tile computation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryPoint {
    /// Dashboard tiles: one-decimal averages, `contains` click filters.
    Dashboard,
    /// Summary cards: whole-day averages, `{type, value}` click filters.
    Summary,
}

#[derive(Debug, Deserialize)]
pub struct DashboardFiles {
    /// JSON array of tile specs.
    pub tiles: PathBuf,
    /// JSON array of records.
    pub records: PathBuf,
    /// JSON array of `{key, subtitle}` metric tiles.
    pub metrics: Option<PathBuf>,
    pub entry_point: EntryPoint,
}

/// The reporting period. Records are split into the current and previous
/// windows by the date in `column`.
#[derive(Debug, Deserialize)]
pub struct Window {
    pub column: String,
    #[serde(deserialize_with = "deserialize_date")]
    pub begin: Date,
    #[serde(deserialize_with = "deserialize_date")]
    pub end: Date,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub engine: EngineOptions,
    pub log: Log,
    pub dashboard: DashboardFiles,
    pub window: Option<Window>,
}

impl Settings {
    /// Load settings from the given TOML file, with sane defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let builder = ConfigBuilder::<DefaultState>::default()
            .set_default("engine.unknown_operator", "permissive")?
            .set_default("log.level", DEFAULT_LOG_LEVEL)?
            .set_default("dashboard.entry_point", "dashboard")?;

        let cfg = builder.add_source(File::from(path)).build()?;

        cfg.try_deserialize()
    }
}

fn deserialize_level<'de, D>(deserializer: D) -> Result<Level, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

fn deserialize_date<'de, D>(deserializer: D) -> Result<Date, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}
