use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tracing::info;

use crate::{
    filter::Record,
    settings::{DashboardFiles, EntryPoint, Window},
    tile::{assemble::MetricTiles, RecordWindows, TileResult, TileSpec},
    window::DateRange,
    TileEngine,
};

pub fn load_tiles(path: &Path) -> Result<Vec<TileSpec>> {
    read_json(path, "tile specs")
}

pub fn load_records(path: &Path) -> Result<Vec<Record>> {
    read_json(path, "records")
}

pub fn load_metrics(path: &Path) -> Result<MetricTiles> {
    read_json(path, "metric tiles")
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {what} from {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse {what} in {}", path.display()))
}

/// Tile specs, records and metric tiles loaded from disk, with the records
/// split into reporting windows when a window is configured.
#[derive(Debug)]
pub struct Dashboard {
    pub tiles: Vec<TileSpec>,
    pub records: Vec<Record>,
    pub metrics: MetricTiles,
    periods: Option<(Vec<Record>, Vec<Record>)>,
}

impl Dashboard {
    pub fn load(files: &DashboardFiles, window: Option<&Window>) -> Result<Self> {
        let tiles = load_tiles(&files.tiles)?;
        let records = load_records(&files.records)?;
        let metrics = match &files.metrics {
            Some(path) => load_metrics(path)?,
            None => MetricTiles::default(),
        };
        info!("Loaded {} tiles and {} records", tiles.len(), records.len());
        Ok(Self::new(tiles, records, metrics, window))
    }

    pub fn new(
        tiles: Vec<TileSpec>,
        records: Vec<Record>,
        metrics: MetricTiles,
        window: Option<&Window>,
    ) -> Self {
        let periods = window.map(|w| {
            let range = DateRange::new(w.begin, w.end);
            let (current, previous) = range.split(&records, &w.column);
            info!(
                "Window {} to {}: {} current and {} previous records",
                w.begin,
                w.end,
                current.len(),
                previous.len()
            );
            (current, previous)
        });
        Self {
            tiles,
            records,
            metrics,
            periods,
        }
    }

    pub fn windows(&self) -> RecordWindows<'_> {
        match &self.periods {
            Some((current, previous)) => RecordWindows::new(&self.records, current, previous),
            None => RecordWindows::unranged(&self.records),
        }
    }

    pub fn tile_results(&self, engine: &TileEngine, entry_point: EntryPoint) -> Vec<TileResult> {
        self.compute(engine, &self.tiles, entry_point)
    }

    /// The records behind the click filter of the tile with `key`.
    ///
    /// Tiles with `noRangeFilter` drill into every record, other tiles into
    /// the current window.
    pub fn drill_down(
        &self,
        engine: &TileEngine,
        entry_point: EntryPoint,
        key: &str,
    ) -> Result<Vec<&Record>> {
        let spec = self
            .tiles
            .iter()
            .find(|tile| tile.key == key)
            .with_context(|| format!("No tile with key `{key}`"))?;
        let result = self
            .compute(engine, std::slice::from_ref(spec), entry_point)
            .pop()
            .with_context(|| format!("Failed to compute tile `{key}`"))?;
        let click = result
            .click_filter
            .with_context(|| format!("Tile `{key}` has no click filter"))?;
        let windows = self.windows();
        let records = if spec.no_range_filter {
            windows.all
        } else {
            windows.current
        };
        Ok(engine.drill_down(records, &click))
    }

    fn compute(
        &self,
        engine: &TileEngine,
        specs: &[TileSpec],
        entry_point: EntryPoint,
    ) -> Vec<TileResult> {
        let windows = self.windows();
        match entry_point {
            EntryPoint::Dashboard => engine.compute_tiles(specs, &windows, &self.metrics),
            EntryPoint::Summary => engine.calculate_tiles(specs, &windows, &self.metrics),
        }
    }
}
