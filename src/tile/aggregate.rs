use std::sync::LazyLock;

use jiff::civil::Date;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::{round_0, round_1, Direction, Measure, RecordWindows, TileSpec, Trend};
use crate::{evaluate, filter::Record, TileEngine};

static DATE_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date shape pattern is valid")
});

/// Which entry point a tile is computed for. The two differ in how average
/// durations are rounded and how click filters are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Profile {
    /// `TileEngine::compute_tiles`
    Dashboard,
    /// `TileEngine::calculate_tiles`
    Summary,
}

/// The computed part of a tile.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Aggregate {
    pub(crate) value: f64,
    pub(crate) previous: Option<u64>,
    pub(crate) trend: Option<Trend>,
    pub(crate) direction: Option<Direction>,
    pub(crate) percent: Option<f64>,
}

pub(crate) fn aggregate(
    engine: &TileEngine,
    spec: &TileSpec,
    windows: &RecordWindows<'_>,
    profile: Profile,
) -> Aggregate {
    let (active, previous) = if spec.no_range_filter {
        (windows.all, windows.all)
    } else {
        (windows.current, windows.previous)
    };

    match spec.measure() {
        Measure::Count { filter } => {
            let matcher = engine.compile(filter);
            count_trend(
                evaluate::count(active, &matcher),
                evaluate::count(previous, &matcher),
            )
        }
        Measure::Percentage {
            numerator,
            denominator,
        } => {
            let numerator = evaluate::count(active, &engine.compile(numerator));
            let denominator = evaluate::count(active, &engine.compile(denominator));
            Aggregate {
                value: percentage(&spec.key, numerator, denominator),
                ..Aggregate::default()
            }
        }
        Measure::Average { start, end, filter } => {
            let rows = match filter {
                Some(filter) => engine.apply(active, std::slice::from_ref(filter)),
                None => active.iter().collect(),
            };
            let average = average_days(&spec.key, &rows, start, end);
            let value = match profile {
                Profile::Dashboard => round_1(average),
                Profile::Summary => round_0(average),
            };
            Aggregate {
                value,
                ..Aggregate::default()
            }
        }
        Measure::Unmeasured => {
            debug!("Tile `{}` has no filter, ratio or date pair", spec.key);
            Aggregate::default()
        }
    }
}

/// Count with the trend against the previous period.
///
/// With a non-empty previous period the trend is the relative change in
/// percent. With an empty one it is the absolute count (`+N`), and with
/// nothing in either period there is no trend.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn count_trend(value: usize, previous: usize) -> Aggregate {
    let (value, previous) = (value as u64, previous as u64);
    let mut aggregate = Aggregate {
        value: value as f64,
        previous: Some(previous),
        ..Aggregate::default()
    };
    if previous > 0 {
        let delta = (value as f64 - previous as f64) / previous as f64 * 100.0;
        aggregate.trend = Some(Trend::Percentage(delta.abs()));
        aggregate.direction = Some(if delta >= 0.0 {
            Direction::Up
        } else {
            Direction::Down
        });
        aggregate.percent = Some(delta);
    } else if value > 0 {
        aggregate.trend = Some(Trend::Absolute(value));
        aggregate.direction = Some(Direction::Up);
    }
    aggregate
}

/// `numerator / denominator` in percent, one decimal. An empty denominator
/// counts as one.
#[allow(clippy::cast_precision_loss)]
fn percentage(key: &str, numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        debug!("Tile `{}` has an empty denominator; dividing by one", key);
    }
    round_1(numerator as f64 / denominator.max(1) as f64 * 100.0)
}

/// Mean of `end - start` in days over rows where both columns hold
/// `YYYY-MM-DD` dates. Zero when no row qualifies.
#[allow(clippy::cast_precision_loss)]
fn average_days(key: &str, rows: &[&Record], start: &str, end: &str) -> f64 {
    let durations: Vec<f64> = rows
        .iter()
        .filter_map(|row| days_between(row.get(start), row.get(end)))
        .collect();
    let skipped = rows.len() - durations.len();
    if skipped > 0 {
        debug!(
            "Tile `{}` skipped {} of {} rows without a valid `{}`/`{}` date pair",
            key,
            skipped,
            rows.len(),
            start,
            end
        );
    }
    if durations.is_empty() {
        return 0.0;
    }
    durations.iter().sum::<f64>() / durations.len() as f64
}

fn days_between(start: Option<&Value>, end: Option<&Value>) -> Option<f64> {
    let start = calendar_date(start?)?;
    let end = calendar_date(end?)?;
    let span = start.until(end).ok()?;
    Some(f64::from(span.get_days()))
}

/// A `YYYY-MM-DD` string naming a real calendar day.
fn calendar_date(value: &Value) -> Option<Date> {
    let text = value.as_str()?;
    if !DATE_SHAPE.is_match(text) {
        return None;
    }
    text.parse().ok()
}
