//! Filter compiler and tile aggregation engine for the inventory dashboard.
//!
//! Dashboard tiles are configured as JSON. Each tile names a filter (or a
//! numerator/denominator pair, or a start/end date pair), and the engine
//! turns it into a number, a period-over-period trend and a drill-down
//! filter.
//!
//! - `filter/` - Filter AST, value normalization, compilation and the
//!   identity-keyed matcher cache
//! - `evaluate` - applies filters to record slices
//! - `tile/` - tile specs and results, aggregation and assembly
//! - `window` - current/previous reporting windows
//! - `engine` - [`TileEngine`], the entry point used by callers
//! - `dashboard` - JSON loaders for tiles, records and metric tiles
//! - `settings` - command line arguments and the TOML settings file

pub mod dashboard;
pub mod engine;
pub mod evaluate;
pub mod filter;
pub mod settings;
pub mod tile;
pub mod window;

pub use engine::{EngineOptions, TileEngine, UnknownOperatorPolicy};
pub use filter::{cache::MatcherCache, compile::Matcher, Condition, Filter, FilterId, Record};
pub use tile::{
    assemble::{MetricTile, MetricTiles, NoMetrics, SubtitleSource},
    ClickFilter, Direction, RecordWindows, TileResult, TileSpec, Trend,
};
pub use window::DateRange;
