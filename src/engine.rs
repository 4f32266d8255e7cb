use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    evaluate,
    filter::{cache::MatcherCache, compile, compile::Matcher, Filter, Record},
    tile::{
        aggregate::{self, Profile},
        assemble::{self, SubtitleSource},
        ClickFilter, RecordWindows, TileResult, TileSpec,
    },
};

/// What a leaf filter without a recognized operator compiles to.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownOperatorPolicy {
    /// Match every record.
    #[default]
    Permissive,
    /// Match no record.
    Strict,
}

#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize)]
pub struct EngineOptions {
    #[serde(default)]
    pub unknown_operator: UnknownOperatorPolicy,
}

/// Compiles filters, evaluates them over records and computes dashboard
/// tiles.
///
/// The engine keeps compiled matchers for as long as the filters they were
/// compiled from are alive. Reuse the same [`Filter`] values across calls to
/// avoid recompiling.
#[derive(Default)]
pub struct TileEngine {
    cache: MatcherCache,
    options: EngineOptions,
}

impl TileEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            cache: MatcherCache::default(),
            options,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn cache(&self) -> &MatcherCache {
        &self.cache
    }

    pub fn compile(&self, filter: &Filter) -> Matcher {
        self.cache.get_or_insert_with(filter, || {
            compile::compile(filter, &self.cache, self.options.unknown_operator)
        })
    }

    /// Records matching every filter, in their original order.
    pub fn apply<'r>(&self, records: &'r [Record], filters: &[Filter]) -> Vec<&'r Record> {
        if filters.is_empty() || records.is_empty() {
            return records.iter().collect();
        }
        let matchers: Vec<_> = filters.iter().map(|f| self.compile(f)).collect();
        evaluate::apply(records, &matchers)
    }

    /// Tiles for the dashboard: averages keep one decimal and derived click
    /// filters are `contains` filters on the tile's `matchKey`.
    pub fn compute_tiles(
        &self,
        specs: &[TileSpec],
        windows: &RecordWindows<'_>,
        metrics: &impl SubtitleSource,
    ) -> Vec<TileResult> {
        self.tiles(specs, windows, metrics, Profile::Dashboard)
    }

    /// Tiles for summary cards: averages are whole days and derived click
    /// filters use the `{type, value}` form.
    pub fn calculate_tiles(
        &self,
        specs: &[TileSpec],
        windows: &RecordWindows<'_>,
        metrics: &impl SubtitleSource,
    ) -> Vec<TileResult> {
        self.tiles(specs, windows, metrics, Profile::Summary)
    }

    fn tiles(
        &self,
        specs: &[TileSpec],
        windows: &RecordWindows<'_>,
        metrics: &impl SubtitleSource,
        profile: Profile,
    ) -> Vec<TileResult> {
        debug!(
            "Computing {} tiles over {} current and {} previous records",
            specs.len(),
            windows.current.len(),
            windows.previous.len()
        );
        specs
            .iter()
            .map(|spec| {
                let aggregate = aggregate::aggregate(self, spec, windows, profile);
                assemble::assemble(spec, aggregate, metrics, profile)
            })
            .collect()
    }

    /// The records behind a tile's click filter.
    pub fn drill_down<'r>(&self, records: &'r [Record], click: &ClickFilter) -> Vec<&'r Record> {
        match click {
            ClickFilter::Filter(filter) => self.apply(records, std::slice::from_ref(filter)),
            ClickFilter::Typed { .. } => self.apply(records, &[click.to_filter()]),
        }
    }
}
