use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    aggregate::{Aggregate, Profile},
    ClickFilter, Measure, TileResult, TileSpec,
};
use crate::filter::{Condition, Filter};

/// Supplies tile subtitles from an external metrics feed.
pub trait SubtitleSource {
    fn subtitle(&self, key: &str) -> Option<String>;
}

/// No external metrics.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMetrics;

impl SubtitleSource for NoMetrics {
    fn subtitle(&self, _key: &str) -> Option<String> {
        None
    }
}

impl SubtitleSource for HashMap<String, String> {
    fn subtitle(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// One entry of the metrics feed. Only `key` and `subtitle` are read.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricTile {
    pub key: String,
    #[serde(default)]
    pub subtitle: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct MetricTiles(pub Vec<MetricTile>);

impl SubtitleSource for MetricTiles {
    fn subtitle(&self, key: &str) -> Option<String> {
        self.0
            .iter()
            .find(|metric| metric.key == key)
            .and_then(|metric| metric.subtitle.clone())
    }
}

pub(crate) fn assemble(
    spec: &TileSpec,
    aggregate: Aggregate,
    metrics: &impl SubtitleSource,
    profile: Profile,
) -> TileResult {
    let click_filter = click_filter(spec, profile);
    let clickable = spec.clickable.unwrap_or(click_filter.is_some());
    TileResult {
        spec: spec.clone(),
        value: aggregate.value,
        previous: aggregate.previous,
        trend: aggregate.trend,
        direction: aggregate.direction,
        percent: aggregate.percent,
        subtitle: subtitle(spec, metrics),
        clickable,
        click_filter,
    }
}

/// The configured subtitle, else the metrics feed's subtitle for the tile's
/// `matchKey` or, failing that, its `key`.
fn subtitle(spec: &TileSpec, metrics: &impl SubtitleSource) -> Option<String> {
    spec.subtitle
        .clone()
        .or_else(|| spec.match_key.as_deref().and_then(|k| metrics.subtitle(k)))
        .or_else(|| metrics.subtitle(&spec.key))
}

/// The configured click filter, else one derived from `matchKey` for count
/// tiles.
fn click_filter(spec: &TileSpec, profile: Profile) -> Option<ClickFilter> {
    if let Some(click) = &spec.click_filter {
        return Some(click.clone());
    }
    let Measure::Count { .. } = spec.measure() else {
        return None;
    };
    let match_key = spec.match_key.as_ref()?;
    let derived = match profile {
        Profile::Dashboard => ClickFilter::Filter(Filter::leaf(
            match_key.clone(),
            Condition::Contains(Value::String(spec.key.clone())),
        )),
        Profile::Summary => ClickFilter::Typed {
            kind: match_key.clone(),
            value: spec.key.clone(),
        },
    };
    Some(derived)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn spec(value: Value) -> TileSpec {
        serde_json::from_value(value).unwrap()
    }

    fn metrics() -> MetricTiles {
        serde_json::from_value(json!([
            {"key": "stock_alerts", "subtitle": "from metrics by matchKey"},
            {"key": "low_stock", "subtitle": "from metrics by key", "value": 12},
            {"key": "no_subtitle"}
        ]))
        .unwrap()
    }

    #[test]
    fn subtitle_fallback_order() {
        let configured = spec(json!({"key": "low_stock", "subtitle": "configured"}));
        assert_eq!(subtitle(&configured, &metrics()).as_deref(), Some("configured"));

        let by_match_key = spec(json!({"key": "low_stock", "matchKey": "stock_alerts"}));
        assert_eq!(
            subtitle(&by_match_key, &metrics()).as_deref(),
            Some("from metrics by matchKey")
        );

        let by_key = spec(json!({"key": "low_stock", "matchKey": "unknown"}));
        assert_eq!(subtitle(&by_key, &metrics()).as_deref(), Some("from metrics by key"));

        let none = spec(json!({"key": "no_subtitle"}));
        assert_eq!(subtitle(&none, &metrics()), None);
        assert_eq!(subtitle(&by_key, &NoMetrics), None);
    }

    #[test]
    fn subtitle_from_a_plain_map() {
        let map = HashMap::from([("low_stock".to_string(), "mapped".to_string())]);
        let tile = spec(json!({"key": "low_stock"}));
        assert_eq!(subtitle(&tile, &map).as_deref(), Some("mapped"));
    }

    #[test]
    fn derived_click_filters() {
        let tile = spec(json!({
            "key": "spares",
            "matchKey": "category",
            "filter": {"column": "category", "equals": "spares"}
        }));
        let dashboard = click_filter(&tile, Profile::Dashboard).unwrap();
        assert_eq!(
            serde_json::to_value(&dashboard).unwrap(),
            json!({"column": "category", "contains": "spares"})
        );
        let summary = click_filter(&tile, Profile::Summary).unwrap();
        assert_eq!(
            serde_json::to_value(&summary).unwrap(),
            json!({"type": "category", "value": "spares"})
        );
    }

    #[test]
    fn no_derived_click_filter_without_match_key_or_count_mode() {
        let without_match_key = spec(json!({
            "key": "spares",
            "filter": {"column": "category", "equals": "spares"}
        }));
        assert!(click_filter(&without_match_key, Profile::Dashboard).is_none());

        let ratio = spec(json!({
            "key": "spares",
            "matchKey": "category",
            "numerator": {"column": "category", "equals": "spares"},
            "denominator": {"and": []}
        }));
        assert!(click_filter(&ratio, Profile::Dashboard).is_none());
    }

    #[test]
    fn explicit_click_filter_wins() {
        let tile = spec(json!({
            "key": "spares",
            "matchKey": "category",
            "filter": {"column": "category", "equals": "spares"},
            "clickFilter": {"column": "bin", "isNull": true}
        }));
        let click = click_filter(&tile, Profile::Summary).unwrap();
        assert_eq!(
            serde_json::to_value(&click).unwrap(),
            json!({"column": "bin", "isNull": true})
        );
    }

    #[test]
    fn clickable_follows_click_filter_unless_overridden() {
        let derived = spec(json!({
            "key": "spares",
            "matchKey": "category",
            "filter": {"column": "category", "equals": "spares"}
        }));
        let result = assemble(&derived, Aggregate::default(), &NoMetrics, Profile::Dashboard);
        assert!(result.clickable);

        let overridden = spec(json!({
            "key": "spares",
            "matchKey": "category",
            "clickable": false,
            "filter": {"column": "category", "equals": "spares"}
        }));
        let result = assemble(&overridden, Aggregate::default(), &NoMetrics, Profile::Dashboard);
        assert!(!result.clickable);
        assert!(result.click_filter.is_some());

        let plain = spec(json!({"key": "spares", "filter": {"and": []}}));
        let result = assemble(&plain, Aggregate::default(), &NoMetrics, Profile::Dashboard);
        assert!(!result.clickable);
    }
}
