pub mod aggregate;
pub mod assemble;

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::filter::{Condition, Filter, Record};

/// Configuration of one dashboard tile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TileSpec {
    pub key: String,
    #[serde(default)]
    pub title: String,
    // subtitle, clickable and clickFilter are emitted as resolved on TileResult
    #[serde(default, skip_serializing)]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_key: Option<String>,
    #[serde(default, skip_serializing)]
    pub click_filter: Option<ClickFilter>,
    #[serde(default, skip_serializing)]
    pub clickable: Option<bool>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub no_range_filter: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numerator: Option<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denominator: Option<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

/// How a tile's value is computed.
#[derive(Debug, Clone, Copy)]
pub enum Measure<'a> {
    Count {
        filter: &'a Filter,
    },
    Percentage {
        numerator: &'a Filter,
        denominator: &'a Filter,
    },
    Average {
        start: &'a str,
        end: &'a str,
        filter: Option<&'a Filter>,
    },
    Unmeasured,
}

impl TileSpec {
    pub fn measure(&self) -> Measure<'_> {
        if let (Some(numerator), Some(denominator)) = (&self.numerator, &self.denominator) {
            return Measure::Percentage {
                numerator,
                denominator,
            };
        }
        if let (Some(start), Some(end)) = (&self.start, &self.end) {
            return Measure::Average {
                start,
                end,
                filter: self.filter.as_ref(),
            };
        }
        match &self.filter {
            Some(filter) => Measure::Count { filter },
            None => Measure::Unmeasured,
        }
    }
}

/// The record sets a tile is computed over.
#[derive(Debug, Clone, Copy)]
pub struct RecordWindows<'a> {
    /// Every record, used by tiles with `noRangeFilter`.
    pub all: &'a [Record],
    pub current: &'a [Record],
    pub previous: &'a [Record],
}

impl<'a> RecordWindows<'a> {
    pub fn new(all: &'a [Record], current: &'a [Record], previous: &'a [Record]) -> Self {
        Self {
            all,
            current,
            previous,
        }
    }

    /// Windows with no range applied: the current window is everything and
    /// there is no previous period.
    pub fn unranged(all: &'a [Record]) -> Self {
        Self::new(all, all, &[])
    }
}

/// Filter applied when a tile is clicked.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ClickFilter {
    /// `{ "type": <column>, "value": <text> }`
    Typed {
        #[serde(rename = "type")]
        kind: String,
        value: String,
    },
    Filter(Filter),
}

impl ClickFilter {
    /// The filter a drill-down evaluates. Typed click filters compare the
    /// column for equality, so every call builds a new filter node.
    pub fn to_filter(&self) -> Filter {
        match self {
            Self::Filter(filter) => filter.clone(),
            Self::Typed { kind, value } => {
                Filter::leaf(kind.clone(), Condition::Equals(Value::String(value.clone())))
            }
        }
    }
}

/// Period-over-period change of a count tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Trend {
    /// Magnitude of the relative change, in percent.
    Percentage(f64),
    /// Absolute count, used when the previous period had nothing to compare.
    Absolute(u64),
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Percentage(p) => write!(f, "{}%", to_fixed_1(*p)),
            Self::Absolute(n) => write!(f, "+{n}"),
        }
    }
}

impl Serialize for Trend {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

/// A tile spec with its computed values.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TileResult {
    #[serde(flatten)]
    pub spec: TileSpec,
    #[serde(serialize_with = "serialize_number")]
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend: Option<Trend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    pub clickable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub click_filter: Option<ClickFilter>,
}

/// Whole numbers are written as JSON integers, the way the dashboard
/// front end receives them.
#[allow(clippy::cast_possible_truncation)]
fn serialize_number<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

/// Rounds half up to one decimal, like `Math.round(x * 10) / 10`.
pub(crate) fn round_1(value: f64) -> f64 {
    (value * 10.0 + 0.5).floor() / 10.0
}

/// Rounds half up to an integer, like `Math.round(x)`.
pub(crate) fn round_0(value: f64) -> f64 {
    (value + 0.5).floor()
}

/// `Number::toFixed(1)`: exact ties go to the larger magnitude, where Rust's
/// formatter would round to even. Everything else rounds on the exact
/// binary value, which the formatter already does.
fn to_fixed_1(value: f64) -> String {
    let magnitude = value.abs();
    if is_tenths_tie(magnitude) {
        let rounded = ((magnitude * 10.0).floor() + 1.0) / 10.0;
        format!("{:.1}", rounded.copysign(value))
    } else {
        format!("{value:.1}")
    }
}

/// Whether `value` is exactly halfway between two tenths, i.e. an odd
/// multiple of 1/20.
fn is_tenths_tie(value: f64) -> bool {
    let fifths = value * 5.0;
    // a non-zero residual means `value * 5` was rounded
    if value.mul_add(5.0, -fifths) != 0.0 {
        return false;
    }
    let twentieths = fifths * 4.0;
    twentieths.fract() == 0.0 && twentieths % 2.0 == 1.0
}
