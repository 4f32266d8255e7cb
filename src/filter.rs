pub mod cache;
pub mod compile;
pub(crate) mod normalize;

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use serde::{ser::SerializeMap, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::debug;

/// One row of domain data. Columns are looked up by name at evaluation time.
pub type Record = serde_json::Map<String, Value>;

static NEXT_FILTER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a filter node.
///
/// Every constructed or deserialized node gets a fresh id. Clones of a
/// [`Filter`] share the node, and so share the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterId(u64);

impl FilterId {
    fn next() -> Self {
        Self(NEXT_FILTER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A boolean predicate over a record's columns.
///
/// Filters are immutable. Two filters built from the same JSON are distinct
/// nodes; only clones of one filter compare as the same node.
#[derive(Clone, Deserialize)]
#[serde(from = "RawFilter")]
pub struct Filter(Arc<FilterNode>);

pub(crate) struct FilterNode {
    pub(crate) id: FilterId,
    pub(crate) kind: FilterKind,
}

#[derive(Debug)]
pub enum FilterKind {
    Leaf { column: String, condition: Condition },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

/// The comparison carried by a leaf filter.
///
/// The variant order is the precedence used when a wire object sets more
/// than one operator key.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    IsNull,
    IsNotNull,
    Equals(Value),
    NotEquals(Value),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    Contains(Value),
    NotContains(Value),
    Matches(String),
    NotMatches(String),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    /// No recognized operator key was present.
    Unrecognized,
}

impl Condition {
    /// The wire name of the operator key.
    pub fn operator(&self) -> Option<&'static str> {
        let name = match self {
            Self::IsNull => "isNull",
            Self::IsNotNull => "isNotNull",
            Self::Equals(_) => "equals",
            Self::NotEquals(_) => "notEquals",
            Self::Lt(_) => "lt",
            Self::Lte(_) => "lte",
            Self::Gt(_) => "gt",
            Self::Gte(_) => "gte",
            Self::Contains(_) => "contains",
            Self::NotContains(_) => "notContains",
            Self::Matches(_) => "matches",
            Self::NotMatches(_) => "notMatches",
            Self::In(_) => "in",
            Self::NotIn(_) => "notIn",
            Self::Unrecognized => return None,
        };
        Some(name)
    }
}

impl Filter {
    fn new(kind: FilterKind) -> Self {
        Self(Arc::new(FilterNode {
            id: FilterId::next(),
            kind,
        }))
    }

    pub fn leaf(column: impl Into<String>, condition: Condition) -> Self {
        Self::new(FilterKind::Leaf {
            column: column.into(),
            condition,
        })
    }

    pub fn and(subfilters: Vec<Filter>) -> Self {
        Self::new(FilterKind::And(subfilters))
    }

    pub fn or(subfilters: Vec<Filter>) -> Self {
        Self::new(FilterKind::Or(subfilters))
    }

    pub fn id(&self) -> FilterId {
        self.0.id
    }

    pub fn kind(&self) -> &FilterKind {
        &self.0.kind
    }

    /// Returns `true` if both handles point at the same node.
    pub fn same_node(&self, other: &Filter) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn node(&self) -> &Arc<FilterNode> {
        &self.0
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("id", &self.0.id)
            .field("kind", &self.0.kind)
            .finish()
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        match self.kind() {
            FilterKind::And(subfilters) => map.serialize_entry("and", subfilters)?,
            FilterKind::Or(subfilters) => map.serialize_entry("or", subfilters)?,
            FilterKind::Leaf { column, condition } => {
                map.serialize_entry("column", column)?;
                match condition {
                    Condition::IsNull => map.serialize_entry("isNull", &true)?,
                    Condition::IsNotNull => map.serialize_entry("isNotNull", &true)?,
                    Condition::Equals(v) => map.serialize_entry("equals", v)?,
                    Condition::NotEquals(v) => map.serialize_entry("notEquals", v)?,
                    Condition::Lt(v) => map.serialize_entry("lt", v)?,
                    Condition::Lte(v) => map.serialize_entry("lte", v)?,
                    Condition::Gt(v) => map.serialize_entry("gt", v)?,
                    Condition::Gte(v) => map.serialize_entry("gte", v)?,
                    Condition::Contains(v) => map.serialize_entry("contains", v)?,
                    Condition::NotContains(v) => map.serialize_entry("notContains", v)?,
                    Condition::Matches(p) => map.serialize_entry("matches", p)?,
                    Condition::NotMatches(p) => map.serialize_entry("notMatches", p)?,
                    Condition::In(set) => map.serialize_entry("in", set)?,
                    Condition::NotIn(set) => map.serialize_entry("notIn", set)?,
                    Condition::Unrecognized => {}
                }
            }
        }
        map.end()
    }
}

/// Wire form of a filter node: one object with optional keys for every
/// operator and group.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawFilter {
    and: Option<Vec<Filter>>,
    or: Option<Vec<Filter>>,
    #[serde(default)]
    column: String,
    is_null: Option<bool>,
    is_not_null: Option<bool>,
    #[serde(default, deserialize_with = "present")]
    equals: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    not_equals: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    lt: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    lte: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    gt: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    gte: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    contains: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    not_contains: Option<Value>,
    matches: Option<String>,
    not_matches: Option<String>,
    #[serde(rename = "in")]
    in_set: Option<Vec<Value>>,
    not_in: Option<Vec<Value>>,
}

/// Keeps an explicit `null` operand as `Some(Value::Null)`; only a missing
/// key is `None`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl RawFilter {
    fn into_condition(self, column: &str) -> Condition {
        let candidates = [
            self.is_null.filter(|set| *set).map(|_| Condition::IsNull),
            self.is_not_null
                .filter(|set| *set)
                .map(|_| Condition::IsNotNull),
            self.equals.map(Condition::Equals),
            self.not_equals.map(Condition::NotEquals),
            self.lt.map(Condition::Lt),
            self.lte.map(Condition::Lte),
            self.gt.map(Condition::Gt),
            self.gte.map(Condition::Gte),
            self.contains.map(Condition::Contains),
            self.not_contains.map(Condition::NotContains),
            self.matches.map(Condition::Matches),
            self.not_matches.map(Condition::NotMatches),
            self.in_set.map(Condition::In),
            self.not_in.map(Condition::NotIn),
        ];
        let mut present = candidates.into_iter().flatten();
        let Some(condition) = present.next() else {
            return Condition::Unrecognized;
        };
        let ignored: Vec<_> = present.filter_map(|c| c.operator()).collect();
        if !ignored.is_empty() {
            debug!(
                "Filter on `{}` sets several operators; using `{}` and ignoring {:?}",
                column,
                condition.operator().unwrap_or_default(),
                ignored
            );
        }
        condition
    }
}

impl From<RawFilter> for Filter {
    fn from(mut raw: RawFilter) -> Self {
        if let Some(subfilters) = raw.and.take() {
            return Filter::and(subfilters);
        }
        if let Some(subfilters) = raw.or.take() {
            return Filter::or(subfilters);
        }
        let column = std::mem::take(&mut raw.column);
        let condition = raw.into_condition(&column);
        Filter::leaf(column, condition)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parse(value: Value) -> Filter {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn leaf_operators_by_wire_name() {
        let cases = [
            (json!({"column": "a", "isNull": true}), Condition::IsNull),
            (json!({"column": "a", "isNotNull": true}), Condition::IsNotNull),
            (json!({"column": "a", "equals": "x"}), Condition::Equals(json!("x"))),
            (json!({"column": "a", "notEquals": 1}), Condition::NotEquals(json!(1))),
            (json!({"column": "a", "lt": 1}), Condition::Lt(json!(1))),
            (json!({"column": "a", "lte": 1}), Condition::Lte(json!(1))),
            (json!({"column": "a", "gt": 1}), Condition::Gt(json!(1))),
            (json!({"column": "a", "gte": 1}), Condition::Gte(json!(1))),
            (json!({"column": "a", "contains": "x"}), Condition::Contains(json!("x"))),
            (
                json!({"column": "a", "notContains": "x"}),
                Condition::NotContains(json!("x")),
            ),
            (
                json!({"column": "a", "matches": "^x"}),
                Condition::Matches("^x".to_string()),
            ),
            (
                json!({"column": "a", "notMatches": "^x"}),
                Condition::NotMatches("^x".to_string()),
            ),
            (json!({"column": "a", "in": ["x", 1]}), Condition::In(vec![json!("x"), json!(1)])),
            (json!({"column": "a", "notIn": []}), Condition::NotIn(vec![])),
        ];
        for (wire, expected) in cases {
            let filter = parse(wire.clone());
            match filter.kind() {
                FilterKind::Leaf { column, condition } => {
                    assert_eq!(column, "a");
                    assert_eq!(condition, &expected, "{wire}");
                }
                other => panic!("expected a leaf, got {other:?}"),
            }
        }
    }

    #[test]
    fn explicit_null_operand_is_kept() {
        let filter = parse(json!({"column": "a", "equals": null}));
        assert!(matches!(
            filter.kind(),
            FilterKind::Leaf { condition: Condition::Equals(Value::Null), .. }
        ));
    }

    #[test]
    fn is_null_false_is_not_an_operator() {
        let filter = parse(json!({"column": "a", "isNull": false}));
        assert!(matches!(
            filter.kind(),
            FilterKind::Leaf { condition: Condition::Unrecognized, .. }
        ));
    }

    #[test]
    fn precedence_when_several_operators_are_set() {
        let filter = parse(json!({"column": "a", "in": ["x"], "gt": 3, "equals": "y"}));
        assert!(matches!(
            filter.kind(),
            FilterKind::Leaf { condition: Condition::Equals(_), .. }
        ));

        let filter = parse(json!({"column": "a", "notIn": ["x"], "isNotNull": true}));
        assert!(matches!(
            filter.kind(),
            FilterKind::Leaf { condition: Condition::IsNotNull, .. }
        ));
    }

    #[test]
    fn groups_take_precedence_over_leaf_keys() {
        let filter = parse(json!({
            "and": [{"column": "a", "equals": 1}],
            "or": [],
            "column": "b",
            "equals": 2
        }));
        match filter.kind() {
            FilterKind::And(subfilters) => assert_eq!(subfilters.len(), 1),
            other => panic!("expected and-group, got {other:?}"),
        }

        let filter = parse(json!({"or": [{"column": "a", "equals": 1}, {"column": "b", "lt": 2}]}));
        assert!(matches!(filter.kind(), FilterKind::Or(subfilters) if subfilters.len() == 2));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let filter = parse(json!({"column": "a", "label": "Status", "between": [1, 2]}));
        assert!(matches!(
            filter.kind(),
            FilterKind::Leaf { condition: Condition::Unrecognized, .. }
        ));
    }

    #[test]
    fn wrong_operand_shapes_are_rejected() {
        assert!(serde_json::from_value::<Filter>(json!({"column": "a", "in": "x"})).is_err());
        assert!(serde_json::from_value::<Filter>(json!({"column": "a", "matches": 3})).is_err());
    }

    #[test]
    fn every_parse_yields_a_new_identity() {
        let wire = json!({"column": "status", "equals": "OPEN"});
        let first = parse(wire.clone());
        let second = parse(wire);
        assert_ne!(first.id(), second.id());
        assert!(!first.same_node(&second));

        let clone = first.clone();
        assert_eq!(first.id(), clone.id());
        assert!(first.same_node(&clone));
    }

    #[test]
    fn serializes_back_to_wire_names() {
        let filter = parse(json!({
            "or": [
                {"column": "status", "notEquals": "CLOSED"},
                {"column": "qty", "isNull": true},
                {"column": "bin", "notIn": ["A1"]}
            ]
        }));
        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            json!({
                "or": [
                    {"column": "status", "notEquals": "CLOSED"},
                    {"column": "qty", "isNull": true},
                    {"column": "bin", "notIn": ["A1"]}
                ]
            })
        );
    }
}
