use std::{cmp::Ordering, fmt, sync::Arc};

use regex::Regex;
use serde_json::Value;
use tracing::{trace, warn};

use super::{
    cache::MatcherCache,
    normalize::{contains_needle, js_compare, normalize, to_js_string, Normalized},
    Condition, Filter, FilterKind, Record,
};
use crate::engine::UnknownOperatorPolicy;

type MatchFn = dyn Fn(&Record) -> bool + Send + Sync;

/// A compiled filter: a pure predicate over records.
#[derive(Clone)]
pub struct Matcher(Arc<MatchFn>);

impl Matcher {
    fn new(f: impl Fn(&Record) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    fn constant(result: bool) -> Self {
        Self::new(move |_| result)
    }

    pub fn matches(&self, record: &Record) -> bool {
        (self.0)(record)
    }

    /// Returns `true` if both matchers are the same compiled instance.
    pub fn ptr_eq(&self, other: &Matcher) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matcher").finish_non_exhaustive()
    }
}

/// Compiles `filter` into a matcher. Subfilters are looked up in and added
/// to `cache`.
pub(crate) fn compile(
    filter: &Filter,
    cache: &MatcherCache,
    policy: UnknownOperatorPolicy,
) -> Matcher {
    match filter.kind() {
        FilterKind::And(subfilters) => {
            let matchers = compile_all(subfilters, cache, policy);
            Matcher::new(move |record| matchers.iter().all(|m| m.matches(record)))
        }
        FilterKind::Or(subfilters) => {
            let matchers = compile_all(subfilters, cache, policy);
            Matcher::new(move |record| matchers.iter().any(|m| m.matches(record)))
        }
        FilterKind::Leaf { column, condition } => {
            compile_leaf(column.clone(), condition, policy)
        }
    }
}

fn compile_all(
    subfilters: &[Filter],
    cache: &MatcherCache,
    policy: UnknownOperatorPolicy,
) -> Vec<Matcher> {
    subfilters
        .iter()
        .map(|sub| cache.get_or_insert_with(sub, || compile(sub, cache, policy)))
        .collect()
}

fn compile_leaf(column: String, condition: &Condition, policy: UnknownOperatorPolicy) -> Matcher {
    match condition {
        Condition::IsNull => {
            Matcher::new(move |r| matches!(r.get(&column), None | Some(Value::Null)))
        }
        Condition::IsNotNull => {
            Matcher::new(move |r| !matches!(r.get(&column), None | Some(Value::Null)))
        }
        Condition::Equals(operand) => {
            let expected = normalize(Some(operand)).into_owned();
            Matcher::new(move |r| normalize(r.get(&column)).strict_eq(&expected))
        }
        Condition::NotEquals(operand) => {
            let expected = normalize(Some(operand)).into_owned();
            Matcher::new(move |r| !normalize(r.get(&column)).strict_eq(&expected))
        }
        Condition::Lt(operand) => relational(column, operand.clone(), |o| o == Ordering::Less),
        Condition::Lte(operand) => relational(column, operand.clone(), |o| o != Ordering::Greater),
        Condition::Gt(operand) => relational(column, operand.clone(), |o| o == Ordering::Greater),
        Condition::Gte(operand) => relational(column, operand.clone(), |o| o != Ordering::Less),
        Condition::Contains(operand) => {
            let needle = contains_needle(operand);
            Matcher::new(move |r| text_of(r, &column).is_some_and(|text| text.contains(&needle)))
        }
        Condition::NotContains(operand) => {
            let needle = contains_needle(operand);
            Matcher::new(move |r| text_of(r, &column).is_some_and(|text| !text.contains(&needle)))
        }
        Condition::Matches(pattern) => match compile_regex(&column, pattern) {
            Some(re) => Matcher::new(move |r| re.is_match(&to_js_string(r.get(&column)))),
            None => Matcher::constant(false),
        },
        Condition::NotMatches(pattern) => match compile_regex(&column, pattern) {
            Some(re) => Matcher::new(move |r| !re.is_match(&to_js_string(r.get(&column)))),
            None => Matcher::constant(false),
        },
        Condition::In(set) => {
            let set = normalize_set(set);
            Matcher::new(move |r| {
                let value = normalize(r.get(&column));
                set.iter().any(|member| value.strict_eq(member))
            })
        }
        Condition::NotIn(set) => {
            let set = normalize_set(set);
            Matcher::new(move |r| {
                let value = normalize(r.get(&column));
                !set.iter().any(|member| value.strict_eq(member))
            })
        }
        Condition::Unrecognized => {
            let result = policy == UnknownOperatorPolicy::Permissive;
            warn!(
                "Filter on `{}` has no recognized operator; it will {} every record",
                column,
                if result { "match" } else { "reject" }
            );
            Matcher::constant(result)
        }
    }
}

fn relational(
    column: String,
    operand: Value,
    accept: impl Fn(Ordering) -> bool + Send + Sync + 'static,
) -> Matcher {
    Matcher::new(move |r| js_compare(r.get(&column), &operand).is_some_and(&accept))
}

/// The normalized text of a column, or `None` when the value is not a string.
fn text_of<'r>(record: &'r Record, column: &str) -> Option<std::borrow::Cow<'r, str>> {
    match normalize(record.get(column)) {
        Normalized::Text(text) => Some(text),
        _ => {
            trace!("`{}` is not a string; contains-style operators do not match", column);
            None
        }
    }
}

fn normalize_set(set: &[Value]) -> Vec<Normalized<'static>> {
    set.iter()
        .map(|member| normalize(Some(member)).into_owned())
        .collect()
}

fn compile_regex(column: &str, pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("Invalid pattern for `{}`; the filter will not match: {}", column, e);
            None
        }
    }
}
