use crate::filter::{compile::Matcher, Record};

/// Records that satisfy every matcher, in their original order.
///
/// With no matchers every record passes.
pub(crate) fn apply<'r>(records: &'r [Record], matchers: &[Matcher]) -> Vec<&'r Record> {
    records
        .iter()
        .filter(|record| matchers.iter().all(|m| m.matches(record)))
        .collect()
}

pub(crate) fn count(records: &[Record], matcher: &Matcher) -> usize {
    records.iter().filter(|record| matcher.matches(record)).count()
}
