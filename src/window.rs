use jiff::{civil::Date, ToSpan};
use serde_json::Value;
use tracing::debug;

use crate::filter::Record;

/// A reporting period over civil dates. `begin` is inclusive and `end` is
/// exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub begin: Date,
    pub end: Date,
}

impl DateRange {
    pub fn new(begin: Date, end: Date) -> Self {
        Self { begin, end }
    }

    pub fn contains(&self, date: Date) -> bool {
        self.begin <= date && date < self.end
    }

    /// Length of the range in days.
    pub fn days(&self) -> i32 {
        self.begin
            .until(self.end)
            .map(|span| span.get_days())
            .unwrap_or_default()
    }

    /// The range of the same length ending where this one begins.
    pub fn previous(&self) -> Self {
        let begin = self
            .begin
            .checked_sub(self.days().days())
            .unwrap_or(Date::MIN);
        Self {
            begin,
            end: self.begin,
        }
    }

    /// Splits `records` into the records of this range and of the previous
    /// range, by the date in `column`.
    ///
    /// The column may hold a date or a timestamp string; only its leading
    /// `YYYY-MM-DD` is read. Records without a readable date fall in neither
    /// window.
    pub fn split(&self, records: &[Record], column: &str) -> (Vec<Record>, Vec<Record>) {
        let previous_range = self.previous();
        let mut current = Vec::new();
        let mut previous = Vec::new();
        let mut undated = 0;
        for record in records {
            match leading_date(record.get(column)) {
                Some(date) if self.contains(date) => current.push(record.clone()),
                Some(date) if previous_range.contains(date) => previous.push(record.clone()),
                Some(_) => {}
                None => undated += 1,
            }
        }
        if undated > 0 {
            debug!("{} records have no readable `{}` date", undated, column);
        }
        (current, previous)
    }
}

fn leading_date(value: Option<&Value>) -> Option<Date> {
    value?.as_str()?.get(..10)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use jiff::civil::date;
    use serde_json::json;

    use super::*;

    fn rows(values: &[Value]) -> Vec<Record> {
        values.iter().filter_map(|v| v.as_object().cloned()).collect()
    }

    fn ids(rows: &[Record]) -> Vec<i64> {
        rows.iter().filter_map(|r| r["id"].as_i64()).collect()
    }

    #[test]
    fn previous_range_has_the_same_length() {
        let range = DateRange::new(date(2024, 3, 1), date(2024, 3, 15));
        assert_eq!(range.days(), 14);
        let previous = range.previous();
        assert_eq!(previous, DateRange::new(date(2024, 2, 16), date(2024, 3, 1)));
    }

    #[test]
    fn begin_is_inclusive_and_end_is_exclusive() {
        let range = DateRange::new(date(2024, 3, 1), date(2024, 4, 1));
        assert!(range.contains(date(2024, 3, 1)));
        assert!(range.contains(date(2024, 3, 31)));
        assert!(!range.contains(date(2024, 4, 1)));
    }

    #[test]
    fn split_by_date_column() {
        let records = rows(&[
            json!({"id": 1, "counted_on": "2024-03-01"}),
            json!({"id": 2, "counted_on": "2024-03-09T10:30:00Z"}),
            json!({"id": 3, "counted_on": "2024-03-10"}),
            json!({"id": 4, "counted_on": "2024-02-29"}),
            json!({"id": 5, "counted_on": "2024-02-21"}),
            json!({"id": 6, "counted_on": "2024-02-20"}),
            json!({"id": 7, "counted_on": "yesterday"}),
            json!({"id": 8}),
        ]);
        // previous window: 2024-02-21 up to 2024-03-01
        let range = DateRange::new(date(2024, 3, 1), date(2024, 3, 10));
        let (current, previous) = range.split(&records, "counted_on");
        assert_eq!(ids(&current), vec![1, 2]);
        assert_eq!(ids(&previous), vec![4, 5]);
    }
}
