//! Range lookup parameters.
//!
//! A query selects rows either by timestamp bounds or by row indices, never
//! both. A single bound may be paired with a length.

use candlestore_core::{parse_timestamp, Column, Error, Result, TimestampMs};

/// Which columns a lookup returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Columns {
    /// All six columns in canonical order.
    All,
    /// The listed columns in the listed order; repeats are allowed.
    Select(Vec<Column>),
}

impl Columns {
    /// Parse `"ALL"` or a list of column names.
    pub fn from_names(names: &[&str]) -> Result<Self> {
        if names == ["ALL"] {
            return Ok(Columns::All);
        }
        let columns = names
            .iter()
            .map(|n| n.parse::<Column>())
            .collect::<Result<Vec<_>>>()?;
        Ok(Columns::Select(columns))
    }

    /// The concrete column list.
    pub fn resolve(&self) -> Vec<Column> {
        match self {
            Columns::All => Column::ALL.to_vec(),
            Columns::Select(columns) => columns.clone(),
        }
    }
}

/// Row selection for a range lookup. The default selects the whole table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeQuery {
    /// Rows strictly after this timestamp.
    pub start: Option<TimestampMs>,
    /// Rows at or before this timestamp.
    pub end: Option<TimestampMs>,
    /// First row index (may be negative, clamped to 0).
    pub start_index: Option<i64>,
    /// One past the last row index.
    pub end_index: Option<i64>,
    /// Rows to return when only one bound is given.
    pub length: Option<i64>,
}

impl RangeQuery {
    /// Query covering the whole table.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn start(mut self, ts: TimestampMs) -> Self {
        self.start = Some(ts);
        self
    }

    pub fn end(mut self, ts: TimestampMs) -> Self {
        self.end = Some(ts);
        self
    }

    /// Start bound from a `%Y-%m-%d %H:%M:%S` UTC string.
    pub fn start_at(self, datetime: &str) -> Result<Self> {
        Ok(self.start(parse_timestamp(datetime)?))
    }

    /// End bound from a `%Y-%m-%d %H:%M:%S` UTC string.
    pub fn end_at(self, datetime: &str) -> Result<Self> {
        Ok(self.end(parse_timestamp(datetime)?))
    }

    pub fn start_index(mut self, index: i64) -> Self {
        self.start_index = Some(index);
        self
    }

    pub fn end_index(mut self, index: i64) -> Self {
        self.end_index = Some(index);
        self
    }

    pub fn length(mut self, length: i64) -> Self {
        self.length = Some(length);
        self
    }

    /// Whether timestamp bounds were given.
    pub fn has_timestamps(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    /// Whether index bounds were given.
    pub fn has_indices(&self) -> bool {
        self.start_index.is_some() || self.end_index.is_some()
    }

    /// Reject conflicting or out-of-range parameters.
    pub fn validate(&self) -> Result<()> {
        if self.has_timestamps() && self.has_indices() {
            return Err(Error::invalid_query(
                "pass either start/end or start_index/end_index, not both",
            ));
        }
        if let Some(length) = self.length {
            if length < 1 {
                return Err(Error::invalid_query(format!(
                    "length must be at least 1, got {length}"
                )));
            }
        }
        Ok(())
    }

    /// Turn already-resolved index bounds into a clamped row range.
    ///
    /// `start`/`end` are row indices (timestamps must have been searched
    /// already). A lone bound is extended by `length`; both ends are clamped
    /// to `[0, row_count]` and an inverted range collapses to empty.
    pub(crate) fn clamp(
        start: Option<i64>,
        end: Option<i64>,
        length: Option<i64>,
        row_count: usize,
    ) -> std::ops::Range<usize> {
        let (mut start, mut end) = (start, end);
        if let Some(length) = length {
            match (start, end) {
                (Some(s), None) => end = Some(s.saturating_add(length)),
                (None, Some(e)) => start = Some(e.saturating_sub(length)),
                _ => {}
            }
        }

        let rows = row_count as i64;
        let start = start.unwrap_or(0).clamp(0, rows);
        let end = end.unwrap_or(rows).clamp(0, rows);
        let start = start.min(end);
        start as usize..end as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_bounds_rejected() {
        let query = RangeQuery::all().start(100).end_index(3);
        assert!(matches!(query.validate(), Err(Error::InvalidQuery(_))));
    }

    #[test]
    fn test_zero_length_rejected() {
        let query = RangeQuery::all().start_index(0).length(0);
        assert!(matches!(query.validate(), Err(Error::InvalidQuery(_))));
    }

    #[test]
    fn test_clamp() {
        assert_eq!(RangeQuery::clamp(None, None, None, 5), 0..5);
        assert_eq!(RangeQuery::clamp(Some(-3), Some(99), None, 5), 0..5);
        assert_eq!(RangeQuery::clamp(Some(1), None, Some(2), 5), 1..3);
        assert_eq!(RangeQuery::clamp(None, Some(4), Some(10), 5), 0..4);
        assert_eq!(RangeQuery::clamp(Some(4), Some(2), None, 5), 2..2);
        assert_eq!(RangeQuery::clamp(Some(7), None, None, 5), 5..5);
        // Derived bounds saturate instead of overflowing
        assert_eq!(RangeQuery::clamp(Some(i64::MAX), None, Some(2), 5), 5..5);
        assert_eq!(RangeQuery::clamp(None, Some(i64::MIN), Some(1), 5), 0..0);
        assert_eq!(RangeQuery::clamp(Some(i64::MIN), None, Some(i64::MAX), 5), 0..0);
    }

    #[test]
    fn test_columns_from_names() {
        assert_eq!(Columns::from_names(&["ALL"]).unwrap(), Columns::All);
        assert_eq!(
            Columns::from_names(&["HIGH", "MTS", "HIGH"]).unwrap().resolve(),
            vec![Column::High, Column::Mts, Column::High]
        );
        assert!(matches!(Columns::from_names(&["PRICE"]), Err(Error::Schema(_))));
    }

    #[test]
    fn test_datetime_bounds() {
        let query = RangeQuery::all().start_at("2024-01-01 00:00:00").unwrap();
        assert_eq!(query.start, Some(1_704_067_200_000));
        assert!(RangeQuery::all().end_at("not a date").is_err());
    }
}
