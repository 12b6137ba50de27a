//! Upsert of candle frames into a table.
//!
//! Three save modes:
//! - `append`: rows go to the tail, no overlap detection.
//! - `skip`: where rows overlap, existing cells win unless they are missing.
//! - `replace`: where rows overlap, incoming cells win unless they are missing.
//!
//! With `keep_missing`, missing cells are treated as ordinary values: `skip`
//! never writes into the overlap and `replace` overwrites it unconditionally.

use crate::backend::{SearchSide, TableBackend};
use crate::query::RangeQuery;
use crate::store::Store;
use candlestore_core::{
    is_missing, Candle, CandleFrame, Column, Error, Resolution, Result,
};
use std::str::FromStr;

/// How incoming rows are combined with stored ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    Append,
    Skip,
    Replace,
}

impl SaveMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SaveMode::Append => "append",
            SaveMode::Skip => "skip",
            SaveMode::Replace => "replace",
        }
    }
}

impl FromStr for SaveMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "append" => Ok(SaveMode::Append),
            "skip" => Ok(SaveMode::Skip),
            "replace" => Ok(SaveMode::Replace),
            _ => Err(Error::invalid_query(format!(
                "\"{s}\" is not a save mode, expected append, skip or replace"
            ))),
        }
    }
}

/// Outcome of a save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveReport {
    /// Incoming rows that landed on existing rows.
    pub overlapped: usize,
    /// Rows added at the tail.
    pub appended: usize,
}

/// Check a frame's columns before any mutation.
pub fn validate_frame(frame: &CandleFrame, mode: SaveMode) -> Result<()> {
    let columns = frame.columns();
    for (i, column) in columns.iter().enumerate() {
        if columns[..i].contains(column) {
            return Err(Error::schema(format!(
                "column {column} appears more than once"
            )));
        }
    }
    if mode != SaveMode::Append && !columns.contains(&Column::Mts) {
        return Err(Error::schema(format!(
            "there is no MTS column, which {} mode needs to place rows",
            mode.as_str()
        )));
    }
    Ok(())
}

#[inline]
fn merge_cell(existing: f64, incoming: f64, mode: SaveMode, keep_missing: bool) -> f64 {
    match (mode, keep_missing) {
        (SaveMode::Skip, true) => existing,
        (SaveMode::Skip, false) if is_missing(existing) => incoming,
        (SaveMode::Skip, false) => existing,
        (SaveMode::Replace, false) if is_missing(incoming) => existing,
        (SaveMode::Replace, _) | (SaveMode::Append, _) => incoming,
    }
}

impl<B: TableBackend> Store<B> {
    /// Save a frame into the table for `resolution`.
    ///
    /// Columns absent from the frame are treated as missing. Validation
    /// happens before anything is written.
    pub fn save(
        &mut self,
        resolution: Resolution,
        frame: &CandleFrame,
        mode: SaveMode,
        keep_missing: bool,
    ) -> Result<SaveReport> {
        validate_frame(frame, mode)?;
        self.save_candles(resolution, &frame.to_candles(), mode, keep_missing)
    }

    /// Save full candle rows into the table for `resolution`.
    pub fn save_candles(
        &mut self,
        resolution: Resolution,
        incoming: &[Candle],
        mode: SaveMode,
        keep_missing: bool,
    ) -> Result<SaveReport> {
        if incoming.is_empty() {
            return Ok(SaveReport::default());
        }
        if mode == SaveMode::Append {
            self.append(resolution, incoming)?;
            return Ok(SaveReport {
                overlapped: 0,
                appended: incoming.len(),
            });
        }

        let first = incoming[0].mts();
        if is_missing(first) {
            return Err(Error::schema("the first row has no MTS value"));
        }

        let count = self.row_count(resolution)?;
        let offset = self.search_mts(resolution, first, SearchSide::Left)?;
        let overlapped = (count - offset).min(incoming.len());
        let (head, tail) = incoming.split_at(overlapped);

        // Grow first: the suffix past the current tail needs no merging.
        self.append(resolution, tail)?;

        let untouched = mode == SaveMode::Skip && keep_missing;
        if !head.is_empty() && !untouched {
            let query = RangeQuery::all()
                .start_index(offset as i64)
                .end_index((offset + overlapped) as i64);
            let mut merged = self.range(resolution, &query)?;
            for (existing, new) in merged.iter_mut().zip(head) {
                for column in Column::ALL {
                    let value = merge_cell(existing.get(column), new.get(column), mode, keep_missing);
                    existing.set(column, value);
                }
            }
            self.write_cells(resolution, offset, &Column::ALL, &merged)?;
        }

        tracing::debug!(
            %resolution,
            mode = mode.as_str(),
            keep_missing,
            overlapped,
            appended = tail.len(),
            "Saved rows"
        );
        Ok(SaveReport {
            overlapped,
            appended: tail.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use candlestore_core::MISSING;

    const NAN: f64 = MISSING;

    fn candle(mts: i64, v: f64) -> Candle {
        Candle::new(mts, v, v + 1.0, v + 2.0, v - 1.0, 1000.0)
    }

    fn all_rows(store: &Store<MemoryBackend>) -> Vec<Candle> {
        store.range(Resolution::M1, &RangeQuery::all()).unwrap()
    }

    fn seeded(rows: &[Candle]) -> Store<MemoryBackend> {
        let mut store = Store::in_memory();
        store.append(Resolution::M1, rows).unwrap();
        store
    }

    #[test]
    fn test_append_round_trip() {
        let mut store = Store::in_memory();
        let candles: Vec<Candle> = (1..=50).map(|i| candle(i * 60_000, i as f64)).collect();
        let report = store
            .save(Resolution::M1, &CandleFrame::from_candles(&candles), SaveMode::Append, false)
            .unwrap();
        assert_eq!(report.appended, 50);

        let stored = all_rows(&store);
        assert_eq!(stored, candles);
        assert!(stored.windows(2).all(|w| w[0].mts() < w[1].mts()));
    }

    #[test]
    fn test_append_fills_absent_column() {
        let mut store = Store::in_memory();
        let frame = CandleFrame::from_named(
            &["MTS", "OPEN", "CLOSE", "HIGH", "LOW"],
            vec![vec![100.0, 1.0, 2.0, 3.0, 0.5], vec![200.0, 2.0, 3.0, 4.0, 1.5]],
        )
        .unwrap();
        store.save(Resolution::M1, &frame, SaveMode::Append, false).unwrap();

        let stored = all_rows(&store);
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|c| is_missing(c.volume())));
        assert_eq!(stored[1].high(), 4.0);
    }

    #[test]
    fn test_append_without_mts_allowed() {
        let mut store = Store::in_memory();
        let frame = CandleFrame::from_named(&["VOLUME"], vec![vec![5.0]]).unwrap();
        store.save(Resolution::M1, &frame, SaveMode::Append, false).unwrap();
        assert_eq!(store.row_count(Resolution::M1).unwrap(), 1);
        assert_eq!(store.latest(Resolution::M1).unwrap(), 0);
    }

    #[test]
    fn test_schema_errors_leave_table_untouched() {
        let mut store = seeded(&[candle(100, 1.0)]);

        let duplicated =
            CandleFrame::from_named(&["MTS", "HIGH", "HIGH"], vec![vec![200.0, 1.0, 2.0]]).unwrap();
        let result = store.save(Resolution::M1, &duplicated, SaveMode::Append, false);
        assert!(matches!(result, Err(Error::Schema(_))));

        let no_mts = CandleFrame::from_named(&["HIGH"], vec![vec![2.0]]).unwrap();
        for mode in [SaveMode::Skip, SaveMode::Replace] {
            let result = store.save(Resolution::M1, &no_mts, mode, false);
            assert!(matches!(result, Err(Error::Schema(_))));
        }

        assert_eq!(store.row_count(Resolution::M1).unwrap(), 1);
    }

    #[test]
    fn test_skip_fills_only_missing_cells() {
        let mut existing = candle(200, 5.0);
        existing.set(Column::High, NAN);
        let mut store = seeded(&[candle(100, 1.0), existing, candle(300, 9.0)]);

        let incoming = [candle(200, 50.0), candle(300, 90.0), candle(400, 12.0)];
        let report = store
            .save(Resolution::M1, &CandleFrame::from_candles(&incoming), SaveMode::Skip, false)
            .unwrap();
        assert_eq!(report, SaveReport { overlapped: 2, appended: 1 });

        let stored = all_rows(&store);
        assert_eq!(stored.len(), 4);
        assert_eq!(stored[0], candle(100, 1.0));
        // Non-missing cells survive, the missing HIGH is filled
        assert_eq!(stored[1].open(), 5.0);
        assert_eq!(stored[1].high(), 52.0);
        assert_eq!(stored[2], candle(300, 9.0));
        assert_eq!(stored[3], candle(400, 12.0));
    }

    #[test]
    fn test_replace_overwrites_unless_incoming_missing() {
        let mut store = seeded(&[candle(100, 1.0), candle(200, 2.0), candle(300, 3.0)]);

        let frame = CandleFrame::from_named(
            &["MTS", "OPEN", "HIGH"],
            vec![vec![200.0, 20.0, NAN], vec![300.0, NAN, 33.0]],
        )
        .unwrap();
        let report = store.save(Resolution::M1, &frame, SaveMode::Replace, false).unwrap();
        assert_eq!(report, SaveReport { overlapped: 2, appended: 0 });

        let stored = all_rows(&store);
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[1].open(), 20.0);
        assert_eq!(stored[1].high(), 4.0);
        assert_eq!(stored[1].volume(), 1000.0);
        assert_eq!(stored[2].open(), 3.0);
        assert_eq!(stored[2].high(), 33.0);
        assert_eq!(stored[0], candle(100, 1.0));
    }

    #[test]
    fn test_keep_missing() {
        let mut with_gap = candle(200, 2.0);
        with_gap.set(Column::Low, NAN);
        let rows = [candle(100, 1.0), with_gap];

        // Skip never writes into the overlap
        let mut store = seeded(&rows);
        let incoming = [candle(200, 7.0), candle(300, 8.0)];
        store
            .save(Resolution::M1, &CandleFrame::from_candles(&incoming), SaveMode::Skip, true)
            .unwrap();
        let stored = all_rows(&store);
        assert!(stored[1].same_cells(&with_gap));
        assert_eq!(stored[2], candle(300, 8.0));

        // Replace overwrites, missing included
        let mut store = seeded(&rows);
        let mut patch = candle(200, 7.0);
        patch.set(Column::Volume, NAN);
        store
            .save(Resolution::M1, &CandleFrame::from_candles(&[patch]), SaveMode::Replace, true)
            .unwrap();
        let stored = all_rows(&store);
        assert!(stored[1].same_cells(&patch));
        assert!(is_missing(stored[1].volume()));
    }

    #[test]
    fn test_save_inside_existing_bounds() {
        let rows: Vec<Candle> = (1..=5).map(|i| candle(i * 100, i as f64)).collect();
        let mut store = seeded(&rows);

        let frame = CandleFrame::from_named(
            &["MTS", "CLOSE"],
            vec![vec![200.0, -2.0], vec![300.0, -3.0]],
        )
        .unwrap();
        let report = store.save(Resolution::M1, &frame, SaveMode::Replace, false).unwrap();
        assert_eq!(report, SaveReport { overlapped: 2, appended: 0 });

        let stored = all_rows(&store);
        assert_eq!(stored.len(), 5);
        assert_eq!(stored[1].close(), -2.0);
        assert_eq!(stored[2].close(), -3.0);
        assert_eq!(stored[3], rows[3]);
        assert_eq!(stored[1].open(), 2.0);
    }

    #[test]
    fn test_exact_tail_overlap_does_not_grow() {
        let rows = [candle(100, 1.0), candle(200, 2.0)];
        let mut store = seeded(&rows);

        let incoming = [candle(100, 10.0), candle(200, 20.0)];
        let report = store
            .save(Resolution::M1, &CandleFrame::from_candles(&incoming), SaveMode::Replace, false)
            .unwrap();
        assert_eq!(report, SaveReport { overlapped: 2, appended: 0 });
        assert_eq!(all_rows(&store), incoming.to_vec());
    }

    #[test]
    fn test_skip_past_tail_is_plain_append() {
        let mut store = seeded(&[candle(100, 1.0)]);
        let incoming = [candle(200, 2.0), candle(300, 3.0)];
        let report = store
            .save(Resolution::M1, &CandleFrame::from_candles(&incoming), SaveMode::Skip, false)
            .unwrap();
        assert_eq!(report, SaveReport { overlapped: 0, appended: 2 });
        assert_eq!(store.latest(Resolution::M1).unwrap(), 300);
    }

    #[test]
    fn test_save_mode_parse() {
        assert_eq!("skip".parse::<SaveMode>().unwrap(), SaveMode::Skip);
        assert!(matches!("merge".parse::<SaveMode>(), Err(Error::InvalidQuery(_))));
    }
}
