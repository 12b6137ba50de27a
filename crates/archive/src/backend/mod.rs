//! Storage backends for the candle tables.
//!
//! A backend holds one growable `(rows, 6)` table per resolution. Rows are
//! kept in non-decreasing MTS order by the callers; backends never reorder.

mod memory;
mod sqlite;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use candlestore_core::{Candle, Column, Resolution, Result};
use std::ops::Range;

/// Which insertion point a sorted-column search returns for equal keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchSide {
    /// First index whose MTS is `>= key`.
    Left,
    /// First index whose MTS is `> key`.
    Right,
}

/// Growable per-resolution tables with a sorted MTS column.
pub trait TableBackend {
    /// Whether the table for `resolution` exists.
    fn has_table(&self, resolution: Resolution) -> Result<bool>;

    /// Create an empty table for `resolution`.
    fn create_table(&mut self, resolution: Resolution) -> Result<()>;

    /// Number of rows in the table.
    fn row_count(&self, resolution: Resolution) -> Result<usize>;

    /// MTS cell of row `index`.
    fn mts_at(&self, resolution: Resolution, index: usize) -> Result<f64>;

    /// Copy of the rows in `rows`; the range must lie within the table.
    fn read_rows(&self, resolution: Resolution, rows: Range<usize>) -> Result<Vec<Candle>>;

    /// Grow the table by `rows.len()` and fill the new rows.
    ///
    /// Growing and filling happen as one unit: a failure leaves the table
    /// at its previous length.
    fn append_rows(&mut self, resolution: Resolution, rows: &[Candle]) -> Result<()>;

    /// Overwrite `columns` of rows `start_row..start_row + rows.len()` with
    /// the corresponding cells of `rows`.
    fn write_cells(
        &mut self,
        resolution: Resolution,
        start_row: usize,
        columns: &[Column],
        rows: &[Candle],
    ) -> Result<()>;

    /// Insertion point of `mts` in the sorted MTS column.
    fn search_mts(&self, resolution: Resolution, mts: f64, side: SearchSide) -> Result<usize> {
        let mut lo = 0;
        let mut hi = self.row_count(resolution)?;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let value = self.mts_at(resolution, mid)?;
            let go_right = match side {
                SearchSide::Left => value < mts,
                SearchSide::Right => value <= mts,
            };
            if go_right {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    /// Release the underlying storage.
    fn close(self) -> Result<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}
