//! In-memory backend, used for tests and scratch archives.

use super::{SearchSide, TableBackend};
use candlestore_core::{Candle, Column, Error, Resolution, Result};
use std::collections::BTreeMap;
use std::ops::Range;

/// Tables held in plain vectors.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    tables: BTreeMap<Resolution, Vec<Candle>>,
}

impl MemoryBackend {
    /// Create a backend with no tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend holding an empty table for every resolution.
    pub fn with_all_tables() -> Self {
        Self {
            tables: Resolution::ALL.into_iter().map(|r| (r, Vec::new())).collect(),
        }
    }

    fn table(&self, resolution: Resolution) -> Result<&Vec<Candle>> {
        self.tables
            .get(&resolution)
            .ok_or_else(|| Error::not_found(format!("no table for resolution {resolution}")))
    }

    fn table_mut(&mut self, resolution: Resolution) -> Result<&mut Vec<Candle>> {
        self.tables
            .get_mut(&resolution)
            .ok_or_else(|| Error::not_found(format!("no table for resolution {resolution}")))
    }
}

impl TableBackend for MemoryBackend {
    fn has_table(&self, resolution: Resolution) -> Result<bool> {
        Ok(self.tables.contains_key(&resolution))
    }

    fn create_table(&mut self, resolution: Resolution) -> Result<()> {
        self.tables.entry(resolution).or_default();
        Ok(())
    }

    fn row_count(&self, resolution: Resolution) -> Result<usize> {
        Ok(self.table(resolution)?.len())
    }

    fn mts_at(&self, resolution: Resolution, index: usize) -> Result<f64> {
        self.table(resolution)?
            .get(index)
            .map(|c| c.mts())
            .ok_or_else(|| Error::storage(format!("row {index} out of range in {resolution}")))
    }

    fn read_rows(&self, resolution: Resolution, rows: Range<usize>) -> Result<Vec<Candle>> {
        self.table(resolution)?
            .get(rows.clone())
            .map(<[Candle]>::to_vec)
            .ok_or_else(|| Error::storage(format!("rows {rows:?} out of range in {resolution}")))
    }

    fn append_rows(&mut self, resolution: Resolution, rows: &[Candle]) -> Result<()> {
        self.table_mut(resolution)?.extend_from_slice(rows);
        Ok(())
    }

    fn write_cells(
        &mut self,
        resolution: Resolution,
        start_row: usize,
        columns: &[Column],
        rows: &[Candle],
    ) -> Result<()> {
        let table = self.table_mut(resolution)?;
        let end = start_row + rows.len();
        let target = table.get_mut(start_row..end).ok_or_else(|| {
            Error::storage(format!("rows {start_row}..{end} out of range in {resolution}"))
        })?;
        for (existing, incoming) in target.iter_mut().zip(rows) {
            for &column in columns {
                existing.set(column, incoming.get(column));
            }
        }
        Ok(())
    }

    fn search_mts(&self, resolution: Resolution, mts: f64, side: SearchSide) -> Result<usize> {
        let table = self.table(resolution)?;
        Ok(match side {
            SearchSide::Left => table.partition_point(|c| c.mts() < mts),
            SearchSide::Right => table.partition_point(|c| c.mts() <= mts),
        })
    }
}
