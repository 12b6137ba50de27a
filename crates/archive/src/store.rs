//! The candle archive: twelve per-resolution tables behind one owner.

use crate::backend::{MemoryBackend, SearchSide, SqliteBackend, TableBackend};
use crate::query::{Columns, RangeQuery};
use candlestore_core::{
    format_mts, Candle, CandleFrame, Column, Error, Resolution, Result, TimestampMs,
};
use std::ops::Range;
use std::path::Path;

/// Something the store needs permission to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatePrompt<'a> {
    /// The archive file does not exist.
    Archive(&'a Path),
    /// The archive exists but lacks the table for a resolution.
    Table(Resolution),
}

/// Exclusive owner of an open archive.
///
/// All operations fail with [`Error::NotFound`] once the store is closed.
pub struct Store<B: TableBackend = SqliteBackend> {
    backend: Option<B>,
}

impl Store<SqliteBackend> {
    /// Open the archive file at `path`, creating whatever is missing.
    ///
    /// Unless `auto_create` is set, `confirm` is asked before creating the
    /// file or any table; a refusal fails with [`Error::NotFound`].
    pub fn open(
        path: impl AsRef<Path>,
        auto_create: bool,
        mut confirm: impl FnMut(&CreatePrompt<'_>) -> bool,
    ) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            if !auto_create && !confirm(&CreatePrompt::Archive(path)) {
                return Err(Error::not_found(format!(
                    "archive \"{}\" does not exist and was not created",
                    path.display()
                )));
            }
            tracing::info!(path = %path.display(), "Creating archive file");
        }
        let backend = SqliteBackend::open(path)?;
        Self::with_backend(backend, auto_create, confirm)
    }

    /// Open or create the archive at `path` without asking.
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(path, true, |_| true)
    }
}

impl Store<MemoryBackend> {
    /// A fresh archive held in memory.
    pub fn in_memory() -> Self {
        Self {
            backend: Some(MemoryBackend::with_all_tables()),
        }
    }
}

impl<B: TableBackend> Store<B> {
    /// Wrap an open backend, making sure all twelve tables exist.
    pub fn with_backend(
        mut backend: B,
        auto_create: bool,
        mut confirm: impl FnMut(&CreatePrompt<'_>) -> bool,
    ) -> Result<Self> {
        for resolution in Resolution::ALL {
            if backend.has_table(resolution)? {
                continue;
            }
            if !auto_create && !confirm(&CreatePrompt::Table(resolution)) {
                return Err(Error::not_found(format!(
                    "table for resolution {resolution} does not exist and was not created"
                )));
            }
            tracing::debug!(%resolution, "Creating table");
            backend.create_table(resolution)?;
        }
        Ok(Self {
            backend: Some(backend),
        })
    }

    fn backend(&self) -> Result<&B> {
        self.backend
            .as_ref()
            .ok_or_else(|| Error::not_found("archive is not open"))
    }

    fn backend_mut(&mut self) -> Result<&mut B> {
        self.backend
            .as_mut()
            .ok_or_else(|| Error::not_found("archive is not open"))
    }

    /// Whether the archive is still open.
    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    /// Number of rows stored for `resolution`.
    pub fn row_count(&self, resolution: Resolution) -> Result<usize> {
        self.backend()?.row_count(resolution)
    }

    /// MTS of the last row, or 0 when the table is empty.
    pub fn latest(&self, resolution: Resolution) -> Result<TimestampMs> {
        let backend = self.backend()?;
        let count = backend.row_count(resolution)?;
        if count == 0 {
            return Ok(0);
        }
        let mts = backend.mts_at(resolution, count - 1)?;
        Ok(if mts.is_nan() { 0 } else { mts as TimestampMs })
    }

    /// Latest MTS of every resolution.
    pub fn latest_all(&self) -> Result<Vec<(Resolution, TimestampMs)>> {
        Resolution::ALL
            .into_iter()
            .map(|r| Ok((r, self.latest(r)?)))
            .collect()
    }

    /// Append rows at the tail in one step.
    ///
    /// The caller guarantees that `rows` continue the ascending MTS order;
    /// this is not re-checked.
    pub fn append(&mut self, resolution: Resolution, rows: &[Candle]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        self.backend_mut()?.append_rows(resolution, rows)?;
        tracing::trace!(%resolution, rows = rows.len(), "Appended rows");
        Ok(())
    }

    /// Insertion point of `mts` in the MTS column.
    pub fn search_mts(&self, resolution: Resolution, mts: f64, side: SearchSide) -> Result<usize> {
        self.backend()?.search_mts(resolution, mts, side)
    }

    /// Resolve a query to a clamped row range.
    pub fn resolve_range(&self, resolution: Resolution, query: &RangeQuery) -> Result<Range<usize>> {
        query.validate()?;
        let backend = self.backend()?;
        let count = backend.row_count(resolution)?;

        let (start, end) = if query.has_timestamps() {
            let position = |ts: TimestampMs| -> Result<i64> {
                Ok(backend.search_mts(resolution, ts as f64, SearchSide::Right)? as i64)
            };
            (
                query.start.map(position).transpose()?,
                query.end.map(position).transpose()?,
            )
        } else {
            (query.start_index, query.end_index)
        };

        Ok(RangeQuery::clamp(start, end, query.length, count))
    }

    /// All columns of the rows selected by `query`.
    pub fn range(&self, resolution: Resolution, query: &RangeQuery) -> Result<Vec<Candle>> {
        let rows = self.resolve_range(resolution, query)?;
        tracing::trace!(
            %resolution,
            from = ?query.start.map(format_mts),
            to = ?query.end.map(format_mts),
            ?rows,
            "Range lookup"
        );
        self.backend()?.read_rows(resolution, rows)
    }

    /// The requested columns of the rows selected by `query`.
    pub fn select(
        &self,
        resolution: Resolution,
        columns: &Columns,
        query: &RangeQuery,
    ) -> Result<CandleFrame> {
        let candles = self.range(resolution, query)?;
        if let Columns::All = columns {
            return Ok(CandleFrame::from_candles(&candles));
        }
        let columns = columns.resolve();
        let rows = candles
            .iter()
            .map(|c| columns.iter().map(|col| c.get(*col)).collect())
            .collect();
        CandleFrame::new(columns, rows)
    }

    /// Overwrite `columns` of existing rows starting at `start_row`.
    pub fn write_cells(
        &mut self,
        resolution: Resolution,
        start_row: usize,
        columns: &[Column],
        rows: &[Candle],
    ) -> Result<()> {
        self.backend_mut()?
            .write_cells(resolution, start_row, columns, rows)
    }

    /// Release the archive. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        match self.backend.take() {
            Some(backend) => backend.close(),
            None => Ok(()),
        }
    }
}
