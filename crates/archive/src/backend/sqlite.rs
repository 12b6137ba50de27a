//! SQLite-backed archive file.
//!
//! Each resolution lives in its own table keyed by the 0-based row index, so
//! index ranges are rowid ranges and the row count is `MAX(idx) + 1`. Missing
//! cells are stored as NULL.

use super::TableBackend;
use candlestore_core::{is_missing, Candle, Column, Error, Resolution, Result, MISSING};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::ops::Range;
use std::path::{Path, PathBuf};

fn db_err(e: rusqlite::Error) -> Error {
    Error::storage(e.to_string())
}

fn to_sql(value: f64) -> Value {
    if is_missing(value) {
        Value::Null
    } else {
        Value::Real(value)
    }
}

fn from_sql(value: Option<f64>) -> f64 {
    value.unwrap_or(MISSING)
}

const SELECT_COLUMNS: &str = "mts, open, close, high, low, volume";

/// An archive stored in a single SQLite file.
pub struct SqliteBackend {
    conn: Connection,
    path: PathBuf,
}

impl SqliteBackend {
    /// Open (or create) the archive file at `path`.
    ///
    /// The connection holds an exclusive lock so only one store owns the file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(db_err)?;
        let mode: String = conn
            .pragma_update_and_check(None, "locking_mode", "EXCLUSIVE", |row| row.get(0))
            .map_err(db_err)?;
        tracing::debug!(path = %path.display(), locking_mode = %mode, "Opened archive file");
        Ok(Self { conn, path })
    }

    /// Path of the archive file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_bounds(&self, resolution: Resolution, end: usize) -> Result<()> {
        let count = self.row_count(resolution)?;
        if end > count {
            return Err(Error::storage(format!(
                "row {end} out of range in {resolution} ({count} rows)"
            )));
        }
        Ok(())
    }
}

impl TableBackend for SqliteBackend {
    fn has_table(&self, resolution: Resolution) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [resolution.table_name()],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }

    fn create_table(&mut self, resolution: Resolution) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                idx INTEGER PRIMARY KEY,
                mts REAL,
                open REAL,
                close REAL,
                high REAL,
                low REAL,
                volume REAL
            )",
            resolution.table_name()
        );
        self.conn.execute(&sql, []).map_err(db_err)?;
        Ok(())
    }

    fn row_count(&self, resolution: Resolution) -> Result<usize> {
        let sql = format!(
            "SELECT COALESCE(MAX(idx) + 1, 0) FROM {}",
            resolution.table_name()
        );
        let count: i64 = self
            .conn
            .prepare_cached(&sql)
            .and_then(|mut stmt| stmt.query_row([], |row| row.get(0)))
            .map_err(db_err)?;
        Ok(count as usize)
    }

    fn mts_at(&self, resolution: Resolution, index: usize) -> Result<f64> {
        let sql = format!("SELECT mts FROM {} WHERE idx = ?1", resolution.table_name());
        let value: Option<Option<f64>> = self
            .conn
            .prepare_cached(&sql)
            .and_then(|mut stmt| stmt.query_row([index as i64], |row| row.get(0)).optional())
            .map_err(db_err)?;
        value
            .map(from_sql)
            .ok_or_else(|| Error::storage(format!("row {index} out of range in {resolution}")))
    }

    fn read_rows(&self, resolution: Resolution, rows: Range<usize>) -> Result<Vec<Candle>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        self.check_bounds(resolution, rows.end)?;

        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM {} WHERE idx >= ?1 AND idx < ?2 ORDER BY idx",
            resolution.table_name()
        );
        let mut stmt = self.conn.prepare_cached(&sql).map_err(db_err)?;
        let candles = stmt
            .query_map([rows.start as i64, rows.end as i64], |row| {
                let mut values = [MISSING; 6];
                for (i, value) in values.iter_mut().enumerate() {
                    *value = from_sql(row.get(i)?);
                }
                Ok(Candle::from_values(values))
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(candles)
    }

    fn append_rows(&mut self, resolution: Resolution, rows: &[Candle]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let start = self.row_count(resolution)?;
        let sql = format!(
            "INSERT INTO {} (idx, {SELECT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            resolution.table_name()
        );

        let tx = self.conn.transaction().map_err(db_err)?;
        {
            let mut stmt = tx.prepare_cached(&sql).map_err(db_err)?;
            for (offset, candle) in rows.iter().enumerate() {
                let idx = Value::Integer((start + offset) as i64);
                let cells = candle.values().iter().map(|v| to_sql(*v));
                stmt.execute(params_from_iter(std::iter::once(idx).chain(cells)))
                    .map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)
    }

    fn write_cells(
        &mut self,
        resolution: Resolution,
        start_row: usize,
        columns: &[Column],
        rows: &[Candle],
    ) -> Result<()> {
        if rows.is_empty() || columns.is_empty() {
            return Ok(());
        }
        self.check_bounds(resolution, start_row + rows.len())?;

        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", c.field_name(), i + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE idx = ?{}",
            resolution.table_name(),
            assignments.join(", "),
            columns.len() + 1
        );

        let tx = self.conn.transaction().map_err(db_err)?;
        {
            let mut stmt = tx.prepare_cached(&sql).map_err(db_err)?;
            for (offset, candle) in rows.iter().enumerate() {
                let cells = columns.iter().map(|c| to_sql(candle.get(*c)));
                let idx = Value::Integer((start_row + offset) as i64);
                stmt.execute(params_from_iter(cells.chain(std::iter::once(idx))))
                    .map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)
    }

    fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| db_err(e))
    }
}
