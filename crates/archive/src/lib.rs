//! Storage and merge engine for the candle archive.
//!
//! This crate handles:
//! - Per-resolution growable tables behind the [`TableBackend`] trait
//! - The [`Store`] owning an open archive (latest, append, range lookup)
//! - Upserts in append / skip / replace mode ([`SaveMode`])

pub mod backend;
pub mod merge;
pub mod query;
pub mod store;

pub use backend::{MemoryBackend, SearchSide, SqliteBackend, TableBackend};
pub use merge::{validate_frame, SaveMode, SaveReport};
pub use query::{Columns, RangeQuery};
pub use store::{CreatePrompt, Store};
