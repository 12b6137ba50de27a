//! Synchronization of the raw candle archive with a remote source.
//!
//! This crate provides:
//! - The [`CandleSource`] contract for remote candle providers
//! - A blocking Bitfinex client implementing it
//! - The [`Synchronizer`] paging new candles into a [`candlestore_archive::Store`]

pub mod bitfinex;
pub mod source;
pub mod synchronizer;

pub use bitfinex::BitfinexClient;
pub use source::{CandleSource, FetchRequest, Selector};
pub use synchronizer::{expected_pages, SyncReport, Synchronizer};
