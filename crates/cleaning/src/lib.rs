//! Wick outlier correction for candle archives.
//!
//! This crate provides:
//! - Weighted statistics over Gaussian windows
//! - The outlier scaler for HIGH and LOW spikes
//! - Propagation of corrected candles from a raw archive to a clean one

pub mod outlier;
pub mod propagate;
pub mod stats;

pub use outlier::{CleanReport, Correction, EditedSets, OutlierScaler, Polarity};
pub use propagate::{clean_in_place, propagate, propagate_all, PropagateReport};
pub use stats::{gaussian_window, weighted_avg_and_std};
