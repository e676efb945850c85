//! Term-end report cards and multi-scope rankings computed from raw
//! assessment scores.
//!
//! The pipeline runs raw scores through [`calc::aggregate_subject`], grades and
//! positions them, and stores the result as a [`model::TermReport`] whose
//! finalization locks further score entry ([`lock::is_locked`]). Rankings
//! are computed on demand by [`ranking`].

pub mod calc;
pub mod config;
pub mod db;
pub mod error;
pub mod ipc;
pub mod lock;
pub mod logging;
pub mod model;
pub mod ranking;
pub mod reports;
pub mod store;

pub use error::{CoreError, CoreResult};
pub use ranking::rank;
pub use reports::{finalize_report, generate_reports};
