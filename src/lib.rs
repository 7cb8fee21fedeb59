//! Batch lineage and recall reconciliation
//!
//! Traces stock batches backward to their suppliers and forward to the
//! customers they reached, and runs the recall workflow on top of that
//! genealogy: quarantine, disposition, customer notification and
//! reconciliation of affected against recovered stock.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod services;
pub mod validation;

pub use errors::ServiceError;
