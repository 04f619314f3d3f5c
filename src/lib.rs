//! Authoritative in-memory reading progress with append-only SQLite journaling.
//!
//! Tracks one read-through per (reader, book, context) across paper, ebook,
//! and audiobook formats, converts every position into page-equivalents, and
//! aggregates an append-only reading ledger into daily totals, period
//! rollups, calendars, and streaks.
//!
//! # Examples
//!
//! In-memory usage with [`core::store::ProgressStore`]:
//! ```
//! use readlog::{
//!     core::store::ProgressStore,
//!     progress::ProgressInput,
//!     types::{Medium, ProgressKey},
//! };
//! use chrono::NaiveDate;
//!
//! let mut store = ProgressStore::new();
//! let key = ProgressKey::new(7, 42);
//! let day = NaiveDate::from_ymd_opt(2024, 3, 1).expect("date");
//!
//! let (result, _op) = store
//!     .report(key, Medium::Paper, ProgressInput::Page(50), day, Some(200))
//!     .expect("report");
//! assert_eq!(result.snapshot.percent_centi, 2_500); // 25.00%
//! assert_eq!(result.entries_appended, 1);
//! ```
//!
//! Runtime usage with SQLite sink:
//! ```no_run
//! use readlog::{
//!     catalog::StaticCatalog,
//!     core::store::ProgressStore,
//!     persist::sqlite::SqliteLedgerSink,
//!     progress::ProgressInput,
//!     runtime::handle::{spawn_readlog, RuntimeConfig},
//!     types::{Medium, ProgressKey},
//! };
//! use chrono::NaiveDate;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let sink = SqliteLedgerSink::open("readlog.db").expect("open sqlite");
//! let store = sink.load_store().expect("replay");
//! let mut catalog = StaticCatalog::new();
//! catalog.set(42, 200);
//!
//! let handle = spawn_readlog(
//!     store,
//!     Some(Box::new(catalog)),
//!     Some(Box::new(sink)),
//!     RuntimeConfig::default(),
//! );
//! let key = ProgressKey::new(7, 42);
//! let day = NaiveDate::from_ymd_opt(2024, 3, 1).expect("date");
//! let _result = handle
//!     .report(key, Medium::Paper, ProgressInput::Page(50), day)
//!     .await
//!     .expect("report");
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```
#![deny(missing_docs)]

/// Book metadata lookup trait and a static in-memory catalog.
pub mod catalog;
/// Fixed-point page-equivalence and percent conversion helpers.
pub mod convert;
/// Core in-memory store, synchronization rules, and index helpers.
pub mod core;
/// Ledger entries, mutation op model, and journal wrapper types.
pub mod ledger;
/// Persistence abstraction and SQLite implementation.
pub mod persist;
/// Progress record aggregate and per-format medium states.
pub mod progress;
/// Single-writer runtime handle and events.
pub mod runtime;
/// Read-side aggregation: daily totals, rollups, calendars, streaks.
pub mod stats;
/// Shared primitive types and enums.
pub mod types;
