//! Kernel Inventory - time-indexed catalogue of mission kernel files
//!
//! This library answers the question "which kernel files cover instrument X,
//! kernel type Y, between time A and time B, at the best available quality?"
//! without rescanning the data tree or re-reading kernel files on every call.
//!
//! # Architecture
//!
//! ```text
//! ConfigTree ──► IntervalCollector (via Memo) ──► Database::build
//!                                                      │
//!                                       persist ◄──────┤
//!                                          │           │
//!                                     KeyedStore ──► lazy hydrate
//!                                                      │
//!                                                      ▼
//!                                               Database::search
//! ```
//!
//! - [`config`] expands mission definitions (regex kernel groups, `deps`
//!   cross-references, version selection) into concrete file lists.
//! - [`memo`] caches listings, pattern searches and interval extraction keyed by
//!   a fingerprint of the watched roots.
//! - [`toolkit`] is the seam to the kernel-reading toolkit, with a native
//!   implementation for DAF and text kernels.
//! - [`database`] owns the time-indexed and static kernel sets, builds them and
//!   persists them to a keyed binary store.
//! - [`search`] answers inventory queries with quality fallback.

pub mod config;
pub mod database;
pub mod error;
pub mod intervals;
pub mod json;
pub mod kernel;
pub mod memo;
pub mod paths;
pub mod search;
pub mod settings;
pub mod toolkit;

pub use database::{BuildOptions, Database, TimeIndexedKernelSet};
pub use error::{InventoryError, Result};
pub use kernel::{KernelType, Quality};
pub use search::SearchQuery;
pub use settings::InventorySettings;

/// Library version, stamped into cache keys so upgrades invalidate them.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
