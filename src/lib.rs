//! # flatpack
//!
//! A minimal persistent key-value store backed by a single flat file of
//! length-prefixed records, with a write-back caching layer in front:
//! - Single-file layout: one signature byte, then records back-to-back
//! - In-memory offset index rebuilt by scanning the file
//! - Whole-file compaction on overwrite and delete (no free-list)
//! - Write-back cache that defers mutations until flush/drop
//!
//! ## Architecture Overview
//!
//! ```text
//!   ┌──────────────────┐
//!   │   CachedStore    │   buffered writes/deletes, read-through cache
//!   └────────┬─────────┘
//!            │ flush (deletes, then writes)
//!   ┌────────▼─────────┐
//!   │      Store       │   offset index + compaction, sole file I/O
//!   └────────┬─────────┘
//!            │
//!   ┌────────▼─────────┐
//!   │  0xB5 │ records  │   [key_len][value_len][key][value] ...
//!   └──────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cache;
pub mod error;
pub mod record;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use cache::CachedStore;
pub use error::{PackError, Result};
pub use store::Store;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of flatpack
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
