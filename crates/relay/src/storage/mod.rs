//! Storage traits and implementations
//!
//! This module defines the persistence seam for the watch record and the
//! notification ledger. The trait-based design allows swapping between
//! in-memory and SQLite storage.

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryWatchStore;
pub use sqlite::SqliteWatchStore;
pub use traits::WatchStore;
