//! Storage of versioned cache generations.
//!
//! A generation is a named map from request identity to response. The
//! interceptor only ever talks to a [`CacheStore`]; two backends ship with
//! the crate:
//! - [`MemoryStore`] keeps everything in process
//! - [`SqliteStore`] persists generations across runs

mod memory;
mod storage;
mod traits;

pub use memory::MemoryStore;
pub use storage::SqliteStore;
pub use traits::{CacheScope, CacheStore, CachedResponse};
