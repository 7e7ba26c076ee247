//! Domain caches
//!
//! - [`IndexedStore`]: an ordered, primary-key indexed record collection
//!   whose text-search and tag-filter results are cached until the next
//!   mutation.
//! - [`PagedLoader`]: fixed-size pages fetched from a [`PageSource`]
//!   through an LRU page cache, with range reads and background preloading.

pub mod indexed;
pub mod paged;
pub mod record;

pub use indexed::IndexedStore;
pub use paged::{MemoryPageSource, PageSource, PagedLoader};
pub use record::{normalize_query, Bookmark, Record};
