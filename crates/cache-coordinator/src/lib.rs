//! Cache coordinator
//!
//! [`CacheCoordinator`] owns the recommendation and search result caches,
//! the metrics monitor and the memory reclaimer, and holds references to
//! any number of domain caches. It sequences startup and shutdown and
//! renders an aggregate report.

pub mod config;
pub mod coordinator;
pub mod report;

pub use config::CoordinatorConfig;
pub use coordinator::{CacheCoordinator, CoordinatorStats, RECOMMENDATIONS_CACHE, SEARCH_CACHE};
pub use report::render_report;
