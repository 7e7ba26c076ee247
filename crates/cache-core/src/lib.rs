pub mod clock;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CacheError, Result};
pub use types::*;
