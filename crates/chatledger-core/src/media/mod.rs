//! Media blob cache.
//!
//! Content cached by remote URL with a fixed time-to-live. Reads past expiry
//! delete the entry and report a miss; nothing renews an entry implicitly.

mod model;
mod repository;

pub use model::{CachedMedia, MediaStats};
pub use repository::MediaRepository;
