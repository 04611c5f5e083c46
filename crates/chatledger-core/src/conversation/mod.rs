//! Conversation cache.
//!
//! Size-bounded storage of conversation thread summaries with filter/sort
//! reads and pin-aware eviction.

mod model;
mod repository;

pub use model::{ConversationFilter, ConversationSort, ConversationThread, Participant};
pub use repository::ConversationRepository;
