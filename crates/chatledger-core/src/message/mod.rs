//! Per-thread message cache.
//!
//! Stores messages with reply threading and read receipts, serves ascending
//! pages, and enforces a hard per-thread capacity with no exemptions.

mod model;
mod repository;

pub use model::{MessageKind, MessageQuery, ThreadMessage};
pub use repository::MessageRepository;
