//! X (Twitter) API adapters

mod media;
mod write;

pub use write::{DEFAULT_MAX_CHARS, X_API_BASE_URL, XPublisher};
