//! everylot domain crate
//!
//! This crate contains the core domain logic following hexagonal architecture:
//! - `model`: Lots, platforms and composed posts
//! - `ports`: Trait definitions for external dependencies (adapters)
//! - `framing`: Camera framing heuristic for street-level imagery
//! - `usecases`: Cursor resolution, composing, posting and ingestion

pub mod framing;
pub mod model;
pub mod ports;
pub mod usecases;

pub use framing::{Framing, aim_camera};
pub use model::*;
pub use ports::*;
