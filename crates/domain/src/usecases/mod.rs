//! Application use cases / business logic

pub mod compose;
pub mod ingest;
pub mod post_run;
pub mod resolve;

pub use compose::{ComposeConfig, ComposeError, Composer, Template, sanitize_address};
pub use ingest::{Ingest, IngestConfig, IngestError, IngestReport};
pub use post_run::{PlatformOutcome, PostRun, PostRunConfig, RunError, RunReport};
pub use resolve::{CursorResolver, Resolution, ResolveRequest};
