//! Logging setup and stage timing.

mod tracing;

pub use self::tracing::{init_tracing, SpanTimer};
