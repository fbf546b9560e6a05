//! Observability utilities: subscriber setup and timing.

mod tracing;

pub use self::tracing::{init_tracing, StageTimer, TracingConfig};
