//! Cooperative cancellation for run sessions.
//!
//! A session owns one [`CancellationToken`]; the orchestrator checks it between
//! stage transitions and agents check it at every retry boundary.

mod token;

pub use token::{CancelCallback, CancellationToken};
