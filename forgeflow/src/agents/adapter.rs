//! The uniform agent interface.

use super::{AgentContext, AgentOutput};
use crate::errors::AgentError;
use async_trait::async_trait;

/// An agent serving one or more pipeline roles.
///
/// Implementations classify failures: [`AgentError::Transient`] and
/// [`AgentError::Timeout`] may be retried by the caller, everything else is
/// final for this invocation.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    /// Produces the stage output for `ctx`.
    async fn invoke(&self, ctx: &AgentContext) -> Result<AgentOutput, AgentError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "agent"
    }
}
