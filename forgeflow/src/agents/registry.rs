//! Stage-to-agent dispatch table.

use super::AgentAdapter;
use crate::core::StageKind;
use crate::errors::ConfigError;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Maps every stage to the agent that serves it.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: BTreeMap<StageKind, Arc<dyn AgentAdapter>>,
}

impl AgentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry serving every stage with the same agent.
    #[must_use]
    pub fn uniform(agent: Arc<dyn AgentAdapter>) -> Self {
        let agents = StageKind::ALL
            .into_iter()
            .map(|stage| (stage, Arc::clone(&agent)))
            .collect();
        Self { agents }
    }

    /// Registers the agent for a stage, replacing any previous one.
    pub fn register(&mut self, stage: StageKind, agent: Arc<dyn AgentAdapter>) {
        self.agents.insert(stage, agent);
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with_agent(mut self, stage: StageKind, agent: Arc<dyn AgentAdapter>) -> Self {
        self.register(stage, agent);
        self
    }

    /// The agent for `stage`.
    pub fn resolve(&self, stage: StageKind) -> Result<Arc<dyn AgentAdapter>, ConfigError> {
        self.agents
            .get(&stage)
            .cloned()
            .ok_or(ConfigError::MissingAgent(stage))
    }

    /// Checks that every stage has an agent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        StageKind::ALL
            .into_iter()
            .try_for_each(|stage| self.resolve(stage).map(|_| ()))
    }

    /// Stages with a registered agent.
    #[must_use]
    pub fn stages(&self) -> Vec<StageKind> {
        self.agents.keys().copied().collect()
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.agents.iter().map(|(stage, agent)| (stage, agent.name())))
            .finish()
    }
}
