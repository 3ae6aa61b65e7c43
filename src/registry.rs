//! Agent registry.
//!
//! The coordinator only reads agents through [`AgentDirectory`]; the in-memory
//! [`AgentRegistry`] is the default implementation and the only place agents
//! are inserted.

use crate::clock::{Clock, RandomSource, Timestamp};
use crate::error::{HandshakeError, Result};
use crate::signature::SecretKey;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Declared kind of agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Genuine,
    Fake,
    #[default]
    Unspecified,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Genuine => "genuine",
            AgentType::Fake => "fake",
            AgentType::Unspecified => "unspecified",
        }
    }
}

/// Server-side view of an agent used for signature checks.
#[derive(Debug, Clone)]
pub struct AgentCredentials {
    pub agent_type: AgentType,
    pub secret_key: SecretKey,
}

/// Public view of a registered agent. Carries no key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub agent_id: String,
    pub agent_type: AgentType,
    pub registered_at: Timestamp,
}

/// Read-only agent lookup consumed by the handshake coordinator.
pub trait AgentDirectory: Send + Sync {
    fn get(&self, agent_id: &str) -> Option<AgentCredentials>;

    fn exists(&self, agent_id: &str) -> bool {
        self.get(agent_id).is_some()
    }

    /// Number of known agents, if the directory can tell.
    fn count(&self) -> Option<usize> {
        None
    }
}

struct AgentRecord {
    profile: AgentProfile,
    secret_key: SecretKey,
}

/// In-memory, insert-only agent registry.
pub struct AgentRegistry {
    agents: DashMap<String, AgentRecord>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
}

impl AgentRegistry {
    pub fn new(clock: Arc<dyn Clock>, random: Arc<dyn RandomSource>) -> Self {
        Self {
            agents: DashMap::new(),
            clock,
            random,
        }
    }

    /// Register an agent. Generates a random key when none is supplied.
    ///
    /// Records are immutable: registering an existing id is a `Conflict`.
    pub fn register(
        &self,
        agent_id: &str,
        agent_type: AgentType,
        secret_key: Option<SecretKey>,
    ) -> Result<AgentProfile> {
        match self.agents.entry(agent_id.to_string()) {
            Entry::Occupied(_) => Err(HandshakeError::Conflict(format!(
                "agent {} is already registered",
                agent_id
            ))),
            Entry::Vacant(slot) => {
                let secret_key =
                    secret_key.unwrap_or_else(|| SecretKey::generate(self.random.as_ref()));
                let profile = AgentProfile {
                    agent_id: agent_id.to_string(),
                    agent_type,
                    registered_at: self.clock.now(),
                };
                slot.insert(AgentRecord {
                    profile: profile.clone(),
                    secret_key,
                });
                info!(
                    agent_id = %agent_id,
                    agent_type = agent_type.as_str(),
                    "Agent registered"
                );
                Ok(profile)
            }
        }
    }

    pub fn profile(&self, agent_id: &str) -> Option<AgentProfile> {
        self.agents.get(agent_id).map(|r| r.profile.clone())
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl AgentDirectory for AgentRegistry {
    fn get(&self, agent_id: &str) -> Option<AgentCredentials> {
        self.agents.get(agent_id).map(|r| AgentCredentials {
            agent_type: r.profile.agent_type,
            secret_key: r.secret_key.clone(),
        })
    }

    fn exists(&self, agent_id: &str) -> bool {
        self.agents.contains_key(agent_id)
    }

    fn count(&self) -> Option<usize> {
        Some(self.agents.len())
    }
}
