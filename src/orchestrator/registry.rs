//! Static registry of validation agents.

use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::ConfigError;

/// Port used when an agent entry does not name one.
pub const DEFAULT_AGENT_PORT: &str = "8268";

/// One validation vantage point and its credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct AgentDescriptor {
    /// Name used to attribute errors.
    pub name: String,
    /// Hostname or address of the agent.
    pub host: String,
    /// TCP port of the agent.
    pub port: String,
    /// Basic auth username; empty means no credentials.
    pub user: String,
    /// Basic auth password.
    pub pass: String,
}

impl fmt::Debug for AgentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentDescriptor")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl AgentDescriptor {
    /// Agent on the default port without credentials.
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port: DEFAULT_AGENT_PORT.to_string(),
            user: String::new(),
            pass: String::new(),
        }
    }

    /// Use `port`; an empty port keeps the default.
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        let port = port.into();
        if !port.is_empty() {
            self.port = port;
        }
        self
    }

    /// Authenticate with `user`/`pass`.
    pub fn with_credentials(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.user = user.into();
        self.pass = pass.into();
        self
    }

    /// Whether requests to this agent carry Basic credentials.
    pub fn has_credentials(&self) -> bool {
        !self.user.is_empty()
    }

    /// Base URL of the agent.
    pub fn url(&self) -> String {
        format!("https://{}:{}", self.host, self.port)
    }
}

/// Agents known to the orchestrator, loaded once at startup.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    agents: Vec<AgentDescriptor>,
}

impl AgentRegistry {
    /// Create a registry; at least one agent is required.
    pub fn new(agents: Vec<AgentDescriptor>) -> Result<Self, ConfigError> {
        if agents.is_empty() {
            return Err(ConfigError::NoAgents);
        }
        Ok(Self { agents })
    }

    /// Number of agents.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether the registry has no agents.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// All agents in registration order.
    pub fn agents(&self) -> &[AgentDescriptor] {
        &self.agents
    }

    /// Agents to query for one dispatch.
    ///
    /// The full registry is returned in order when `pool_size` covers it;
    /// otherwise `pool_size` distinct agents are drawn uniformly at random.
    pub fn select_pool<R: Rng + ?Sized>(&self, pool_size: usize, rng: &mut R) -> Vec<AgentDescriptor> {
        if pool_size >= self.agents.len() {
            return self.agents.clone();
        }
        self.agents
            .choose_multiple(rng, pool_size)
            .cloned()
            .collect()
    }
}
