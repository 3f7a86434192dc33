//! Concurrent fan-out of a validation request to a pool of agents.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::quorum::{self, QuorumConfig};
use super::registry::{AgentDescriptor, AgentRegistry};
use crate::error::{AgentError, ConfigError};
use crate::messages::{ValidationRequest, ValidationResult};
use crate::metrics::{self, AgentOutcome, Timer};

/// Transport used to ask one agent for a validation.
#[async_trait]
pub trait AgentClient: Send + Sync + 'static {
    /// Request `request` from `agent` and decode its result.
    async fn request(
        &self,
        agent: &AgentDescriptor,
        request: &ValidationRequest,
    ) -> Result<ValidationResult, AgentError>;
}

/// HTTPS client trusting only the configured agent roots.
#[derive(Debug, Clone)]
pub struct HttpAgentClient {
    client: reqwest::Client,
}

impl HttpAgentClient {
    /// Build a client for the roots in `config`.
    pub fn new(config: &QuorumConfig) -> Result<Self, ConfigError> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .tls_built_in_root_certs(false)
            .https_only(true);
        for certificate in config.trusted_certificates() {
            builder = builder.add_root_certificate(certificate.clone());
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn request(
        &self,
        agent: &AgentDescriptor,
        request: &ValidationRequest,
    ) -> Result<ValidationResult, AgentError> {
        let url = format!("{}{}", agent.url(), request.to_path());
        let mut req = self.client.get(&url);
        if agent.has_credentials() {
            req = req.basic_auth(&agent.user, Some(&agent.pass));
        }

        let response = req.send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(AgentError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        Ok(ValidationResult::from_json(&body)?)
    }
}

/// Fans requests out to agents and applies the quorum rule.
pub struct Orchestrator<C = HttpAgentClient> {
    client: Arc<C>,
    registry: AgentRegistry,
    config: QuorumConfig,
}

impl Orchestrator<HttpAgentClient> {
    /// Orchestrator talking HTTPS to the agents of `registry`.
    pub fn new(registry: AgentRegistry, config: QuorumConfig) -> Result<Self, ConfigError> {
        let client = HttpAgentClient::new(&config)?;
        Ok(Self::with_client(client, registry, config))
    }
}

impl<C: AgentClient> Orchestrator<C> {
    /// Orchestrator using a custom agent transport.
    pub fn with_client(client: C, registry: AgentRegistry, config: QuorumConfig) -> Self {
        Self {
            client: Arc::new(client),
            registry,
            config,
        }
    }

    /// Quorum parameters in use.
    pub fn config(&self) -> &QuorumConfig {
        &self.config
    }

    /// Validate `request` against a fresh pool and return the verdict.
    pub async fn validate_domain(&self, request: &ValidationRequest) -> ValidationResult {
        let pool = self
            .registry
            .select_pool(self.config.pool_size, &mut rand::thread_rng());
        let pool_size = pool.len();
        debug!(
            domain = %request.domain,
            pool = ?pool.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(),
            "dispatching validation"
        );

        let results = self.dispatch(pool, request).await;
        let (result, verdict) = quorum::decide(results, pool_size, self.config.tolerance);

        metrics::record_verdict(verdict.accepted, verdict.successes, verdict.failed);
        if verdict.accepted {
            debug!(
                domain = %request.domain,
                response = %result.response,
                successes = verdict.successes,
                "quorum reached"
            );
        } else {
            warn!(
                domain = %request.domain,
                successes = verdict.successes,
                failed = verdict.failed,
                tolerance = self.config.tolerance,
                "quorum not reached"
            );
        }
        result
    }

    async fn dispatch(
        &self,
        pool: Vec<AgentDescriptor>,
        request: &ValidationRequest,
    ) -> Vec<ValidationResult> {
        let expected = pool.len();
        let (tx, mut rx) = mpsc::channel(expected.max(1));

        for agent in pool {
            let tx = tx.clone();
            let client = Arc::clone(&self.client);
            let request = request.clone();
            let timeout = self.config.timeout;
            tokio::spawn(async move {
                let result = request_agent(client.as_ref(), &agent, &request, timeout).await;
                // The receiver only goes away once every report is in.
                let _ = tx.send(result).await;
            });
        }
        drop(tx);

        let mut results = Vec::with_capacity(expected);
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        if results.len() < expected {
            warn!(
                missing = expected - results.len(),
                "agent tasks ended without a report"
            );
        }
        results
    }
}

/// Query one agent under `timeout` and attribute any error to it.
async fn request_agent<C: AgentClient>(
    client: &C,
    agent: &AgentDescriptor,
    request: &ValidationRequest,
    timeout: Duration,
) -> ValidationResult {
    debug!(agent = %agent.name, url = %agent.url(), "fetching result");
    let timer = Timer::start();

    let outcome = match tokio::time::timeout(timeout, client.request(agent, request)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(AgentError::Timeout(timeout.as_millis() as u64)),
    };

    let mut result = ValidationResult::new();
    match outcome {
        Ok(reply) => {
            let kind = if reply.success {
                AgentOutcome::Success
            } else {
                AgentOutcome::Negative
            };
            metrics::record_agent_request(&agent.name, kind, timer.elapsed());
            result.success = reply.success;
            result.response = reply.response;
            result.append_errors_with_prefix(reply.errors, &agent.name);
        }
        Err(err) => {
            let kind = match err {
                AgentError::Timeout(_) => AgentOutcome::Timeout,
                _ => AgentOutcome::Failed,
            };
            metrics::record_agent_request(&agent.name, kind, timer.elapsed());
            warn!(agent = %agent.name, error = %err, "agent request failed");
            result.append_error_with_prefix(err.to_string(), &agent.name);
        }
    }
    result
}
