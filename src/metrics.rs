//! Metrics instrumentation for dvpp.
//!
//! All metrics are prefixed with `dvpp.`

use metrics::{counter, gauge, histogram};
use std::time::Instant;

/// Record a DNS query sent by the resolver client.
pub fn record_query(record_type: &str, result: QueryResult, duration: std::time::Duration) {
    let result_str = match result {
        QueryResult::Success => "success",
        QueryResult::ResponseCode => "response_code",
        QueryResult::Timeout => "timeout",
        QueryResult::Error => "error",
    };

    counter!("dvpp.dns.query.count", "type" => record_type.to_string(), "result" => result_str)
        .increment(1);
    histogram!("dvpp.dns.query.duration.seconds", "type" => record_type.to_string())
        .record(duration.as_secs_f64());
}

/// DNS query result type for metrics.
#[derive(Debug, Clone, Copy)]
pub enum QueryResult {
    /// Answer received with NOERROR.
    Success,
    /// Answer received with an error RCODE.
    ResponseCode,
    /// No answer within the query timeout.
    Timeout,
    /// Transport or decoding failure.
    Error,
}

/// Record the outcome of one CNAME validation on an agent.
pub fn record_validation(outcome: ValidationOutcome, duration: std::time::Duration) {
    let outcome_str = match outcome {
        ValidationOutcome::Valid => "valid",
        ValidationOutcome::Mismatch => "mismatch",
        ValidationOutcome::Failed => "failed",
    };

    counter!("dvpp.validation.count", "outcome" => outcome_str).increment(1);
    histogram!("dvpp.validation.duration.seconds").record(duration.as_secs_f64());
}

/// Validation outcomes.
#[derive(Debug, Clone, Copy)]
pub enum ValidationOutcome {
    /// Observed target matched.
    Valid,
    /// A CNAME was observed but did not match.
    Mismatch,
    /// No CNAME observed (DNS failure or empty answer).
    Failed,
}

/// Record an access decision of the agent gate.
pub fn record_access(decision: AccessDecision) {
    let decision_str = match decision {
        AccessDecision::Accepted => "accepted",
        AccessDecision::IpRejected => "ip_rejected",
        AccessDecision::AuthRejected => "auth_rejected",
    };

    counter!("dvpp.agent.access.count", "decision" => decision_str).increment(1);
}

/// Access gate decisions.
#[derive(Debug, Clone, Copy)]
pub enum AccessDecision {
    /// Request passed the gate.
    Accepted,
    /// Caller IP is not on the allow-list.
    IpRejected,
    /// Credentials missing or wrong.
    AuthRejected,
}

/// Record one orchestrator request to an agent.
pub fn record_agent_request(agent: &str, outcome: AgentOutcome, duration: std::time::Duration) {
    let outcome_str = match outcome {
        AgentOutcome::Success => "success",
        AgentOutcome::Negative => "negative",
        AgentOutcome::Failed => "failed",
        AgentOutcome::Timeout => "timeout",
    };

    counter!("dvpp.orchestrator.agent.request.count", "agent" => agent.to_string(), "outcome" => outcome_str)
        .increment(1);
    histogram!("dvpp.orchestrator.agent.request.duration.seconds", "agent" => agent.to_string())
        .record(duration.as_secs_f64());
}

/// Per-agent request outcomes.
#[derive(Debug, Clone, Copy)]
pub enum AgentOutcome {
    /// Agent validated successfully.
    Success,
    /// Agent answered with an unsuccessful validation.
    Negative,
    /// HTTP, status or decoding failure.
    Failed,
    /// Request exceeded the dispatch timeout.
    Timeout,
}

/// Record a quorum verdict.
pub fn record_verdict(accepted: bool, successes: usize, failed: usize) {
    let verdict = if accepted { "accepted" } else { "rejected" };
    counter!("dvpp.orchestrator.verdict.count", "verdict" => verdict).increment(1);
    gauge!("dvpp.orchestrator.last.successes").set(successes as f64);
    gauge!("dvpp.orchestrator.last.failed").set(failed as f64);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
