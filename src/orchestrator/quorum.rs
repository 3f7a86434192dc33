//! Quorum parameters and the vote over agent results.

use std::fmt;
use std::time::Duration;

use crate::error::ConfigError;
use crate::messages::ValidationResult;

/// Default per-dispatch timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MILLIS: u64 = 2000;

/// Parameters of one orchestrator.
pub struct QuorumConfig {
    /// Deadline for each agent request.
    pub timeout: Duration,
    /// Number of pool members allowed to fail or disagree.
    pub tolerance: usize,
    /// Number of agents queried per validation.
    pub pool_size: usize,
    trusted_certificates: Vec<reqwest::Certificate>,
}

impl fmt::Debug for QuorumConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuorumConfig")
            .field("timeout", &self.timeout)
            .field("tolerance", &self.tolerance)
            .field("pool_size", &self.pool_size)
            .field("trusted_certificates", &self.trusted_certificates.len())
            .finish()
    }
}

impl QuorumConfig {
    /// Build and check the quorum parameters against a registry of
    /// `registry_len` agents.
    ///
    /// A `pool_size` of zero or one larger than the registry selects the
    /// whole registry. The pool must be strictly larger than twice the
    /// tolerance.
    pub fn new(
        timeout_millis: u64,
        tolerance: usize,
        pool_size: usize,
        registry_len: usize,
    ) -> Result<Self, ConfigError> {
        if registry_len == 0 {
            return Err(ConfigError::NoAgents);
        }
        let pool_size = if pool_size == 0 || pool_size > registry_len {
            registry_len
        } else {
            pool_size
        };
        if 2 * tolerance >= pool_size {
            return Err(ConfigError::Tolerance {
                tolerance,
                pool_size,
            });
        }

        Ok(Self {
            timeout: Duration::from_millis(timeout_millis),
            tolerance,
            pool_size,
            trusted_certificates: Vec::new(),
        })
    }

    /// Trust exactly these roots when talking to agents.
    pub fn with_trusted_certificates(mut self, certificates: Vec<reqwest::Certificate>) -> Self {
        self.trusted_certificates = certificates;
        self
    }

    /// Roots trusted for agent TLS.
    pub fn trusted_certificates(&self) -> &[reqwest::Certificate] {
        &self.trusted_certificates
    }

    /// Minimum number of agreeing agents for acceptance.
    pub fn required_agreement(&self) -> usize {
        self.pool_size - self.tolerance
    }
}

/// Insertion-ordered vote count over observed responses.
#[derive(Debug, Default)]
pub struct Tally {
    votes: Vec<(String, usize)>,
}

impl Tally {
    /// Count one successful agent's response.
    pub fn vote(&mut self, response: &str) {
        match self.votes.iter_mut().find(|(r, _)| r == response) {
            Some((_, count)) => *count += 1,
            None => self.votes.push((response.to_string(), 1)),
        }
    }

    /// Response with the most votes. Ties go to the response seen first.
    pub fn leader(&self) -> Option<(&str, usize)> {
        let mut leader: Option<(&str, usize)> = None;
        for (response, count) in &self.votes {
            if leader.map_or(true, |(_, best)| *count > best) {
                leader = Some((response.as_str(), *count));
            }
        }
        leader
    }
}

/// Outcome of a vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Whether the quorum accepted.
    pub accepted: bool,
    /// Votes for the winning response.
    pub successes: usize,
    /// Pool members that failed or disagreed.
    pub failed: usize,
}

/// Reduce per-agent results to the final result.
///
/// `results` may hold fewer entries than `pool_size`; missing reports count
/// as failures.
pub fn decide<I>(results: I, pool_size: usize, tolerance: usize) -> (ValidationResult, Verdict)
where
    I: IntoIterator<Item = ValidationResult>,
{
    let mut tally = Tally::default();
    let mut outcome = ValidationResult::new();

    for result in results {
        if result.success {
            tally.vote(&result.response);
        } else {
            outcome.append_errors(result.errors);
        }
    }

    let (winner, successes) = tally
        .leader()
        .map(|(r, n)| (r.to_string(), n))
        .unwrap_or_default();
    let failed = pool_size.saturating_sub(successes);
    let accepted = failed <= tolerance;

    if accepted {
        outcome.success = true;
        outcome.response = winner;
    } else if outcome.errors.is_empty() {
        outcome.append_error(format!(
            "local: {} response(s) failed (tolerance = {})",
            failed, tolerance
        ));
    }

    (
        outcome,
        Verdict {
            accepted,
            successes,
            failed,
        },
    )
}
