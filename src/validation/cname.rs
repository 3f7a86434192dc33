//! CNAME challenge/response validation.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::Message;
use hickory_proto::rr::{RData, RecordType};
use tracing::{debug, info};

use crate::error::DnsError;
use crate::messages::{ValidationRequest, ValidationResult};
use crate::metrics::{self, Timer, ValidationOutcome};
use crate::resolver::{self, ResolverClient, DNS_PORT};
use crate::validation::{discover_authority, Validator};

/// Error reported when the observed CNAME target differs from the expected one.
pub const INVALID_RESPONSE: &str = "Invalid response";

/// Error reported when the authority returned no CNAME record.
pub const NO_RESPONSE: &str = "No response";

/// Compare the first CNAME answer in `response` with `expected`.
///
/// `expected` must already be fully qualified. Comparison is exact.
pub fn evaluate_answer(response: &Message, expected: &str) -> ValidationResult {
    let target = response.answers().iter().find_map(|r| match r.data() {
        RData::CNAME(cname) => Some(cname.0.to_string()),
        _ => None,
    });

    match target {
        Some(target) => {
            let mut result = ValidationResult::new();
            result.success = target == expected;
            result.response = target;
            if !result.success {
                result.append_error(INVALID_RESPONSE);
            }
            result
        }
        None => ValidationResult::failure(NO_RESPONSE),
    }
}

/// Validates CNAME challenges through a fixed recursive resolver.
#[derive(Debug, Clone)]
pub struct CnameValidator {
    client: ResolverClient,
    resolver: SocketAddr,
    authority_port: u16,
}

impl CnameValidator {
    /// Create a validator that discovers authorities through `resolver`.
    pub fn new(resolver: SocketAddr) -> Self {
        Self {
            client: ResolverClient::default(),
            resolver,
            authority_port: DNS_PORT,
        }
    }

    /// Query authoritative nameservers on `port` instead of 53.
    pub fn with_authority_port(mut self, port: u16) -> Self {
        self.authority_port = port;
        self
    }

    /// Bound every DNS query by `timeout`.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.client = ResolverClient::new(timeout);
        self
    }

    /// Resolver used for authority discovery.
    pub fn resolver(&self) -> SocketAddr {
        self.resolver
    }

    async fn run(&self, request: &ValidationRequest) -> Result<ValidationResult, DnsError> {
        let expected = resolver::fqdn(&request.response);

        let authority = discover_authority(&self.client, &request.domain, self.resolver).await?;
        let server = authority.socket_addr(self.authority_port).await?;
        debug!(domain = %request.domain, authority = %authority, %server, "querying authority");

        let response = self
            .client
            .query(server, &request.challenge, RecordType::CNAME, false)
            .await?;

        Ok(evaluate_answer(&response, &expected))
    }
}

#[async_trait]
impl Validator for CnameValidator {
    async fn validate(&self, request: &ValidationRequest) -> ValidationResult {
        let timer = Timer::start();

        let result = match self.run(request).await {
            Ok(result) => result,
            Err(e) => ValidationResult::failure(e.to_string()),
        };

        let outcome = if result.success {
            ValidationOutcome::Valid
        } else if result.response.is_empty() {
            ValidationOutcome::Failed
        } else {
            ValidationOutcome::Mismatch
        };
        metrics::record_validation(outcome, timer.elapsed());

        info!(
            domain = %request.domain,
            challenge = %request.challenge,
            success = result.success,
            observed = %result.response,
            "CNAME validation finished"
        );
        result
    }
}
