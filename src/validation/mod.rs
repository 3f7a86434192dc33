//! DNS-based domain control validation as performed by one agent.
//!
//! ```text
//! ValidationRequest
//!   → discover_authority(domain, resolver)   NS answer, or SOA mname → A
//!   → CNAME query for the challenge against that authority
//!   → compare target with the expected response
//!   → ValidationResult
//! ```

use async_trait::async_trait;

use crate::messages::{ValidationRequest, ValidationResult};

pub mod cname;
pub mod discovery;

pub use cname::CnameValidator;
pub use discovery::{discover_authority, NameserverChain};

/// A validation method an agent can run for a request.
#[async_trait]
pub trait Validator: Send + Sync {
    /// Validate `request`. Failures are reported inside the result.
    async fn validate(&self, request: &ValidationRequest) -> ValidationResult;
}
