//! dvpp - Domain validation from multiple network vantage points.
//!
//! A certificate authority proves control of a domain by asking the owner
//! to publish a CNAME. This crate checks that record from several agents at
//! once, each resolving the domain through the authoritative nameserver
//! from its own network position, and accepts only when enough agents agree.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐        HTTPS GET /cname/{d}/{c}/{r}
//! │   Orchestrator   │───────────────────┬──────────────────┐
//! │  (quorum vote)   │                   ▼                  ▼
//! └──────────────────┘         ┌──────────────────┐ ┌──────────────────┐
//!          ▲                   │ Agent            │ │ Agent            │
//!          │ JSON results      │  access gate     │ │  access gate     │
//!          └───────────────────│  CnameValidator  │ │  CnameValidator  │
//!                              └────────┬─────────┘ └────────┬─────────┘
//!                                       │ NS, then CNAME     │
//!                                       ▼                    ▼
//!                              recursive resolver ─▶ authoritative server
//! ```
//!
//! ## Validation
//!
//! ```text
//! <challenge> CNAME <response>      (challenge is the full DNS name)
//!   → NS <domain> via the agent's resolver (SOA primary as fallback)
//!   → CNAME <challenge> at that nameserver
//!   → compare the first CNAME target with <response>
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use dvpp::orchestrator::{AgentDescriptor, AgentRegistry, Orchestrator, QuorumConfig};
//! use dvpp::ValidationRequest;
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = AgentRegistry::new(vec![
//!         AgentDescriptor::new("ams", "ams.example.net"),
//!         AgentDescriptor::new("fra", "fra.example.net"),
//!         AgentDescriptor::new("zrh", "zrh.example.net"),
//!     ])
//!     .unwrap();
//!     let config = QuorumConfig::new(2000, 1, 0, registry.len()).unwrap();
//!     let orchestrator = Orchestrator::new(registry, config).unwrap();
//!
//!     let request = ValidationRequest::new("example.com", "_validate.example.com", "target.example.com.");
//!     let result = orchestrator.validate_domain(&request).await;
//!     println!("{}", result.to_json());
//! }
//! ```

#![warn(missing_docs)]

pub mod agent;
pub mod config;
pub mod error;
pub mod messages;
pub mod metrics;
pub mod orchestrator;
pub mod resolver;
pub mod telemetry;
pub mod validation;

// Re-export main types
pub use agent::{AccessPolicy, AgentServer};
pub use config::{AgentConfig, OrchestratorConfig, TelemetryConfig};
pub use error::{AgentError, ConfigError, DnsError};
pub use messages::{ValidationRequest, ValidationResult};
pub use orchestrator::{AgentRegistry, Orchestrator, QuorumConfig};
pub use validation::{CnameValidator, Validator};
