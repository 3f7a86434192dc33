//! Error types for dvpp.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while talking to nameservers.
#[derive(Debug, Error)]
pub enum DnsError {
    /// The query could not be sent or no answer was received.
    #[error("DNS query to {server} failed: {source}")]
    Query {
        /// Nameserver the query was sent to.
        server: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// No answer arrived within the query timeout.
    #[error("DNS query to {server} timed out")]
    Timeout {
        /// Nameserver the query was sent to.
        server: String,
    },

    /// Encoding or decoding a DNS message failed.
    #[error("DNS protocol error: {0}")]
    Proto(#[from] hickory_proto::ProtoError),

    /// The nameserver answered with a non-success response code.
    #[error("Received DNS response code {code}")]
    ResponseCode {
        /// Numeric RCODE of the answer.
        code: u16,
    },

    /// Neither NS answers nor an SOA authority record were present.
    #[error("Did not receive an authoritative name server")]
    NoAuthority,

    /// The SOA primary nameserver did not resolve to an IPv4 address.
    #[error("Could not resolve A record for {host}")]
    NoIpv4Address {
        /// Hostname that was resolved.
        host: String,
    },

    /// Resolving a nameserver hostname failed.
    #[error("Could not resolve {host}: {source}")]
    Resolve {
        /// Hostname that was resolved.
        host: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The system resolver configuration could not be read.
    #[error("System resolver configuration unavailable: {0}")]
    SystemConfig(String),
}

/// Errors raised while requesting a validation from one agent.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Connecting, TLS handshake or reading the body failed.
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    /// The agent answered with a status other than 200.
    #[error("returned HTTP code {0}")]
    Status(u16),

    /// The body was not a valid validation result.
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// The whole request exceeded the dispatch timeout.
    #[error("request timed out after {0}ms")]
    Timeout(u64),
}

/// Fatal startup errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Tolerance must stay strictly below half the pool.
    #[error("Tolerance must be smaller than 50% of the pool size. Tolerance: {tolerance} Pool size: {pool_size}")]
    Tolerance {
        /// Configured tolerance.
        tolerance: usize,
        /// Effective pool size.
        pool_size: usize,
    },

    /// No agents were configured.
    #[error("no agents configured")]
    NoAgents,

    /// A configured file was not found in any search path.
    #[error("Cannot find file {0}.")]
    MissingFile(String),

    /// The trusted certificate directory is missing or not a directory.
    #[error("Cannot open directory {}.", .0.display())]
    CertificateDirectory(PathBuf),

    /// A certificate or key could not be parsed.
    #[error("invalid certificate material in {}: {}", .path.display(), .reason)]
    Certificate {
        /// File that failed to parse.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// TLS configuration could not be built.
    #[error("TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),

    /// An allow-list entry is neither an address nor a CIDR block.
    #[error("invalid allow-list entry: {0}")]
    AllowList(String),

    /// A listen or resolver address could not be parsed.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Building the HTTPS client failed.
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    /// The configuration file could not be read or deserialized.
    #[error("Fatal error config file: {0}")]
    Load(#[from] ::config::ConfigError),

    /// IO error while reading configuration material.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// DNS configuration error (system resolver).
    #[error(transparent)]
    Dns(#[from] DnsError),
}
