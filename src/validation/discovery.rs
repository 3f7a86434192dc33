//! Authoritative nameserver discovery.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};

use hickory_proto::op::Message;
use hickory_proto::rr::{RData, RecordType};
use tracing::debug;

use crate::error::DnsError;
use crate::resolver::{self, ResolverClient};

/// Where the authoritative nameserver for a domain was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameserverChain {
    /// Target of the first NS record, verbatim.
    Host(String),
    /// First IPv4 address of the SOA primary nameserver.
    Address(Ipv4Addr),
}

impl NameserverChain {
    /// Socket address of the nameserver on `port`.
    pub async fn socket_addr(&self, port: u16) -> Result<SocketAddr, DnsError> {
        match self {
            NameserverChain::Host(host) => resolver::resolve_socket_addr(host, port).await,
            NameserverChain::Address(ip) => Ok(SocketAddr::from((*ip, port))),
        }
    }
}

impl fmt::Display for NameserverChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameserverChain::Host(host) => f.write_str(host),
            NameserverChain::Address(ip) => write!(f, "{}", ip),
        }
    }
}

/// What an NS response says about the domain's authority, before any
/// address resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorityAnswer {
    /// An NS record was present in the answer section.
    Nameserver(String),
    /// No NS answer; primary nameserver taken from the SOA authority record.
    SoaPrimary(String),
}

/// Inspect an NS response.
pub fn authority_from_response(response: &Message) -> Result<AuthorityAnswer, DnsError> {
    let ns = response.answers().iter().find_map(|r| match r.data() {
        RData::NS(ns) => Some(ns.0.to_string()),
        _ => None,
    });
    if let Some(ns) = ns {
        return Ok(AuthorityAnswer::Nameserver(ns));
    }

    response
        .name_servers()
        .iter()
        .find_map(|r| match r.data() {
            RData::SOA(soa) => Some(AuthorityAnswer::SoaPrimary(soa.mname().to_string())),
            _ => None,
        })
        .ok_or(DnsError::NoAuthority)
}

/// Find the nameserver authoritative for `domain`, starting at `nameserver`.
pub async fn discover_authority(
    client: &ResolverClient,
    domain: &str,
    nameserver: SocketAddr,
) -> Result<NameserverChain, DnsError> {
    let response = client
        .query(nameserver, domain, RecordType::NS, true)
        .await?;

    match authority_from_response(&response)? {
        AuthorityAnswer::Nameserver(host) => {
            debug!(domain, ns = %host, "authority from NS answer");
            Ok(NameserverChain::Host(host))
        }
        AuthorityAnswer::SoaPrimary(mname) => {
            let ip = resolver::lookup_ipv4(&mname).await?;
            debug!(domain, mname = %mname, %ip, "authority from SOA primary");
            Ok(NameserverChain::Address(ip))
        }
    }
}
