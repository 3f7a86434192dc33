//! Raw DNS queries against a chosen nameserver.
//!
//! Unlike a stub resolver this client never picks servers on its own: every
//! query names the exact nameserver it is sent to, which is what validation
//! from a fixed vantage point requires.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{DNSClass, Name, RecordType};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, trace};

use crate::error::DnsError;
use crate::metrics::{self, QueryResult, Timer};

/// Standard DNS port.
pub const DNS_PORT: u16 = 53;

/// EDNS0 UDP payload size advertised on discovery queries.
pub const EDNS_UDP_PAYLOAD: u16 = 4096;

/// Default bound for one query, including a TCP retry.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Return `name` in fully-qualified (trailing-dot) form.
pub fn fqdn(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{}.", name)
    }
}

/// Issues single queries to a given nameserver.
#[derive(Debug, Clone)]
pub struct ResolverClient {
    timeout: Duration,
}

impl Default for ResolverClient {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY_TIMEOUT)
    }
}

impl ResolverClient {
    /// Create a client bounding each query by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Build a recursion-desired query, optionally advertising EDNS0.
    pub fn build_query(name: Name, record_type: RecordType, edns: bool) -> Message {
        let mut msg = Message::new();
        msg.set_id(rand::random());
        msg.set_message_type(MessageType::Query);
        msg.set_op_code(OpCode::Query);
        msg.set_recursion_desired(true);

        let mut query = Query::new();
        query.set_name(name);
        query.set_query_type(record_type);
        query.set_query_class(DNSClass::IN);
        msg.add_query(query);

        if edns {
            let ext = msg.extensions_mut().get_or_insert_with(Edns::new);
            ext.set_max_payload(EDNS_UDP_PAYLOAD);
        }

        msg
    }

    /// Query `server` for `name`/`record_type`.
    ///
    /// Fails with [`DnsError::ResponseCode`] when the answer's RCODE is not
    /// `NOERROR`.
    pub async fn query(
        &self,
        server: SocketAddr,
        name: &str,
        record_type: RecordType,
        edns: bool,
    ) -> Result<Message, DnsError> {
        let timer = Timer::start();
        let rtype_str = record_type.to_string();
        let qname = Name::from_ascii(fqdn(name))?;
        let request = Self::build_query(qname, record_type, edns);

        trace!(%server, name, rtype = %rtype_str, id = request.id(), "sending DNS query");

        let response = match tokio::time::timeout(self.timeout, self.exchange(server, &request)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                metrics::record_query(&rtype_str, QueryResult::Error, timer.elapsed());
                return Err(e);
            }
            Err(_) => {
                debug!(%server, name, rtype = %rtype_str, "DNS query timed out");
                metrics::record_query(&rtype_str, QueryResult::Timeout, timer.elapsed());
                return Err(DnsError::Timeout {
                    server: server.to_string(),
                });
            }
        };

        if response.response_code() != ResponseCode::NoError {
            debug!(
                %server,
                name,
                rtype = %rtype_str,
                rcode = ?response.response_code(),
                "DNS query answered with error code"
            );
            metrics::record_query(&rtype_str, QueryResult::ResponseCode, timer.elapsed());
            return Err(DnsError::ResponseCode {
                code: u16::from(response.response_code()),
            });
        }

        debug!(
            %server,
            name,
            rtype = %rtype_str,
            answers = response.answers().len(),
            authorities = response.name_servers().len(),
            "DNS query answered"
        );
        metrics::record_query(&rtype_str, QueryResult::Success, timer.elapsed());
        Ok(response)
    }

    async fn exchange(&self, server: SocketAddr, request: &Message) -> Result<Message, DnsError> {
        let response = exchange_udp(server, request).await?;
        if response.truncated() {
            trace!(%server, "response truncated, retrying over TCP");
            return exchange_tcp(server, request).await;
        }
        Ok(response)
    }
}

fn query_error(server: SocketAddr) -> impl FnOnce(std::io::Error) -> DnsError {
    move |source| DnsError::Query {
        server: server.to_string(),
        source,
    }
}

async fn exchange_udp(server: SocketAddr, request: &Message) -> Result<Message, DnsError> {
    let bind_addr: SocketAddr = match server {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(bind_addr).await.map_err(query_error(server))?;
    socket.connect(server).await.map_err(query_error(server))?;
    socket
        .send(&request.to_vec()?)
        .await
        .map_err(query_error(server))?;

    let mut buf = vec![0u8; usize::from(u16::MAX)];
    loop {
        let len = socket.recv(&mut buf).await.map_err(query_error(server))?;
        // Stray or malformed datagrams are dropped; the caller's timeout bounds the wait.
        let response = match Message::from_vec(&buf[..len]) {
            Ok(response) => response,
            Err(e) => {
                trace!(%server, len, error = %e, "ignoring malformed DNS datagram");
                continue;
            }
        };
        if response.id() == request.id() {
            return Ok(response);
        }
        trace!(%server, expected = request.id(), got = response.id(), "ignoring mismatched DNS id");
    }
}

async fn exchange_tcp(server: SocketAddr, request: &Message) -> Result<Message, DnsError> {
    let mut stream = TcpStream::connect(server)
        .await
        .map_err(query_error(server))?;

    let wire = request.to_vec()?;
    let len = u16::try_from(wire.len()).map_err(|_| {
        query_error(server)(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "DNS message exceeds 65535 bytes",
        ))
    })?;
    stream
        .write_all(&len.to_be_bytes())
        .await
        .map_err(query_error(server))?;
    stream.write_all(&wire).await.map_err(query_error(server))?;

    let mut len_buf = [0u8; 2];
    stream
        .read_exact(&mut len_buf)
        .await
        .map_err(query_error(server))?;
    let mut resp_buf = vec![0u8; usize::from(u16::from_be_bytes(len_buf))];
    stream
        .read_exact(&mut resp_buf)
        .await
        .map_err(query_error(server))?;

    Ok(Message::from_vec(&resp_buf)?)
}

/// Resolve `host` to a socket address on `port`, preferring IPv4.
///
/// Literal addresses are used as-is.
pub async fn resolve_socket_addr(host: &str, port: u16) -> Result<SocketAddr, DnsError> {
    let host = host.trim_end_matches('.');
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|source| DnsError::Resolve {
            host: host.to_string(),
            source,
        })?
        .collect();

    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| DnsError::Resolve {
            host: host.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses"),
        })
}

/// Resolve `host` through the system resolver and return its first IPv4 address.
pub async fn lookup_ipv4(host: &str) -> Result<Ipv4Addr, DnsError> {
    let host = host.trim_end_matches('.');
    let addrs = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|source| DnsError::Resolve {
            host: host.to_string(),
            source,
        })?;

    addrs
        .filter_map(|a| match a.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(v6) => v6.to_ipv4_mapped(),
        })
        .next()
        .ok_or_else(|| DnsError::NoIpv4Address {
            host: host.to_string(),
        })
}

/// First nameserver of the system resolver configuration (`/etc/resolv.conf`).
pub fn system_nameserver() -> Result<SocketAddr, DnsError> {
    let (config, _opts) = hickory_resolver::system_conf::read_system_conf()
        .map_err(|e| DnsError::SystemConfig(e.to_string()))?;

    config
        .name_servers()
        .first()
        .map(|ns| ns.socket_addr)
        .ok_or_else(|| DnsError::SystemConfig("no nameservers configured".to_string()))
}

/// Parse a resolver address, defaulting the port to 53.
pub fn parse_nameserver(addr: &str) -> Option<SocketAddr> {
    if let Ok(sock) = addr.parse::<SocketAddr>() {
        return Some(sock);
    }
    let ip = addr.trim_start_matches('[').trim_end_matches(']');
    ip.parse::<IpAddr>()
        .ok()
        .map(|ip| SocketAddr::new(ip, DNS_PORT))
}
