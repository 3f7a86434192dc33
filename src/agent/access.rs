//! Access control in front of the validator: IP allow-list and Basic credentials.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use subtle::ConstantTimeEq;

use crate::error::ConfigError;

/// Mask keeping the top `prefix` bits of a `width`-bit address.
fn prefix_mask(prefix: u8, width: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        let all = if width == 128 {
            u128::MAX
        } else {
            (1u128 << width) - 1
        };
        (all << (width - prefix)) & all
    }
}

fn ip_bits(ip: &IpAddr) -> (u128, u8) {
    match ip {
        IpAddr::V4(v4) => (u128::from(u32::from_be_bytes(v4.octets())), 32),
        IpAddr::V6(v6) => (u128::from_be_bytes(v6.octets()), 128),
    }
}

/// Caller address as seen by the gate. IPv4-mapped IPv6 addresses are unmapped.
pub fn caller_ip(remote: SocketAddr) -> IpAddr {
    match remote.ip() {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        ip => ip,
    }
}

/// One allow-list entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowEntry {
    /// A single address.
    Address(IpAddr),
    /// A CIDR block; `network` has its host bits cleared.
    Network {
        /// Network address.
        network: IpAddr,
        /// Prefix length in bits.
        prefix: u8,
    },
}

impl AllowEntry {
    /// Whether `ip` matches this entry.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match self {
            AllowEntry::Address(addr) => *addr == ip,
            AllowEntry::Network { network, prefix } => {
                let (net_bits, width) = ip_bits(network);
                let (ip_bits, ip_width) = ip_bits(&ip);
                if width != ip_width {
                    return false;
                }
                let mask = prefix_mask(*prefix, width);
                ip_bits & mask == net_bits
            }
        }
    }
}

impl FromStr for AllowEntry {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let Some((addr, prefix)) = s.split_once('/') else {
            return s
                .parse::<IpAddr>()
                .map(AllowEntry::Address)
                .map_err(|_| ConfigError::AllowList(s.to_string()));
        };

        let addr: IpAddr = addr
            .parse()
            .map_err(|_| ConfigError::AllowList(s.to_string()))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| ConfigError::AllowList(s.to_string()))?;
        let (bits, width) = ip_bits(&addr);
        if prefix > width {
            return Err(ConfigError::AllowList(s.to_string()));
        }

        let masked = bits & prefix_mask(prefix, width);
        let network = match addr {
            IpAddr::V4(_) => IpAddr::V4((masked as u32).into()),
            IpAddr::V6(_) => IpAddr::V6(masked.into()),
        };
        Ok(AllowEntry::Network { network, prefix })
    }
}

/// Username/password pair presented with HTTP Basic authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    /// Parse an `Authorization: Basic …` header value.
    pub fn from_authorization(value: &str) -> Option<Self> {
        let (scheme, encoded) = value.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        Some(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// `Authorization` header value for these credentials.
    pub fn to_authorization(&self) -> String {
        format!(
            "Basic {}",
            STANDARD.encode(format!("{}:{}", self.username, self.password))
        )
    }
}

/// Why the gate refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDenied {
    /// Caller IP not allowed (HTTP 403).
    Forbidden,
    /// Credentials required and missing or wrong (HTTP 401).
    Unauthorized,
}

/// Immutable access policy of one agent.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    allow_list: Vec<AllowEntry>,
    users: HashMap<String, String>,
}

impl AccessPolicy {
    /// Build a policy from allow-list strings and a user table.
    ///
    /// An empty allow-list admits every IP; an empty user table skips the
    /// credential check.
    pub fn new<S: AsRef<str>>(
        allow_list: &[S],
        users: HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let allow_list = allow_list
            .iter()
            .map(|s| s.as_ref().parse())
            .collect::<Result<Vec<AllowEntry>, _>>()?;
        Ok(Self { allow_list, users })
    }

    /// Policy admitting everyone.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Whether `ip` passes the allow-list.
    pub fn is_ip_allowed(&self, ip: IpAddr) -> bool {
        self.allow_list.is_empty() || self.allow_list.iter().any(|e| e.contains(ip))
    }

    /// Whether `credentials` satisfy the user table.
    pub fn is_authorized(&self, credentials: Option<&Credentials>) -> bool {
        if self.users.is_empty() {
            return true;
        }
        let Some(creds) = credentials else {
            return false;
        };
        match self.users.get(&creds.username) {
            Some(expected) => bool::from(expected.as_bytes().ct_eq(creds.password.as_bytes())),
            None => false,
        }
    }

    /// Apply the allow-list, then the credential check.
    pub fn check(&self, ip: IpAddr, credentials: Option<&Credentials>) -> Result<(), AccessDenied> {
        if !self.is_ip_allowed(ip) {
            return Err(AccessDenied::Forbidden);
        }
        if !self.is_authorized(credentials) {
            return Err(AccessDenied::Unauthorized);
        }
        Ok(())
    }
}
