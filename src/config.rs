//! Configuration types for the agent and the orchestrator.

use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::agent::{AccessPolicy, DEFAULT_PORT};
use crate::error::ConfigError;
use crate::orchestrator::{
    AgentDescriptor, AgentRegistry, QuorumConfig, DEFAULT_AGENT_PORT, DEFAULT_TIMEOUT_MILLIS,
};
use crate::resolver::{self, DNS_PORT};

/// Environment prefix for agent overrides, e.g. `DVPP_AGENT__PORT`.
pub const AGENT_ENV_PREFIX: &str = "DVPP_AGENT";

/// Environment prefix for orchestrator overrides.
pub const ORCHESTRATOR_ENV_PREFIX: &str = "DVPP_ORCHESTRATOR";

/// Extensions tried when looking up a default configuration file.
const CONFIG_EXTENSIONS: &[&str] = &["toml", "yaml", "yml"];

/// Directories searched for relative configuration paths, in order.
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/dv++")];
    if let Some(home) = std::env::var_os("HOME") {
        paths.push(PathBuf::from(home).join(".dv++"));
    }
    paths.push(PathBuf::from("."));
    paths
}

/// Resolve `file` against the search paths.
///
/// Absolute paths must exist as given.
pub fn find_file(file: &str) -> Result<PathBuf, ConfigError> {
    find_file_in(file, &search_paths())
}

fn find_file_in(file: &str, paths: &[PathBuf]) -> Result<PathBuf, ConfigError> {
    let path = Path::new(file);
    if file.is_empty() {
        return Err(ConfigError::MissingFile(file.to_string()));
    }
    if path.is_absolute() {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(ConfigError::MissingFile(file.to_string()));
    }
    paths
        .iter()
        .map(|dir| dir.join(path))
        .find(|candidate| candidate.exists())
        .ok_or_else(|| ConfigError::MissingFile(file.to_string()))
}

/// Default configuration file `<name>.{toml,yaml,yml}` in the search paths.
pub fn default_config_file(name: &str) -> Result<PathBuf, ConfigError> {
    CONFIG_EXTENSIONS
        .iter()
        .find_map(|ext| find_file(&format!("{}.{}", name, ext)).ok())
        .ok_or_else(|| ConfigError::MissingFile(format!("{}.toml", name)))
}

/// Load a configuration file with environment overrides under `env_prefix`.
pub fn load<T: DeserializeOwned>(path: &Path, env_prefix: &str) -> Result<T, ConfigError> {
    let loaded = ::config::Config::builder()
        .add_source(::config::File::from(path))
        .add_source(
            ::config::Environment::with_prefix(env_prefix)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;
    Ok(loaded)
}

/// Read every trusted root in `dir`.
///
/// Files whose name starts with `.` or `_` are skipped. Each remaining file
/// is parsed as a PEM bundle.
pub fn load_trusted_certificates(dir: &Path) -> Result<Vec<reqwest::Certificate>, ConfigError> {
    if !dir.is_dir() {
        return Err(ConfigError::CertificateDirectory(dir.to_path_buf()));
    }

    let mut entries = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();

    let mut certificates = Vec::new();
    for path in entries {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') || name.starts_with('_') || !path.is_file() {
            continue;
        }
        info!(path = %path.display(), "loading certificate");
        let pem = std::fs::read(&path)?;
        let bundle =
            reqwest::Certificate::from_pem_bundle(&pem).map_err(|e| ConfigError::Certificate {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        certificates.extend(bundle);
    }
    Ok(certificates)
}

/// Pick one resolver at random from `servers`, defaulting the port to 53.
///
/// Returns `None` for an empty list.
pub fn pick_resolver<S, R>(servers: &[S], rng: &mut R) -> Result<Option<SocketAddr>, ConfigError>
where
    S: AsRef<str>,
    R: Rng + ?Sized,
{
    let candidates: Vec<&str> = servers
        .iter()
        .map(|s| s.as_ref().trim())
        .filter(|s| !s.is_empty())
        .collect();
    let Some(chosen) = candidates.choose(rng) else {
        return Ok(None);
    };
    resolver::parse_nameserver(chosen)
        .map(Some)
        .ok_or_else(|| ConfigError::InvalidAddress(chosen.to_string()))
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "dvpp=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Append logs to this file instead of stderr.
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: None,
            prometheus_addr: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Agent configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Address to listen on; empty means all IPv4 interfaces.
    #[serde(default)]
    pub ip: String,

    /// HTTPS port.
    #[serde(default = "default_agent_port")]
    pub port: u16,

    /// Certificate chain (PEM).
    pub certificate: String,

    /// Private key (PEM).
    pub key: String,

    /// Recursive resolvers; one is picked at random at startup.
    #[serde(default)]
    pub dns: Vec<String>,

    /// Basic auth users and passwords. Empty disables authentication.
    #[serde(default)]
    pub users: HashMap<String, String>,

    /// Allowed caller addresses or CIDR blocks. Empty allows everyone.
    #[serde(default)]
    pub whitelist: Vec<String>,

    /// Port used to query authoritative nameservers.
    #[serde(default = "default_authority_port")]
    pub authority_port: u16,

    /// Per DNS query timeout in milliseconds.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_agent_port() -> u16 {
    DEFAULT_PORT
}

fn default_authority_port() -> u16 {
    DNS_PORT
}

fn default_query_timeout_ms() -> u64 {
    resolver::DEFAULT_QUERY_TIMEOUT.as_millis() as u64
}

impl AgentConfig {
    /// Socket address of the HTTPS listener.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip = if self.ip.is_empty() {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            self.ip
                .parse()
                .map_err(|_| ConfigError::InvalidAddress(self.ip.clone()))?
        };
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Certificate and key paths resolved against the search paths.
    pub fn tls_files(&self) -> Result<(PathBuf, PathBuf), ConfigError> {
        Ok((find_file(&self.certificate)?, find_file(&self.key)?))
    }

    /// Access policy built from `whitelist` and `users`.
    pub fn access_policy(&self) -> Result<AccessPolicy, ConfigError> {
        AccessPolicy::new(&self.whitelist, self.users.clone())
    }

    /// Recursive resolver to use.
    ///
    /// `override_list` (from the command line) wins over the `dns` key; with
    /// neither, the first system nameserver is used.
    pub fn resolver<R: Rng + ?Sized>(
        &self,
        override_list: &[String],
        rng: &mut R,
    ) -> Result<SocketAddr, ConfigError> {
        if let Some(addr) = pick_resolver(override_list, rng)? {
            return Ok(addr);
        }
        if let Some(addr) = pick_resolver(&self.dns, rng)? {
            return Ok(addr);
        }
        Ok(resolver::system_nameserver()?)
    }

    /// Per DNS query timeout.
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

/// One `[agents.<name>]` table of the orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEntry {
    /// Hostname or address.
    pub host: String,

    /// HTTPS port.
    #[serde(default = "default_agent_entry_port")]
    pub port: String,

    /// Basic auth username.
    #[serde(default)]
    pub user: String,

    /// Basic auth password.
    #[serde(default)]
    pub pass: String,
}

fn default_agent_entry_port() -> String {
    DEFAULT_AGENT_PORT.to_string()
}

/// Orchestrator configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Per agent request timeout in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Number of agents allowed to fail or disagree.
    #[serde(default)]
    pub tolerance: usize,

    /// Agents queried per validation; zero or less means all.
    #[serde(default)]
    pub poolsize: i64,

    /// Directory of trusted agent certificates.
    #[serde(default = "default_certificates")]
    pub certificates: String,

    /// Agents by name.
    #[serde(default)]
    pub agents: BTreeMap<String, AgentEntry>,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MILLIS
}

fn default_certificates() -> String {
    "certs".to_string()
}

impl OrchestratorConfig {
    /// Registry of the configured agents, ordered by name.
    pub fn registry(&self) -> Result<AgentRegistry, ConfigError> {
        let agents = self
            .agents
            .iter()
            .map(|(name, entry)| {
                AgentDescriptor::new(name.clone(), entry.host.clone())
                    .with_port(entry.port.clone())
                    .with_credentials(entry.user.clone(), entry.pass.clone())
            })
            .collect();
        AgentRegistry::new(agents)
    }

    /// Quorum parameters, checked against `registry`, with trusted roots
    /// loaded from the certificate directory.
    pub fn quorum_config(&self, registry: &AgentRegistry) -> Result<QuorumConfig, ConfigError> {
        let pool_size = usize::try_from(self.poolsize).unwrap_or(0);
        let config = QuorumConfig::new(self.timeout, self.tolerance, pool_size, registry.len())?;

        let dir = find_file(&self.certificates)
            .map_err(|_| ConfigError::CertificateDirectory(PathBuf::from(&self.certificates)))?;
        let certificates = load_trusted_certificates(&dir)?;
        Ok(config.with_trusted_certificates(certificates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn parse<T: DeserializeOwned>(toml: &str) -> T {
        ::config::Config::builder()
            .add_source(::config::File::from_str(toml, ::config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    fn self_signed_pem() -> String {
        rcgen::generate_simple_self_signed(vec!["agent.example.net".to_string()])
            .unwrap()
            .cert
            .pem()
    }

    #[test]
    fn test_agent_defaults() {
        let config: AgentConfig = parse(
            r#"
            certificate = "agent.crt"
            key = "agent.key"
            "#,
        );
        assert_eq!(config.port, 8268);
        assert_eq!(config.authority_port, 53);
        assert_eq!(config.query_timeout(), Duration::from_secs(5));
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(
            config.listen_addr().unwrap(),
            "0.0.0.0:8268".parse::<SocketAddr>().unwrap()
        );
        assert!(config.users.is_empty());
    }

    #[test]
    fn test_agent_full() {
        let config: AgentConfig = parse(
            r#"
            ip = "127.0.0.1"
            port = 9443
            certificate = "agent.crt"
            key = "agent.key"
            dns = ["192.0.2.53"]
            whitelist = ["10.0.0.0/8"]

            [users]
            orchestrator = "s3cret"
            "#,
        );
        assert_eq!(
            config.listen_addr().unwrap(),
            "127.0.0.1:9443".parse::<SocketAddr>().unwrap()
        );
        let policy = config.access_policy().unwrap();
        assert!(policy.is_ip_allowed("10.9.9.9".parse().unwrap()));
        assert!(!policy.is_authorized(None));

        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(
            config.resolver(&[], &mut rng).unwrap(),
            "192.0.2.53:53".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            config
                .resolver(&["198.51.100.1:5353".to_string()], &mut rng)
                .unwrap(),
            "198.51.100.1:5353".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_invalid_listen_ip() {
        let config: AgentConfig = parse(
            r#"
            ip = "not-an-ip"
            certificate = "a"
            key = "b"
            "#,
        );
        assert!(matches!(
            config.listen_addr(),
            Err(ConfigError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_pick_resolver() {
        let mut rng = StdRng::seed_from_u64(9);
        let servers = ["192.0.2.1", "192.0.2.2:5300", " "];
        for _ in 0..20 {
            let picked = pick_resolver(&servers, &mut rng).unwrap().unwrap();
            assert!(
                picked == "192.0.2.1:53".parse().unwrap()
                    || picked == "192.0.2.2:5300".parse().unwrap()
            );
        }
        assert_eq!(pick_resolver::<&str, _>(&[], &mut rng).unwrap(), None);
        assert!(pick_resolver(&["bogus"], &mut rng).is_err());
    }

    #[test]
    fn test_orchestrator_defaults_and_registry() {
        let config: OrchestratorConfig = parse(
            r#"
            [agents.zurich]
            host = "zrh.example.net"

            [agents.amsterdam]
            host = "ams.example.net"
            port = "9443"
            user = "orch"
            pass = "pw"
            "#,
        );
        assert_eq!(config.timeout, 2000);
        assert_eq!(config.tolerance, 0);
        assert_eq!(config.poolsize, 0);
        assert_eq!(config.certificates, "certs");

        let registry = config.registry().unwrap();
        let names: Vec<_> = registry.agents().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["amsterdam", "zurich"]);
        assert_eq!(registry.agents()[0].url(), "https://ams.example.net:9443");
        assert!(registry.agents()[0].has_credentials());
        assert_eq!(registry.agents()[1].url(), "https://zrh.example.net:8268");
    }

    #[test]
    fn test_orchestrator_without_agents() {
        let config: OrchestratorConfig = parse("timeout = 500");
        assert!(matches!(config.registry(), Err(ConfigError::NoAgents)));
    }

    #[test]
    fn test_quorum_config_loads_certificates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("agent1.pem"), self_signed_pem()).unwrap();
        std::fs::write(
            dir.path().join("bundle.pem"),
            format!("{}{}", self_signed_pem(), self_signed_pem()),
        )
        .unwrap();
        std::fs::write(dir.path().join(".hidden.pem"), "garbage").unwrap();
        std::fs::write(dir.path().join("_disabled.pem"), "garbage").unwrap();

        let certificates = load_trusted_certificates(dir.path()).unwrap();
        assert_eq!(certificates.len(), 3);

        let config: OrchestratorConfig = parse(&format!(
            r#"
            tolerance = 1
            poolsize = -1
            certificates = "{}"

            [agents.a]
            host = "a"
            [agents.b]
            host = "b"
            [agents.c]
            host = "c"
            "#,
            dir.path().display()
        ));
        let registry = config.registry().unwrap();
        let quorum = config.quorum_config(&registry).unwrap();
        assert_eq!(quorum.pool_size, 3);
        assert_eq!(quorum.trusted_certificates().len(), 3);
    }

    #[test]
    fn test_tolerance_too_high() {
        let dir = tempfile::tempdir().unwrap();
        let config: OrchestratorConfig = parse(&format!(
            r#"
            tolerance = 1
            certificates = "{}"

            [agents.a]
            host = "a"
            [agents.b]
            host = "b"
            "#,
            dir.path().display()
        ));
        let registry = config.registry().unwrap();
        assert!(matches!(
            config.quorum_config(&registry),
            Err(ConfigError::Tolerance {
                tolerance: 1,
                pool_size: 2
            })
        ));
    }

    #[test]
    fn test_missing_certificate_directory() {
        assert!(matches!(
            load_trusted_certificates(Path::new("/nonexistent/dvpp/certs")),
            Err(ConfigError::CertificateDirectory(_))
        ));
    }

    #[test]
    fn test_find_file_search_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(second.path().join("agent.crt"), "x").unwrap();
        let paths = vec![first.path().to_path_buf(), second.path().to_path_buf()];

        assert_eq!(
            find_file_in("agent.crt", &paths).unwrap(),
            second.path().join("agent.crt")
        );

        std::fs::write(first.path().join("agent.crt"), "y").unwrap();
        assert_eq!(
            find_file_in("agent.crt", &paths).unwrap(),
            first.path().join("agent.crt")
        );

        assert!(matches!(
            find_file_in("missing.crt", &paths),
            Err(ConfigError::MissingFile(name)) if name == "missing.crt"
        ));

        let absolute = second.path().join("agent.crt");
        assert_eq!(
            find_file_in(absolute.to_str().unwrap(), &[]).unwrap(),
            absolute
        );
    }
}
