//! TLS settings for the agent's HTTPS listener.
//!
//! TLS 1.2 is the minimum version. Only AES-256-GCM suites with ECDHE key
//! exchange over P-384 or P-256 are offered.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;

use crate::error::ConfigError;

/// Crypto provider restricted to the agent's cipher and curve set.
pub fn crypto_provider() -> CryptoProvider {
    CryptoProvider {
        cipher_suites: vec![
            ring::cipher_suite::TLS13_AES_256_GCM_SHA384,
            ring::cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
            ring::cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
        ],
        kx_groups: vec![ring::kx_group::SECP384R1, ring::kx_group::SECP256R1],
        ..ring::default_provider()
    }
}

fn certificate_error(path: &Path, reason: impl ToString) -> ConfigError {
    ConfigError::Certificate {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Read every certificate of a PEM file.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ConfigError> {
    let mut reader = BufReader::new(File::open(path)?);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| certificate_error(path, e))?;
    if certs.is_empty() {
        return Err(certificate_error(path, "no certificates found"));
    }
    Ok(certs)
}

/// Read the first private key of a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ConfigError> {
    let mut reader = BufReader::new(File::open(path)?);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| certificate_error(path, e))?
        .ok_or_else(|| certificate_error(path, "no private key found"))
}

/// Build the server configuration from a certificate chain and key.
pub fn server_config(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>, ConfigError> {
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let mut config = ServerConfig::builder_with_provider(Arc::new(crypto_provider()))
        .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}
