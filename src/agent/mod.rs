//! Agent endpoint: an HTTPS server running validations for the orchestrator.
//!
//! ```text
//! GET /cname/{domain}/{challenge}/{response}
//!   → caller IP on allow-list?        no → 403
//!   → Basic credentials registered?   no → 401
//!   → CnameValidator                      → 200 application/json
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tracing::{info, warn};

use crate::messages::ValidationRequest;
use crate::metrics::{self, AccessDecision};
use crate::validation::Validator;

pub mod access;
pub mod tls;

pub use access::{AccessDenied, AccessPolicy, Credentials};

/// Default agent port.
pub const DEFAULT_PORT: u16 = 8268;

/// Value of the `Strict-Transport-Security` header on every response.
pub const HSTS_VALUE: &str = "max-age=63072000; includeSubDomains";

/// Grace period for in-flight requests on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Shared, read-only state of the request handlers.
struct AgentState {
    validator: Arc<dyn Validator>,
    policy: AccessPolicy,
}

/// Build the agent router.
///
/// The router expects `ConnectInfo<SocketAddr>`; serve it with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn router(validator: Arc<dyn Validator>, policy: AccessPolicy) -> Router {
    let state = Arc::new(AgentState { validator, policy });

    Router::new()
        .route("/cname/{domain}/{challenge}/{response}", get(handle_cname))
        .fallback(not_found)
        .layer(axum::middleware::map_response(add_hsts))
        .with_state(state)
}

async fn add_hsts(mut response: Response) -> Response {
    response.headers_mut().insert(
        header::STRICT_TRANSPORT_SECURITY,
        HeaderValue::from_static(HSTS_VALUE),
    );
    response
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found\n").into_response()
}

async fn handle_cname(
    State(state): State<Arc<AgentState>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Path((domain, challenge, response)): Path<(String, String, String)>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let ip = access::caller_ip(remote);
    let credentials = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(Credentials::from_authorization);
    let user = credentials
        .as_ref()
        .map(|c| c.username.as_str())
        .unwrap_or("");
    let target = uri.path();

    match state.policy.check(ip, credentials.as_ref()) {
        Err(AccessDenied::Forbidden) => {
            warn!(%ip, user, path = target, "IP rejected");
            metrics::record_access(AccessDecision::IpRejected);
            return (StatusCode::FORBIDDEN, "Forbidden\n").into_response();
        }
        Err(AccessDenied::Unauthorized) => {
            warn!(%ip, user, path = target, "rejected access");
            metrics::record_access(AccessDecision::AuthRejected);
            return (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Basic realm=Restricted")],
                "Unauthorized\n",
            )
                .into_response();
        }
        Ok(()) => {
            info!(%ip, user, path = target, "CNAME request");
            metrics::record_access(AccessDecision::Accepted);
        }
    }

    let request = ValidationRequest::new(domain, challenge, response);
    let result = state.validator.validate(&request).await;

    (
        [(header::CONTENT_TYPE, "application/json")],
        result.to_json(),
    )
        .into_response()
}

/// HTTPS agent server.
pub struct AgentServer {
    listen_addr: SocketAddr,
    tls: Arc<rustls::ServerConfig>,
    router: Router,
}

impl AgentServer {
    /// Create a server for `validator` behind `policy`.
    pub fn new(
        listen_addr: SocketAddr,
        tls: Arc<rustls::ServerConfig>,
        validator: Arc<dyn Validator>,
        policy: AccessPolicy,
    ) -> Self {
        Self {
            listen_addr,
            tls,
            router: router(validator, policy),
        }
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn run<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = axum_server::Handle::new();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            shutdown.await;
            info!("agent shutdown requested");
            shutdown_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        });

        info!(addr = %self.listen_addr, "agent listening");
        axum_server::bind_rustls(self.listen_addr, RustlsConfig::from_config(self.tls))
            .handle(handle)
            .serve(
                self.router
                    .into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await?;

        info!("agent stopped");
        Ok(())
    }
}
