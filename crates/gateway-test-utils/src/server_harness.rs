//! Test server harness for E2E testing
//!
//! Provides TestGateway for spawning real gateway instances in tests.

use crate::crypto_fixtures::test_signing_key;
use gateway_service::config::Config;
use gateway_service::crypto::TokenCodec;
use gateway_service::models::RouteRule;
use gateway_service::observability::metrics::init_metrics_recorder;
use gateway_service::proxy::Forwarder;
use gateway_service::repositories::{EphemeralKeyStore, InMemoryRouteStore, KeyStore};
use gateway_service::routes::{self, AppState};
use gateway_service::services::key_manager::KeyManager;
use gateway_service::services::route_table::RouteTable;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// The global recorder can be installed once per process. Later servers
/// share its handle; if another recorder is already installed, a standalone
/// one is used instead.
fn metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            init_metrics_recorder()
                .unwrap_or_else(|_| PrometheusBuilder::new().build_recorder().handle())
        })
        .clone()
}

/// Test harness for spawning the gateway in E2E tests
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_forward() -> Result<()> {
///     let gateway = TestGateway::builder()
///         .forward_timeout(Duration::from_millis(500))
///         .spawn()
///         .await?;
///     gateway.add_route(TestRouteBuilder::new("/server/orders").target(&url).build()).await?;
///
///     let response = reqwest::Client::new()
///         .get(format!("{}/api/orders", gateway.url()))
///         .bearer_auth(gateway.access_token(1, "alice", ROLE_USER)?)
///         .send()
///         .await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestGateway {
    addr: SocketAddr,
    state: Arc<AppState>,
    _handle: JoinHandle<()>,
}

/// Builder for [`TestGateway`]
pub struct TestGatewayBuilder {
    vars: HashMap<String, String>,
    key_seed: u8,
    key_store: Arc<dyn KeyStore>,
    forward_timeout: Option<Duration>,
}

impl TestGatewayBuilder {
    /// Set a configuration variable as if it came from the environment
    pub fn with_var(mut self, name: &str, value: &str) -> Self {
        self.vars.insert(name.to_string(), value.to_string());
        self
    }

    /// Seed for the deterministic initial signing key
    pub fn key_seed(mut self, seed: u8) -> Self {
        self.key_seed = seed;
        self
    }

    /// Key store used by rotation (default: ephemeral)
    pub fn key_store(mut self, store: Arc<dyn KeyStore>) -> Self {
        self.key_store = store;
        self
    }

    /// Upstream timeout below the one-second resolution of the config
    pub fn forward_timeout(mut self, timeout: Duration) -> Self {
        self.forward_timeout = Some(timeout);
        self
    }

    /// Spawn the server
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Hold routes in memory
    /// - Start the HTTP server in the background
    pub async fn spawn(self) -> Result<TestGateway, anyhow::Error> {
        let config = Config::from_vars(&self.vars)
            .map_err(|e| anyhow::anyhow!("Invalid test configuration: {}", e))?;

        let key = test_signing_key(self.key_seed)?;
        let keys = Arc::new(KeyManager::with_key(key, self.key_store));

        let mut state = AppState::new(config, keys, Arc::new(InMemoryRouteStore::new()))
            .map_err(|e| anyhow::anyhow!("Failed to build application state: {}", e))?;
        if let Some(timeout) = self.forward_timeout {
            state.forwarder = Forwarder::new(timeout)
                .map_err(|e| anyhow::anyhow!("Failed to build forwarder: {}", e))?;
        }
        let state = Arc::new(state);

        let app = routes::build_routes(state.clone(), metrics_handle());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(TestGateway {
            addr,
            state,
            _handle: handle,
        })
    }
}

impl TestGateway {
    pub fn builder() -> TestGatewayBuilder {
        TestGatewayBuilder {
            vars: HashMap::new(),
            key_seed: 1,
            key_store: Arc::new(EphemeralKeyStore),
            forward_timeout: None,
        }
    }

    /// Spawn with default configuration
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::builder().spawn().await
    }

    /// Get the base URL of the test server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn config(&self) -> &Config {
        &self.state.config
    }

    pub fn keys(&self) -> &Arc<KeyManager> {
        &self.state.keys
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.state.codec
    }

    pub fn routes(&self) -> &RouteTable {
        &self.state.routes
    }

    /// Register a route rule through the validating route table
    pub async fn add_route(&self, rule: RouteRule) -> Result<RouteRule, anyhow::Error> {
        self.state
            .routes
            .upsert(rule)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to add route: {}", e))
    }

    /// Issue an access token with the gateway's own codec
    pub fn access_token(
        &self,
        user_id: i64,
        username: &str,
        role_mask: u32,
    ) -> Result<String, anyhow::Error> {
        self.state
            .codec
            .issue_access_token(user_id, username, role_mask)
            .map_err(|e| anyhow::anyhow!("Failed to issue token: {}", e))
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
