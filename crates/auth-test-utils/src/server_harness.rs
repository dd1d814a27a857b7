//! Test server harness for E2E testing.

use crate::fixtures::TestStack;
use crate::test_ids::{TEST_CLIENT_ID, TEST_CLIENT_SECRET};
use auth_service::observability::metrics::init_metrics_recorder;
use auth_service::routes::{self, AppState};
use base64::{engine::general_purpose, Engine as _};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A real auth service HTTP server over a [`TestStack`].
///
/// # Example
/// ```rust,ignore
/// let stack = TestStack::new();
/// let server = TestAuthServer::spawn(&stack).await?;
///
/// let response = reqwest::Client::new()
///     .get(format!("{}/ready", server.url()))
///     .send()
///     .await?;
/// assert_eq!(response.status(), 200);
/// ```
pub struct TestAuthServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl TestAuthServer {
    /// Bind 127.0.0.1:0 and serve the production router in the background.
    pub async fn spawn(stack: &TestStack) -> Result<Self, anyhow::Error> {
        let state = Arc::new(AppState {
            lifecycle: stack.lifecycle.clone(),
            health: stack.health.clone(),
        });

        // The global recorder can only be installed once per process.
        let metrics_handle = match init_metrics_recorder() {
            Ok(handle) => handle,
            Err(_) => {
                use metrics_exporter_prometheus::PrometheusBuilder;
                PrometheusBuilder::new().build_recorder().handle()
            }
        };

        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            handle,
        })
    }

    /// Base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `Authorization` header value for the fixed test client.
    pub fn client_basic_auth(&self) -> String {
        basic_auth(TEST_CLIENT_ID, TEST_CLIENT_SECRET)
    }
}

pub fn basic_auth(client_id: &str, client_secret: &str) -> String {
    let raw = format!("{}:{}", client_id, client_secret);
    format!("Basic {}", general_purpose::STANDARD.encode(raw))
}

impl Drop for TestAuthServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
