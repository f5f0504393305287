//! HTTP edge layer for Prism
//!
//! Assembles the axum router from configuration: the chat endpoints, the
//! health endpoint, request-context middleware, and request tracing. The
//! gateway core stays free of HTTP server concerns.

mod health;
mod request_context;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use prism_config::Config;
use prism_llm::{chat_router, Gateway, GatewayState};
use prism_storage::MemoryRecordStore;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Assembled server with all routes and middleware
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
}

impl Server {
    /// Build the server from configuration
    ///
    /// # Errors
    ///
    /// Returns an error when gateway initialization fails
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let listen_address = config
            .server
            .listen_address
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

        let store = Arc::new(MemoryRecordStore::new());
        let gateway = Gateway::from_config(&config.llm, store)?;
        let state = GatewayState {
            gateway: Arc::new(gateway),
        };

        let mut app = Router::new();

        if config.server.health.enabled {
            app = app.route(&config.server.health.path, axum::routing::get(health::health_handler));
        }

        app = app.merge(chat_router(state));

        // Request context runs innermost, just before the handlers
        app = app.layer(axum::middleware::from_fn(request_context::request_context_middleware));
        app = app.layer(TraceLayer::new_for_http());

        Ok(Self {
            router: app,
            listen_address,
        })
    }

    /// The assembled router, for embedding in tests or another server
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Bind and serve until the shutdown token fires
    ///
    /// # Errors
    ///
    /// Returns an error when binding or serving fails
    pub async fn serve(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        tracing::info!(address = %self.listen_address, "prism listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
            })
            .await?;

        Ok(())
    }
}
