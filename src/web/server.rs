//! Web server for filedrop.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;

use crate::config::WebConfig;
use crate::file::DropService;
use crate::{DropError, Result};

use super::handlers::AppState;
use super::router::{create_health_router, create_router};

/// HTTP front end for a [`DropService`].
pub struct WebServer {
    /// Server address.
    addr: SocketAddr,
    /// Application state.
    app_state: Arc<AppState>,
    /// Web configuration.
    web_config: WebConfig,
}

impl WebServer {
    /// Create a new web server.
    pub fn new(config: &WebConfig, service: Arc<DropService>) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port)
            .parse::<SocketAddr>()
            .map_err(|e| {
                DropError::Config(format!(
                    "invalid web server address {}:{}: {e}",
                    config.host, config.port
                ))
            })?;

        Ok(Self {
            addr,
            app_state: Arc::new(AppState::new(service)),
            web_config: config.clone(),
        })
    }

    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn router(&self) -> Router {
        create_router(self.app_state.clone(), &self.web_config.cors_origins)
            .merge(create_health_router())
    }

    /// Run the web server until it fails.
    pub async fn run(self) -> std::result::Result<(), std::io::Error> {
        let router = self.router();
        let listener = TcpListener::bind(self.addr).await?;

        tracing::info!("Web server listening on http://{}", listener.local_addr()?);

        axum::serve(listener, router).await
    }

    /// Run the server in the background and return the actual bound address.
    ///
    /// This is useful for testing when binding to port 0.
    pub async fn run_with_addr(self) -> std::result::Result<SocketAddr, std::io::Error> {
        let router = self.router();
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;

        tracing::info!("Web server listening on http://{}", local_addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!("Web server error: {}", e);
            }
        });

        Ok(local_addr)
    }
}
