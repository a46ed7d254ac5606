use axum::Router;
use std::net::SocketAddr;
use tokio::sync::watch;
use tracing::{error, info};

use crate::api::routes;
use crate::api::types::ApiState;
use crate::error::Error;

/// HTTP server for health, readiness and metrics
pub struct ApiServer {
    /// Listening address
    address: SocketAddr,
    router: Router,
}

impl ApiServer {
    pub fn new(address: SocketAddr, state: ApiState) -> Self {
        Self {
            address,
            router: routes::create_router(state),
        }
    }

    /// Serve until `shutdown` turns true
    pub async fn start_with_shutdown(self, mut shutdown: watch::Receiver<bool>) -> Result<(), Error> {
        info!("Starting API server on {}", self.address);

        let server = axum::Server::try_bind(&self.address)
            .map_err(|e| Error::ApiServer(format!("Failed to bind {}: {}", self.address, e)))?
            .serve(self.router.into_make_service())
            .with_graceful_shutdown(async move {
                while !*shutdown.borrow() {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                }
            });

        if let Err(e) = server.await {
            error!("API server error: {}", e);
            return Err(Error::ApiServer(e.to_string()));
        }

        info!("API server shut down gracefully");
        Ok(())
    }

    pub fn address(&self) -> &SocketAddr {
        &self.address
    }
}
