//! Relay server lifecycle: bind, serve, shut down.

use std::future::Future;
use std::net::SocketAddr;

use flare_common::FlareError;
use flare_config::RelayConfig;
use tokio::net::TcpListener;

use crate::http::{router, RelayState};
use crate::registry::ConnectionRegistry;

/// A relay that has not bound its socket yet.
pub struct RelayServer {
    config: RelayConfig,
    registry: ConnectionRegistry,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            registry: ConnectionRegistry::new(),
        }
    }

    /// Handle to the member set, usable before and after serving starts.
    pub fn registry(&self) -> ConnectionRegistry {
        self.registry.clone()
    }

    /// Bind the listening socket.
    pub async fn bind(self) -> Result<BoundRelay, FlareError> {
        let listener = TcpListener::bind(self.config.listen_addr()).await?;
        let local_addr = listener.local_addr()?;
        let state = RelayState::new(&self.config, self.registry);
        Ok(BoundRelay {
            listener,
            local_addr,
            state,
        })
    }
}

/// A relay with a bound socket, ready to accept connections.
pub struct BoundRelay {
    listener: TcpListener,
    local_addr: SocketAddr,
    state: RelayState,
}

impl BoundRelay {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> ConnectionRegistry {
        self.state.registry.clone()
    }

    /// Serve until the process ends.
    pub async fn serve(self) -> Result<(), FlareError> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serve until `signal` resolves, then close every member connection.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<(), FlareError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let registry = self.state.registry.clone();
        let shutdown = async move {
            signal.await;
            let closed = registry.close_all().await;
            tracing::info!(closed, "Relay shutting down");
        };

        let app = router(self.state).into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(self.listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}
