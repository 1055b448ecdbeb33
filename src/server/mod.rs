//! Line-protocol TCP front-end
//!
//! Wires a store, broker, and delayed sweeper together and serves the
//! command protocol: `INFO`, `PING`, `TOPICS`, `PUBLISH <topic> <payload>`
//! and `SUBSCRIBE <topic>`, one command per line, case-insensitive. Each
//! accepted connection runs on its own task.

mod session;

use crate::broker::Broker;
use crate::config::QueueConfig;
use crate::error::{QueueError, Result};
use crate::store::{FileStore, Store, StoreOptions, Sweeper};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// A bound queue server, ready to accept connections
pub struct Server {
    broker: Arc<Broker>,
    store: Arc<dyn Store>,
    sweeper: Sweeper,
    listener: TcpListener,
}

impl Server {
    /// Bind the listen address and assemble the broker and sweeper over
    /// an already-open store
    pub async fn bind(config: &QueueConfig, store: Arc<dyn Store>) -> Result<Self> {
        let broker = Arc::new(Broker::new(store.clone()));
        let sweeper = Sweeper::spawn(store.clone(), broker.signals(), config.sweep_interval());

        let bind_addr = config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            QueueError::Config(format!("Failed to bind to {}: {}", bind_addr, e))
        })?;

        tracing::info!("Server listening on {}", bind_addr);

        Ok(Self {
            broker,
            store,
            sweeper,
            listener,
        })
    }

    /// The bound address (useful when the configured port was 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// The broker behind this server
    pub fn broker(&self) -> Arc<Broker> {
        self.broker.clone()
    }

    /// Accept connections until `shutdown` fires, then tear down the
    /// broker, the sweeper, and the store
    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted?;
                    tracing::debug!(peer = %peer, "new connection");

                    let broker = self.broker.clone();
                    tokio::spawn(async move {
                        if let Err(e) = session::handle(stream, broker).await {
                            tracing::debug!(peer = %peer, error = %e, "session ended");
                        }
                    });
                }
            }
        }

        tracing::info!("shutting down");
        self.broker.shutdown().await;
        self.sweeper.stop().await;
        self.store.close().await?;
        Ok(())
    }
}

/// Open the durable store and run the server until ctrl-c
pub async fn start(config: QueueConfig) -> Result<()> {
    let store: Arc<dyn Store> = Arc::new(FileStore::open_with_options(
        &config.data_dir,
        StoreOptions {
            max_nacks: config.max_nacks,
        },
    )?);

    let server = Server::bind(&config, store).await?;

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
            token.cancel();
        }
    });

    server.serve(shutdown).await
}
