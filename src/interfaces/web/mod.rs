mod handlers;
mod router;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::core::akool::WebhookVerifier;
use crate::core::callbacks::CallbackStore;
use crate::core::lifecycle::LifecycleComponent;
use crate::core::migrations::MigrationRunner;

pub struct ApiServer {
    state: AppState,
    runner: MigrationRunner,
    host: String,
    port: u16,
    bound: Option<SocketAddr>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

pub struct ApiServerConfig {
    pub store: CallbackStore,
    pub verifier: Option<WebhookVerifier>,
    pub runner: MigrationRunner,
    pub host: String,
    pub port: u16,
}

#[derive(Clone)]
pub(crate) struct AppState {
    /// `None` when credentials are missing; callbacks then fail with 500.
    pub(crate) verifier: Option<Arc<WebhookVerifier>>,
    pub(crate) store: CallbackStore,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig) -> Self {
        Self {
            state: AppState {
                verifier: config.verifier.map(Arc::new),
                store: config.store,
            },
            runner: config.runner,
            host: config.host,
            port: config.port,
            bound: None,
            shutdown_tx: None,
            handle: None,
        }
    }

    /// Address actually bound once started (port 0 resolves here).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.bound
    }
}

// --- Lifecycle Implementations ---

#[async_trait]
impl LifecycleComponent for ApiServer {
    async fn on_init(&mut self) -> Result<()> {
        info!("API Server initializing, applying migrations...");
        match self.state.store.migrate(&self.runner).await {
            Ok(report) if report.is_success() => {}
            Ok(report) => warn!(
                "Starting with {} failed migrations: {}",
                report.failed.len(),
                report.failed_files().join(", ")
            ),
            Err(e) => error!("Migrations did not run: {:#}", e),
        }
        if self.state.verifier.is_none() {
            warn!("Akool credentials missing; /akool/webhook will answer 500");
        }
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("binding {}", addr))?;
        let local = listener.local_addr()?;
        self.bound = Some(local);

        let app = router::build_router(self.state.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        self.shutdown_tx = Some(shutdown_tx);

        self.handle = Some(tokio::spawn(async move {
            info!("API Server running at http://{local}");
            let shutdown = async {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("API Server crashed: {}", e);
            }
        }));
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("API Server shutting down...");
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.await.context("API Server task panicked")?;
        }
        Ok(())
    }
}
