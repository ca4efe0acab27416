use anyhow::{Context, Result, bail};
use console::style;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::flag_value;
use crate::core::akool::WebhookVerifier;
use crate::core::callbacks::CallbackStore;
use crate::core::config::AppConfig;
use crate::core::lifecycle::LifecycleManager;
use crate::core::terminal::GuideSection;
use crate::interfaces::web::{ApiServer, ApiServerConfig};

pub(crate) fn parse_serve_flags(
    args: &[String],
    mut host: String,
    mut port: u16,
) -> Result<(String, u16)> {
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                host = flag_value(args, i)?;
                i += 2;
            }
            "--port" => {
                let raw = flag_value(args, i)?;
                port = raw
                    .parse()
                    .with_context(|| format!("--port must be a port number, got '{}'", raw))?;
                i += 2;
            }
            other => bail!("unexpected argument '{}' for serve", other),
        }
    }
    Ok((host, port))
}

pub async fn run_serve_command(mut config: AppConfig, args: &[String]) -> Result<()> {
    (config.server.host, config.server.port) =
        parse_serve_flags(args, config.server.host.clone(), config.server.port)?;

    let verifier = match config.akool.credentials() {
        Ok(credentials) => {
            let verifier = WebhookVerifier::new(credentials);
            info!("Accepting Akool callbacks for client id {}", verifier.client_id());
            Some(verifier)
        }
        Err(e) => {
            warn!("{}", e);
            None
        }
    };
    let store = CallbackStore::open(&config.database.path)?;

    let server = Arc::new(Mutex::new(ApiServer::new(ApiServerConfig {
        store,
        verifier,
        runner: config.migrations.runner(),
        host: config.server.host.clone(),
        port: config.server.port,
    })));

    let mut lifecycle = LifecycleManager::new();
    lifecycle.attach(server.clone());
    lifecycle.start().await?;
    debug!("Lifecycle state: {:?}", lifecycle.state());

    let addr = server
        .lock()
        .await
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    GuideSection::new("AirShorts Service")
        .status(
            "Webhook",
            &format!(
                "{}",
                style(format!("http://{}/akool/webhook", addr))
                    .underlined()
                    .cyan()
            ),
        )
        .status("Health", &format!("http://{}/health", addr))
        .status("Database", &config.database.path.display().to_string())
        .blank()
        .status(
            "Press Ctrl+C to stop the service.",
            &format!("{}", style("Ctrl+C").bold().yellow()),
        )
        .print();

    tokio::signal::ctrl_c().await?;
    lifecycle.shutdown().await?;
    Ok(())
}
