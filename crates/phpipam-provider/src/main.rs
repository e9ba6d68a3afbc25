// # phpipam-provider - phpIPAM Provider Plugin Process
//
// Thin integration layer between the host orchestrator and `phpipam-core`.
// All resolution, reconciliation and allocation logic lives in the library.
//
// The process is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Validating the connection to phpIPAM
// 4. Registering resource types and data sources
// 5. Serving lifecycle requests, one JSON object per line on stdin/stdout
//
// ## Configuration
//
// - `PHPIPAM_APP_ID`: API application id (required)
// - `PHPIPAM_ENDPOINT_ADDR`: API base URL (default `http://localhost/api`)
// - `PHPIPAM_USER_NAME`: user name for token login
// - `PHPIPAM_PASSWORD`: password, or static app token when no user name is set
// - `PHPIPAM_INSECURE`: skip TLS verification (`true`/`false`)
// - `PHPIPAM_TIMEOUT_SECS`: per-request HTTP timeout
// - `PHPIPAM_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// Logs go to stderr; stdout carries protocol responses only.
//
// ## Example
//
// ```bash
// export PHPIPAM_APP_ID=terraform
// export PHPIPAM_ENDPOINT_ADDR=https://ipam.example.com/api
// export PHPIPAM_USER_NAME=admin
// export PHPIPAM_PASSWORD=secret
//
// echo '{"id":1,"kind":"data_source","type":"phpipam_section","attrs":{"name":"Customers"}}' | phpipam-provider
// ```

mod protocol;

use anyhow::{Context, Result};
use phpipam_client::PhpIpamClient;
use phpipam_core::{AllocationLocks, ProviderConfig, ResourceRegistry};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use crate::protocol::Response;

/// Exit codes for different termination scenarios
///
/// - 0: Clean shutdown (stdin closed or signal)
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum ProviderExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<ProviderExitCode> for ExitCode {
    fn from(code: ProviderExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn log_level() -> Level {
    match env::var("PHPIPAM_LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match ProviderConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ProviderExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return ProviderExitCode::ConfigError.into();
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level())
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ProviderExitCode::ConfigError.into();
    }

    info!("Starting phpipam-provider");
    debug!("Configuration: {:?}", config);

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ProviderExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        let registry = match connect(&config).await {
            Ok(registry) => registry,
            Err(e) => {
                error!("Startup failed: {:#}", e);
                return ProviderExitCode::ConfigError;
            }
        };

        match serve(registry).await {
            Ok(()) => ProviderExitCode::CleanShutdown,
            Err(e) => {
                error!("Provider error: {:#}", e);
                ProviderExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Build the client, check connectivity and register every handler
async fn connect(config: &ProviderConfig) -> Result<Arc<ResourceRegistry>> {
    let client = PhpIpamClient::new(config).context("failed to create phpIPAM client")?;
    client
        .validate_connection()
        .await
        .with_context(|| format!("cannot reach phpIPAM at {}", config.endpoint))?;

    let registry = ResourceRegistry::new();
    phpipam_core::resources::register(&registry, Arc::new(client), AllocationLocks::new());
    info!(
        "Registered {} resource types and {} data sources",
        registry.list_resources().len(),
        registry.list_data_sources().len()
    );
    Ok(Arc::new(registry))
}

/// Serve requests until stdin closes or a shutdown signal arrives
///
/// Requests run concurrently. Finished tasks are reaped on every new request
/// and in-flight requests finish before returning.
async fn serve(registry: Arc<ResourceRegistry>) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Response>();

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(response) = rx.recv().await {
            let mut line = serde_json::to_vec(&response)?;
            line.push(b'\n');
            stdout.write_all(&line).await?;
            stdout.flush().await?;
        }
        anyhow::Ok(())
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut in_flight = JoinSet::new();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    info!("Input closed, shutting down");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }

                let request = match protocol::parse(&line) {
                    Ok(request) => request,
                    Err(response) => {
                        warn!("Rejected malformed request");
                        let _ = tx.send(response);
                        continue;
                    }
                };

                let registry = registry.clone();
                let tx = tx.clone();
                in_flight.spawn(async move {
                    let response = protocol::dispatch(&registry, request).await;
                    let _ = tx.send(response);
                });
                reap_finished(&mut in_flight);
            }
            signal = &mut shutdown => {
                info!("Received shutdown signal: {}", signal?);
                break;
            }
        }
    }

    while let Some(joined) = in_flight.join_next().await {
        report_task(joined);
    }

    drop(tx);
    writer.await.context("response writer panicked")??;
    Ok(())
}

/// Collect tasks that already completed without waiting on the rest
fn reap_finished(in_flight: &mut JoinSet<()>) -> usize {
    let mut reaped = 0;
    while let Some(joined) = in_flight.try_join_next() {
        report_task(joined);
        reaped += 1;
    }
    reaped
}

fn report_task(joined: std::result::Result<(), JoinError>) {
    if let Err(e) = joined {
        error!("Request task failed: {}", e);
    }
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn shutdown_signal() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for CTRL-C
#[cfg(not(unix))]
async fn shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_reap_finished_empties_completed_tasks() {
        let mut in_flight = JoinSet::new();
        for _ in 0..16 {
            in_flight.spawn(async {});
        }
        in_flight.spawn(async { panic!("request handler failed") });
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(reap_finished(&mut in_flight), 17);
        assert!(in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_reap_finished_leaves_running_tasks() {
        let mut in_flight = JoinSet::new();
        let (release, wait) = tokio::sync::oneshot::channel::<()>();
        in_flight.spawn(async move {
            let _ = wait.await;
        });
        in_flight.spawn(async {});
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(reap_finished(&mut in_flight), 1);
        assert_eq!(in_flight.len(), 1);

        release.send(()).unwrap();
        assert!(in_flight.join_next().await.unwrap().is_ok());
    }
}
