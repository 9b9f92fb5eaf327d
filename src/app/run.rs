//! Main application run loop

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::balancer::Dispatcher;
use crate::config::Config;
use crate::errors::OrchestratorError;
use crate::probe::HealthProbe;
use crate::release::ReleaseClient;
use crate::runtime::docker::DockerCli;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::supervisor::{Supervisor, SupervisorOptions};

/// How long graceful shutdown may take before the process is forced down
const MAX_SHUTDOWN_DELAY: Duration = Duration::from_secs(30);

/// Run the orchestrator until the shutdown signal fires
pub async fn run(
    config: Config,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), OrchestratorError> {
    info!("Initializing podgate...");

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), MAX_SHUTDOWN_DELAY);

    // Initialize runtime, supervisor and server
    if let Err(e) = init(&config, shutdown_tx.clone(), &mut shutdown_manager).await {
        error!("Failed to start podgate: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    tokio::select! {
        _ = shutdown_signal => {
            info!("Shutdown signal received, shutting down...");
        }
    }

    // Shutdown
    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    config: &Config,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), OrchestratorError> {
    // 1. Runtime adapter and orphan sweep
    let runtime = Arc::new(DockerCli::new(
        &config.docker.executable_path,
        config.docker.environment.clone(),
    ));
    runtime.cleanup_orphans().await?;

    // 2. Supervisor
    let probe = HealthProbe::new(Duration::from_secs(5))?;
    let releases = ReleaseClient::new()?;
    let supervisor = Arc::new(Supervisor::new(
        runtime,
        probe,
        releases,
        SupervisorOptions::default(),
    ));
    shutdown_manager.with_supervisor(supervisor.clone())?;

    // 3. Deploy the declared deployment
    supervisor.clone().deploy(config.deployment.clone()).await?;

    // 4. Dispatcher and HTTP server
    let dispatcher = Arc::new(Dispatcher::new(
        supervisor.clone(),
        config.load_balancer.strategy,
    ));
    let state = ServerState::new(
        supervisor.clone(),
        dispatcher,
        config.deployment.name.clone(),
    )?;

    let mut shutdown_rx = shutdown_tx.subscribe();
    let server_handle = serve(&config.server, Arc::new(state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;
    shutdown_manager.with_server_handle(server_handle)?;

    Ok(())
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    max_shutdown_delay: Duration,
    supervisor: Option<Arc<Supervisor>>,
    server_handle: Option<JoinHandle<Result<(), OrchestratorError>>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, max_shutdown_delay: Duration) -> Self {
        Self {
            shutdown_tx,
            max_shutdown_delay,
            supervisor: None,
            server_handle: None,
        }
    }

    pub fn with_supervisor(&mut self, supervisor: Arc<Supervisor>) -> Result<(), OrchestratorError> {
        if self.supervisor.is_some() {
            return Err(OrchestratorError::ShutdownError(
                "supervisor already set".to_string(),
            ));
        }
        self.supervisor = Some(supervisor);
        Ok(())
    }

    pub fn with_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), OrchestratorError>>,
    ) -> Result<(), OrchestratorError> {
        if self.server_handle.is_some() {
            return Err(OrchestratorError::ShutdownError(
                "server_handle already set".to_string(),
            ));
        }
        self.server_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), OrchestratorError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(self.max_shutdown_delay, self.shutdown_impl()).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), OrchestratorError> {
        info!("Shutting down podgate...");

        // 1. Supervisor: cancels the health loop, stops and removes every pod
        if let Some(supervisor) = self.supervisor.take() {
            supervisor.shutdown().await?;
        }

        // 2. HTTP server
        if let Some(handle) = self.server_handle.take() {
            handle
                .await
                .map_err(|e| OrchestratorError::ShutdownError(e.to_string()))??;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
