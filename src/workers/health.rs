//! Health check worker driving the supervisory tick

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::supervisor::Supervisor;

/// Health worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Tick interval
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
        }
    }
}

/// Run the health check worker
pub async fn run<S, F>(
    options: &Options,
    supervisor: Arc<Supervisor>,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Health check worker starting...");

    loop {
        // Check for shutdown
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Health check worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {
                // Continue with the tick
            }
        }

        supervisor.tick().await;
    }
}
