//! HTTP health probing

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::errors::OrchestratorError;

/// HTTP health probe
///
/// A single GET per check; the supervisor's failure counter provides the
/// retry semantics.
pub struct HealthProbe {
    client: Client,
}

impl HealthProbe {
    /// Create a probe with a finite request timeout
    pub fn new(timeout: Duration) -> Result<Self, OrchestratorError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Probe `http://{host}:{port}{path}`; true iff the response status is 2xx
    pub async fn check(&self, host: &str, port: u16, path: &str) -> bool {
        let url = format!("http://{}:{}{}", host, port, path);

        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                debug!("Health check {} returned {}", url, response.status());
                false
            }
            Err(e) => {
                debug!("Health check {} failed: {}", url, e);
                false
            }
        }
    }
}
