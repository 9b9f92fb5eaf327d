//! Server state

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::balancer::Dispatcher;
use crate::errors::OrchestratorError;
use crate::supervisor::Supervisor;

/// Server state shared across handlers
pub struct ServerState {
    pub supervisor: Arc<Supervisor>,
    pub dispatcher: Arc<Dispatcher>,

    /// Client used for forwarding requests to backend pods
    pub upstream: Client,

    /// Deployment inbound traffic is forwarded to
    pub deployment_name: String,
}

impl ServerState {
    pub fn new(
        supervisor: Arc<Supervisor>,
        dispatcher: Arc<Dispatcher>,
        deployment_name: String,
    ) -> Result<Self, OrchestratorError> {
        let upstream = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            supervisor,
            dispatcher,
            upstream,
            deployment_name,
        })
    }
}
