//! Backend selection for the reverse proxy

use std::sync::{Arc, Mutex, PoisonError};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::pod::Pod;
use crate::supervisor::Supervisor;

/// Balancing strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    #[default]
    RoundRobin,
    Random,
    /// Placeholder: connection tracking is not implemented yet, selection
    /// falls back to the first healthy pod
    LeastConnections,
}

/// Chooses the next pod for a deployment under the configured strategy
pub struct Dispatcher {
    supervisor: Arc<Supervisor>,
    strategy: Strategy,

    /// Round-robin position. Global rather than per-deployment; only its
    /// monotonicity matters, the modulo collapses the difference.
    counter: Mutex<u64>,
}

impl Dispatcher {
    pub fn new(supervisor: Arc<Supervisor>, strategy: Strategy) -> Self {
        Self {
            supervisor,
            strategy,
            counter: Mutex::new(0),
        }
    }

    /// Select a pod from a snapshot of the healthy-pods view
    pub fn pick(&self, pods: &[Pod]) -> Option<Pod> {
        if pods.is_empty() {
            return None;
        }

        let index = match self.strategy {
            Strategy::RoundRobin => {
                let mut counter = self.counter.lock().unwrap_or_else(PoisonError::into_inner);
                let index = (*counter as usize) % pods.len();
                *counter = counter.wrapping_add(1);
                index
            }
            Strategy::Random => rand::thread_rng().gen_range(0..pods.len()),
            Strategy::LeastConnections => 0,
        };

        Some(pods[index].clone())
    }

    /// Pick the next healthy pod of a deployment
    pub async fn next_pod(&self, deployment: &str) -> Option<Pod> {
        // Snapshot first; the registry lock is never held while selecting.
        let pods = self.supervisor.healthy_pods(deployment).await;
        let pod = self.pick(&pods);

        if let Some(ref pod) = pod {
            debug!("Dispatching {} to pod {}", deployment, pod.short_id());
        }
        pod
    }

    /// Reachable address of the next healthy pod of a deployment
    pub async fn next_address(&self, deployment: &str) -> Option<String> {
        self.next_pod(deployment).await.map(|pod| pod.host_address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parses_kebab_case() {
        assert_eq!(
            serde_json::from_str::<Strategy>("\"round-robin\"").unwrap(),
            Strategy::RoundRobin
        );
        assert_eq!(
            serde_json::from_str::<Strategy>("\"random\"").unwrap(),
            Strategy::Random
        );
        assert_eq!(
            serde_json::from_str::<Strategy>("\"least-connections\"").unwrap(),
            Strategy::LeastConnections
        );
        assert!(serde_json::from_str::<Strategy>("\"sticky\"").is_err());
    }
}
