//! In-process pod table
//!
//! Plain in-memory store keyed by pod id. The registry has no interior
//! locking: all access goes through the supervisor state mutex.

use std::collections::HashMap;

use crate::models::pod::{Pod, PodInfo, PodStatus};

/// Table of pods keyed by id, with query views by deployment and by version
#[derive(Debug, Default)]
pub struct PodRegistry {
    pods: HashMap<String, Pod>,
}

impl PodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pods.is_empty()
    }

    /// Insert a pod, keyed by its id
    pub fn insert(&mut self, pod: Pod) {
        self.pods.insert(pod.id.clone(), pod);
    }

    /// Remove a pod by id
    pub fn remove(&mut self, pod_id: &str) -> Option<Pod> {
        self.pods.remove(pod_id)
    }

    /// Remove every pod from the table
    pub fn drain(&mut self) -> Vec<Pod> {
        self.pods.drain().map(|(_, pod)| pod).collect()
    }

    pub fn get(&self, pod_id: &str) -> Option<&Pod> {
        self.pods.get(pod_id)
    }

    /// All running pods
    pub fn healthy_pods(&self) -> Vec<Pod> {
        self.pods
            .values()
            .filter(|p| p.status == PodStatus::Running)
            .cloned()
            .collect()
    }

    /// Running pods of one deployment
    pub fn healthy_pods_for(&self, deployment: &str) -> Vec<Pod> {
        self.pods
            .values()
            .filter(|p| p.status == PodStatus::Running && p.deployment_name == deployment)
            .cloned()
            .collect()
    }

    /// All pods regardless of status
    pub fn all_pods(&self) -> Vec<Pod> {
        self.pods.values().cloned().collect()
    }

    /// Pod counts per release version for one deployment
    pub fn version_counts(&self, deployment: &str) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for pod in self.pods.values() {
            if pod.deployment_name != deployment {
                continue;
            }
            let version = pod
                .release_version
                .clone()
                .unwrap_or_else(|| "unknown".to_string());
            *counts.entry(version).or_insert(0) += 1;
        }
        counts
    }

    /// Pod counts per release version for every deployment
    pub fn all_version_counts(&self) -> HashMap<String, HashMap<String, usize>> {
        let mut counts: HashMap<String, HashMap<String, usize>> = HashMap::new();
        for pod in self.pods.values() {
            let version = pod
                .release_version
                .clone()
                .unwrap_or_else(|| "unknown".to_string());
            *counts
                .entry(pod.deployment_name.clone())
                .or_default()
                .entry(version)
                .or_insert(0) += 1;
        }
        counts
    }

    /// Pod summaries per deployment, for the admin endpoint
    pub fn pods_info(&self) -> HashMap<String, Vec<PodInfo>> {
        let mut info: HashMap<String, Vec<PodInfo>> = HashMap::new();
        for pod in self.pods.values() {
            info.entry(pod.deployment_name.clone())
                .or_default()
                .push(PodInfo::from(pod));
        }
        info
    }

    /// Update a pod's status in place
    pub fn set_status(&mut self, pod_id: &str, status: PodStatus) {
        if let Some(pod) = self.pods.get_mut(pod_id) {
            pod.status = status;
        }
    }

    /// Reset the failure counter after a successful probe
    pub fn record_probe_success(&mut self, pod_id: &str) {
        if let Some(pod) = self.pods.get_mut(pod_id) {
            pod.health_check_failures = 0;
        }
    }

    /// Advance the failure counter after a failed probe; returns the new
    /// count, or None when the pod is gone
    pub fn record_probe_failure(&mut self, pod_id: &str) -> Option<u32> {
        let pod = self.pods.get_mut(pod_id)?;
        pod.health_check_failures += 1;
        Some(pod.health_check_failures)
    }
}
