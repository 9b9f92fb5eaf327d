//! Pod bookkeeping

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::generate_uuid;

/// Pod lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PodStatus {
    Pending,
    Running,
    Unhealthy,
    Terminating,
    Terminated,
}

impl PodStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PodStatus::Pending => "pending",
            PodStatus::Running => "running",
            PodStatus::Unhealthy => "unhealthy",
            PodStatus::Terminating => "terminating",
            PodStatus::Terminated => "terminated",
        }
    }
}

/// A single container instance plus the orchestrator's bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pod {
    /// Opaque unique token; the container name is derived from it
    pub id: String,

    /// Deployment this pod belongs to
    pub deployment_name: String,

    /// Image the container runs
    pub image: String,

    /// Port the application listens on inside the container
    pub container_port: u16,

    /// Host port published for this pod
    pub host_port: u16,

    /// Container id, set after launch
    pub container_id: Option<String>,

    /// Container network address, set after inspect; absent on hosts where
    /// the bridge network is not reachable
    pub container_ip: Option<String>,

    pub status: PodStatus,

    /// Consecutive failed health probes
    pub health_check_failures: u32,

    /// Release tag this pod was started from
    pub release_version: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Pod {
    /// Create a new pending pod
    pub fn new(
        deployment_name: &str,
        image: &str,
        container_port: u16,
        host_port: u16,
        release_version: Option<String>,
    ) -> Self {
        Self {
            id: generate_uuid(),
            deployment_name: deployment_name.to_string(),
            image: image.to_string(),
            container_port,
            host_port,
            container_id: None,
            container_ip: None,
            status: PodStatus::Pending,
            health_check_failures: 0,
            release_version,
            created_at: Utc::now(),
        }
    }

    /// First 8 characters of the pod id
    pub fn short_id(&self) -> &str {
        &self.id[..8.min(self.id.len())]
    }

    /// Container name derived from the pod id
    pub fn container_name(&self) -> String {
        format!("pod-{}", self.short_id())
    }

    /// Address the proxy forwards traffic to
    pub fn host_address(&self) -> String {
        match &self.container_ip {
            Some(ip) => format!("{}:{}", ip, self.container_port),
            None => format!("127.0.0.1:{}", self.host_port),
        }
    }

    /// Host and port the health probe targets
    pub fn probe_target(&self) -> (String, u16) {
        match &self.container_ip {
            Some(ip) => (ip.clone(), self.container_port),
            None => ("127.0.0.1".to_string(), self.host_port),
        }
    }
}

/// Pod summary reported by the admin endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodInfo {
    pub id: String,
    pub name: String,
    pub status: PodStatus,
    pub version: Option<String>,
}

impl From<&Pod> for PodInfo {
    fn from(pod: &Pod) -> Self {
        Self {
            id: pod.short_id().to_string(),
            name: pod.container_name(),
            status: pod.status,
            version: pod.release_version.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_name_uses_short_id() {
        let pod = Pod::new("web", "nginx:alpine", 80, 9000, None);
        assert_eq!(pod.container_name(), format!("pod-{}", &pod.id[..8]));
    }

    #[test]
    fn test_host_address_prefers_container_ip() {
        let mut pod = Pod::new("web", "nginx:alpine", 80, 9000, None);
        assert_eq!(pod.host_address(), "127.0.0.1:9000");
        assert_eq!(pod.probe_target(), ("127.0.0.1".to_string(), 9000));

        pod.container_ip = Some("172.17.0.2".to_string());
        assert_eq!(pod.host_address(), "172.17.0.2:80");
        assert_eq!(pod.probe_target(), ("172.17.0.2".to_string(), 80));
    }

    #[test]
    fn test_pod_info_projection() {
        let mut pod = Pod::new("web", "nginx:alpine", 80, 9001, Some("v1.0.0".to_string()));
        pod.status = PodStatus::Running;

        let info = PodInfo::from(&pod);
        assert_eq!(info.id, pod.short_id());
        assert_eq!(info.name, pod.container_name());
        assert_eq!(info.status, PodStatus::Running);
        assert_eq!(info.version.as_deref(), Some("v1.0.0"));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&PodStatus::Terminating).unwrap();
        assert_eq!(json, "\"terminating\"");
    }
}
