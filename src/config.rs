//! Configuration file loading

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::balancer::Strategy;
use crate::errors::OrchestratorError;
use crate::models::deployment::DeploymentSpec;

/// Search order for the configuration file
pub const CONFIG_SEARCH_PATHS: &[&str] = &[
    "./config.json",
    "./appconfig.json",
    "/etc/myloadbalancer/config.json",
];

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Container runtime configuration
    pub docker: DockerConfig,

    /// Deployment declaration
    pub deployment: DeploymentSpec,

    /// Load balancer configuration
    #[serde(default)]
    pub load_balancer: LoadBalancerConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Container runtime settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerConfig {
    /// Path to the runtime executable
    pub executable_path: String,

    /// Environment overlay merged onto the ambient environment for every
    /// runtime invocation
    #[serde(default)]
    pub environment: Option<HashMap<String, String>>,
}

/// Load balancer settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerConfig {
    #[serde(default)]
    pub strategy: Strategy,
}

/// Load the configuration from the first file found in the search order
pub async fn load_config() -> Result<Config, OrchestratorError> {
    let path = CONFIG_SEARCH_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .ok_or_else(|| OrchestratorError::ConfigNotFound(CONFIG_SEARCH_PATHS.join(", ")))?;

    load_config_file(&path).await
}

/// Load and parse a specific configuration file
pub async fn load_config_file(path: &Path) -> Result<Config, OrchestratorError> {
    let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
        OrchestratorError::ConfigInvalid(format!("failed to read {}: {}", path.display(), e))
    })?;

    serde_json::from_str(&contents).map_err(|e| {
        OrchestratorError::ConfigInvalid(format!("failed to parse {}: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let raw = r#"{
            "server": { "port": 8000, "host": "0.0.0.0" },
            "docker": { "executablePath": "/usr/bin/docker", "environment": { "DOCKER_HOST": "unix:///var/run/docker.sock" } },
            "deployment": {
                "name": "web",
                "image": "nginx:alpine",
                "replicas": 2,
                "containerPort": 80,
                "healthCheckPath": "/",
                "healthCheckInterval": 5,
                "remoteUrl": "https://github.com/acme/web"
            },
            "loadBalancer": { "strategy": "random" }
        }"#;

        let config: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.docker.executable_path, "/usr/bin/docker");
        assert_eq!(config.deployment.name, "web");
        assert_eq!(config.deployment.replicas, 2);
        assert_eq!(config.load_balancer.strategy, Strategy::Random);
    }

    #[test]
    fn test_parse_minimal_config_applies_defaults() {
        let raw = r#"{
            "server": { "port": 8000, "host": "127.0.0.1" },
            "docker": { "executablePath": "docker" },
            "deployment": { "name": "web", "image": "nginx:alpine" }
        }"#;

        let config: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(config.deployment.replicas, 1);
        assert_eq!(config.deployment.container_port, 8080);
        assert_eq!(config.deployment.health_check_path, "/health");
        assert_eq!(config.deployment.health_check_interval, 10.0);
        assert!(config.deployment.remote_url.is_none());
        assert!(config.docker.environment.is_none());
        assert_eq!(config.load_balancer.strategy, Strategy::RoundRobin);
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        let raw = r#"{ "server": { "port": 8000 "#;
        assert!(serde_json::from_str::<Config>(raw).is_err());
    }
}
