//! Deployment declaration

use serde::{Deserialize, Serialize};

use crate::errors::OrchestratorError;

/// Declarative description of a deployment. Immutable for the lifetime of the
/// deployment name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    /// Unique deployment name
    pub name: String,

    /// Pre-built image reference
    #[serde(default)]
    pub image: Option<String>,

    /// Dockerfile path, for deployments built from source
    #[serde(default)]
    pub dockerfile: Option<String>,

    /// Build context directory
    #[serde(default)]
    pub context: Option<String>,

    /// Number of pod replicas
    #[serde(default = "default_replicas")]
    pub replicas: u32,

    /// Port the application listens on inside the container
    #[serde(default = "default_container_port")]
    pub container_port: u16,

    /// Health check endpoint path
    #[serde(default = "default_health_check_path")]
    pub health_check_path: String,

    /// Health check interval in seconds
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval: f64,

    /// Upstream repository URL polled for new releases
    #[serde(default)]
    pub remote_url: Option<String>,
}

fn default_replicas() -> u32 {
    1
}

fn default_container_port() -> u16 {
    8080
}

fn default_health_check_path() -> String {
    "/health".to_string()
}

fn default_health_check_interval() -> f64 {
    10.0
}

impl DeploymentSpec {
    /// Validate the declaration before deploying it
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.name.is_empty() {
            return Err(OrchestratorError::DeployError(
                "deployment name must not be empty".to_string(),
            ));
        }

        match (&self.image, &self.dockerfile) {
            (Some(_), Some(_)) => {
                return Err(OrchestratorError::DeployError(format!(
                    "deployment {} must specify either an image or a dockerfile, not both",
                    self.name
                )));
            }
            (None, None) => {
                return Err(OrchestratorError::DeployError(format!(
                    "deployment {} must specify an image or a dockerfile",
                    self.name
                )));
            }
            (None, Some(_)) if self.context.is_none() => {
                return Err(OrchestratorError::DeployError(format!(
                    "deployment {} builds from a dockerfile and requires a build context",
                    self.name
                )));
            }
            _ => {}
        }

        if self.replicas == 0 {
            return Err(OrchestratorError::DeployError(format!(
                "deployment {} must have at least one replica",
                self.name
            )));
        }

        if self.container_port == 0 {
            return Err(OrchestratorError::DeployError(format!(
                "deployment {} has an invalid container port",
                self.name
            )));
        }

        Ok(())
    }

    /// The image a pod of this deployment runs: the declared image, or the
    /// locally built tag for dockerfile deployments
    pub fn resolved_image(&self) -> String {
        match &self.image {
            Some(image) => image.clone(),
            None => format!("{}:local", self.name),
        }
    }

    /// Whether the image has to be built before pods can start
    pub fn needs_build(&self) -> bool {
        self.dockerfile.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_spec() -> DeploymentSpec {
        DeploymentSpec {
            name: "web".to_string(),
            image: Some("nginx:alpine".to_string()),
            dockerfile: None,
            context: None,
            replicas: 1,
            container_port: 8080,
            health_check_path: "/health".to_string(),
            health_check_interval: 10.0,
            remote_url: None,
        }
    }

    #[test]
    fn test_image_spec_is_valid() {
        let spec = image_spec();
        assert!(spec.validate().is_ok());
        assert_eq!(spec.resolved_image(), "nginx:alpine");
        assert!(!spec.needs_build());
    }

    #[test]
    fn test_dockerfile_spec_resolves_local_tag() {
        let mut spec = image_spec();
        spec.image = None;
        spec.dockerfile = Some("Dockerfile".to_string());
        spec.context = Some(".".to_string());

        assert!(spec.validate().is_ok());
        assert_eq!(spec.resolved_image(), "web:local");
        assert!(spec.needs_build());
    }

    #[test]
    fn test_rejects_image_and_dockerfile() {
        let mut spec = image_spec();
        spec.dockerfile = Some("Dockerfile".to_string());
        spec.context = Some(".".to_string());
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_rejects_neither_image_nor_dockerfile() {
        let mut spec = image_spec();
        spec.image = None;
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_rejects_dockerfile_without_context() {
        let mut spec = image_spec();
        spec.image = None;
        spec.dockerfile = Some("Dockerfile".to_string());
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_replicas() {
        let mut spec = image_spec();
        spec.replicas = 0;
        assert!(spec.validate().is_err());
    }
}
