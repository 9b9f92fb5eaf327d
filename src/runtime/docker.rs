//! Container runtime adapter
//!
//! Invokes the container runtime as an opaque command-line tool. The runtime
//! serializes concurrent invocations itself; every operation here carries its
//! own timeout.

use std::collections::HashMap;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::OrchestratorError;

/// Seconds the runtime waits before killing a container on stop
const STOP_GRACE_SECS: u32 = 5;

/// Container runtime CLI adapter
pub struct DockerCli {
    executable: String,
    environment: HashMap<String, String>,
    command_timeout: Duration,
    build_timeout: Duration,
}

impl DockerCli {
    /// Create an adapter for the configured executable
    pub fn new(executable: &str, environment: Option<HashMap<String, String>>) -> Self {
        Self {
            executable: executable.to_string(),
            environment: environment.unwrap_or_default(),
            command_timeout: Duration::from_secs(30),
            build_timeout: Duration::from_secs(600),
        }
    }

    /// Run a runtime command, returning trimmed stdout
    async fn run(&self, args: &[&str], timeout: Duration) -> Result<String, OrchestratorError> {
        debug!("Running {} {}", self.executable, args.join(" "));

        let output = tokio::time::timeout(
            timeout,
            Command::new(&self.executable)
                .args(args)
                .envs(&self.environment)
                .output(),
        )
        .await
        .map_err(|_| {
            OrchestratorError::CommandFailed(format!(
                "{} {} timed out after {:?}",
                self.executable,
                args.join(" "),
                timeout
            ))
        })?
        .map_err(|e| {
            OrchestratorError::CommandFailed(format!("failed to run {}: {}", self.executable, e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("No such container") || stderr.contains("No such object") {
                return Err(OrchestratorError::ContainerNotFound(stderr));
            }
            return Err(OrchestratorError::CommandFailed(stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Build an image from a dockerfile and context
    pub async fn build_image(
        &self,
        dockerfile: &str,
        context: &str,
        tag: &str,
        build_args: &HashMap<String, String>,
    ) -> Result<(), OrchestratorError> {
        info!("Building image {} from {}", tag, dockerfile);

        let args = build_command_args(dockerfile, context, tag, build_args);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

        match self.run(&arg_refs, self.build_timeout).await {
            Ok(_) => {
                info!("Built image {}", tag);
                Ok(())
            }
            Err(OrchestratorError::CommandFailed(output)) => {
                Err(OrchestratorError::BuildFailed(output))
            }
            Err(e) => Err(e),
        }
    }

    /// Start a detached container publishing `host_port:container_port`;
    /// returns the container id
    pub async fn run_container(
        &self,
        image: &str,
        name: &str,
        host_port: u16,
        container_port: u16,
    ) -> Result<String, OrchestratorError> {
        let publish = format!("{}:{}", host_port, container_port);
        let id = self
            .run(
                &["run", "-d", "--name", name, "-p", &publish, image],
                self.command_timeout,
            )
            .await?;

        if id.is_empty() {
            return Err(OrchestratorError::CommandFailed(
                "runtime returned an empty container id".to_string(),
            ));
        }

        debug!("Started container {} ({})", name, id);
        Ok(id)
    }

    /// Gracefully stop a container
    pub async fn stop_container(&self, container_id: &str) -> Result<(), OrchestratorError> {
        let grace = STOP_GRACE_SECS.to_string();
        self.run(&["stop", "-t", &grace, container_id], self.command_timeout)
            .await?;
        Ok(())
    }

    /// Force remove a container
    pub async fn remove_container(&self, container_id: &str) -> Result<(), OrchestratorError> {
        self.run(&["rm", "-f", container_id], self.command_timeout)
            .await?;
        Ok(())
    }

    /// Inspect a container for its primary network address
    pub async fn container_ip(
        &self,
        container_id: &str,
    ) -> Result<Option<String>, OrchestratorError> {
        let ip = self
            .run(
                &[
                    "inspect",
                    "-f",
                    "{{range .NetworkSettings.Networks}}{{.IPAddress}}{{end}}",
                    container_id,
                ],
                self.command_timeout,
            )
            .await?;

        if ip.is_empty() {
            Ok(None)
        } else {
            Ok(Some(ip))
        }
    }

    /// Whether a container is currently running; inspect errors collapse to
    /// false
    pub async fn is_running(&self, container_id: &str) -> bool {
        match self
            .run(
                &["inspect", "-f", "{{.State.Running}}", container_id],
                self.command_timeout,
            )
            .await
        {
            Ok(state) => state == "true",
            Err(e) => {
                debug!("Inspect of {} failed: {}", container_id, e);
                false
            }
        }
    }

    /// List container ids whose name begins with the prefix
    pub async fn list_containers(&self, prefix: &str) -> Result<Vec<String>, OrchestratorError> {
        let filter = format!("name=^{}", prefix);
        let stdout = self
            .run(
                &["ps", "-a", "--filter", &filter, "--format", "{{.ID}}"],
                self.command_timeout,
            )
            .await?;

        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Remove every container left behind by a previous process, matched by
    /// the pod naming convention
    pub async fn cleanup_orphans(&self) -> Result<(), OrchestratorError> {
        let orphans = self.list_containers("pod-").await?;

        if orphans.is_empty() {
            debug!("No orphan containers found");
            return Ok(());
        }

        info!("Removing {} orphan container(s)", orphans.len());
        for container_id in orphans {
            if let Err(e) = self.remove_container(&container_id).await {
                warn!("Failed to remove orphan container {}: {}", container_id, e);
            }
        }

        Ok(())
    }
}

/// Assemble the argument list for an image build
fn build_command_args(
    dockerfile: &str,
    context: &str,
    tag: &str,
    build_args: &HashMap<String, String>,
) -> Vec<String> {
    let mut args = vec![
        "build".to_string(),
        "-t".to_string(),
        tag.to_string(),
        "-f".to_string(),
        dockerfile.to_string(),
    ];

    for (key, value) in build_args {
        args.push("--build-arg".to_string());
        args.push(format!("{}={}", key, value));
    }

    args.push(context.to_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_command_args_without_build_args() {
        let args = build_command_args("Dockerfile", ".", "web:local", &HashMap::new());
        assert_eq!(args, vec!["build", "-t", "web:local", "-f", "Dockerfile", "."]);
    }

    #[test]
    fn test_build_command_args_with_release_version() {
        let mut build_args = HashMap::new();
        build_args.insert("RELEASE_VERSION".to_string(), "v1.1.0".to_string());

        let args = build_command_args("docker/Dockerfile", "./src", "web:local", &build_args);
        assert_eq!(args[0], "build");
        assert!(args.contains(&"--build-arg".to_string()));
        assert!(args.contains(&"RELEASE_VERSION=v1.1.0".to_string()));
        assert_eq!(args.last().unwrap(), "./src");
    }
}
