//! Pod lifecycle supervision
//!
//! The supervisor owns the pod table and all deployment bookkeeping behind a
//! single mutex. The lock is held only around state transitions; container
//! CLI invocations, health probes, release polls and sleeps all happen with
//! the lock released.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::OrchestratorError;
use crate::models::deployment::DeploymentSpec;
use crate::models::pod::{Pod, PodInfo, PodStatus};
use crate::probe::HealthProbe;
use crate::registry::PodRegistry;
use crate::release::ReleaseClient;
use crate::runtime::docker::DockerCli;
use crate::workers::health;

/// Version recorded when a deployment has a remote but no reachable release
const UNKNOWN_VERSION: &str = "unknown";

/// Supervisor tuning knobs
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Health tick cadence
    pub tick_interval: Duration,

    /// Minimum time between release sweeps
    pub release_check_interval: Duration,

    /// Consecutive probe failures before a pod is replaced
    pub failure_threshold: u32,

    /// How long a freshly started pod may take to become healthy
    pub pod_ready_timeout: Duration,

    /// Poll interval while waiting for a pod to become healthy
    pub pod_ready_poll_interval: Duration,

    /// Pause between rolling-update iterations
    pub update_pacing: Duration,

    /// First host port handed out to pods
    pub base_port: u16,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(10),
            release_check_interval: Duration::from_secs(120),
            failure_threshold: 3,
            pod_ready_timeout: Duration::from_secs(60),
            pod_ready_poll_interval: Duration::from_secs(2),
            update_pacing: Duration::from_secs(2),
            base_port: 9000,
        }
    }
}

/// Everything guarded by the supervisor mutex
struct SupervisorState {
    registry: PodRegistry,
    deployments: HashMap<String, DeploymentSpec>,
    current_versions: HashMap<String, String>,
    rolling_updates: HashSet<String>,
    next_port: u16,
    last_release_check: Option<Instant>,
}

impl SupervisorState {
    fn new(base_port: u16) -> Self {
        Self {
            registry: PodRegistry::new(),
            deployments: HashMap::new(),
            current_versions: HashMap::new(),
            rolling_updates: HashSet::new(),
            next_port: base_port,
            last_release_check: None,
        }
    }

    /// Hand out the next host port; ports are never reused within a process
    /// lifetime
    fn allocate_port(&mut self) -> u16 {
        let port = self.next_port;
        self.next_port += 1;
        port
    }

    /// Claim the rolling-update flag for a deployment; false when an update
    /// is already active
    fn begin_rolling_update(&mut self, name: &str) -> bool {
        self.rolling_updates.insert(name.to_string())
    }

    fn finish_rolling_update(&mut self, name: &str) {
        self.rolling_updates.remove(name);
    }

    /// Throttle release polling; the first call always passes
    fn should_check_releases(&mut self, interval: Duration) -> bool {
        match self.last_release_check {
            Some(at) if at.elapsed() < interval => false,
            _ => {
                self.last_release_check = Some(Instant::now());
                true
            }
        }
    }
}

/// Aggregate view for the admin endpoint
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub healthy_pods: usize,
    pub pods: HashMap<String, Vec<PodInfo>>,
    pub rolling_updates: Vec<String>,
}

/// Pod lifecycle manager
pub struct Supervisor {
    state: Mutex<SupervisorState>,
    runtime: Arc<DockerCli>,
    probe: HealthProbe,
    releases: ReleaseClient,
    options: SupervisorOptions,
    shutdown_tx: broadcast::Sender<()>,
    shutting_down: AtomicBool,
    tick_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Supervisor {
    pub fn new(
        runtime: Arc<DockerCli>,
        probe: HealthProbe,
        releases: ReleaseClient,
        options: SupervisorOptions,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            state: Mutex::new(SupervisorState::new(options.base_port)),
            runtime,
            probe,
            releases,
            options,
            shutdown_tx,
            shutting_down: AtomicBool::new(false),
            tick_handle: Mutex::new(None),
        }
    }

    fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Deploy a declaration: resolve the current release, build if needed,
    /// start the replicas and make sure the health loop is running
    pub async fn deploy(self: Arc<Self>, spec: DeploymentSpec) -> Result<(), OrchestratorError> {
        spec.validate()?;
        info!("Deploying {} ({} replica(s))", spec.name, spec.replicas);

        // 1. Resolve the current release version
        let version = match &spec.remote_url {
            Some(remote_url) => match self.releases.get_latest(remote_url).await {
                Some(release) => Some(release.tag_name),
                None => {
                    warn!(
                        "Could not determine latest release for {}, proceeding with version {}",
                        spec.name, UNKNOWN_VERSION
                    );
                    Some(UNKNOWN_VERSION.to_string())
                }
            },
            None => None,
        };

        // 2. Build the image when the deployment builds from source
        if spec.needs_build() {
            self.build_deployment_image(&spec, version.as_deref()).await?;
        }

        // 3. Register the deployment
        {
            let mut state = self.state.lock().await;
            state.deployments.insert(spec.name.clone(), spec.clone());
            if let Some(version) = &version {
                state.current_versions.insert(spec.name.clone(), version.clone());
            }
        }

        // 4. Start the replicas
        for _ in 0..spec.replicas {
            if let Err(e) = self.start_pod(&spec, version.clone()).await {
                error!("Failed to start pod for {}: {}", spec.name, e);
            }
        }

        // 5. Start the health loop on the first successful deploy
        self.ensure_health_loop(Duration::from_secs_f64(spec.health_check_interval))
            .await;

        Ok(())
    }

    async fn build_deployment_image(
        &self,
        spec: &DeploymentSpec,
        version: Option<&str>,
    ) -> Result<(), OrchestratorError> {
        let dockerfile = spec.dockerfile.as_deref().unwrap_or_default();
        let context = spec.context.as_deref().unwrap_or_default();

        let mut build_args = HashMap::new();
        if let Some(version) = version {
            if version != UNKNOWN_VERSION {
                build_args.insert("RELEASE_VERSION".to_string(), version.to_string());
            }
        }

        self.runtime
            .build_image(dockerfile, context, &spec.resolved_image(), &build_args)
            .await
    }

    /// Start one pod for a deployment. Never leaks a container: if anything
    /// fails after the container exists it is stopped and removed.
    async fn start_pod(
        &self,
        spec: &DeploymentSpec,
        version: Option<String>,
    ) -> Result<Pod, OrchestratorError> {
        // 1. Allocate a host port
        let host_port = {
            let mut state = self.state.lock().await;
            state.allocate_port()
        };

        // 2. Create the pod record
        let mut pod = Pod::new(
            &spec.name,
            &spec.resolved_image(),
            spec.container_port,
            host_port,
            version,
        );

        // 3. Launch the container
        let container_id = self
            .runtime
            .run_container(&pod.image, &pod.container_name(), host_port, spec.container_port)
            .await?;
        pod.container_id = Some(container_id.clone());

        // 4. Resolve the container address
        match self.runtime.container_ip(&container_id).await {
            Ok(ip) => pod.container_ip = ip,
            Err(e) => {
                self.discard_container(&container_id).await;
                return Err(e);
            }
        }

        // 5. Mark running and insert into the registry
        pod.status = PodStatus::Running;
        {
            let mut state = self.state.lock().await;
            state.registry.insert(pod.clone());
        }

        info!(
            "Started pod {} for {} on host port {}",
            pod.short_id(),
            spec.name,
            host_port
        );
        Ok(pod)
    }

    /// Best-effort stop and remove of a container that never made it into the
    /// registry
    async fn discard_container(&self, container_id: &str) {
        if let Err(e) = self.runtime.stop_container(container_id).await {
            warn!("Failed to stop container {}: {}", container_id, e);
        }
        if let Err(e) = self.runtime.remove_container(container_id).await {
            warn!("Failed to remove container {}: {}", container_id, e);
        }
    }

    /// One supervisory tick: a throttled release sweep followed by a health
    /// probe of every running pod
    pub async fn tick(&self) {
        let sweep = {
            let mut state = self.state.lock().await;
            state.should_check_releases(self.options.release_check_interval)
        };
        if sweep {
            self.release_sweep().await;
        }

        // Snapshot the probe targets; probes run with the lock released
        let targets: Vec<(Pod, String)> = {
            let state = self.state.lock().await;
            state
                .registry
                .healthy_pods()
                .into_iter()
                .map(|pod| {
                    let path = state
                        .deployments
                        .get(&pod.deployment_name)
                        .map(|spec| spec.health_check_path.clone())
                        .unwrap_or_else(|| "/health".to_string());
                    (pod, path)
                })
                .collect()
        };

        for (pod, path) in targets {
            if self.is_shutting_down() {
                return;
            }

            let (host, port) = pod.probe_target();
            if self.probe.check(&host, port, &path).await {
                let mut state = self.state.lock().await;
                state.registry.record_probe_success(&pod.id);
                continue;
            }

            let failures = {
                let mut state = self.state.lock().await;
                state.registry.record_probe_failure(&pod.id)
            };

            // The pod may have been terminated while the probe was in flight
            if let Some(failures) = failures {
                warn!(
                    "Pod {} of {} failed health check ({}/{})",
                    pod.short_id(),
                    pod.deployment_name,
                    failures,
                    self.options.failure_threshold
                );
                if failures >= self.options.failure_threshold {
                    self.replace_pod(&pod).await;
                }
            }
        }
    }

    /// Replace an unhealthy pod with a fresh one at the same version.
    /// New-first: the old pod is only terminated once the replacement probes
    /// healthy; otherwise the replacement is discarded and the old pod goes
    /// back into rotation to be retried next tick.
    async fn replace_pod(&self, pod: &Pod) {
        info!(
            "Replacing unhealthy pod {} of {}",
            pod.short_id(),
            pod.deployment_name
        );

        let spec = {
            let mut state = self.state.lock().await;
            state.registry.set_status(&pod.id, PodStatus::Unhealthy);
            state.deployments.get(&pod.deployment_name).cloned()
        };
        let Some(spec) = spec else {
            warn!("No deployment registered for pod {}", pod.short_id());
            return;
        };

        let new_pod = match self.start_pod(&spec, pod.release_version.clone()).await {
            Ok(new_pod) => new_pod,
            Err(e) => {
                error!(
                    "Failed to start replacement pod for {}: {}",
                    pod.deployment_name, e
                );
                let mut state = self.state.lock().await;
                state.registry.set_status(&pod.id, PodStatus::Running);
                return;
            }
        };

        if self.wait_for_pod_healthy(&new_pod, &spec.health_check_path).await {
            self.terminate_pod(&pod.id).await;
            info!(
                "Replaced pod {} with {} for {}",
                pod.short_id(),
                new_pod.short_id(),
                pod.deployment_name
            );
        } else {
            warn!(
                "Replacement pod {} for {} never became healthy, keeping {}",
                new_pod.short_id(),
                pod.deployment_name,
                pod.short_id()
            );
            self.terminate_pod(&new_pod.id).await;
            let mut state = self.state.lock().await;
            state.registry.set_status(&pod.id, PodStatus::Running);
        }
    }

    /// Poll a pod's health endpoint until it responds healthy or the ready
    /// timeout elapses
    async fn wait_for_pod_healthy(&self, pod: &Pod, path: &str) -> bool {
        let deadline = Instant::now() + self.options.pod_ready_timeout;
        let (host, port) = pod.probe_target();

        while Instant::now() < deadline {
            if self.is_shutting_down() {
                return false;
            }
            if self.probe.check(&host, port, path).await {
                return true;
            }
            tokio::time::sleep(self.options.pod_ready_poll_interval).await;
        }

        false
    }

    /// Stop and remove a pod's container and drop it from the registry
    async fn terminate_pod(&self, pod_id: &str) {
        let container_id = {
            let mut state = self.state.lock().await;
            state.registry.set_status(pod_id, PodStatus::Terminating);
            state
                .registry
                .get(pod_id)
                .and_then(|pod| pod.container_id.clone())
        };

        if let Some(container_id) = container_id {
            self.discard_container(&container_id).await;
        }

        let mut state = self.state.lock().await;
        state.registry.set_status(pod_id, PodStatus::Terminated);
        state.registry.remove(pod_id);
    }

    /// Check every deployment with a remote for a new release and roll it out
    async fn release_sweep(&self) {
        let candidates: Vec<(String, String, Option<String>)> = {
            let state = self.state.lock().await;
            state
                .deployments
                .values()
                .filter(|spec| {
                    spec.remote_url.is_some() && !state.rolling_updates.contains(&spec.name)
                })
                .map(|spec| {
                    (
                        spec.name.clone(),
                        spec.remote_url.clone().unwrap_or_default(),
                        state.current_versions.get(&spec.name).cloned(),
                    )
                })
                .collect()
        };

        for (name, remote_url, current_version) in candidates {
            debug!("Checking {} for a new release", name);
            if let Some(release) = self
                .releases
                .check_for_update(&remote_url, current_version.as_deref())
                .await
            {
                info!("New release {} for {}", release.tag_name, name);
                self.perform_rolling_update(&name, &release.tag_name).await;
            }
        }
    }

    /// Sequential, one-at-a-time replacement of a deployment's pods. New
    /// pods start first so that the healthy view never drops below
    /// (replicas - 1); a replacement that never probes healthy is rolled
    /// back on its own, keeping the old pod.
    pub async fn perform_rolling_update(&self, name: &str, new_version: &str) {
        let (spec, current_pods) = {
            let mut state = self.state.lock().await;
            if !state.begin_rolling_update(name) {
                debug!("Rolling update already active for {}", name);
                return;
            }
            (
                state.deployments.get(name).cloned(),
                state.registry.healthy_pods_for(name),
            )
        };

        let Some(spec) = spec else {
            warn!("No deployment registered under {}", name);
            let mut state = self.state.lock().await;
            state.finish_rolling_update(name);
            return;
        };

        info!(
            "Rolling {} to {} ({} pod(s))",
            name,
            new_version,
            current_pods.len()
        );

        // 1. Rebuild the image when the deployment builds from source
        if spec.needs_build() {
            if let Err(e) = self.build_deployment_image(&spec, Some(new_version)).await {
                error!("Build of {} {} failed, aborting rolling update: {}", name, new_version, e);
                let mut state = self.state.lock().await;
                state.finish_rolling_update(name);
                return;
            }
        }

        // 2. Record the new version
        {
            let mut state = self.state.lock().await;
            state
                .current_versions
                .insert(name.to_string(), new_version.to_string());
        }

        // 3. Nothing running: start the replicas fresh
        if current_pods.is_empty() {
            info!("No running pods for {}, starting {} fresh", name, spec.replicas);
            for _ in 0..spec.replicas {
                if let Err(e) = self.start_pod(&spec, Some(new_version.to_string())).await {
                    error!("Failed to start pod for {}: {}", name, e);
                }
            }
            let mut state = self.state.lock().await;
            state.finish_rolling_update(name);
            return;
        }

        // 4. Replace the snapshot one pod at a time
        for old_pod in current_pods {
            if self.is_shutting_down() {
                break;
            }

            let new_pod = match self.start_pod(&spec, Some(new_version.to_string())).await {
                Ok(new_pod) => new_pod,
                Err(e) => {
                    error!("Failed to start {} pod for {}: {}", new_version, name, e);
                    continue;
                }
            };

            if self.wait_for_pod_healthy(&new_pod, &spec.health_check_path).await {
                self.terminate_pod(&old_pod.id).await;
                info!(
                    "Rolled pod {} to {} ({})",
                    old_pod.short_id(),
                    new_pod.short_id(),
                    new_version
                );
            } else {
                warn!(
                    "New pod {} for {} never became healthy, keeping {}",
                    new_pod.short_id(),
                    name,
                    old_pod.short_id()
                );
                self.terminate_pod(&new_pod.id).await;
            }

            tokio::time::sleep(self.options.update_pacing).await;
        }

        {
            let mut state = self.state.lock().await;
            state.finish_rolling_update(name);
        }
        info!("Rolling update of {} to {} finished", name, new_version);
    }

    /// Healthy pods of a deployment, as a snapshot
    pub async fn healthy_pods(&self, deployment: &str) -> Vec<Pod> {
        let state = self.state.lock().await;
        state.registry.healthy_pods_for(deployment)
    }

    /// Aggregate status for the admin endpoint
    pub async fn status(&self) -> StatusSnapshot {
        let state = self.state.lock().await;
        let mut rolling_updates: Vec<String> = state.rolling_updates.iter().cloned().collect();
        rolling_updates.sort();

        StatusSnapshot {
            healthy_pods: state.registry.healthy_pods().len(),
            pods: state.registry.pods_info(),
            rolling_updates,
        }
    }

    /// Start the health tick loop unless it is already running
    async fn ensure_health_loop(self: Arc<Self>, interval: Duration) {
        let mut handle_slot = self.tick_handle.lock().await;
        if handle_slot.is_some() {
            return;
        }

        info!("Starting health check loop (every {:?})", interval);
        let supervisor = self.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let options = health::Options { interval };

        let handle = tokio::spawn(async move {
            health::run(
                &options,
                supervisor,
                |wait| tokio::time::sleep(wait),
                Box::pin(async move {
                    let _ = shutdown_rx.recv().await;
                }),
            )
            .await;
        });

        *handle_slot = Some(handle);
    }

    /// Cancel the health loop, then stop and remove every pod
    pub async fn shutdown(&self) -> Result<(), OrchestratorError> {
        info!("Shutting down supervisor...");
        self.shutting_down.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());

        // 1. Health loop
        if let Some(handle) = self.tick_handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("Health loop did not stop cleanly: {}", e);
            }
        }

        // 2. Pods
        let pods = {
            let mut state = self.state.lock().await;
            state.registry.drain()
        };
        for pod in pods {
            if let Some(container_id) = pod.container_id {
                self.discard_container(&container_id).await;
            }
        }

        info!("Supervisor shutdown complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_allocation_is_monotonic() {
        let mut state = SupervisorState::new(9000);
        assert_eq!(state.allocate_port(), 9000);
        assert_eq!(state.allocate_port(), 9001);
        assert_eq!(state.allocate_port(), 9002);
    }

    #[test]
    fn test_rolling_update_flag_is_exclusive() {
        let mut state = SupervisorState::new(9000);
        assert!(state.begin_rolling_update("web"));
        assert!(!state.begin_rolling_update("web"));
        assert!(state.begin_rolling_update("api"));

        state.finish_rolling_update("web");
        assert!(state.begin_rolling_update("web"));
    }

    #[test]
    fn test_release_check_throttle() {
        let mut state = SupervisorState::new(9000);
        let interval = Duration::from_secs(120);

        // First call always passes, an immediate retry is throttled
        assert!(state.should_check_releases(interval));
        assert!(!state.should_check_releases(interval));

        // A zero interval is never throttled
        assert!(state.should_check_releases(Duration::ZERO));
    }
}
