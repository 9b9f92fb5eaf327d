//! Pod registry unit tests

use podgate::models::pod::{Pod, PodStatus};
use podgate::registry::PodRegistry;

fn running_pod(deployment: &str, host_port: u16, version: Option<&str>) -> Pod {
    let mut pod = Pod::new(
        deployment,
        "nginx:alpine",
        8080,
        host_port,
        version.map(str::to_string),
    );
    pod.container_id = Some(format!("container-{}", host_port));
    pod.status = PodStatus::Running;
    pod
}

#[test]
fn test_pods_are_unique_by_id() {
    let mut registry = PodRegistry::new();

    let a = running_pod("web", 9000, None);
    let b = running_pod("web", 9001, None);
    assert_ne!(a.id, b.id);

    registry.insert(a.clone());
    registry.insert(b);
    registry.insert(a);

    assert_eq!(registry.len(), 2);
}

#[test]
fn test_healthy_view_is_per_deployment_and_running_only() {
    let mut registry = PodRegistry::new();
    registry.insert(running_pod("web", 9000, None));
    registry.insert(running_pod("web", 9001, None));
    registry.insert(running_pod("api", 9002, None));

    let mut stopping = running_pod("web", 9003, None);
    stopping.status = PodStatus::Terminating;
    registry.insert(stopping);

    assert_eq!(registry.healthy_pods().len(), 3);
    assert_eq!(registry.healthy_pods_for("web").len(), 2);
    assert_eq!(registry.healthy_pods_for("api").len(), 1);
    assert!(registry.healthy_pods_for("missing").is_empty());
}

#[test]
fn test_pods_info_projects_short_ids() {
    let mut registry = PodRegistry::new();
    let pod = running_pod("web", 9000, Some("v1.0.0"));
    let short_id = pod.short_id().to_string();
    registry.insert(pod);

    let info = registry.pods_info();
    let web = info.get("web").unwrap();
    assert_eq!(web.len(), 1);
    assert_eq!(web[0].id, short_id);
    assert_eq!(web[0].name, format!("pod-{}", short_id));
    assert_eq!(web[0].status, PodStatus::Running);
    assert_eq!(web[0].version.as_deref(), Some("v1.0.0"));
}

#[test]
fn test_version_counts_group_by_deployment() {
    let mut registry = PodRegistry::new();
    registry.insert(running_pod("web", 9000, Some("v1.0.0")));
    registry.insert(running_pod("web", 9001, Some("v1.1.0")));
    registry.insert(running_pod("web", 9002, Some("v1.1.0")));
    registry.insert(running_pod("api", 9003, None));

    let web = registry.version_counts("web");
    assert_eq!(web.get("v1.0.0"), Some(&1));
    assert_eq!(web.get("v1.1.0"), Some(&2));

    let all = registry.all_version_counts();
    assert_eq!(all.get("web").unwrap().len(), 2);
    assert_eq!(all.get("api").unwrap().get("unknown"), Some(&1));
}

#[test]
fn test_live_host_ports_are_unique() {
    let mut registry = PodRegistry::new();
    for port in 9000..9010 {
        registry.insert(running_pod("web", port, None));
    }

    let mut ports: Vec<u16> = registry.all_pods().iter().map(|p| p.host_port).collect();
    ports.sort_unstable();
    ports.dedup();
    assert_eq!(ports.len(), 10);
}

#[test]
fn test_drain_leaves_registry_empty() {
    let mut registry = PodRegistry::new();
    registry.insert(running_pod("web", 9000, None));
    registry.insert(running_pod("api", 9001, None));

    let drained = registry.drain();
    assert_eq!(drained.len(), 2);
    assert!(registry.is_empty());
    assert!(registry.healthy_pods().is_empty());
}
