//! Dispatcher unit tests

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use podgate::balancer::{Dispatcher, Strategy};
use podgate::models::pod::{Pod, PodStatus};
use podgate::probe::HealthProbe;
use podgate::release::ReleaseClient;
use podgate::runtime::docker::DockerCli;
use podgate::supervisor::{Supervisor, SupervisorOptions};

fn test_supervisor() -> Arc<Supervisor> {
    let runtime = Arc::new(DockerCli::new("docker", None));
    let probe = HealthProbe::new(Duration::from_secs(1)).unwrap();
    let releases = ReleaseClient::new().unwrap();
    Arc::new(Supervisor::new(
        runtime,
        probe,
        releases,
        SupervisorOptions::default(),
    ))
}

fn running_pods(count: u16) -> Vec<Pod> {
    (0..count)
        .map(|i| {
            let mut pod = Pod::new("web", "nginx:alpine", 8080, 9000 + i, None);
            pod.status = PodStatus::Running;
            pod
        })
        .collect()
}

#[test]
fn test_round_robin_fairness() {
    let dispatcher = Dispatcher::new(test_supervisor(), Strategy::RoundRobin);
    let pods = running_pods(3);

    let mut counts: HashMap<String, usize> = HashMap::new();
    let dispatches = 10;
    for _ in 0..dispatches {
        let pod = dispatcher.pick(&pods).unwrap();
        *counts.entry(pod.id).or_insert(0) += 1;
    }

    // With K pods and N dispatches each pod receives floor(N/K) or ceil(N/K)
    assert_eq!(counts.len(), pods.len());
    for count in counts.values() {
        assert!(*count == 3 || *count == 4, "unfair selection: {}", count);
    }
}

#[test]
fn test_round_robin_cycles_in_order() {
    let dispatcher = Dispatcher::new(test_supervisor(), Strategy::RoundRobin);
    let pods = running_pods(2);

    let first = dispatcher.pick(&pods).unwrap();
    let second = dispatcher.pick(&pods).unwrap();
    let third = dispatcher.pick(&pods).unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(first.id, third.id);
}

#[test]
fn test_random_selects_a_member() {
    let dispatcher = Dispatcher::new(test_supervisor(), Strategy::Random);
    let pods = running_pods(4);

    for _ in 0..50 {
        let pod = dispatcher.pick(&pods).unwrap();
        assert!(pods.iter().any(|p| p.id == pod.id));
    }
}

#[test]
fn test_least_connections_returns_first() {
    let dispatcher = Dispatcher::new(test_supervisor(), Strategy::LeastConnections);
    let pods = running_pods(3);

    for _ in 0..5 {
        assert_eq!(dispatcher.pick(&pods).unwrap().id, pods[0].id);
    }
}

#[test]
fn test_empty_snapshot_yields_none() {
    let dispatcher = Dispatcher::new(test_supervisor(), Strategy::RoundRobin);
    assert!(dispatcher.pick(&[]).is_none());
}

#[tokio::test]
async fn test_next_pod_without_deployment_yields_none() {
    let dispatcher = Dispatcher::new(test_supervisor(), Strategy::RoundRobin);
    assert!(dispatcher.next_pod("web").await.is_none());
    assert!(dispatcher.next_address("web").await.is_none());
}
