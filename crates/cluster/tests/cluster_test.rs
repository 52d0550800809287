use std::sync::Arc;

use chrono::{Duration, Utc};
use simgrid_cluster::{with_cluster, BestFitStrategy, LocalCluster};
use simgrid_core::config::ClusterConfig;
use simgrid_core::models::{MembershipEvent, WorkerHealth, WorkerId};
use simgrid_core::traits::{Cluster, WorkerEndpoint};
use simgrid_errors::SimGridError;
use simgrid_testing_utils::{complexity_of, ScriptedWorker};
use tracing_test::traced_test;

fn config() -> ClusterConfig {
    ClusterConfig {
        probe_interval_ms: 50,
        failure_threshold: 2,
        eviction_timeout_ms: 10_000,
        ..ClusterConfig::default()
    }
}

async fn cluster_with(capacities: &[(&str, u64)]) -> (LocalCluster, Vec<Arc<ScriptedWorker>>) {
    let cluster = LocalCluster::new(config()).unwrap();
    let mut workers = Vec::new();
    for (id, units) in capacities {
        let worker = ScriptedWorker::new(id, *units, 2).arc();
        cluster.join(worker.clone()).await.unwrap();
        workers.push(worker);
    }
    (cluster, workers)
}

fn names(ids: Vec<WorkerId>) -> Vec<String> {
    let mut names: Vec<String> = ids.into_iter().map(|id| id.to_string()).collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_scenario_a_descending_greedy() {
    let (cluster, _) = cluster_with(&[("w2", 2), ("w3", 3), ("w5", 5)]).await;
    let set = cluster.resolve(&complexity_of(4)).await.unwrap();
    assert_eq!(names(set.ids()), vec!["w5"]);
    assert_eq!(set.demand(), 4);
    assert!(set.total_capacity() >= 4);
}

#[tokio::test]
async fn test_scenario_c_insufficient_capacity_has_no_side_effects() {
    let (cluster, _) = cluster_with(&[("w2", 2), ("w3", 3), ("w5", 5)]).await;
    let before = cluster.workers().await;
    let mut events = cluster.subscribe();

    let err = cluster.resolve(&complexity_of(11)).await.unwrap_err();
    assert!(matches!(
        err,
        SimGridError::InsufficientCapacity {
            required: 11,
            available: 10
        }
    ));

    let after = cluster.workers().await;
    assert_eq!(before.len(), after.len());
    for (a, b) in before.iter().zip(after.iter()) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.health, b.health);
    }
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_resolve_never_below_demand() {
    let (cluster, _) = cluster_with(&[("a", 1), ("b", 2), ("c", 3), ("d", 5), ("e", 8)]).await;
    for demand in 0..=19 {
        match cluster.resolve(&complexity_of(demand)).await {
            Ok(set) => {
                assert!(set.total_capacity() >= demand);
                assert!(!set.is_empty());
            }
            Err(SimGridError::InsufficientCapacity { available, .. }) => {
                assert!(demand > 19 || available < demand);
            }
            Err(other) => panic!("unexpected error {other}"),
        }
    }
    assert!(cluster.resolve(&complexity_of(20)).await.is_err());
}

#[tokio::test]
async fn test_returned_set_survives_membership_changes() {
    let (cluster, _) = cluster_with(&[("w2", 2), ("w3", 3), ("w5", 5)]).await;
    let set = cluster.resolve(&complexity_of(7)).await.unwrap();
    assert_eq!(names(set.ids()), vec!["w3", "w5"]);

    cluster.leave(&WorkerId::new("w5")).await.unwrap();
    assert_eq!(names(set.ids()), vec!["w3", "w5"]);
    assert!(cluster.resolve(&complexity_of(7)).await.is_err());
}

#[tokio::test]
async fn test_join_twice_rejected() {
    let (cluster, workers) = cluster_with(&[("w1", 2)]).await;
    let err = cluster.join(workers[0].clone()).await.unwrap_err();
    assert!(matches!(err, SimGridError::WorkerAlreadyJoined { .. }));
}

#[tokio::test]
async fn test_leave_publishes_event_and_closes_endpoint() {
    let (cluster, workers) = cluster_with(&[("w1", 2), ("w2", 2)]).await;
    let mut events = cluster.subscribe();
    cluster.leave(&WorkerId::new("w1")).await.unwrap();
    assert_eq!(events.recv().await.unwrap(), MembershipEvent::Left(WorkerId::new("w1")));
    assert!(workers[0].is_closed());
    assert!(matches!(
        cluster.leave(&WorkerId::new("w1")).await,
        Err(SimGridError::WorkerNotFound { .. })
    ));
}

#[tokio::test]
async fn test_draining_worker_excluded() {
    let (cluster, _) = cluster_with(&[("w2", 2), ("w5", 5)]).await;
    cluster.drain(&WorkerId::new("w5")).await.unwrap();
    let set = cluster.resolve(&complexity_of(2)).await.unwrap();
    assert_eq!(names(set.ids()), vec!["w2"]);
    assert!(cluster.resolve(&complexity_of(3)).await.is_err());
}

#[tokio::test]
async fn test_best_fit_strategy() {
    let cluster = LocalCluster::with_strategy(config(), Arc::new(BestFitStrategy::new()));
    for (id, units) in [("w2", 2), ("w3", 3), ("w5", 5)] {
        cluster.join(ScriptedWorker::new(id, units, 1).arc()).await.unwrap();
    }
    assert_eq!(cluster.strategy_name(), "best_fit");
    let set = cluster.resolve(&complexity_of(3)).await.unwrap();
    assert_eq!(names(set.ids()), vec!["w3"]);
}

#[tokio::test]
#[traced_test]
async fn test_probe_failures_mark_unreachable_and_recover() {
    let (cluster, workers) = cluster_with(&[("w2", 2), ("w5", 5)]).await;
    let monitor = cluster.health_monitor();
    let mut events = cluster.subscribe();
    workers[1].set_reachable(false);

    let first = monitor.probe_round().await;
    assert_eq!(first.probed, 2);
    assert!(first.became_unreachable.is_empty());
    // 阈值前仍可被选中
    assert!(cluster.resolve(&complexity_of(5)).await.is_ok());

    let second = monitor.probe_round().await;
    assert_eq!(second.became_unreachable, vec![WorkerId::new("w5")]);
    assert_eq!(
        events.recv().await.unwrap(),
        MembershipEvent::Unreachable(WorkerId::new("w5"))
    );
    let info = cluster.worker(&WorkerId::new("w5")).await.unwrap();
    assert_eq!(info.health, WorkerHealth::Unreachable);
    // 不可达的Worker仍是成员, 但不参与解析
    assert_eq!(cluster.len().await, 2);
    assert!(cluster.resolve(&complexity_of(3)).await.is_err());

    workers[1].set_reachable(true);
    let third = monitor.probe_round().await;
    assert_eq!(third.recovered, vec![WorkerId::new("w5")]);
    assert!(cluster.resolve(&complexity_of(5)).await.is_ok());
}

#[tokio::test]
async fn test_unreachable_worker_evicted_after_timeout() {
    let (cluster, workers) = cluster_with(&[("w2", 2), ("w5", 5)]).await;
    let monitor = cluster.health_monitor();
    let mut events = cluster.subscribe();
    workers[0].set_reachable(false);

    let start = Utc::now();
    monitor.probe_round_at(start).await;
    let marked = monitor.probe_round_at(start).await;
    assert_eq!(marked.became_unreachable, vec![WorkerId::new("w2")]);
    assert!(marked.evicted.is_empty());

    let later = monitor
        .probe_round_at(start + Duration::milliseconds(10_000))
        .await;
    assert_eq!(later.evicted, vec![WorkerId::new("w2")]);
    assert_eq!(cluster.len().await, 1);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen.contains(&MembershipEvent::Left(WorkerId::new("w2"))));
}

#[tokio::test]
#[traced_test]
async fn test_close_is_idempotent() {
    let (cluster, workers) = cluster_with(&[("w2", 2), ("w5", 5)]).await;
    let mut events = cluster.subscribe();
    cluster.start_health_monitor().unwrap();

    cluster.close().await.unwrap();
    assert!(cluster.is_closed());
    assert_eq!(events.recv().await.unwrap(), MembershipEvent::Closed);
    assert!(workers.iter().all(|w| w.is_closed()));
    assert!(cluster.is_empty().await);

    cluster.close().await.unwrap();
    assert!(workers.iter().all(|w| w.close_calls() == 1));
    assert!(events.try_recv().is_err());

    assert!(matches!(
        cluster.resolve(&complexity_of(1)).await,
        Err(SimGridError::ClusterClosed)
    ));
    assert!(matches!(
        cluster.join(ScriptedWorker::new("late", 1, 1).arc()).await,
        Err(SimGridError::ClusterClosed)
    ));
}

#[tokio::test]
async fn test_with_cluster_closes_on_error() {
    let (cluster, workers) = cluster_with(&[("w1", 2)]).await;
    let cluster = Arc::new(cluster);
    let result: Result<(), _> = with_cluster(cluster.clone(), |c| async move {
        c.resolve(&complexity_of(100)).await?;
        Ok(())
    })
    .await;
    assert!(matches!(result, Err(SimGridError::InsufficientCapacity { .. })));
    assert!(cluster.is_closed());
    assert!(workers[0].is_closed());
}

#[tokio::test]
async fn test_with_cluster_closes_on_success() {
    let (cluster, _) = cluster_with(&[("w1", 2)]).await;
    let cluster = Arc::new(cluster);
    let size = with_cluster(cluster.clone(), |c| async move {
        Ok(c.resolve(&complexity_of(1)).await?.len())
    })
    .await
    .unwrap();
    assert_eq!(size, 1);
    assert!(cluster.is_closed());
}

#[tokio::test]
async fn test_with_cluster_closes_on_panic() {
    let (cluster, workers) = cluster_with(&[("w1", 2)]).await;
    let cluster: Arc<dyn Cluster> = Arc::new(cluster);
    let inner = cluster.clone();
    let handle = tokio::spawn(async move {
        with_cluster(inner, |_| async move {
            if true {
                panic!("boom");
            }
            Ok(())
        })
        .await
    });
    assert!(handle.await.unwrap_err().is_panic());
    assert!(cluster.is_closed());
    assert!(workers[0].is_closed());
    assert_eq!(workers[0].id().as_str(), "w1");
}
