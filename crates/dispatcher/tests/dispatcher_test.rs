use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use simgrid_cluster::LocalCluster;
use simgrid_core::config::{ClusterConfig, DispatcherConfig};
use simgrid_core::models::{FailureReason, JobResult, JobState, WorkerId};
use simgrid_core::traits::Cluster;
use simgrid_dispatcher::{DeliveryStatus, Dispatcher};
use simgrid_errors::SimGridError;
use simgrid_testing_utils::{complexity_of, JobSpecBuilder, ScriptStep, ScriptedWorker, TestEnv};

async fn wait_until(check: impl Fn() -> bool) -> bool {
    TestEnv::wait_for(|| std::future::ready(check()), Duration::from_secs(2)).await
}

fn cluster_config() -> ClusterConfig {
    ClusterConfig {
        probe_interval_ms: 50,
        failure_threshold: 2,
        ..ClusterConfig::default()
    }
}

fn dispatcher_config(max_retries: u32) -> DispatcherConfig {
    DispatcherConfig {
        max_retries,
        attempt_timeout_ms: None,
        rejection_backoff_ms: 10,
    }
}

async fn cluster_of(workers: &[Arc<ScriptedWorker>]) -> Arc<LocalCluster> {
    let cluster = Arc::new(LocalCluster::new(cluster_config()).unwrap());
    for worker in workers {
        cluster.join(worker.clone()).await.unwrap();
    }
    cluster
}

#[tokio::test]
async fn test_scenario_b_retry_then_success() {
    let worker = ScriptedWorker::new("w1", 4, 1)
        .with_script(vec![
            ScriptStep::Crash("segfault".to_string()),
            ScriptStep::Crash("segfault".to_string()),
            ScriptStep::Complete,
        ])
        .arc();
    let cluster = cluster_of(&[worker.clone()]).await;
    let set = cluster.resolve(&complexity_of(1)).await.unwrap();
    let dispatcher = Dispatcher::new(cluster.clone(), dispatcher_config(2));

    let job = JobSpecBuilder::new().with_label("scenario-b").build();
    let job_id = job.id;
    let report = dispatcher
        .run_batch(set, complexity_of(1), vec![job])
        .await
        .unwrap();

    assert_eq!(report.deliveries.len(), 1);
    let delivery = report.delivery(&job_id).unwrap();
    assert!(delivery.is_completed());
    assert_eq!(delivery.attempts, 3);
    assert_eq!(delivery.worker, Some(WorkerId::new("w1")));
    assert_eq!(worker.submissions(), 3);
    assert_eq!(report.stats.failed_attempts, 2);
    assert_eq!(report.stats.reassigned, 2);

    // 每条新的分派记录之前, 上一条都已是Failed
    let history = dispatcher.history(&job_id).await;
    let states: Vec<JobState> = history.iter().map(|r| r.state).collect();
    assert_eq!(
        states,
        vec![JobState::Failed, JobState::Failed, JobState::Completed]
    );
    assert_eq!(history[0].failure.as_deref(), Some("执行崩溃: segfault"));
}

#[tokio::test]
async fn test_retries_exhausted_delivers_unrecoverable_once() {
    let worker = ScriptedWorker::new("w1", 4, 1)
        .with_script(vec![
            ScriptStep::Crash("a".to_string()),
            ScriptStep::Timeout,
            ScriptStep::Crash("c".to_string()),
            ScriptStep::Complete,
        ])
        .arc();
    let cluster = cluster_of(&[worker.clone()]).await;
    let set = cluster.resolve(&complexity_of(1)).await.unwrap();
    let dispatcher = Dispatcher::new(cluster.clone(), dispatcher_config(2));

    let job = JobSpecBuilder::new().build();
    let job_id = job.id;
    let report = dispatcher
        .run_batch(set, complexity_of(1), vec![job])
        .await
        .unwrap();

    assert_eq!(report.deliveries.len(), 1);
    let delivery = &report.deliveries[0];
    assert_eq!(delivery.status(), DeliveryStatus::Unrecoverable);
    match &delivery.result {
        Err(SimGridError::JobUnrecoverable {
            job_id: failed,
            attempts,
            last_failure,
        }) => {
            assert_eq!(failed, &job_id.to_string());
            assert_eq!(*attempts, 3);
            assert_eq!(last_failure, "执行崩溃: c");
        }
        other => panic!("unexpected delivery {other:?}"),
    }
    // R+1 次之后不再提交
    assert_eq!(worker.submissions(), 3);
    assert_eq!(report.stats.unrecoverable, 1);
}

#[tokio::test]
async fn test_rejection_is_not_a_failure() {
    let worker = ScriptedWorker::new("w1", 4, 1)
        .with_script(vec![
            ScriptStep::Reject,
            ScriptStep::Reject,
            ScriptStep::Complete,
        ])
        .arc();
    let cluster = cluster_of(&[worker.clone()]).await;
    let set = cluster.resolve(&complexity_of(1)).await.unwrap();
    // 零重试预算: 任何一次失败都会变成不可恢复
    let dispatcher = Dispatcher::new(cluster.clone(), dispatcher_config(0));

    let report = dispatcher
        .run_batch(set, complexity_of(1), JobSpecBuilder::batch(1))
        .await
        .unwrap();

    assert!(report.all_completed());
    assert_eq!(report.stats.rejected, 2);
    assert_eq!(report.stats.failed_attempts, 0);
    assert_eq!(report.deliveries[0].attempts, 1);
}

#[tokio::test]
async fn test_reassignment_prefers_different_worker() {
    let w1 = ScriptedWorker::new("w1", 5, 1)
        .with_script(vec![ScriptStep::Crash("oom".to_string())])
        .arc();
    let w2 = ScriptedWorker::new("w2", 5, 1).arc();
    let cluster = cluster_of(&[w1.clone(), w2.clone()]).await;
    let set = cluster.resolve(&complexity_of(10)).await.unwrap();
    assert_eq!(set.ids(), vec![WorkerId::new("w1"), WorkerId::new("w2")]);
    let dispatcher = Dispatcher::new(cluster.clone(), dispatcher_config(3));

    let job = JobSpecBuilder::new().build();
    let job_id = job.id;
    let report = dispatcher
        .run_batch(set, complexity_of(10), vec![job])
        .await
        .unwrap();

    let delivery = report.delivery(&job_id).unwrap();
    assert!(delivery.is_completed());
    assert_eq!(delivery.worker, Some(WorkerId::new("w2")));
    assert_eq!(w1.accepted_jobs(), vec![job_id]);
    assert_eq!(w2.accepted_jobs(), vec![job_id]);
}

#[tokio::test]
async fn test_worker_leave_triggers_reassignment() {
    let w1 = ScriptedWorker::new("w1", 5, 1)
        .with_script(vec![ScriptStep::Hang])
        .arc();
    let w2 = ScriptedWorker::new("w2", 5, 1).arc();
    let cluster = cluster_of(&[w1.clone(), w2.clone()]).await;
    let set = cluster.resolve(&complexity_of(10)).await.unwrap();
    let dispatcher = Dispatcher::new(cluster.clone(), dispatcher_config(3));

    let leaver = {
        let cluster = cluster.clone();
        let w1 = w1.clone();
        tokio::spawn(async move {
            assert!(wait_until(|| w1.running() == 1).await);
            cluster.leave(&WorkerId::new("w1")).await.unwrap();
        })
    };

    // w2 只处理第二个作业, 第一个作业挂在 w1 上直到 w1 离开
    let jobs = JobSpecBuilder::batch(2);
    let hung = jobs[0].id;
    let report = dispatcher
        .run_batch(set, complexity_of(10), jobs)
        .await
        .unwrap();
    leaver.await.unwrap();

    assert!(report.all_completed());
    let delivery = report.delivery(&hung).unwrap();
    assert_eq!(delivery.attempts, 2);
    assert_eq!(delivery.worker, Some(WorkerId::new("w2")));
    assert_eq!(report.stats.reassigned, 1);
    assert!(w1.is_closed());
}

#[tokio::test]
async fn test_unreachable_worker_jobs_are_reassigned() {
    let w1 = ScriptedWorker::new("w1", 5, 1)
        .with_script(vec![ScriptStep::Hang])
        .arc();
    let w2 = ScriptedWorker::new("w2", 5, 1).arc();
    let cluster = cluster_of(&[w1.clone(), w2.clone()]).await;
    let set = cluster.resolve(&complexity_of(10)).await.unwrap();
    let dispatcher = Dispatcher::new(cluster.clone(), dispatcher_config(3));

    let prober = {
        let monitor = cluster.health_monitor();
        let w1 = w1.clone();
        tokio::spawn(async move {
            assert!(wait_until(|| w1.running() == 1).await);
            w1.set_reachable(false);
            monitor.probe_round().await;
            monitor.probe_round().await
        })
    };

    let job = JobSpecBuilder::new().build();
    let job_id = job.id;
    let report = dispatcher
        .run_batch(set, complexity_of(10), vec![job])
        .await
        .unwrap();
    let summary = prober.await.unwrap();

    assert_eq!(summary.became_unreachable, vec![WorkerId::new("w1")]);
    let delivery = report.delivery(&job_id).unwrap();
    assert!(delivery.is_completed());
    assert_eq!(delivery.worker, Some(WorkerId::new("w2")));
    // 尝试被判失败时会尽力取消
    assert!(wait_until(|| w1.cancels() >= 1).await);
}

#[tokio::test]
async fn test_close_cancels_outstanding_jobs_once() {
    let w1 = ScriptedWorker::new("w1", 5, 2)
        .with_script(vec![ScriptStep::Hang, ScriptStep::Hang])
        .arc();
    let w2 = ScriptedWorker::new("w2", 5, 2)
        .with_script(vec![ScriptStep::Hang, ScriptStep::Hang])
        .arc();
    let cluster = cluster_of(&[w1.clone(), w2.clone()]).await;
    let set = cluster.resolve(&complexity_of(10)).await.unwrap();
    let dispatcher = Dispatcher::new(cluster.clone(), dispatcher_config(3));

    let closer = {
        let cluster = cluster.clone();
        let (w1, w2) = (w1.clone(), w2.clone());
        tokio::spawn(async move {
            assert!(wait_until(|| w1.running() + w2.running() == 4).await);
            cluster.close().await.unwrap();
        })
    };

    // 4 个挂起, 2 个仍在等待空闲槽位
    let jobs = JobSpecBuilder::batch(6);
    let ids: HashSet<_> = jobs.iter().map(|job| job.id).collect();
    let report = dispatcher
        .run_batch(set, complexity_of(10), jobs)
        .await
        .unwrap();
    closer.await.unwrap();

    assert_eq!(report.deliveries.len(), 6);
    let delivered: HashSet<_> = report.deliveries.iter().map(|d| d.job_id).collect();
    assert_eq!(delivered, ids);
    for delivery in &report.deliveries {
        assert!(matches!(
            delivery.result,
            Ok(JobResult::Failed(FailureReason::Cancelled))
        ));
    }
    assert_eq!(report.stats.cancelled, 6);
    assert!(w1.is_closed() && w2.is_closed());

    // 关闭后的批次直接被拒绝
    let set_err = dispatcher
        .run_batch(
            simgrid_core::models::WorkersSet::new(Vec::new(), 0),
            complexity_of(1),
            JobSpecBuilder::batch(1),
        )
        .await;
    assert!(matches!(set_err, Err(SimGridError::ClusterClosed)));
}

#[tokio::test]
async fn test_concurrency_limit_respected() {
    let worker = ScriptedWorker::new("w1", 4, 2)
        .with_delay(Duration::from_millis(20))
        .arc();
    let cluster = cluster_of(&[worker.clone()]).await;
    let set = cluster.resolve(&complexity_of(4)).await.unwrap();
    let dispatcher = Dispatcher::new(cluster.clone(), dispatcher_config(0));

    let report = dispatcher
        .run_batch(set, complexity_of(4), JobSpecBuilder::batch(8))
        .await
        .unwrap();

    assert!(report.all_completed());
    // 超过上限的提交会被ScriptedWorker拒绝
    assert_eq!(report.stats.rejected, 0);
    assert_eq!(report.stats.dispatched, 8);
    assert_eq!(worker.submissions(), 8);
}

#[tokio::test]
async fn test_exactly_once_under_mixed_failures() {
    let w1 = ScriptedWorker::new("w1", 3, 2)
        .with_script(vec![
            ScriptStep::Crash("x".to_string()),
            ScriptStep::Complete,
            ScriptStep::Timeout,
            ScriptStep::Reject,
            ScriptStep::Complete,
        ])
        .arc();
    let w2 = ScriptedWorker::new("w2", 3, 2)
        .with_script(vec![
            ScriptStep::Complete,
            ScriptStep::Cancelled,
            ScriptStep::Crash("y".to_string()),
        ])
        .arc();
    let w3 = ScriptedWorker::new("w3", 3, 1).arc();
    let cluster = cluster_of(&[w1.clone(), w2.clone(), w3.clone()]).await;
    let set = cluster.resolve(&complexity_of(9)).await.unwrap();
    let dispatcher = Dispatcher::new(cluster.clone(), dispatcher_config(3));

    let jobs = JobSpecBuilder::batch(20);
    let ids: Vec<_> = jobs.iter().map(|job| job.id).collect();
    let report = dispatcher
        .run_batch(set, complexity_of(9), jobs)
        .await
        .unwrap();

    // 交付顺序与提交顺序一致, 没有重复
    let delivered: Vec<_> = report.deliveries.iter().map(|d| d.job_id).collect();
    assert_eq!(delivered, ids);
    assert!(report.all_completed());
    assert_eq!(report.stats.completed, 20);
    assert_eq!(report.stats.failed_attempts, 4);
}

#[tokio::test]
async fn test_attempt_timeout_cancels_and_retries() {
    // 超时的挂起作业仍占用脚本Worker的一个槽位
    let worker = ScriptedWorker::new("w1", 2, 2)
        .with_script(vec![ScriptStep::Hang, ScriptStep::Complete])
        .arc();
    let cluster = cluster_of(&[worker.clone()]).await;
    let set = cluster.resolve(&complexity_of(1)).await.unwrap();
    let dispatcher = Dispatcher::new(
        cluster.clone(),
        DispatcherConfig {
            max_retries: 1,
            attempt_timeout_ms: Some(30),
            rejection_backoff_ms: 10,
        },
    );

    let job = JobSpecBuilder::new().build();
    let job_id = job.id;
    let report = dispatcher
        .run_batch(set, complexity_of(1), vec![job])
        .await
        .unwrap();

    assert!(report.all_completed());
    assert!(worker.cancels() >= 1);
    let history = dispatcher.history(&job_id).await;
    assert_eq!(history[0].failure.as_deref(), Some("执行超时"));
}

#[tokio::test]
async fn test_transport_error_counts_and_moves_on() {
    let w1 = ScriptedWorker::new("w1", 5, 1)
        .with_script(vec![ScriptStep::TransportError("connection reset".to_string())])
        .arc();
    let w2 = ScriptedWorker::new("w2", 5, 1).arc();
    let cluster = cluster_of(&[w1.clone(), w2.clone()]).await;
    let set = cluster.resolve(&complexity_of(10)).await.unwrap();
    let dispatcher = Dispatcher::new(cluster.clone(), dispatcher_config(1));

    let report = dispatcher
        .run_batch(set, complexity_of(10), JobSpecBuilder::batch(1))
        .await
        .unwrap();

    assert!(report.all_completed());
    assert_eq!(report.stats.failed_attempts, 1);
    assert_eq!(report.deliveries[0].worker, Some(WorkerId::new("w2")));
    assert_eq!(report.deliveries[0].attempts, 2);
}

#[tokio::test]
async fn test_no_capacity_left_makes_jobs_unrecoverable() {
    let worker = ScriptedWorker::new("w1", 4, 1)
        .with_script(vec![ScriptStep::Hang])
        .arc();
    let cluster = cluster_of(&[worker.clone()]).await;
    let set = cluster.resolve(&complexity_of(4)).await.unwrap();
    let dispatcher = Dispatcher::new(cluster.clone(), dispatcher_config(3));

    let leaver = {
        let cluster = cluster.clone();
        let worker = worker.clone();
        tokio::spawn(async move {
            assert!(wait_until(|| worker.running() == 1).await);
            cluster.leave(&WorkerId::new("w1")).await.unwrap();
        })
    };

    let report = dispatcher
        .run_batch(set, complexity_of(4), JobSpecBuilder::batch(1))
        .await
        .unwrap();
    leaver.await.unwrap();

    assert_eq!(report.deliveries.len(), 1);
    assert!(matches!(
        report.deliveries[0].result,
        Err(SimGridError::JobUnrecoverable { attempts: 1, .. })
    ));
}

#[tokio::test]
async fn test_duplicate_job_ids_rejected() {
    let worker = ScriptedWorker::new("w1", 4, 1).arc();
    let cluster = cluster_of(&[worker]).await;
    let set = cluster.resolve(&complexity_of(1)).await.unwrap();
    let dispatcher = Dispatcher::new(cluster.clone(), dispatcher_config(1));

    let job = JobSpecBuilder::new().build();
    let result = dispatcher
        .run_batch(set, complexity_of(1), vec![job.clone(), job])
        .await;
    assert!(matches!(result, Err(SimGridError::Internal(_))));
}

#[tokio::test]
async fn test_unrecoverable_job_can_be_resubmitted() {
    let worker = ScriptedWorker::new("w1", 4, 1)
        .with_script(vec![ScriptStep::Crash("oom".to_string()), ScriptStep::Complete])
        .arc();
    let cluster = cluster_of(&[worker.clone()]).await;
    let dispatcher = Dispatcher::new(cluster.clone(), dispatcher_config(0));
    let job = JobSpecBuilder::new().with_label("again").build();
    let job_id = job.id;

    let set = cluster.resolve(&complexity_of(1)).await.unwrap();
    let first = dispatcher
        .run_batch(set, complexity_of(1), vec![job.clone()])
        .await
        .unwrap();
    assert_eq!(first.stats.unrecoverable, 1);
    assert_eq!(dispatcher.active_jobs().await, 0);

    let set = cluster.resolve(&complexity_of(1)).await.unwrap();
    let second = dispatcher
        .run_batch(set, complexity_of(1), vec![job])
        .await
        .unwrap();
    assert!(second.all_completed());
    assert_eq!(second.delivery(&job_id).unwrap().attempts, 1);
    assert_eq!(dispatcher.active_jobs().await, 0);

    // 只保留最近一次批次的记录
    let states: Vec<JobState> = dispatcher
        .history(&job_id)
        .await
        .iter()
        .map(|r| r.state)
        .collect();
    assert_eq!(states, vec![JobState::Completed]);
}

#[tokio::test]
async fn test_finished_batches_keep_bounded_history() {
    let worker = ScriptedWorker::new("w1", 4, 8).arc();
    let cluster = cluster_of(&[worker]).await;
    let dispatcher = Dispatcher::new(cluster.clone(), dispatcher_config(0));

    let mut first_id = None;
    let rounds = simgrid_dispatcher::HISTORY_CAPACITY / 64 + 1;
    for _ in 0..rounds {
        let jobs = JobSpecBuilder::batch(64);
        first_id.get_or_insert(jobs[0].id);
        let set = cluster.resolve(&complexity_of(1)).await.unwrap();
        let report = dispatcher
            .run_batch(set, complexity_of(1), jobs)
            .await
            .unwrap();
        assert!(report.all_completed());
    }

    assert_eq!(dispatcher.active_jobs().await, 0);
    // 最早的记录已被淘汰
    assert!(dispatcher.history(&first_id.unwrap()).await.is_empty());
}

#[tokio::test]
async fn test_accepted_job_is_recorded_running() {
    let worker = ScriptedWorker::new("w1", 4, 1)
        .with_script(vec![ScriptStep::Hang])
        .arc();
    let cluster = cluster_of(&[worker.clone()]).await;
    let set = cluster.resolve(&complexity_of(1)).await.unwrap();
    let dispatcher = Arc::new(Dispatcher::new(cluster.clone(), dispatcher_config(0)));
    let job = JobSpecBuilder::new().build();
    let job_id = job.id;

    let run = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.run_batch(set, complexity_of(1), vec![job]).await })
    };

    let watcher = dispatcher.clone();
    let running = TestEnv::wait_for(
        move || {
            let dispatcher = watcher.clone();
            async move {
                dispatcher
                    .history(&job_id)
                    .await
                    .last()
                    .map(|record| record.state == JobState::Running)
                    .unwrap_or(false)
            }
        },
        Duration::from_secs(2),
    )
    .await;
    assert!(running);

    cluster.close().await.unwrap();
    let report = run.await.unwrap().unwrap();
    assert_eq!(report.stats.cancelled, 1);
}
