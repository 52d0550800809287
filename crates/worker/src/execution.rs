use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{debug, error, info, warn};

use simgrid_core::models::{FailureReason, JobResult, JobSpec};
use simgrid_engine::{CancelFlag, RunControl, TerminationReason};

/// 在当前线程上执行一个作业, 必须在阻塞线程中调用
///
/// 取消与截止时间只在步边界生效; 引擎错误(包括环境不一致)一律报告为 `Crashed`。
pub fn execute_job(job: &JobSpec, cancel: CancelFlag, started: Instant) -> JobResult {
    let deadline = job.deadline().map(|limit| started + limit);
    let control = RunControl::new(cancel, deadline);

    let run = job
        .simulation
        .build(job.seed, job.termination)
        .map(|simulation| simulation.with_trace(job.record_trace))
        .and_then(|mut simulation| simulation.run(&control));

    let elapsed = started.elapsed();
    histogram!("simgrid_worker_job_duration_ms").record(elapsed.as_millis() as f64);

    let result = match run {
        Ok(outcome) => match outcome.reason {
            TerminationReason::Cancelled => {
                info!("作业 {} 在第 {} 步被取消", job.id, outcome.steps);
                JobResult::Failed(FailureReason::Cancelled)
            }
            TerminationReason::DeadlineExceeded => {
                warn!(
                    "作业 {} 超过截止时间 {:?}, 已执行 {} 步",
                    job.id,
                    job.deadline(),
                    outcome.steps
                );
                JobResult::Failed(FailureReason::Timeout)
            }
            reason => {
                debug!(
                    "作业 {} 完成: {:?}, 时间 {}, {} 步, 耗时 {:?}",
                    job.id, reason, outcome.final_time, outcome.steps, elapsed
                );
                JobResult::Completed(outcome)
            }
        },
        Err(e) => {
            error!("作业 {} 执行失败: {}", job.id, e);
            JobResult::Failed(FailureReason::Crashed(e.to_string()))
        }
    };

    let outcome = match &result {
        JobResult::Completed(_) => "completed",
        JobResult::Failed(FailureReason::Cancelled) => "cancelled",
        JobResult::Failed(FailureReason::Timeout) => "timeout",
        JobResult::Failed(_) => "crashed",
    };
    counter!("simgrid_worker_jobs_total", "outcome" => outcome).increment(1);
    result
}
