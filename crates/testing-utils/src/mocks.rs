//! Scripted worker endpoints for dispatcher and cluster tests
//!
//! A [`ScriptedWorker`] plays back a queue of [`ScriptStep`]s, one per
//! submission, so tests can stage crashes, rejections, hangs and transport
//! errors deterministically without running real simulations.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use simgrid_core::models::{
    FailureReason, JobHandle, JobId, JobResult, JobSpec, JobStatus, Submission, WorkerCapacity,
    WorkerId,
};
use simgrid_core::traits::WorkerEndpoint;
use simgrid_engine::{SimulationOutcome, TerminationReason};
use simgrid_errors::{SimGridError, SimGridResult};
use tokio::sync::Notify;
use uuid::Uuid;

/// What the worker does with the next accepted submission
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    /// Completes after the configured delay
    Complete,
    Crash(String),
    Timeout,
    Cancelled,
    /// Answers `Submission::Rejected` without consuming a slot
    Reject,
    /// Runs until cancelled
    Hang,
    /// `submit` itself fails as if the transport broke
    TransportError(String),
}

#[derive(Debug)]
struct ScriptedJob {
    spec: JobSpec,
    step: ScriptStep,
    status: JobStatus,
    result: Option<JobResult>,
    cancelled: Arc<AtomicBool>,
    wakeup: Arc<Notify>,
}

/// In-memory [`WorkerEndpoint`] driven by a script
#[derive(Debug)]
pub struct ScriptedWorker {
    id: WorkerId,
    address: String,
    capacity: WorkerCapacity,
    delay: Duration,
    script: Mutex<VecDeque<ScriptStep>>,
    jobs: Mutex<HashMap<Uuid, ScriptedJob>>,
    accepted: Mutex<Vec<JobId>>,
    reachable: AtomicBool,
    closed: AtomicBool,
    running: AtomicUsize,
    submissions: AtomicUsize,
    cancels: AtomicUsize,
    close_calls: AtomicUsize,
}

impl ScriptedWorker {
    pub fn new(id: &str, units: u64, max_concurrent_jobs: usize) -> Self {
        Self {
            id: WorkerId::new(id),
            address: format!("scripted://{id}"),
            capacity: WorkerCapacity::new(units, max_concurrent_jobs),
            delay: Duration::from_millis(5),
            script: Mutex::new(VecDeque::new()),
            jobs: Mutex::new(HashMap::new()),
            accepted: Mutex::new(Vec::new()),
            reachable: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            running: AtomicUsize::new(0),
            submissions: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_script(self, steps: Vec<ScriptStep>) -> Self {
        *self.script.lock().unwrap() = steps.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn push_step(&self, step: ScriptStep) {
        self.script.lock().unwrap().push_back(step);
    }

    /// Makes `probe` fail (or succeed again)
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Job ids in the order they were accepted
    pub fn accepted_jobs(&self) -> Vec<JobId> {
        self.accepted.lock().unwrap().clone()
    }

    fn outcome_for(spec: &JobSpec) -> SimulationOutcome {
        SimulationOutcome {
            final_time: 1.0,
            steps: 1,
            reason: TerminationReason::Exhausted,
            node_count: spec.simulation.node_count() as usize,
            molecule_totals: Default::default(),
            firings: Vec::new(),
        }
    }

    fn finish(&self, token: &Uuid, result: JobResult) -> JobResult {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(token) {
            if let Some(existing) = &job.result {
                return existing.clone();
            }
            job.status = if result.is_completed() {
                JobStatus::Completed
            } else {
                JobStatus::Failed
            };
            job.result = Some(result.clone());
            self.running.fetch_sub(1, Ordering::SeqCst);
        }
        result
    }
}

#[async_trait]
impl WorkerEndpoint for ScriptedWorker {
    fn id(&self) -> &WorkerId {
        &self.id
    }

    fn address(&self) -> &str {
        &self.address
    }

    async fn capacity(&self) -> SimGridResult<WorkerCapacity> {
        Ok(self.capacity)
    }

    async fn probe(&self) -> SimGridResult<usize> {
        if self.reachable.load(Ordering::SeqCst) && !self.is_closed() {
            Ok(self.running())
        } else {
            Err(SimGridError::worker_unreachable(self.id.as_str(), "probe failed"))
        }
    }

    async fn submit(&self, job: JobSpec) -> SimGridResult<Submission> {
        if self.is_closed() {
            return Err(SimGridError::worker_unreachable(self.id.as_str(), "closed"));
        }
        if self.running() >= self.capacity.max_concurrent_jobs {
            return Ok(Submission::Rejected);
        }
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ScriptStep::Complete);
        match step {
            ScriptStep::Reject => return Ok(Submission::Rejected),
            ScriptStep::TransportError(reason) => {
                return Err(SimGridError::worker_unreachable(self.id.as_str(), reason))
            }
            _ => {}
        }
        self.submissions.fetch_add(1, Ordering::SeqCst);
        self.running.fetch_add(1, Ordering::SeqCst);
        let handle = JobHandle::new(job.id, self.id.clone());
        self.accepted.lock().unwrap().push(job.id);
        self.jobs.lock().unwrap().insert(
            handle.token,
            ScriptedJob {
                spec: job,
                step,
                status: JobStatus::Running,
                result: None,
                cancelled: Arc::new(AtomicBool::new(false)),
                wakeup: Arc::new(Notify::new()),
            },
        );
        Ok(Submission::Accepted(handle))
    }

    async fn status(&self, handle: &JobHandle) -> SimGridResult<JobStatus> {
        self.jobs
            .lock()
            .unwrap()
            .get(&handle.token)
            .map(|job| job.status)
            .ok_or_else(|| SimGridError::JobNotFound {
                id: handle.job_id.to_string(),
            })
    }

    async fn wait(&self, handle: &JobHandle) -> SimGridResult<JobResult> {
        let (step, spec, cancelled, wakeup) = {
            let jobs = self.jobs.lock().unwrap();
            let job = jobs.get(&handle.token).ok_or_else(|| SimGridError::JobNotFound {
                id: handle.job_id.to_string(),
            })?;
            if let Some(result) = &job.result {
                return Ok(result.clone());
            }
            (
                job.step.clone(),
                job.spec.clone(),
                job.cancelled.clone(),
                job.wakeup.clone(),
            )
        };

        let result = match step {
            ScriptStep::Hang => {
                while !cancelled.load(Ordering::SeqCst) {
                    wakeup.notified().await;
                }
                JobResult::Failed(FailureReason::Cancelled)
            }
            other => {
                tokio::select! {
                    _ = tokio::time::sleep(self.delay) => match other {
                        ScriptStep::Crash(message) => JobResult::Failed(FailureReason::Crashed(message)),
                        ScriptStep::Timeout => JobResult::Failed(FailureReason::Timeout),
                        ScriptStep::Cancelled => JobResult::Failed(FailureReason::Cancelled),
                        _ => JobResult::Completed(Self::outcome_for(&spec)),
                    },
                    _ = wakeup.notified() => JobResult::Failed(FailureReason::Cancelled),
                }
            }
        };
        Ok(self.finish(&handle.token, result))
    }

    async fn cancel(&self, handle: &JobHandle) -> SimGridResult<()> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        if let Some(job) = self.jobs.lock().unwrap().get(&handle.token) {
            if !job.cancelled.swap(true, Ordering::SeqCst) {
                job.wakeup.notify_one();
            }
        }
        Ok(())
    }

    async fn close(&self) -> SimGridResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        for job in self.jobs.lock().unwrap().values() {
            if !job.cancelled.swap(true, Ordering::SeqCst) {
                job.wakeup.notify_one();
            }
        }
        Ok(())
    }
}
