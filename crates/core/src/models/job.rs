use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use simgrid_engine::{SimulationOutcome, SimulationSpec, Termination};
use uuid::Uuid;

use super::worker::WorkerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 一次仿真运行: 环境、部署、反应与终止条件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    #[serde(default)]
    pub id: JobId,
    #[serde(default)]
    pub label: String,
    pub simulation: SimulationSpec,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub termination: Termination,
    /// 墙钟截止时间(毫秒), 在仿真步边界处检查
    #[serde(default)]
    pub deadline_ms: Option<u64>,
    #[serde(default)]
    pub record_trace: bool,
}

impl JobSpec {
    pub fn new<S: Into<String>>(label: S, simulation: SimulationSpec, seed: u64) -> Self {
        Self {
            id: JobId::new(),
            label: label.into(),
            simulation,
            seed,
            termination: Termination::default(),
            deadline_ms: None,
            record_trace: false,
        }
    }

    pub fn with_termination(mut self, termination: Termination) -> Self {
        self.termination = termination;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_ms = Some(deadline.as_millis() as u64);
        self
    }

    pub fn with_trace(mut self, record_trace: bool) -> Self {
        self.record_trace = record_trace;
        self
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

/// 作业状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "DISPATCHED")]
    Dispatched,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "REASSIGNED")]
    Reassigned,
}

impl JobState {
    pub fn is_live(&self) -> bool {
        matches!(self, JobState::Dispatched | JobState::Running)
    }
}

/// 一次分派尝试的记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub attempt: u32,
    pub worker_id: Option<WorkerId>,
    pub state: JobState,
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn pending(job_id: JobId, attempt: u32) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            attempt,
            worker_id: None,
            state: JobState::Pending,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn dispatch(&mut self, worker_id: WorkerId) {
        self.worker_id = Some(worker_id);
        self.transition(JobState::Dispatched);
    }

    pub fn fail<S: Into<String>>(&mut self, reason: S) {
        self.failure = Some(reason.into());
        self.transition(JobState::Failed);
    }

    pub fn transition(&mut self, state: JobState) {
        self.state = state;
        self.updated_at = Utc::now();
    }
}

/// Worker为一次已接受的提交返回的句柄
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: JobId,
    pub worker_id: WorkerId,
    pub token: Uuid,
}

impl JobHandle {
    pub fn new(job_id: JobId, worker_id: WorkerId) -> Self {
        Self {
            job_id,
            worker_id,
            token: Uuid::new_v4(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    Timeout,
    Crashed(String),
    Cancelled,
    Rejected,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Timeout => f.write_str("执行超时"),
            FailureReason::Crashed(message) => write!(f, "执行崩溃: {message}"),
            FailureReason::Cancelled => f.write_str("已取消"),
            FailureReason::Rejected => f.write_str("已拒绝"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobResult {
    Completed(SimulationOutcome),
    Failed(FailureReason),
}

impl JobResult {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobResult::Completed(_))
    }
}

/// `submit` 的结果; `Rejected` 表示Worker已满载, 不计入失败次数
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Accepted(JobHandle),
    Rejected,
}
