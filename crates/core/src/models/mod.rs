pub mod complexity;
pub mod job;
pub mod worker;
pub mod workers_set;

pub use complexity::{BatchProfile, Complexity, MemoryClass, WORK_PER_UNIT};
pub use job::{
    FailureReason, JobHandle, JobId, JobRecord, JobResult, JobSpec, JobState, JobStatus,
    Submission,
};
pub use worker::{MembershipEvent, WorkerCapacity, WorkerHealth, WorkerId, WorkerInfo};
pub use workers_set::{WorkerMember, WorkersSet};
