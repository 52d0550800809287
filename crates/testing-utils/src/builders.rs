//! Test data builders with sensible defaults

use std::time::Duration;

use chrono::{DateTime, Utc};
use simgrid_core::models::{
    Complexity, JobSpec, MemoryClass, WorkerCapacity, WorkerHealth, WorkerId, WorkerInfo,
};
use simgrid_engine::{SimulationSpec, Termination};

use crate::helpers::single_point_simulation;

/// Builder for [`WorkerInfo`] snapshots used by strategy tests
pub struct WorkerInfoBuilder {
    info: WorkerInfo,
}

impl WorkerInfoBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            info: WorkerInfo::new(
                WorkerId::new(id),
                format!("test://{id}"),
                WorkerCapacity::new(1, 1),
            ),
        }
    }

    pub fn with_units(mut self, units: u64) -> Self {
        self.info.capacity.units = units;
        self
    }

    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.info.capacity.max_concurrent_jobs = max;
        self
    }

    pub fn with_load(mut self, load: usize) -> Self {
        self.info.current_load = load;
        self
    }

    pub fn with_health(mut self, health: WorkerHealth) -> Self {
        self.info.health = health;
        self
    }

    pub fn unreachable_since(mut self, since: DateTime<Utc>) -> Self {
        self.info.health = WorkerHealth::Unreachable;
        self.info.unreachable_since = Some(since);
        self
    }

    pub fn build(self) -> WorkerInfo {
        self.info
    }
}

/// Builder for [`JobSpec`]
pub struct JobSpecBuilder {
    spec: JobSpec,
}

impl JobSpecBuilder {
    pub fn new() -> Self {
        Self {
            spec: JobSpec::new("test-job", single_point_simulation(), 0),
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.spec.label = label.to_string();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.spec.seed = seed;
        self
    }

    pub fn with_simulation(mut self, simulation: SimulationSpec) -> Self {
        self.spec.simulation = simulation;
        self
    }

    pub fn with_termination(mut self, termination: Termination) -> Self {
        self.spec.termination = termination;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.spec = self.spec.with_deadline(deadline);
        self
    }

    pub fn with_trace(mut self) -> Self {
        self.spec.record_trace = true;
        self
    }

    pub fn build(self) -> JobSpec {
        self.spec
    }

    /// `count` jobs with distinct ids, labels `job-0..` and seeds `0..`
    pub fn batch(count: usize) -> Vec<JobSpec> {
        (0..count)
            .map(|i| {
                JobSpecBuilder::new()
                    .with_label(&format!("job-{i}"))
                    .with_seed(i as u64)
                    .build()
            })
            .collect()
    }
}

impl Default for JobSpecBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A complexity whose demand is exactly `units`
pub fn complexity_of(units: u64) -> Complexity {
    Complexity::new(units, 1, 1, MemoryClass::Small)
}
