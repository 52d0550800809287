use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use simgrid_errors::{SimGridError, SimGridResult};
use tracing::{debug, info};

use crate::dependency::DependencyGraph;
use crate::environment::{Environment, Molecule, NodeId};
use crate::queue::EventQueue;
use crate::reaction::{Reaction, StateKey};
use crate::snapshot::{RngState, SimulationSnapshot, SNAPSHOT_VERSION};
use crate::time::SimTime;

/// 终止条件, 两个上限都是可选的
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Termination {
    pub max_time: Option<f64>,
    pub max_steps: Option<u64>,
}

impl Termination {
    pub fn at_time(max_time: f64) -> Self {
        Self {
            max_time: Some(max_time),
            max_steps: None,
        }
    }

    pub fn after_steps(max_steps: u64) -> Self {
        Self {
            max_time: None,
            max_steps: Some(max_steps),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// 待触发队列为空
    Exhausted,
    TimeHorizon,
    StepHorizon,
    Cancelled,
    DeadlineExceeded,
}

/// 一次反应触发
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Firing {
    pub step: u64,
    pub time: SimTime,
    pub reaction: usize,
    pub node: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutcome {
    pub final_time: f64,
    pub steps: u64,
    pub reason: TerminationReason,
    pub node_count: usize,
    pub molecule_totals: BTreeMap<Molecule, f64>,
    #[serde(default)]
    pub firings: Vec<Firing>,
}

/// 协作式取消标记, 只在步边界被检查
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunControl {
    pub cancel: CancelFlag,
    pub deadline: Option<Instant>,
}

impl RunControl {
    pub fn new(cancel: CancelFlag, deadline: Option<Instant>) -> Self {
        Self { cancel, deadline }
    }
}

/// 单个仿真实例的确定性事件循环
///
/// 单线程、严格顺序执行; 并发只存在于实例之间。
pub struct Simulation {
    environment: Environment,
    reactions: Vec<Box<dyn Reaction>>,
    queue: EventQueue,
    graph: DependencyGraph,
    rng: ChaCha8Rng,
    time: SimTime,
    step: u64,
    termination: Termination,
    record_trace: bool,
    trace: Vec<Firing>,
}

impl Simulation {
    pub fn new(
        environment: Environment,
        reactions: Vec<Box<dyn Reaction>>,
        seed: u64,
        termination: Termination,
    ) -> SimGridResult<Self> {
        Self::check_reactions(&environment, &reactions)?;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let graph = DependencyGraph::build(&reactions, &environment);
        let mut queue = EventQueue::new(reactions.len());
        for (index, reaction) in reactions.iter().enumerate() {
            queue.schedule(
                index,
                reaction.next_firing_time(SimTime::ZERO, &environment, &mut rng),
            );
        }
        debug!(
            "仿真初始化完成: {} 个节点, {} 个反应, {} 个待触发",
            environment.node_count(),
            reactions.len(),
            queue.len()
        );
        Ok(Self {
            environment,
            reactions,
            queue,
            graph,
            rng,
            time: SimTime::ZERO,
            step: 0,
            termination,
            record_trace: false,
            trace: Vec::new(),
        })
    }

    /// 从快照恢复; `reactions` 必须与生成快照时的反应一一对应
    pub fn restore(
        snapshot: SimulationSnapshot,
        reactions: Vec<Box<dyn Reaction>>,
        termination: Termination,
    ) -> SimGridResult<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SimGridError::SnapshotVersion {
                found: snapshot.version,
                supported: SNAPSHOT_VERSION,
            });
        }
        if snapshot.schedule.len() != reactions.len() {
            return Err(SimGridError::inconsistent(format!(
                "快照包含 {} 个反应的调度状态, 实际提供 {} 个反应",
                snapshot.schedule.len(),
                reactions.len()
            )));
        }
        snapshot.environment.check_consistency()?;
        Self::check_reactions(&snapshot.environment, &reactions)?;
        let graph = DependencyGraph::build(&reactions, &snapshot.environment);
        Ok(Self {
            queue: EventQueue::from_schedule(snapshot.schedule),
            rng: snapshot.rng.restore(),
            environment: snapshot.environment,
            reactions,
            graph,
            time: snapshot.time,
            step: snapshot.step,
            termination,
            record_trace: false,
            trace: Vec::new(),
        })
    }

    pub fn with_trace(mut self, record_trace: bool) -> Self {
        self.record_trace = record_trace;
        self
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn time(&self) -> SimTime {
        self.time
    }

    pub fn steps(&self) -> u64 {
        self.step
    }

    pub fn trace(&self) -> &[Firing] {
        &self.trace
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn snapshot(&self) -> SimulationSnapshot {
        SimulationSnapshot {
            version: SNAPSHOT_VERSION,
            time: self.time,
            step: self.step,
            environment: self.environment.clone(),
            schedule: self.queue.to_schedule(),
            rng: RngState::capture(&self.rng),
        }
    }

    /// 执行一步: 弹出最早的反应, 应用其效果, 并只重新调度受影响的反应
    pub fn step(&mut self) -> SimGridResult<Option<Firing>> {
        let Some((time, index)) = self.queue.pop_min() else {
            return Ok(None);
        };
        if time < self.time {
            return Err(SimGridError::inconsistent(format!(
                "反应 {index} 的触发时间 {time} 早于当前时间 {}",
                self.time
            )));
        }
        self.time = time;
        let changes = self.reactions[index].execute(&mut self.environment)?;
        self.step += 1;

        let relinked: BTreeSet<NodeId> = changes
            .iter()
            .filter_map(|key| match key {
                StateKey::Neighborhood { node } => Some(*node),
                _ => None,
            })
            .collect();
        if !relinked.is_empty() {
            debug!("第 {} 步: {} 个节点的邻域发生变化", self.step, relinked.len());
        }

        let mut affected = self.graph.affected_by(&changes);
        affected.insert(index);
        for reaction_index in affected {
            let reaction = &self.reactions[reaction_index];
            self.graph
                .refresh(reaction_index, reaction.reads(&self.environment));
            let next = reaction.next_firing_time(self.time, &self.environment, &mut self.rng);
            self.queue.schedule(reaction_index, next);
        }

        let firing = Firing {
            step: self.step,
            time,
            reaction: index,
            node: self.reactions[index].node(),
        };
        if self.record_trace {
            self.trace.push(firing.clone());
        }
        Ok(Some(firing))
    }

    /// 运行至终止条件; 取消与截止时间只在步边界检查
    pub fn run(&mut self, control: &RunControl) -> SimGridResult<SimulationOutcome> {
        let reason = loop {
            if control.cancel.is_cancelled() {
                break TerminationReason::Cancelled;
            }
            if control.deadline.is_some_and(|d| Instant::now() >= d) {
                break TerminationReason::DeadlineExceeded;
            }
            if self
                .termination
                .max_steps
                .is_some_and(|max| self.step >= max)
            {
                break TerminationReason::StepHorizon;
            }
            match self.queue.peek() {
                None => break TerminationReason::Exhausted,
                Some((next, _)) => {
                    if let Some(max_time) = self.termination.max_time {
                        if next.as_f64() > max_time {
                            self.time = SimTime::new(max_time);
                            break TerminationReason::TimeHorizon;
                        }
                    }
                }
            }
            self.step()?;
        };
        info!(
            "仿真结束: {:?}, 时间 {}, 共 {} 步",
            reason, self.time, self.step
        );
        Ok(self.outcome(reason))
    }

    pub fn outcome(&self, reason: TerminationReason) -> SimulationOutcome {
        SimulationOutcome {
            final_time: self.time.as_f64(),
            steps: self.step,
            reason,
            node_count: self.environment.node_count(),
            molecule_totals: self.environment.molecule_totals(),
            firings: self.trace.clone(),
        }
    }

    fn check_reactions(
        environment: &Environment,
        reactions: &[Box<dyn Reaction>],
    ) -> SimGridResult<()> {
        for reaction in reactions {
            if !environment.contains_node(reaction.node()) {
                return Err(SimGridError::inconsistent(format!(
                    "反应 {} 引用了不存在的节点 {}",
                    reaction.name(),
                    reaction.node()
                )));
            }
        }
        Ok(())
    }
}
