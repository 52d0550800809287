//! # 确定性仿真引擎
//!
//! 每个Worker上运行的单实例仿真循环。引擎保证:
//!
//! - 反应按仿真时间严格递增触发, 时间相同时按反应插入序号打破平局
//! - 相同环境、部署与随机种子的两次运行产生完全相同的触发序列
//! - 每次触发后只重新调度读集合与本次变更集合相交的反应
//! - 节点移动触发邻域规则重算, 依赖邻域的反应随之失效并重新调度
//! - 取消与截止时间只在步边界处生效
//!
//! ## 状态流转
//!
//! ```text
//! pop(min) → execute → ChangeSet → DependencyGraph → reschedule
//! ```

pub mod deployment;
pub mod dependency;
pub mod environment;
pub mod neighborhood;
pub mod position;
pub mod queue;
pub mod reaction;
pub mod simulation;
pub mod snapshot;
pub mod spec;
pub mod time;

pub use deployment::{Circle, Deployment, Grid, Point};
pub use dependency::DependencyGraph;
pub use environment::{Environment, Molecule, NodeId};
pub use neighborhood::NeighborhoodRule;
pub use position::Position;
pub use queue::EventQueue;
pub use reaction::{
    Action, ChangeSet, Condition, Reaction, SimpleReaction, StateKey, TimeDistribution,
};
pub use simulation::{
    CancelFlag, Firing, RunControl, Simulation, SimulationOutcome, Termination, TerminationReason,
};
pub use snapshot::{RngState, SimulationSnapshot, SNAPSHOT_VERSION};
pub use spec::{DeploymentShape, DeploymentSpec, ReactionTemplate, SimulationSpec};
pub use time::SimTime;
