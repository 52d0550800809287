use std::collections::BTreeSet;
use std::fmt;

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use simgrid_errors::{SimGridError, SimGridResult};

use crate::environment::{Environment, Molecule, NodeId};
use crate::time::SimTime;

/// 环境状态中可被读写的最小单元, 依赖图以此为键
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateKey {
    Concentration { node: NodeId, molecule: Molecule },
    Position { node: NodeId },
    Neighborhood { node: NodeId },
}

impl StateKey {
    pub fn concentration(node: NodeId, molecule: &Molecule) -> Self {
        StateKey::Concentration {
            node,
            molecule: molecule.clone(),
        }
    }
}

/// 一次反应执行实际写入的状态
pub type ChangeSet = BTreeSet<StateKey>;

/// 带时间触发的事件
///
/// 具体语义由上层的incarnation提供, 引擎只依赖读集合、下次触发时间与执行结果。
pub trait Reaction: Send + fmt::Debug {
    fn name(&self) -> &str;

    fn node(&self) -> NodeId;

    /// 当前环境下的读集合; 邻域变化后会被重新计算
    fn reads(&self, environment: &Environment) -> BTreeSet<StateKey>;

    /// `None` 表示当前不可触发
    fn next_firing_time(
        &self,
        now: SimTime,
        environment: &Environment,
        rng: &mut dyn RngCore,
    ) -> Option<SimTime>;

    fn execute(&mut self, environment: &mut Environment) -> SimGridResult<ChangeSet>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimeDistribution {
    /// 指数分布间隔, 参数为速率
    Exponential { rate: f64 },
    /// 固定周期
    DiracComb { period: f64 },
}

impl TimeDistribution {
    fn sample(&self, now: SimTime, rng: &mut dyn RngCore) -> Option<SimTime> {
        match self {
            TimeDistribution::Exponential { rate } if *rate > 0.0 => {
                let u: f64 = rng.random();
                Some(now.after(-(1.0 - u).ln() / rate))
            }
            TimeDistribution::DiracComb { period } if *period > 0.0 => Some(now.after(*period)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    MoleculeAtLeast { molecule: Molecule, amount: f64 },
    MoleculeBelow { molecule: Molecule, amount: f64 },
    HasNeighbors,
    /// 至少一个邻居持有不少于 `amount` 的分子
    NeighborHas { molecule: Molecule, amount: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Change { molecule: Molecule, delta: f64 },
    Set { molecule: Molecule, value: f64 },
    /// 向每个邻居发送 `amount`, 本节点扣除对应总量
    SendToNeighbors { molecule: Molecule, amount: f64 },
    MoveBy { delta: Vec<f64> },
}

/// 条件/动作组合的通用反应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleReaction {
    pub name: String,
    pub node: NodeId,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<Action>,
    pub distribution: TimeDistribution,
}

impl SimpleReaction {
    pub fn new<S: Into<String>>(name: S, node: NodeId, distribution: TimeDistribution) -> Self {
        Self {
            name: name.into(),
            node,
            conditions: Vec::new(),
            actions: Vec::new(),
            distribution,
        }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn then(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    fn neighbors(&self, environment: &Environment) -> Vec<NodeId> {
        environment
            .neighbors(self.node)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    fn is_enabled(&self, environment: &Environment) -> bool {
        if !environment.contains_node(self.node) {
            return false;
        }
        self.conditions.iter().all(|condition| match condition {
            Condition::MoleculeAtLeast { molecule, amount } => {
                environment.concentration(self.node, molecule) >= *amount
            }
            Condition::MoleculeBelow { molecule, amount } => {
                environment.concentration(self.node, molecule) < *amount
            }
            Condition::HasNeighbors => !self.neighbors(environment).is_empty(),
            Condition::NeighborHas { molecule, amount } => self
                .neighbors(environment)
                .iter()
                .any(|n| environment.concentration(*n, molecule) >= *amount),
        })
    }
}

impl Reaction for SimpleReaction {
    fn name(&self) -> &str {
        &self.name
    }

    fn node(&self) -> NodeId {
        self.node
    }

    fn reads(&self, environment: &Environment) -> BTreeSet<StateKey> {
        let mut reads = BTreeSet::new();
        for condition in &self.conditions {
            match condition {
                Condition::MoleculeAtLeast { molecule, .. }
                | Condition::MoleculeBelow { molecule, .. } => {
                    reads.insert(StateKey::concentration(self.node, molecule));
                }
                Condition::HasNeighbors => {
                    reads.insert(StateKey::Neighborhood { node: self.node });
                }
                Condition::NeighborHas { molecule, .. } => {
                    reads.insert(StateKey::Neighborhood { node: self.node });
                    for neighbor in self.neighbors(environment) {
                        reads.insert(StateKey::concentration(neighbor, molecule));
                    }
                }
            }
        }
        reads
    }

    fn next_firing_time(
        &self,
        now: SimTime,
        environment: &Environment,
        rng: &mut dyn RngCore,
    ) -> Option<SimTime> {
        if !self.is_enabled(environment) {
            return None;
        }
        self.distribution.sample(now, rng)
    }

    fn execute(&mut self, environment: &mut Environment) -> SimGridResult<ChangeSet> {
        if !environment.contains_node(self.node) {
            return Err(SimGridError::inconsistent(format!(
                "反应 {} 所在节点 {} 不存在",
                self.name, self.node
            )));
        }
        let mut changes = ChangeSet::new();
        for action in &self.actions {
            match action {
                Action::Change { molecule, delta } => {
                    let value = environment.concentration(self.node, molecule) + delta;
                    environment.set_concentration(self.node, molecule.clone(), value)?;
                    changes.insert(StateKey::concentration(self.node, molecule));
                }
                Action::Set { molecule, value } => {
                    environment.set_concentration(self.node, molecule.clone(), *value)?;
                    changes.insert(StateKey::concentration(self.node, molecule));
                }
                Action::SendToNeighbors { molecule, amount } => {
                    let neighbors = self.neighbors(environment);
                    if neighbors.is_empty() {
                        continue;
                    }
                    let remaining = environment.concentration(self.node, molecule)
                        - amount * neighbors.len() as f64;
                    environment.set_concentration(self.node, molecule.clone(), remaining)?;
                    changes.insert(StateKey::concentration(self.node, molecule));
                    for neighbor in neighbors {
                        let value = environment.concentration(neighbor, molecule) + amount;
                        environment.set_concentration(neighbor, molecule.clone(), value)?;
                        changes.insert(StateKey::concentration(neighbor, molecule));
                    }
                }
                Action::MoveBy { delta } => {
                    let relinked = environment.move_node_by(self.node, delta)?;
                    changes.insert(StateKey::Position { node: self.node });
                    changes.extend(
                        relinked
                            .into_iter()
                            .map(|node| StateKey::Neighborhood { node }),
                    );
                }
            }
        }
        Ok(changes)
    }
}
