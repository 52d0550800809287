use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use simgrid_errors::{SimGridError, SimGridResult};
use tracing::debug;

use crate::deployment::{Circle, Deployment, Grid, Point};
use crate::environment::{Environment, Molecule, NodeId};
use crate::neighborhood::NeighborhoodRule;
use crate::reaction::{Action, Condition, Reaction, SimpleReaction, TimeDistribution};
use crate::simulation::{Simulation, Termination};

/// 可跨进程传输的仿真描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSpec {
    pub dimensions: usize,
    #[serde(default)]
    pub neighborhood: Option<NeighborhoodRule>,
    pub deployments: Vec<DeploymentSpec>,
    #[serde(default)]
    pub reactions: Vec<ReactionTemplate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentSpec {
    pub shape: DeploymentShape,
    #[serde(default)]
    pub molecules: BTreeMap<Molecule, f64>,
    #[serde(default)]
    pub neighborhood: Option<NeighborhoodRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeploymentShape {
    Point {
        coordinates: Vec<f64>,
    },
    Grid {
        start: [f64; 2],
        end: [f64; 2],
        step: [f64; 2],
    },
    Circle {
        count: usize,
        center: [f64; 2],
        radius: f64,
        seed: u64,
    },
}

/// 反应模板, 按部署实例化到每个节点上
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionTemplate {
    pub name: String,
    /// 目标部署序号, 缺省时作用于所有节点
    #[serde(default)]
    pub deployment: Option<usize>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<Action>,
    pub distribution: TimeDistribution,
}

impl DeploymentSpec {
    fn to_deployment(&self) -> SimGridResult<Box<dyn Deployment>> {
        let deployment: Box<dyn Deployment> = match (&self.shape, self.neighborhood.clone()) {
            (DeploymentShape::Point { coordinates }, rule) => {
                let point = Point::new(coordinates.clone());
                Box::new(match rule {
                    Some(rule) => point.with_rule(rule),
                    None => point,
                })
            }
            (DeploymentShape::Grid { start, end, step }, rule) => {
                let grid = Grid::new(*start, *end, *step)?;
                Box::new(match rule {
                    Some(rule) => grid.with_rule(rule),
                    None => grid,
                })
            }
            (
                DeploymentShape::Circle {
                    count,
                    center,
                    radius,
                    seed,
                },
                rule,
            ) => {
                let circle = Circle::new(*count, *center, *radius, *seed);
                Box::new(match rule {
                    Some(rule) => circle.with_rule(rule),
                    None => circle,
                })
            }
        };
        Ok(deployment)
    }

    pub fn expected_nodes(&self) -> u64 {
        match &self.shape {
            DeploymentShape::Point { .. } => 1,
            DeploymentShape::Grid { start, end, step } => Grid::new(*start, *end, *step)
                .map(|g| g.node_count() as u64)
                .unwrap_or(0),
            DeploymentShape::Circle { count, .. } => *count as u64,
        }
    }
}

impl SimulationSpec {
    /// 节点总数, 供复杂度估算使用
    pub fn node_count(&self) -> u64 {
        self.deployments
            .iter()
            .map(DeploymentSpec::expected_nodes)
            .fold(0, u64::saturating_add)
    }

    /// 平均每个节点上的反应数, 向上取整
    pub fn reactions_per_node(&self) -> u64 {
        let nodes = self.node_count();
        if nodes == 0 {
            return 0;
        }
        let instantiated: u64 = self
            .reactions
            .iter()
            .map(|template| match template.deployment {
                Some(index) => self
                    .deployments
                    .get(index)
                    .map(DeploymentSpec::expected_nodes)
                    .unwrap_or(0),
                None => nodes,
            })
            .fold(0, u64::saturating_add);
        instantiated.div_ceil(nodes)
    }

    pub fn build_environment(&self) -> SimGridResult<(Environment, Vec<Vec<NodeId>>)> {
        let mut environment =
            Environment::with_rule(self.dimensions, self.neighborhood.clone().unwrap_or_default());
        let mut placed = Vec::with_capacity(self.deployments.len());
        for spec in &self.deployments {
            let deployment = spec.to_deployment()?;
            placed.push(environment.apply_deployment(deployment.as_ref(), &spec.molecules)?);
        }
        Ok((environment, placed))
    }

    pub fn build_reactions(&self, placed: &[Vec<NodeId>]) -> SimGridResult<Vec<Box<dyn Reaction>>> {
        let mut reactions: Vec<Box<dyn Reaction>> = Vec::new();
        for template in &self.reactions {
            let targets: Vec<NodeId> = match template.deployment {
                Some(index) => placed
                    .get(index)
                    .ok_or_else(|| {
                        SimGridError::config_error(format!(
                            "反应模板 {} 引用了不存在的部署 {index}",
                            template.name
                        ))
                    })?
                    .clone(),
                None => placed.iter().flatten().copied().collect(),
            };
            for node in targets {
                reactions.push(Box::new(SimpleReaction {
                    name: template.name.clone(),
                    node,
                    conditions: template.conditions.clone(),
                    actions: template.actions.clone(),
                    distribution: template.distribution.clone(),
                }));
            }
        }
        Ok(reactions)
    }

    pub fn build(&self, seed: u64, termination: Termination) -> SimGridResult<Simulation> {
        let (environment, placed) = self.build_environment()?;
        let reactions = self.build_reactions(&placed)?;
        debug!(
            "根据描述构建仿真: {} 个节点, {} 个反应",
            environment.node_count(),
            reactions.len()
        );
        Simulation::new(environment, reactions, seed, termination)
    }
}
