use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use simgrid_errors::{SimGridError, SimGridResult};

use crate::environment::Environment;
use crate::neighborhood::NeighborhoodRule;
use crate::position::Position;

/// 初始放置: 产生有限的坐标集合, 可选地附带一个邻域规则
pub trait Deployment: Send + Sync {
    fn positions(&self, environment: &Environment) -> SimGridResult<Vec<Position>>;

    /// 部署应用到环境时要挂载的邻域规则
    fn neighborhood_rule(&self) -> Option<NeighborhoodRule> {
        None
    }
}

/// 单个坐标上的单个节点
#[derive(Debug, Clone)]
pub struct Point {
    coordinates: Vec<f64>,
    rule: Option<NeighborhoodRule>,
}

impl Point {
    pub fn new(coordinates: Vec<f64>) -> Self {
        Self {
            coordinates,
            rule: None,
        }
    }

    pub fn with_rule(mut self, rule: NeighborhoodRule) -> Self {
        self.rule = Some(rule);
        self
    }
}

impl Deployment for Point {
    fn positions(&self, environment: &Environment) -> SimGridResult<Vec<Position>> {
        Ok(vec![environment.make_position(&self.coordinates)?])
    }

    fn neighborhood_rule(&self) -> Option<NeighborhoodRule> {
        self.rule.clone()
    }
}

/// 单个网格部署允许的最大节点数
pub const MAX_GRID_NODES: usize = 50_000_000;

/// 二维规则网格, 包含两端端点
#[derive(Debug, Clone)]
pub struct Grid {
    start: [f64; 2],
    step: [f64; 2],
    steps: [usize; 2],
    rule: Option<NeighborhoodRule>,
}

impl Grid {
    pub fn new(start: [f64; 2], end: [f64; 2], step: [f64; 2]) -> SimGridResult<Self> {
        if step.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(SimGridError::config_error(format!(
                "网格步长必须为正数: {step:?}"
            )));
        }
        if start.iter().chain(end.iter()).any(|c| !c.is_finite()) {
            return Err(SimGridError::config_error(format!(
                "网格坐标必须为有限值: {start:?} → {end:?}"
            )));
        }
        if start.iter().zip(end.iter()).any(|(s, e)| e < s) {
            return Err(SimGridError::config_error(format!(
                "网格终点 {end:?} 不能小于起点 {start:?}"
            )));
        }
        let too_large = || {
            SimGridError::config_error(format!(
                "网格 {start:?} → {end:?} (步长 {step:?}) 超过 {MAX_GRID_NODES} 个节点"
            ))
        };
        let nx = Self::steps_along(start[0], end[0], step[0]).ok_or_else(too_large)?;
        let ny = Self::steps_along(start[1], end[1], step[1]).ok_or_else(too_large)?;
        match nx.checked_mul(ny) {
            Some(total) if total <= MAX_GRID_NODES => Ok(Self {
                start,
                step,
                steps: [nx, ny],
                rule: None,
            }),
            _ => Err(too_large()),
        }
    }

    pub fn with_rule(mut self, rule: NeighborhoodRule) -> Self {
        self.rule = Some(rule);
        self
    }

    /// 单个轴上的点数; 超出上限时为 None
    fn steps_along(start: f64, end: f64, step: f64) -> Option<usize> {
        // 容忍浮点误差, 使终点被包含
        let span = ((end - start) / step + 1e-9).floor();
        if !span.is_finite() || span >= MAX_GRID_NODES as f64 {
            return None;
        }
        (span as usize).checked_add(1)
    }

    pub fn node_count(&self) -> usize {
        self.steps[0] * self.steps[1]
    }
}

impl Deployment for Grid {
    fn positions(&self, environment: &Environment) -> SimGridResult<Vec<Position>> {
        let [nx, ny] = self.steps;
        let mut positions = Vec::with_capacity(nx * ny);
        for i in 0..nx {
            for j in 0..ny {
                let x = self.start[0] + i as f64 * self.step[0];
                let y = self.start[1] + j as f64 * self.step[1];
                positions.push(environment.make_position(&[x, y])?);
            }
        }
        Ok(positions)
    }

    fn neighborhood_rule(&self) -> Option<NeighborhoodRule> {
        self.rule.clone()
    }
}

/// 圆盘内均匀随机分布的 `count` 个节点, 由 `seed` 决定
#[derive(Debug, Clone)]
pub struct Circle {
    count: usize,
    center: [f64; 2],
    radius: f64,
    seed: u64,
    rule: Option<NeighborhoodRule>,
}

impl Circle {
    pub fn new(count: usize, center: [f64; 2], radius: f64, seed: u64) -> Self {
        Self {
            count,
            center,
            radius,
            seed,
            rule: None,
        }
    }

    pub fn with_rule(mut self, rule: NeighborhoodRule) -> Self {
        self.rule = Some(rule);
        self
    }
}

impl Deployment for Circle {
    fn positions(&self, environment: &Environment) -> SimGridResult<Vec<Position>> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        (0..self.count)
            .map(|_| {
                let r = self.radius * rng.random::<f64>().sqrt();
                let theta = std::f64::consts::TAU * rng.random::<f64>();
                environment.make_position(&[
                    self.center[0] + r * theta.cos(),
                    self.center[1] + r * theta.sin(),
                ])
            })
            .collect()
    }

    fn neighborhood_rule(&self) -> Option<NeighborhoodRule> {
        self.rule.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point() {
        let env = Environment::new(2);
        let positions = Point::new(vec![1.0, 2.0]).positions(&env).unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].coordinates(), &[1.0, 2.0]);
        assert!(Point::new(vec![1.0]).positions(&env).is_err());
        assert!(Point::new(vec![0.0, 0.0]).neighborhood_rule().is_none());
    }

    #[test]
    fn test_grid_includes_end_points() {
        let env = Environment::new(2);
        let grid = Grid::new([0.0, 0.0], [1.0, 0.3], [0.5, 0.1]).unwrap();
        assert_eq!(grid.node_count(), 3 * 4);
        let positions = grid.positions(&env).unwrap();
        assert_eq!(positions.len(), grid.node_count());
        assert!(Grid::new([0.0, 0.0], [1.0, 1.0], [0.0, 1.0]).is_err());
    }

    #[test]
    fn test_oversized_grid_is_rejected() {
        let huge = Grid::new([0.0, 0.0], [1e300, 0.0], [1.0, 1.0]);
        assert!(matches!(huge, Err(SimGridError::Configuration(_))));

        // 每个轴都在上限内, 乘积超出
        let wide = Grid::new([0.0, 0.0], [99_999.0, 99_999.0], [1.0, 1.0]);
        assert!(matches!(wide, Err(SimGridError::Configuration(_))));

        assert!(Grid::new([0.0, f64::NAN], [1.0, 1.0], [1.0, 1.0]).is_err());
        let edge = Grid::new([0.0, 0.0], [4_999_999.0, 9.0], [1.0, 1.0]).unwrap();
        assert_eq!(edge.node_count(), MAX_GRID_NODES);
    }

    #[test]
    fn test_circle_is_reproducible_and_bounded() {
        let env = Environment::new(2);
        let circle = Circle::new(50, [1.0, 1.0], 2.0, 42)
            .with_rule(NeighborhoodRule::ConnectWithinDistance { range: 0.5 });
        let first = circle.positions(&env).unwrap();
        let second = circle.positions(&env).unwrap();
        assert_eq!(first, second);
        let center = env.make_position(&[1.0, 1.0]).unwrap();
        assert!(first.iter().all(|p| p.distance_to(&center) <= 2.0));
        assert!(circle.neighborhood_rule().is_some());

        let other = Circle::new(50, [1.0, 1.0], 2.0, 43).positions(&env).unwrap();
        assert_ne!(first, other);
    }
}
