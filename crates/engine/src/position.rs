use serde::{Deserialize, Serialize};

/// 固定维度的不可变坐标
///
/// 只能通过 [`crate::Environment::make_position`] 创建, 保证同一环境中的
/// 所有坐标维度一致。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    coordinates: Vec<f64>,
}

impl Position {
    pub(crate) fn from_coordinates(coordinates: Vec<f64>) -> Self {
        Self { coordinates }
    }

    pub fn coordinates(&self) -> &[f64] {
        &self.coordinates
    }

    pub fn dimensions(&self) -> usize {
        self.coordinates.len()
    }

    /// 欧氏距离
    pub fn distance_to(&self, other: &Position) -> f64 {
        self.coordinates
            .iter()
            .zip(other.coordinates.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
    }

    pub(crate) fn translated(&self, delta: &[f64]) -> Position {
        Position {
            coordinates: self
                .coordinates
                .iter()
                .zip(delta.iter())
                .map(|(c, d)| c + d)
                .collect(),
        }
    }
}
