//! # SimGrid 核心抽象
//!
//! 分布式执行层的共享模型与接口:
//!
//! - **models**: 复杂度、Worker信息、作业与结果、Worker集合快照
//! - **traits**: `WorkerEndpoint`、`Cluster`、`WorkerSelectionStrategy`、`ComplexityEstimator`
//! - **estimator**: 默认复杂度估算器
//! - **config**: 应用配置加载与校验

pub mod config;
pub mod estimator;
pub mod models;
pub mod traits;

pub use crate::config::AppConfig;
pub use estimator::DefaultComplexityEstimator;
pub use models::*;
pub use traits::*;

pub use simgrid_errors::{SimGridError, SimGridResult};
