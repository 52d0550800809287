//! 配置管理
//!
//! 配置按 默认值 → TOML文件 → `SIMGRID__*` 环境变量 的顺序合并, 加载后统一校验。
//!
//! ```toml
//! [cluster]
//! probe_interval_ms = 1000
//! failure_threshold = 3
//! selection_strategy = "greedy_descending"
//!
//! [dispatcher]
//! max_retries = 3
//!
//! [[worker_pool.workers]]
//! id = "local-1"
//! capacity_units = 4
//! max_concurrent_jobs = 2
//! ```

pub mod models;


pub use models::*;
