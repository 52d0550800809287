//! # 作业分派与结果收集
//!
//! [`Dispatcher`] 在 `resolve` 得到的Worker集合上轮询分派作业, 遵守每个成员的并发上限,
//! 在重试预算内把失败的作业重新分配给其他成员, 并保证每个作业恰好交付一次。

pub mod dispatcher;
pub mod report;

pub use dispatcher::{Dispatcher, HISTORY_CAPACITY};
pub use report::{BatchReport, BatchStats, BatchSummary, DeliveryStatus, JobDelivery, JobSummary};
