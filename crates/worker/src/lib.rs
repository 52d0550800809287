//! # 本地Worker
//!
//! [`LocalWorker`] 在进程内实现 `WorkerEndpoint`: 每个作业占用一个并发槽位,
//! 在阻塞线程池中运行确定性引擎, 通过协作式取消标记和截止时间在步边界停止。

pub mod execution;
pub mod local_worker;

pub use execution::execute_job;
pub use local_worker::LocalWorker;
