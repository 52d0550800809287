//! Worker端点接口
//!
//! 集群与调度器只通过此接口与Worker交互, 传输方式由实现决定。
//!
//! ## 约定
//!
//! - `submit` 在负载已达并发上限时立即返回 [`Submission::Rejected`], 不代表执行失败
//! - `status` 与 `cancel` 必须幂等, 以容忍消息丢失后的重复调用
//! - 取消是协作式的, 只在仿真步边界生效
//!
//! ## 实现示例
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use simgrid_core::traits::WorkerEndpoint;
//!
//! #[async_trait]
//! impl WorkerEndpoint for RemoteWorker {
//!     fn id(&self) -> &WorkerId {
//!         &self.id
//!     }
//!
//!     async fn submit(&self, job: JobSpec) -> SimGridResult<Submission> {
//!         self.client.post_job(job).await
//!     }
//!     // ...
//! }
//! ```

use async_trait::async_trait;
use simgrid_errors::SimGridResult;

use crate::models::{JobHandle, JobResult, JobSpec, JobStatus, Submission, WorkerCapacity, WorkerId};

#[async_trait]
pub trait WorkerEndpoint: Send + Sync {
    fn id(&self) -> &WorkerId;

    /// 端点地址, 仅用于展示
    fn address(&self) -> &str;

    async fn capacity(&self) -> SimGridResult<WorkerCapacity>;

    /// 健康探测, 成功时返回当前负载(运行中的作业数)
    async fn probe(&self) -> SimGridResult<usize>;

    async fn submit(&self, job: JobSpec) -> SimGridResult<Submission>;

    async fn status(&self, handle: &JobHandle) -> SimGridResult<JobStatus>;

    /// 等待作业结束
    async fn wait(&self, handle: &JobHandle) -> SimGridResult<JobResult>;

    async fn cancel(&self, handle: &JobHandle) -> SimGridResult<()>;

    /// 取消全部作业并释放资源, 重复调用无副作用
    async fn close(&self) -> SimGridResult<()>;
}
