use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::error;

use simgrid_core::traits::Cluster;
use simgrid_errors::SimGridResult;

/// 在作用域内使用集群, 任何退出路径(成功、错误、panic)都会关闭集群
///
/// panic 会在关闭之后重新抛出。闭包返回的错误优先于关闭时的错误。
pub async fn with_cluster<C, F, Fut, T>(cluster: Arc<C>, body: F) -> SimGridResult<T>
where
    C: Cluster + ?Sized,
    F: FnOnce(Arc<C>) -> Fut,
    Fut: Future<Output = SimGridResult<T>>,
{
    let outcome = AssertUnwindSafe(body(cluster.clone())).catch_unwind().await;
    let closed = cluster.close().await;
    match outcome {
        Ok(result) => {
            let value = result?;
            closed?;
            Ok(value)
        }
        Err(panic) => {
            if let Err(e) = closed {
                error!("panic后关闭集群失败: {}", e);
            }
            std::panic::resume_unwind(panic)
        }
    }
}
