//! RPC Method Handlers
//!
//! Thin translation between JSON-RPC params and the QueueManager.

use crate::error::to_rpc_error;
use crate::types::{
    CancelResponse, ClearQueueRequest, ClearQueueResponse, JobIdRequest, ListJobsRequest,
    ListJobsResponse, PauseResponse, QueueConfigResponse, QueueListResponse, QueueRequest,
    RegisterQueueRequest, RemoveResponse, RestartResponse, StatsRequest, StatsResponse,
    SubmitRequest, SubmitResponse, UpdateQueueRequest, WorkersResponse,
};
use conveyor_core::application::{QueueManager, SubmitOptions};
use conveyor_core::domain::Job;
use conveyor_core::port::Pagination;
use jsonrpsee::types::ErrorObjectOwned;
use std::sync::Arc;
use tracing::debug;

type RpcResult<T> = Result<T, ErrorObjectOwned>;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    manager: Arc<QueueManager>,
}

impl RpcHandler {
    pub fn new(manager: Arc<QueueManager>) -> Self {
        Self { manager }
    }

    /// jobs.submit.v1
    pub async fn submit(&self, params: SubmitRequest) -> RpcResult<SubmitResponse> {
        let options = SubmitOptions {
            delay_ms: params.delay_ms,
        };
        let job_id = self
            .manager
            .submit(&params.queue, &params.job_type, params.payload, options)
            .await
            .map_err(to_rpc_error)?;

        Ok(SubmitResponse {
            job_id,
            status: conveyor_core::domain::JobStatus::Pending,
            queue: params.queue,
        })
    }

    /// jobs.status.v1
    pub async fn status(&self, params: JobIdRequest) -> RpcResult<Job> {
        self.manager
            .get_status(&params.job_id)
            .await
            .map_err(to_rpc_error)
    }

    /// jobs.cancel.v1
    pub async fn cancel(&self, params: JobIdRequest) -> RpcResult<CancelResponse> {
        let job = self
            .manager
            .cancel(&params.job_id)
            .await
            .map_err(to_rpc_error)?;

        Ok(CancelResponse {
            job_id: job.id,
            status: job.status,
            cancel_requested: job.cancel_requested,
        })
    }

    /// jobs.list.v1
    pub async fn list_jobs(&self, params: ListJobsRequest) -> RpcResult<ListJobsResponse> {
        let page = match params.limit {
            Some(limit) => Pagination::new(params.offset, limit),
            None => Pagination {
                offset: params.offset,
                ..Pagination::default()
            },
        };
        let jobs = self
            .manager
            .list_jobs(&params.filter, page)
            .await
            .map_err(to_rpc_error)?;

        debug!(count = jobs.len(), "jobs.list.v1");
        Ok(ListJobsResponse {
            jobs,
            offset: page.offset,
            limit: page.limit,
        })
    }

    /// queues.register.v1
    pub async fn register_queue(
        &self,
        params: RegisterQueueRequest,
    ) -> RpcResult<QueueConfigResponse> {
        self.manager
            .register_queue(&params.queue, params.config.clone())
            .await
            .map_err(to_rpc_error)?;

        Ok(QueueConfigResponse {
            queue: params.queue,
            config: params.config,
        })
    }

    /// queues.update.v1
    pub async fn update_queue(&self, params: UpdateQueueRequest) -> RpcResult<QueueConfigResponse> {
        let config = self
            .manager
            .update_queue(&params.queue, &params.patch)
            .await
            .map_err(to_rpc_error)?;

        Ok(QueueConfigResponse {
            queue: params.queue,
            config,
        })
    }

    /// queues.pause.v1
    pub async fn pause_queue(&self, params: QueueRequest) -> RpcResult<PauseResponse> {
        self.manager
            .pause_queue(&params.queue)
            .await
            .map_err(to_rpc_error)?;
        Ok(PauseResponse {
            queue: params.queue,
            paused: true,
        })
    }

    /// queues.resume.v1
    pub async fn resume_queue(&self, params: QueueRequest) -> RpcResult<PauseResponse> {
        self.manager
            .resume_queue(&params.queue)
            .await
            .map_err(to_rpc_error)?;
        Ok(PauseResponse {
            queue: params.queue,
            paused: false,
        })
    }

    /// queues.clear.v1
    pub async fn clear_queue(&self, params: ClearQueueRequest) -> RpcResult<ClearQueueResponse> {
        let cleared = self
            .manager
            .clear_queue(&params.queue, params.statuses)
            .await
            .map_err(to_rpc_error)?;

        Ok(ClearQueueResponse {
            queue: params.queue,
            cleared,
        })
    }

    /// queues.stats.v1
    pub async fn stats(&self, params: StatsRequest) -> RpcResult<StatsResponse> {
        self.manager
            .stats(params.queue.as_deref())
            .await
            .map_err(to_rpc_error)
    }

    /// queues.list.v1
    pub async fn list_queues(&self) -> RpcResult<QueueListResponse> {
        Ok(QueueListResponse {
            queues: self.manager.queues().await,
        })
    }

    /// queues.workers.v1
    pub async fn workers(&self, params: QueueRequest) -> RpcResult<WorkersResponse> {
        let workers = self
            .manager
            .workers(&params.queue)
            .await
            .map_err(to_rpc_error)?;
        Ok(WorkersResponse {
            queue: params.queue,
            workers,
        })
    }

    /// queues.restart.v1
    pub async fn restart_queue(&self, params: QueueRequest) -> RpcResult<RestartResponse> {
        let workers = self
            .manager
            .restart_pool(&params.queue)
            .await
            .map_err(to_rpc_error)?;
        Ok(RestartResponse {
            queue: params.queue,
            workers,
        })
    }

    /// queues.remove.v1
    pub async fn remove_queue(&self, params: QueueRequest) -> RpcResult<RemoveResponse> {
        self.manager
            .remove_queue(&params.queue)
            .await
            .map_err(to_rpc_error)?;
        Ok(RemoveResponse {
            queue: params.queue,
            removed: true,
        })
    }
}
