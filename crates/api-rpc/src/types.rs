//! RPC Request/Response Types
//!
//! JSON-RPC method parameters and results.

use conveyor_core::application::{QueueStats, QueueSummary};
use conveyor_core::domain::{Job, JobStatus, QueueConfig, QueueConfigPatch, WorkerInfo};
use conveyor_core::port::JobFilter;
use serde::{Deserialize, Serialize};

/// jobs.submit.v1 - Submit a job
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub queue: String,
    pub job_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub queue: String,
}

/// jobs.status.v1 / jobs.cancel.v1
#[derive(Debug, Deserialize)]
pub struct JobIdRequest {
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub job_id: String,
    pub status: JobStatus,
    /// True when the job was running and only a cancel request was recorded
    pub cancel_requested: bool,
}

/// jobs.list.v1 - List jobs
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListJobsRequest {
    pub filter: JobFilter,
    pub offset: u64,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<Job>,
    pub offset: u64,
    pub limit: u64,
}

/// queues.pause.v1 / queues.resume.v1 / queues.workers.v1 / queues.remove.v1 / queues.restart.v1
#[derive(Debug, Deserialize)]
pub struct QueueRequest {
    pub queue: String,
}

/// queues.register.v1
#[derive(Debug, Deserialize)]
pub struct RegisterQueueRequest {
    pub queue: String,
    #[serde(default)]
    pub config: QueueConfig,
}

/// queues.update.v1
#[derive(Debug, Deserialize)]
pub struct UpdateQueueRequest {
    pub queue: String,
    pub patch: QueueConfigPatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfigResponse {
    pub queue: String,
    pub config: QueueConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PauseResponse {
    pub queue: String,
    pub paused: bool,
}

/// queues.clear.v1
#[derive(Debug, Deserialize)]
pub struct ClearQueueRequest {
    pub queue: String,
    /// Omitted: every non-terminal status
    #[serde(default)]
    pub statuses: Option<Vec<JobStatus>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearQueueResponse {
    pub queue: String,
    pub cleared: u64,
}

/// queues.stats.v1
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StatsRequest {
    pub queue: Option<String>,
}

pub type StatsResponse = QueueStats;

#[derive(Debug, Clone, Serialize)]
pub struct QueueListResponse {
    pub queues: Vec<QueueSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkersResponse {
    pub queue: String,
    pub workers: Vec<WorkerInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartResponse {
    pub queue: String,
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveResponse {
    pub queue: String,
    pub removed: bool,
}
