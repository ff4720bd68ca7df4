// Job lifecycle events consumed by external observers (logging, metrics)

use crate::domain::job::{Job, JobId};
use crate::domain::queue::QueueName;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobEventKind {
    JobAdded,
    JobCompleted,
    JobRetrying,
    JobFailed,
    JobCancelled,
}

impl JobEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobEventKind::JobAdded => "jobAdded",
            JobEventKind::JobCompleted => "jobCompleted",
            JobEventKind::JobRetrying => "jobRetrying",
            JobEventKind::JobFailed => "jobFailed",
            JobEventKind::JobCancelled => "jobCancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub kind: JobEventKind,
    pub job_id: JobId,
    pub queue_name: QueueName,
    pub job_type: String,
    pub timestamp: i64, // epoch ms
    pub attempts: u32,
    pub error: Option<String>,
    pub duration_ms: Option<i64>,
}

impl JobEvent {
    pub fn new(kind: JobEventKind, job: &Job, timestamp: i64) -> Self {
        Self {
            kind,
            job_id: job.id.clone(),
            queue_name: job.queue_name.clone(),
            job_type: job.job_type.as_str().to_string(),
            timestamp,
            attempts: job.attempts,
            error: job.last_error.clone(),
            duration_ms: job.duration_ms(),
        }
    }
}
