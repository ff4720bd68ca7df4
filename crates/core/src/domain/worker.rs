// Worker Domain Model (in-memory only, never persisted)

use crate::domain::job::JobId;
use crate::domain::queue::QueueName;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Idle,
    Working,
}

/// Snapshot of one worker in a queue's pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub id: String,
    pub queue_name: QueueName,
    pub status: WorkerStatus,
    pub current_job_id: Option<JobId>,
}

impl WorkerInfo {
    pub fn idle(id: impl Into<String>, queue_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            queue_name: queue_name.into(),
            status: WorkerStatus::Idle,
            current_job_id: None,
        }
    }

    pub fn start_job(&mut self, job_id: &str) {
        self.status = WorkerStatus::Working;
        self.current_job_id = Some(job_id.to_string());
    }

    pub fn finish_job(&mut self) {
        self.status = WorkerStatus::Idle;
        self.current_job_id = None;
    }

    pub fn is_working(&self) -> bool {
        self.status == WorkerStatus::Working
    }
}
