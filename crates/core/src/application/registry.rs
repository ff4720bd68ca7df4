// Queue Registry - named queues and their configuration

use crate::domain::{validate_queue_name, QueueConfig, QueueConfigPatch, QueueName};
use crate::error::{AppError, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Map of queue name to configuration, safe for concurrent readers
#[derive(Default)]
pub struct QueueRegistry {
    queues: RwLock<HashMap<QueueName, QueueConfig>>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new queue
    ///
    /// # Errors
    /// - `AppError::Validation` if the name is taken, malformed, or the config is invalid
    pub async fn register(&self, name: &str, config: QueueConfig) -> Result<()> {
        validate_queue_name(name).map_err(|e| AppError::Validation(e.to_string()))?;
        config
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let mut queues = self.queues.write().await;
        if queues.contains_key(name) {
            return Err(AppError::Validation(format!(
                "queue '{}' is already registered",
                name
            )));
        }

        info!(
            queue = %name,
            concurrency = config.concurrency,
            retry_attempts = config.retry_attempts,
            retry_delay_ms = config.retry_delay_ms,
            priority = %config.priority,
            "Queue registered"
        );
        queues.insert(name.to_string(), config);
        Ok(())
    }

    /// Merge a partial update into an existing queue's configuration
    ///
    /// Retry settings apply to the next retry decision. A concurrency change
    /// only takes effect when the queue's worker pool is restarted.
    pub async fn update(&self, name: &str, patch: &QueueConfigPatch) -> Result<QueueConfig> {
        let mut queues = self.queues.write().await;
        let current = queues
            .get(name)
            .ok_or_else(|| AppError::NotFound(format!("Queue {} not found", name)))?;

        let next = current.merged(patch);
        next.validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        if next.concurrency != current.concurrency {
            warn!(
                queue = %name,
                from = current.concurrency,
                to = next.concurrency,
                "Concurrency change applies after the worker pool restarts"
            );
        }

        queues.insert(name.to_string(), next.clone());
        info!(queue = %name, "Queue configuration updated");
        Ok(next)
    }

    /// Pause a queue; returns false if it was already paused
    pub async fn pause(&self, name: &str) -> Result<bool> {
        self.set_paused(name, true).await
    }

    /// Resume a queue; returns false if it was not paused
    pub async fn resume(&self, name: &str) -> Result<bool> {
        self.set_paused(name, false).await
    }

    async fn set_paused(&self, name: &str, paused: bool) -> Result<bool> {
        let mut queues = self.queues.write().await;
        let config = queues
            .get_mut(name)
            .ok_or_else(|| AppError::NotFound(format!("Queue {} not found", name)))?;

        if config.paused == paused {
            return Ok(false);
        }
        config.paused = paused;
        info!(queue = %name, paused, "Queue pause state changed");
        Ok(true)
    }

    /// Remove a queue, returning its last configuration
    pub async fn remove(&self, name: &str) -> Result<QueueConfig> {
        self.queues
            .write()
            .await
            .remove(name)
            .ok_or_else(|| AppError::NotFound(format!("Queue {} not found", name)))
    }

    pub async fn get(&self, name: &str) -> Option<QueueConfig> {
        self.queues.read().await.get(name).cloned()
    }

    /// Fetch a queue's config or fail with NotFound
    pub async fn require(&self, name: &str) -> Result<QueueConfig> {
        self.get(name)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Queue {} not found", name)))
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.queues.read().await.contains_key(name)
    }

    /// Unknown queues report false
    pub async fn is_paused(&self, name: &str) -> bool {
        self.queues
            .read()
            .await
            .get(name)
            .map(|c| c.paused)
            .unwrap_or(false)
    }

    /// Registered queue names, sorted
    pub async fn names(&self) -> Vec<QueueName> {
        let mut names: Vec<_> = self.queues.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Copy of every queue's configuration, sorted by name
    pub async fn snapshot(&self) -> Vec<(QueueName, QueueConfig)> {
        let mut entries: Vec<_> = self
            .queues
            .read()
            .await
            .iter()
            .map(|(name, config)| (name.clone(), config.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}
