// Worker Pool - exactly `concurrency` workers per queue

use super::constants::WORKER_INTERRUPT_GRACE;
use super::{shutdown_channel, ShutdownSender, Worker, WorkerDeps};
use crate::domain::WorkerInfo;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub struct WorkerPool {
    queue: String,
    shutdown: ShutdownSender,
    interrupt: ShutdownSender,
    handles: Vec<JoinHandle<()>>,
    infos: Vec<Arc<RwLock<WorkerInfo>>>,
}

impl WorkerPool {
    /// Spawn `size` workers for `queue`
    pub fn start(queue: &str, size: usize, deps: WorkerDeps) -> Self {
        let (shutdown, token) = shutdown_channel();
        let (interrupt, interrupt_token) = shutdown_channel();
        let mut handles = Vec::with_capacity(size);
        let mut infos = Vec::with_capacity(size);

        for index in 0..size {
            let worker = Worker::new(format!("{}-worker-{}", queue, index), queue, deps.clone());
            infos.push(worker.info_handle());
            let token = token.clone();
            let interrupt_token = interrupt_token.clone();
            handles.push(tokio::spawn(async move {
                worker.run(token, interrupt_token).await
            }));
        }

        info!(queue = %queue, workers = size, "Worker pool started");
        Self {
            queue: queue.to_string(),
            shutdown,
            interrupt,
            handles,
            infos,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Current status of every worker
    pub async fn snapshot(&self) -> Vec<WorkerInfo> {
        let mut workers = Vec::with_capacity(self.infos.len());
        for info in &self.infos {
            workers.push(info.read().await.clone());
        }
        workers
    }

    /// Workers currently executing a job
    pub async fn busy(&self) -> usize {
        let mut busy = 0;
        for info in &self.infos {
            if info.read().await.is_working() {
                busy += 1;
            }
        }
        busy
    }

    /// Signal shutdown and wait up to `grace` for in-flight jobs
    ///
    /// Jobs still running after `grace` are interrupted: their handler is
    /// aborted and the job goes back to `pending` at the head of its channel.
    /// Once this returns no handler of this pool is running.
    pub async fn stop(mut self, grace: Duration) {
        self.shutdown.shutdown();

        let finished = tokio::time::timeout(grace, join_all(self.handles.iter_mut())).await;
        if finished.is_err() {
            warn!(
                queue = %self.queue,
                grace_ms = grace.as_millis() as u64,
                "Workers did not stop within grace period, interrupting in-flight jobs"
            );
            self.interrupt.shutdown();

            // Handles already joined above must not be polled again
            let pending = self.handles.iter_mut().filter(|h| !h.is_finished());
            let released = tokio::time::timeout(WORKER_INTERRUPT_GRACE, join_all(pending)).await;
            if released.is_err() {
                error!(queue = %self.queue, "Workers ignored interrupt, aborting");
                for handle in &self.handles {
                    handle.abort();
                }
            }
        }
        info!(queue = %self.queue, "Worker pool stopped");
    }
}
