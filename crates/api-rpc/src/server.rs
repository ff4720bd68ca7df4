//! JSON-RPC Server
//!
//! JSON-RPC 2.0 over HTTP/WebSocket on localhost.

use crate::handler::RpcHandler;
use crate::types::{
    ClearQueueRequest, JobIdRequest, ListJobsRequest, QueueRequest, RegisterQueueRequest,
    StatsRequest, SubmitRequest, UpdateQueueRequest,
};
use conveyor_core::application::QueueManager;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9627;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    /// 0 picks a free port
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// Registers one method whose params deserialize into `$req`
macro_rules! register_method {
    ($module:expr, $handler:expr, $name:literal, $req:ty, $method:ident) => {{
        let handler = $handler.clone();
        $module
            .register_async_method($name, move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: $req = params.parse()?;
                    handler.$method(req).await
                }
            })
            .map_err(|e| e.to_string())?;
    }};
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, manager: Arc<QueueManager>) -> Self {
        Self {
            config,
            handler: Arc::new(RpcHandler::new(manager)),
        }
    }

    /// Start the JSON-RPC server
    ///
    /// Returns the bound address together with the handle used to stop it.
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle), String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;
        let local_addr = server
            .local_addr()
            .map_err(|e| format!("Failed to read bound address: {}", e))?;

        let module = self.build_module()?;

        info!(addr = %local_addr, "JSON-RPC server started");

        let handle = server.start(module);
        Ok((local_addr, handle))
    }

    fn build_module(&self) -> Result<RpcModule<()>, String> {
        let mut module = RpcModule::new(());
        let handler = &self.handler;

        // Jobs
        register_method!(module, handler, "jobs.submit.v1", SubmitRequest, submit);
        register_method!(module, handler, "jobs.status.v1", JobIdRequest, status);
        register_method!(module, handler, "jobs.cancel.v1", JobIdRequest, cancel);
        register_method!(module, handler, "jobs.list.v1", ListJobsRequest, list_jobs);

        // Queues
        register_method!(module, handler, "queues.register.v1", RegisterQueueRequest, register_queue);
        register_method!(module, handler, "queues.update.v1", UpdateQueueRequest, update_queue);
        register_method!(module, handler, "queues.pause.v1", QueueRequest, pause_queue);
        register_method!(module, handler, "queues.resume.v1", QueueRequest, resume_queue);
        register_method!(module, handler, "queues.clear.v1", ClearQueueRequest, clear_queue);
        register_method!(module, handler, "queues.stats.v1", StatsRequest, stats);
        register_method!(module, handler, "queues.workers.v1", QueueRequest, workers);
        register_method!(module, handler, "queues.restart.v1", QueueRequest, restart_queue);
        register_method!(module, handler, "queues.remove.v1", QueueRequest, remove_queue);

        let list_handler = handler.clone();
        module
            .register_async_method("queues.list.v1", move |_, _, _| {
                let handler = list_handler.clone();
                async move { handler.list_queues().await }
            })
            .map_err(|e| e.to_string())?;

        Ok(module)
    }
}
