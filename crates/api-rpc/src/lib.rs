//! JSON-RPC API Layer
//!
//! JSON-RPC 2.0 server exposing the Conveyor queue manager:
//! `jobs.*.v1` for submitting and inspecting jobs, `queues.*.v1` for queue administration.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use handler::RpcHandler;
pub use server::{RpcServer, RpcServerConfig};
