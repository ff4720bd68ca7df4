//! RPC Error Types
//!
//! Maps application errors to JSON-RPC error codes.

use conveyor_core::error::AppError;
use jsonrpsee::types::ErrorObjectOwned;

/// RPC Error Codes
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const NOT_FOUND: i32 = 4001;
    pub const CONFLICT: i32 = 4002;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const PERSISTENCE_ERROR: i32 = 5001;
    pub const EXECUTION_ERROR: i32 = 5002;
}

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    let (code, msg) = match err {
        AppError::Validation(msg) => (code::VALIDATION_ERROR, msg),
        AppError::Domain(e) => (code::VALIDATION_ERROR, e.to_string()),
        AppError::Serialization(e) => (code::VALIDATION_ERROR, e.to_string()),
        AppError::NotFound(msg) => (code::NOT_FOUND, msg),
        AppError::Conflict(msg) | AppError::InvalidState(msg) => (code::CONFLICT, msg),
        AppError::Persistence(msg) => (code::PERSISTENCE_ERROR, msg),
        AppError::Execution(e) => (code::EXECUTION_ERROR, e.to_string()),
        AppError::Config(msg) | AppError::Internal(msg) => (code::INTERNAL_ERROR, msg),
    };
    ErrorObjectOwned::owned(code, msg, None::<()>)
}
