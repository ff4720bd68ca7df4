// Panic isolation for handler executions
use tokio::task::JoinError;
use tracing::error;

/// How a spawned handler task ended abnormally
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbnormalExit {
    /// The handler panicked; carries the panic message
    Panicked(String),
    /// The task was aborted (timeout or pool teardown)
    Aborted,
}

/// Classify a JoinError from a handler task
///
/// A panic inside a spawned task is caught by the runtime and surfaced here,
/// so a misbehaving handler never takes its worker (or the process) down.
pub fn classify_join_error(err: JoinError) -> AbnormalExit {
    if err.is_cancelled() {
        return AbnormalExit::Aborted;
    }

    match err.try_into_panic() {
        Ok(panic_info) => {
            let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };

            error!(panic_msg = %panic_msg, "Job handler panicked");
            AbnormalExit::Panicked(panic_msg)
        }
        Err(_) => AbnormalExit::Aborted,
    }
}
