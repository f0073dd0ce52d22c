use crate::transport::{ExceptionDetail, Status};

/// Execution event emitted while waiting on a process.
#[derive(Debug)]
pub enum ExecutionEvent<'a> {
    /// A status update was received while the process is still running.
    Progress {
        status: Status,
        percent_complete: u8,
        message: Option<&'a str>,
    },
    /// The process succeeded, and no more events will follow.
    Completed,
    /// The process failed or was rejected, and no more events will follow.
    Failed {
        status: Status,
        exceptions: &'a [ExceptionDetail],
    },
    /// Waiting stopped because of a cancellation, and no more events will
    /// follow.
    Cancelled,
}

/// Trait to implement to receive notifications about execution progress, or
/// to cancel the execution early.
pub trait ExecutionEvents {
    fn on_event(&mut self, event: ExecutionEvent<'_>);
    fn do_continue(&self) -> bool;
}

/// Width of status messages in progress log lines.
const MESSAGE_WIDTH: usize = 50;

/// Reports progress through the `log` crate.
pub struct LogEvents {
    process_id: String,
}

impl LogEvents {
    pub fn new(process_id: &str) -> Self {
        Self {
            process_id: process_id.to_string(),
        }
    }
}

impl ExecutionEvents for LogEvents {
    fn on_event(&mut self, event: ExecutionEvent<'_>) {
        use ExecutionEvent::*;
        match event {
            Progress {
                percent_complete,
                message,
                ..
            } => {
                let message: String = message
                    .unwrap_or_default()
                    .chars()
                    .take(MESSAGE_WIDTH)
                    .collect();
                log::info!(
                    "{} [{percent_complete}/100] - {message}",
                    self.process_id
                );
            }
            Completed => log::info!("{} done.", self.process_id),
            Failed { .. } => log::warn!("{} failed.", self.process_id),
            Cancelled => log::info!("{} cancelled.", self.process_id),
        }
    }

    fn do_continue(&self) -> bool {
        true
    }
}
