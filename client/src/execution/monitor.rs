//! Waiting on an execution from a background thread.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread,
};

use utils::mpscutil;

use crate::{
    error::Error,
    execution::{ExecutionEvent, ExecutionEvents},
    result::ExecutionResult,
    transport::Status,
};

/// Latest known state of a monitored execution.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusUpdate {
    pub status: Status,
    pub percent_complete: u8,
    pub message: Option<String>,
}

/// Handle to a thread that polls an execution until it finishes.
pub struct Monitor {
    process_id: String,
    updates: mpsc::Receiver<StatusUpdate>,
    latest: Option<StatusUpdate>,
    continue_intent: Arc<AtomicBool>,
    worker: thread::JoinHandle<Result<ExecutionResult, Error>>,
}

impl Monitor {
    /// Moves `result` into a new thread that waits on it.
    pub fn spawn(mut result: ExecutionResult) -> Self {
        let process_id = result.process_id().to_string();
        let (sender, updates) = mpsc::channel();
        let continue_intent = Arc::new(AtomicBool::new(true));

        let mut events = ChannelEvents {
            sender,
            continue_intent: continue_intent.clone(),
            last: StatusUpdate {
                status: result.status(),
                percent_complete: result.percent_complete(),
                message: None,
            },
        };
        let worker = thread::spawn(move || {
            result.wait(&mut events)?;
            Ok(result)
        });

        Self {
            process_id,
            updates,
            latest: None,
            continue_intent,
            worker,
        }
    }

    /// The most recent update received from the monitor thread, if any.
    pub fn latest(&mut self) -> Option<&StatusUpdate> {
        if let Some(update) = mpscutil::latest(&self.updates) {
            self.latest = Some(update);
        }
        self.latest.as_ref()
    }

    /// Asks the monitor thread to cancel the execution and stop waiting.
    pub fn cancel(&self) {
        self.continue_intent.store(false, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Waits for the monitor thread to finish, returning the result.
    pub fn join(self) -> Result<ExecutionResult, Error> {
        self.worker.join().map_err(|_| Error::MonitorPanicked {
            process_id: self.process_id,
        })?
    }
}

/// Forwards execution events to a [Monitor].
struct ChannelEvents {
    sender: mpsc::Sender<StatusUpdate>,
    continue_intent: Arc<AtomicBool>,
    last: StatusUpdate,
}

impl ChannelEvents {
    fn send(&mut self, update: StatusUpdate) {
        self.last = update.clone();
        mpscutil::send_or_log_warning(&self.sender, "execution status", update);
    }
}

impl ExecutionEvents for ChannelEvents {
    fn on_event(&mut self, event: ExecutionEvent<'_>) {
        use ExecutionEvent::*;
        let update = match event {
            Progress {
                status,
                percent_complete,
                message,
            } => StatusUpdate {
                status,
                percent_complete,
                message: message.map(str::to_owned),
            },
            Completed => StatusUpdate {
                status: Status::Succeeded,
                percent_complete: 100,
                message: self.last.message.clone(),
            },
            Failed { status, .. } => StatusUpdate {
                status,
                ..self.last.clone()
            },
            Cancelled => StatusUpdate {
                status: Status::Cancelled,
                ..self.last.clone()
            },
        };
        self.send(update);
    }

    fn do_continue(&self) -> bool {
        self.continue_intent.load(Ordering::SeqCst)
    }
}
