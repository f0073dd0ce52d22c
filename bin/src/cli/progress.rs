use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use client::execution::{ExecutionEvent, ExecutionEvents};
use simple_bar::ProgressBar;

const BAR_WIDTH: u32 = 80;

/// Shows the progress of an execution on the terminal, and stops waiting on
/// it once `continue_intent` is cleared.
pub struct EventDisplayer {
    process_id: String,
    show_progress: bool,
    progress_bar: Option<ProgressBar>,
    /// Percentage the progress bar has been advanced to.
    shown_percent: u8,
    continue_intent: Arc<AtomicBool>,
}

impl EventDisplayer {
    pub fn new(process_id: &str, show_progress: bool, continue_intent: Arc<AtomicBool>) -> Self {
        EventDisplayer {
            process_id: process_id.to_string(),
            show_progress,
            progress_bar: None,
            shown_percent: 0,
            continue_intent,
        }
    }

    /// Moves the progress bar forward to `percent`. Services may report a
    /// lower percentage than before, which leaves the bar where it is.
    fn advance(&mut self, percent: u8) {
        let percent = percent.min(100);
        if percent <= self.shown_percent {
            return;
        }
        let steps = percent - self.shown_percent;
        self.shown_percent = percent;
        if !self.show_progress {
            return;
        }

        let progress_bar = self
            .progress_bar
            .get_or_insert_with(|| ProgressBar::cargo_style(100, BAR_WIDTH, true));
        for _ in 0..steps {
            progress_bar.update();
        }
    }
}

impl ExecutionEvents for EventDisplayer {
    fn on_event(&mut self, event: ExecutionEvent<'_>) {
        use ExecutionEvent::*;
        match event {
            Progress {
                status,
                percent_complete,
                message,
            } => {
                log::debug!(
                    "{} {status} [{percent_complete}/100] - {}",
                    self.process_id,
                    message.unwrap_or_default()
                );
                self.advance(percent_complete);
            }
            Completed => {
                self.advance(100);
                eprintln!("{} complete.", self.process_id);
            }
            Failed { status, exceptions } => {
                eprintln!("{} failed ({status}).", self.process_id);
                for exception in exceptions {
                    eprintln!("  {exception}");
                }
            }
            Cancelled => {
                eprintln!("{} cancelled.", self.process_id);
            }
        }
    }

    fn do_continue(&self) -> bool {
        self.continue_intent.load(Ordering::Relaxed)
    }
}
