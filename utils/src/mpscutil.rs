use std::sync::mpsc;

/// Sends `value` on `sender`, logging a warning if the receiving end has hung up.
pub fn send_or_log_warning<T>(sender: &mpsc::Sender<T>, description: &str, value: T) {
    if sender.send(value).is_err() {
        log::warn!("Failed to send {} on channel.", description);
    }
}

/// Drains every value currently queued on `receiver` without blocking, and
/// returns the most recent one.
pub fn latest<T>(receiver: &mpsc::Receiver<T>) -> Option<T> {
    receiver.try_iter().last()
}
