//! Error sink: hub faults are reported here and logged by a drain task.

use duel_core::HubError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

#[derive(Clone, Debug)]
pub struct ErrorSink {
    tx: mpsc::UnboundedSender<HubError>,
}

impl ErrorSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<HubError>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Never blocks. Reports made after the drain has stopped are logged inline.
    pub fn report(&self, err: HubError) {
        if let Err(mpsc::error::SendError(err)) = self.tx.send(err) {
            log_fault(&err);
        }
    }
}

/// Log every reported fault until cancelled, then flush what is left.
pub async fn run_error_drain(mut rx: mpsc::UnboundedReceiver<HubError>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            err = rx.recv() => match err {
                Some(err) => log_fault(&err),
                None => return,
            },
            () = cancel.cancelled() => break,
        }
    }
    while let Ok(err) = rx.try_recv() {
        log_fault(&err);
    }
}

fn log_fault(err: &HubError) {
    if err.is_internal() {
        error!(kind = err.error_kind(), error = %err, "hub fault");
    } else {
        warn!(kind = err.error_kind(), error = %err, "hub fault");
    }
}
