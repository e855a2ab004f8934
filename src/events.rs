use std::sync::mpsc::{self, Receiver, Sender};

/// One-way ordered channel from a background worker to the presentation
/// layer. Emitting never blocks and never fails the worker: if the
/// consumer is gone the event is dropped.
#[derive(Clone)]
pub struct EventSink {
    tx: Option<Sender<String>>,
}

impl EventSink {
    /// A connected sink plus the receiver the consumer drains at its own
    /// cadence. Events arrive in emission order.
    pub fn channel() -> (Self, Receiver<String>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that discards everything, for callers without a consumer.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, message: impl Into<String>) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(message.into());
        }
    }
}
