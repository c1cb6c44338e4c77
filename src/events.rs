//! Notification sinks for a conversion session.
//!
//! A session reports through two independent channels: progress (a fraction in
//! `[0, 1]`) and status (human-readable text). Sinks are fire-and-forget; a
//! [`Notifier`] delivers to every subscriber in registration order, and events
//! of one session arrive in the order they were generated.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};

/// Progress sample for the current session.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub fraction: f64,
    pub elapsed_seconds: f64,
}

impl ProgressEvent {
    pub fn complete(elapsed_seconds: f64) -> Self {
        Self {
            fraction: 1.0,
            elapsed_seconds,
        }
    }
}

pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: ProgressEvent);
}

pub trait StatusSink: Send + Sync {
    fn on_status(&self, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: ProgressEvent) {
        self(event)
    }
}

impl<F> StatusSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_status(&self, message: &str) {
        self(message)
    }
}

/// Both notification kinds, in generation order, as delivered by [`ChannelSink`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "value")]
pub enum SessionEvent {
    Progress(ProgressEvent),
    Status(String),
}

/// Forwards every notification into one `mpsc` channel. A dropped receiver
/// is ignored.
pub struct ChannelSink {
    tx: parking_lot::Mutex<Sender<SessionEvent>>,
}

impl ChannelSink {
    pub fn new(tx: Sender<SessionEvent>) -> Self {
        Self {
            tx: parking_lot::Mutex::new(tx),
        }
    }

    fn send(&self, event: SessionEvent) {
        let _ = self.tx.lock().send(event);
    }
}

impl ProgressSink for ChannelSink {
    fn on_progress(&self, event: ProgressEvent) {
        self.send(SessionEvent::Progress(event));
    }
}

impl StatusSink for ChannelSink {
    fn on_status(&self, message: &str) {
        self.send(SessionEvent::Status(message.to_string()));
    }
}

/// Fan-out to any number of progress and status subscribers.
#[derive(Clone, Default)]
pub struct Notifier {
    progress: Vec<Arc<dyn ProgressSink>>,
    status: Vec<Arc<dyn StatusSink>>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("progress_sinks", &self.progress.len())
            .field("status_sinks", &self.status.len())
            .finish()
    }
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose progress and status both go to one channel.
    pub fn channel() -> (Self, Receiver<SessionEvent>) {
        let (tx, rx) = channel();
        let sink = Arc::new(ChannelSink::new(tx));
        let notifier = Self {
            progress: vec![sink.clone()],
            status: vec![sink],
        };
        (notifier, rx)
    }

    pub fn with_progress(mut self, sink: impl ProgressSink + 'static) -> Self {
        self.progress.push(Arc::new(sink));
        self
    }

    pub fn with_status(mut self, sink: impl StatusSink + 'static) -> Self {
        self.status.push(Arc::new(sink));
        self
    }

    pub fn subscribe_progress(&mut self, sink: Arc<dyn ProgressSink>) {
        self.progress.push(sink);
    }

    pub fn subscribe_status(&mut self, sink: Arc<dyn StatusSink>) {
        self.status.push(sink);
    }

    pub fn progress(&self, event: ProgressEvent) {
        for sink in &self.progress {
            sink.on_progress(event);
        }
    }

    pub fn status(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        log::debug!(target: "media_convert::events", "status: {}", message);
        for sink in &self.status {
            sink.on_status(message);
        }
    }
}
