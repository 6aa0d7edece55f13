//! Events raised to the session layer.
//!
//! Events are delivered over an unbounded channel: emission never blocks
//! the handler that raised the event, the subscriber observes events
//! strictly after the triggering call has returned, and ordering between
//! emissions is FIFO.

use tokio::sync::mpsc;

use crate::types::Breakpoint;

/// Output channel category for [`Event::Output`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCategory {
    Stderr,
}

impl OutputCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stderr => "stderr",
        }
    }
}

/// A debug event for the session layer to forward to its front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Stopped before executing anything (stop-on-entry launch).
    StopOnEntry,
    /// Stopped after a single step.
    StopOnStep,
    /// Stopped on a registered breakpoint while running.
    StopOnBreakpoint,
    /// The server reported an exception.
    StopOnException,
    /// A breakpoint was hit for the first time and is now verified.
    BreakpointValidated(Breakpoint),
    /// Text for one of the session's output channels. `file` is the
    /// local path the output is attributed to, empty when unknown.
    Output {
        category: OutputCategory,
        text: String,
        file: String,
    },
    /// Session over; the runtime is permanently invalid.
    Ended,
}

/// Receiver half for runtime events.
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventReceiver {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Event>) -> Self {
        Self { rx }
    }

    /// Receive the next event. Returns `None` once the runtime is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Convert to a `Stream` for use with `StreamExt`.
    pub fn into_stream(self) -> impl futures::Stream<Item = Event> {
        tokio_stream::wrappers::UnboundedReceiverStream::new(self.rx)
    }
}
