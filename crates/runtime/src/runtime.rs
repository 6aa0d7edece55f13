//! Public runtime controller handle.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use transport::{Client, Inbound};

use crate::events::{Event, EventReceiver};
use crate::internals::RuntimeInternals;
use crate::types::{Breakpoint, BreakpointSpec, StackEntry, TransportKind, Variable};

/// A debugging session against a remote workflow server.
///
/// The handle owns a background dispatch task that feeds decoded server
/// messages into the session state machine; every stop, output, and
/// lifecycle notification surfaces on the [`EventReceiver`] returned by
/// [`Runtime::events`]. Dropping the handle cancels the dispatch task.
pub struct Runtime {
    internals: Arc<Mutex<RuntimeInternals>>,
    client: Client,
    events: EventReceiver,
    cancellation: CancellationToken,
}

impl Runtime {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let client = Client::new(inbound_tx);
        let internals = Arc::new(Mutex::new(RuntimeInternals::new(
            client.clone(),
            events_tx,
        )));
        let cancellation = CancellationToken::new();

        spawn_dispatch_task(Arc::clone(&internals), inbound_rx, cancellation.clone());

        Self {
            internals,
            client,
            events: EventReceiver::new(events_rx),
            cancellation,
        }
    }

    /// Begin a session: record the connection parameters, arrange the
    /// initial stop, and kick off the connection in the background.
    ///
    /// With `stop_on_entry` the entry stop is raised locally before any
    /// network traffic; otherwise a continue is queued and goes out as
    /// part of the on-connect flush.
    #[tracing::instrument(skip(self))]
    pub async fn start(
        &self,
        program: &str,
        stop_on_entry: bool,
        transport_kind: TransportKind,
        host: &str,
        port: u16,
        server_base: &str,
    ) {
        {
            let mut internals = self.internals.lock().await;
            internals.configure(program, host, server_base);
            if stop_on_entry {
                internals.step_request(Event::StopOnEntry).await;
            } else {
                internals.continue_request().await;
            }
        }

        let client = self.client.clone();
        let host = host.to_string();
        match transport_kind {
            TransportKind::Sockets => {
                tokio::spawn(async move {
                    if let Err(e) = client.connect(&host, port).await {
                        tracing::warn!(%host, port, error = %e, "failed to connect to server");
                    }
                });
            }
        }
    }

    /// Run until the next registered breakpoint.
    #[tracing::instrument(skip(self))]
    pub async fn r#continue(&self) {
        self.internals.lock().await.continue_request().await;
    }

    /// Step to the next element.
    #[tracing::instrument(skip(self))]
    pub async fn step(&self) {
        self.internals
            .lock()
            .await
            .step_request(Event::StopOnStep)
            .await;
    }

    /// Step into the current element.
    #[tracing::instrument(skip(self))]
    pub async fn step_in(&self) {
        self.internals.lock().await.step_in_request().await;
    }

    /// Step out of the current element.
    #[tracing::instrument(skip(self))]
    pub async fn step_out(&self) {
        self.internals.lock().await.step_out_request().await;
    }

    /// End the session and close the connection.
    #[tracing::instrument(skip(self))]
    pub async fn disconnect(&self) {
        self.internals.lock().await.finish_session().await;
    }

    /// Replace the whole breakpoint set and return the created records,
    /// in input order.
    #[tracing::instrument(skip(self, specs))]
    pub async fn set_breakpoints(&self, specs: Vec<BreakpointSpec>) -> Vec<Breakpoint> {
        self.internals.lock().await.set_breakpoints(specs).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn clear_breakpoints(&self) {
        self.internals.lock().await.clear_breakpoints();
    }

    pub async fn stack(&self) -> Vec<StackEntry> {
        self.internals.lock().await.stack_frames()
    }

    pub async fn local_variables(&self) -> Vec<Variable> {
        self.internals.lock().await.local_variables()
    }

    pub async fn global_variables(&self) -> Vec<Variable> {
        self.internals.lock().await.global_variables()
    }

    pub async fn source_file(&self) -> String {
        self.internals.lock().await.source_file()
    }

    pub async fn current_element(&self) -> Option<String> {
        self.internals.lock().await.current_element()
    }

    pub async fn is_valid(&self) -> bool {
        self.internals.lock().await.is_valid()
    }

    /// Subscribe to session events. There is a single subscriber; events
    /// raised before the first poll are buffered in order.
    pub fn events(&mut self) -> &mut EventReceiver {
        &mut self.events
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}

fn spawn_dispatch_task(
    internals: Arc<Mutex<RuntimeInternals>>,
    mut inbound: mpsc::UnboundedReceiver<Inbound>,
    cancellation: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    tracing::debug!("dispatch task cancelled");
                    break;
                }
                inbound = inbound.recv() => match inbound {
                    Some(inbound) => internals.lock().await.on_inbound(inbound).await,
                    None => {
                        tracing::debug!("transport channel closed");
                        break;
                    }
                },
            }
        }
    });
}
