//! Runtime controller internals: the per-session state machine.
//!
//! All session state lives here, behind the [`crate::Runtime`] handle's
//! mutex, and is mutated only by these methods, either from a public
//! operation or from the dispatch task feeding decoded server messages
//! in. Events are pushed onto the unbounded event channel, which defers
//! their delivery past the current call and keeps them FIFO.

use tokio::sync::mpsc;
use transport::{Client, Inbound, RawFrame, ServerMessage, VarRecord};

use crate::breakpoints::BreakpointRegistry;
use crate::events::{Event, OutputCategory};
use crate::paths::{self, PathMap};
use crate::types::{Breakpoint, BreakpointSpec, StackEntry, Variable};

/// File extension of debuggable workflow programs.
pub const WORKFLOW_FILE_EXTENSION: &str = ".wf";

fn is_debuggable(file: &str) -> bool {
    file.ends_with(WORKFLOW_FILE_EXTENSION)
}

fn is_loopback(host: &str) -> bool {
    host == "127.0.0.1" || host == "localhost"
}

pub(crate) struct RuntimeInternals {
    client: Client,
    events: mpsc::UnboundedSender<Event>,

    paths: PathMap,
    breakpoints: BreakpointRegistry,

    /// False permanently once the session ends.
    valid: bool,
    in_exception: bool,
    /// Run-to-next-breakpoint vs single-step handling of `next`.
    continue_mode: bool,
    /// True until the connection to the server is up; local synthetic
    /// steps are served without network traffic while set.
    initializing: bool,

    source_file: String,
    current_element: Option<String>,

    local_variables: Vec<Variable>,
    global_variables: Vec<Variable>,
    stack: Vec<StackEntry>,
}

impl RuntimeInternals {
    pub(crate) fn new(client: Client, events: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            client,
            events,
            paths: PathMap::new(),
            breakpoints: BreakpointRegistry::new(),
            valid: true,
            in_exception: false,
            continue_mode: false,
            initializing: true,
            source_file: String::new(),
            current_element: None,
            local_variables: Vec::new(),
            global_variables: Vec::new(),
            stack: Vec::new(),
        }
    }

    /// Record the program under debug and the path mapping. The server
    /// base directory is forced empty for loopback hosts, where both
    /// sides share one filesystem.
    pub(crate) fn configure(&mut self, program: &str, host: &str, server_base: &str) {
        let server_base = if is_loopback(host) { "" } else { server_base };
        self.paths.set_server_base(server_base);
        self.source_file = program.to_string();
    }

    fn emit(&self, event: Event) {
        tracing::debug!(?event, "raising event");
        if self.events.send(event).is_err() {
            tracing::debug!("event subscriber dropped");
        }
    }

    /// Send a command, logging rather than surfacing failures; a command
    /// the server never sees degrades to a stalled session, not an error
    /// the front end can act on.
    async fn send(&self, command: &str, payload: &str) {
        if let Err(e) = self.client.send(command, payload).await {
            tracing::warn!(command, error = %e, "failed to send command");
        }
    }

    async fn send_now(&self, command: &str, payload: &str) {
        if let Err(e) = self.client.send_now(command, payload).await {
            tracing::warn!(command, error = %e, "failed to send command");
        }
    }

    /// An unresolved exception terminates the session on the next
    /// operation that checks it.
    async fn verify_exception(&mut self) -> bool {
        if self.in_exception {
            self.finish_session().await;
            return false;
        }
        true
    }

    /// A debug operation may proceed only with no unresolved exception
    /// and a debuggable file.
    async fn verify_debug(&mut self, file: &str) -> bool {
        self.verify_exception().await && is_debuggable(file)
    }

    pub(crate) async fn continue_request(&mut self) {
        let source_file = self.source_file.clone();
        if !self.verify_debug(&source_file).await {
            return;
        }
        self.continue_mode = true;
        self.send("continue", "").await;
    }

    /// Single step. While still initializing this is served locally: the
    /// requested stop event is raised without any network traffic, which
    /// is how stop-on-entry works before the connection is up.
    pub(crate) async fn step_request(&mut self, event: Event) {
        let source_file = self.source_file.clone();
        if !self.verify_debug(&source_file).await {
            return;
        }
        self.continue_mode = false;
        if self.initializing {
            self.emit(event);
        } else {
            self.send("step", "").await;
        }
    }

    pub(crate) async fn step_in_request(&mut self) {
        let source_file = self.source_file.clone();
        if !self.verify_debug(&source_file).await {
            return;
        }
        self.continue_mode = false;
        self.send("stepin", "").await;
    }

    pub(crate) async fn step_out_request(&mut self) {
        let source_file = self.source_file.clone();
        if !self.verify_debug(&source_file).await {
            return;
        }
        self.continue_mode = false;
        self.send("stepout", "").await;
    }

    /// Tear the session down: tell the server goodbye, close the socket,
    /// notify the subscriber, and refuse all further operations.
    pub(crate) async fn finish_session(&mut self) {
        if !self.valid {
            return;
        }
        self.send("bye", "").await;
        self.source_file.clear();
        self.client.close().await;
        self.emit(Event::Ended);
        self.valid = false;
        tracing::debug!("session terminated");
    }

    pub(crate) async fn on_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Connected => self.on_connected().await,
            Inbound::Message(message) => self.on_message(message).await,
            Inbound::Closed => tracing::debug!("server closed the connection"),
        }
    }

    /// On-connect sequence: announce the source file, replay every
    /// breakpoint, then release the backlog of commands queued while
    /// disconnected, strictly in that order.
    async fn on_connected(&mut self) {
        self.initializing = false;
        if !self.source_file.is_empty() {
            let source_file = self.source_file.clone();
            let server_path = self.paths.to_server_path(&source_file);
            if !server_path.is_empty() {
                self.send_now("file", &server_path).await;
            }
        }
        self.resync_breakpoints().await;
        if let Err(e) = self.client.flush_queued().await {
            tracing::warn!(error = %e, "failed to flush queued commands");
        }
    }

    async fn on_message(&mut self, message: ServerMessage) {
        if !self.valid {
            return;
        }
        tracing::debug!(?message, "processing server message");

        match message {
            ServerMessage::End => self.finish_session().await,
            ServerMessage::Exc {
                message,
                variables,
                frames,
            } => {
                self.local_variables.clear();
                self.global_variables.clear();
                self.emit(Event::StopOnException);
                self.in_exception = true;
                self.store_variables(variables);
                self.store_stack(frames);

                let text = format!("Exception thrown: {message} ");
                let file = self
                    .stack
                    .first()
                    .map(|entry| entry.file.clone())
                    .unwrap_or_default();
                self.emit(Event::Output {
                    category: OutputCategory::Stderr,
                    text,
                    file,
                });
            }
            ServerMessage::Next {
                path,
                element,
                variables,
                frames,
            } => {
                self.local_variables.clear();
                self.global_variables.clear();

                let local = self.paths.to_local_path(&path);
                self.load_source(&local).await;

                if let Some(element) = element {
                    self.current_element = Some(element.clone());
                    self.handle_stop_at(&element).await;
                }

                self.store_variables(variables);
                self.store_stack(frames);
            }
            ServerMessage::Vars { variables } => {
                self.local_variables.clear();
                self.global_variables.clear();
                self.store_variables(variables);
            }
            ServerMessage::Stack { frames } => self.store_stack(frames),
        }
    }

    /// Decide what stopping at `element` means. In continue mode the
    /// session only stops on a registered breakpoint and silently runs
    /// past anything else; in step mode every stop is a step stop, even
    /// on a breakpoint.
    async fn handle_stop_at(&mut self, element: &str) {
        if !self.continue_mode {
            self.emit(Event::StopOnStep);
            return;
        }

        let key = paths::normalize_key(&self.source_file);
        if self.breakpoints.lookup(&key, element).is_none() {
            self.send("continue", "").await;
            return;
        }

        self.emit(Event::StopOnBreakpoint);
        if let Some(breakpoint) = self.breakpoints.mark_verified(&key, element) {
            self.emit(Event::BreakpointValidated(breakpoint));
        }
    }

    /// Adopt a new source file reported by the server, but only when it
    /// differs case-insensitively from the current one and is itself
    /// debuggable.
    async fn load_source(&mut self, filename: &str) {
        let resolved = paths::resolve(filename);
        if self.source_file.to_lowercase() == resolved.to_lowercase() {
            return;
        }
        if self.verify_debug(&resolved).await {
            self.source_file = resolved;
        }
    }

    fn store_variables(&mut self, records: Vec<VarRecord>) {
        for record in records {
            let variable = Variable {
                name: record.name,
                r#type: record.r#type,
                value: record.value,
                variables_reference: 0,
            };
            if record.global {
                self.global_variables.push(variable);
            } else {
                self.local_variables.push(variable);
            }
        }
    }

    /// Replace the stack wholesale, translating each file into the local
    /// path space and assigning fresh 1-based frame ids.
    fn store_stack(&mut self, frames: Vec<RawFrame>) {
        self.stack.clear();
        for (i, frame) in frames.into_iter().enumerate() {
            let file = self.paths.to_local_path(&frame.file);
            self.stack.push(StackEntry {
                id: i as i64 + 1,
                line: 0,
                name: frame.element,
                file,
            });
        }
    }

    /// Replace the whole breakpoint set, replaying it to the server when
    /// connected, and return the created records for the session layer.
    pub(crate) async fn set_breakpoints(&mut self, specs: Vec<BreakpointSpec>) -> Vec<Breakpoint> {
        self.breakpoints.clear();
        let created: Vec<Breakpoint> = specs
            .iter()
            .map(|spec| self.breakpoints.register(&spec.name, &spec.uri))
            .collect();
        self.resync_breakpoints().await;
        created
    }

    pub(crate) fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    /// Replay every known path's breakpoints to the server. Nothing goes
    /// over the wire while disconnected; the next connect replays anyway.
    async fn resync_breakpoints(&mut self) {
        if !self.client.is_connected().await {
            return;
        }
        for key in self.breakpoints.paths() {
            let payload = self.breakpoints.resync_payload(&key);
            self.send_now("setbp", &payload).await;
        }
    }

    /// The current stack, or a single placeholder frame on the source
    /// file when no stack has been decoded yet.
    pub(crate) fn stack_frames(&self) -> Vec<StackEntry> {
        if self.stack.is_empty() {
            return vec![StackEntry {
                id: 1,
                line: 0,
                name: String::new(),
                file: self.source_file.clone(),
            }];
        }
        self.stack.clone()
    }

    pub(crate) fn local_variables(&self) -> Vec<Variable> {
        self.local_variables.clone()
    }

    pub(crate) fn global_variables(&self) -> Vec<Variable> {
        self.global_variables.clone()
    }

    pub(crate) fn source_file(&self) -> String {
        self.source_file.clone()
    }

    pub(crate) fn current_element(&self) -> Option<String> {
        self.current_element.clone()
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.valid
    }
}
