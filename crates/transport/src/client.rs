//! Outbound command channel and connection lifecycle.
//!
//! [`Client`] owns the socket to the workflow debug server. Commands
//! issued before the channel is ready are queued pre-composed and flushed
//! in order by the owner once its on-connect sequence has run. Inbound
//! bytes are reassembled and decoded on a background task and handed to
//! the owner as [`Inbound`] values over an unbounded channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc};

use crate::decode::{ServerMessage, decode_message};
use crate::error::TransportError;
use crate::framing::FrameAssembler;

/// Connect timeout for loopback (or unspecified) hosts.
const LOOPBACK_CONNECT_TIMEOUT: Duration = Duration::from_millis(3500);
/// Connect timeout for everything else.
const REMOTE_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Notifications handed to the owner of a [`Client`].
#[derive(Debug)]
pub enum Inbound {
    /// The connection to the server was established.
    Connected,
    /// A decoded server message.
    Message(ServerMessage),
    /// The server closed the connection.
    Closed,
}

/// Compose one wire command.
///
/// The payload is appended after a `|`, except when the payload is empty
/// and the command already carries a `|`: pre-composed messages must not
/// be re-delimited when they are replayed from the queue.
pub fn encode_command(command: &str, payload: &str) -> String {
    let mut message = command.to_string();
    if !payload.is_empty() || !command.contains('|') {
        message.push('|');
        message.push_str(payload);
    }
    message
}

fn connect_timeout(host: &str) -> Duration {
    if host == "127.0.0.1" || host == "localhost" || host.is_empty() {
        LOOPBACK_CONNECT_TIMEOUT
    } else {
        REMOTE_CONNECT_TIMEOUT
    }
}

/// Handle to the server connection. Cheap to clone; all clones share the
/// same socket, queue, and connection state.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Mutex<ClientInner>>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
}

struct ClientInner {
    writer: Option<OwnedWriteHalf>,
    /// Socket established.
    connected: bool,
    /// Queue released; set by [`Client::flush_queued`] after the owner's
    /// on-connect sequence so user commands cannot jump ahead of it.
    ready: bool,
    queued: Vec<String>,
}

impl Client {
    /// Create an unconnected client. `inbound_tx` receives connection
    /// notifications and decoded messages.
    pub fn new(inbound_tx: mpsc::UnboundedSender<Inbound>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClientInner {
                writer: None,
                connected: false,
                ready: false,
                queued: Vec::new(),
            })),
            inbound_tx,
        }
    }

    /// Connect to the server. A no-op when already connected.
    ///
    /// Loopback and unspecified hosts get a 3.5 s timeout, remote hosts
    /// 10 s. On success a reader task is spawned and [`Inbound::Connected`]
    /// is delivered; queued commands stay queued until the owner calls
    /// [`Client::flush_queued`].
    pub async fn connect(&self, host: &str, port: u16) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().await;
        if inner.connected {
            return Ok(());
        }

        let addr = format!("{host}:{port}");
        let timeout = connect_timeout(host);
        let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| TransportError::ConnectTimeout {
                addr: addr.clone(),
                timeout,
            })??;
        tracing::debug!(%addr, "connected to workflow server");

        let (read, write) = stream.into_split();
        inner.writer = Some(write);
        inner.connected = true;

        let inbound_tx = self.inbound_tx.clone();
        let inner_handle = Arc::clone(&self.inner);
        tokio::spawn(read_loop(read, inbound_tx, inner_handle));

        let _ = self.inbound_tx.send(Inbound::Connected);
        Ok(())
    }

    /// Send a command, queueing it when the channel is not yet ready.
    pub async fn send(&self, command: &str, payload: &str) -> Result<(), TransportError> {
        let message = encode_command(command, payload);
        let mut inner = self.inner.lock().await;
        if !inner.ready {
            tracing::debug!(%message, "channel not ready, queueing command");
            inner.queued.push(message);
            return Ok(());
        }
        inner.write_line(&message).await
    }

    /// Send a command directly, bypassing the queue. Used for the
    /// on-connect sequence, which must hit the wire before the backlog.
    pub async fn send_now(&self, command: &str, payload: &str) -> Result<(), TransportError> {
        let message = encode_command(command, payload);
        self.inner.lock().await.write_line(&message).await
    }

    /// Write the queued backlog in order and release the queue; later
    /// sends go straight to the socket.
    pub async fn flush_queued(&self) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().await;
        let queued = std::mem::take(&mut inner.queued);
        for message in &queued {
            inner.write_line(message).await?;
        }
        inner.ready = true;
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.connected
    }

    /// Commands waiting for the connection, in send order.
    pub async fn queued_commands(&self) -> Vec<String> {
        self.inner.lock().await.queued.clone()
    }

    /// Shut the connection down. Further sends queue again.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(mut writer) = inner.writer.take() {
            let _ = writer.shutdown().await;
        }
        inner.connected = false;
        inner.ready = false;
    }
}

impl ClientInner {
    async fn write_line(&mut self, message: &str) -> Result<(), TransportError> {
        let Some(writer) = self.writer.as_mut() else {
            tracing::warn!(%message, "no connection, dropping command");
            return Ok(());
        };
        tracing::debug!(%message, "sending command");
        writer.write_all(format!("{message}\n").as_bytes()).await?;
        Ok(())
    }
}

async fn read_loop(
    mut read: OwnedReadHalf,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inner: Arc<Mutex<ClientInner>>,
) {
    let mut assembler = FrameAssembler::new();
    let mut buf = [0u8; 4096];

    loop {
        match read.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                for payload in assembler.feed(&buf[..n]) {
                    match decode_message(&payload) {
                        Some(message) => {
                            if inbound_tx.send(Inbound::Message(message)).is_err() {
                                return;
                            }
                        }
                        None => tracing::warn!("ignoring undecodable server message"),
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "socket read failed");
                break;
            }
        }
    }

    {
        let mut inner = inner.lock().await;
        inner.connected = false;
        inner.ready = false;
    }
    tracing::debug!("server connection closed");
    let _ = inbound_tx.send(Inbound::Closed);
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn bare_command_gets_a_separator() {
        assert_eq!(encode_command("continue", ""), "continue|");
    }

    #[test]
    fn payload_is_pipe_delimited() {
        assert_eq!(encode_command("file", "/tmp/a.wf"), "file|/tmp/a.wf");
    }

    #[test]
    fn precomposed_command_is_not_redelimited() {
        assert_eq!(encode_command("setbp|a.wf|taskA", ""), "setbp|a.wf|taskA");
    }

    #[test]
    fn payload_always_appends_even_with_pipe_in_command() {
        assert_eq!(encode_command("setbp|a.wf", "x"), "setbp|a.wf|x");
    }

    #[tokio::test]
    async fn commands_queue_until_flushed() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let client = Client::new(tx);

        client.send("continue", "").await.unwrap();
        client.send("step", "").await.unwrap();
        assert_eq!(client.queued_commands().await, vec!["continue|", "step|"]);
    }

    #[tokio::test]
    async fn connect_flush_and_send() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = Client::new(tx);

        client.send("continue", "").await.unwrap();
        client.connect("127.0.0.1", port).await.unwrap();
        assert!(matches!(rx.recv().await, Some(Inbound::Connected)));

        // second connect is a no-op
        client.connect("127.0.0.1", port).await.unwrap();

        let (stream, _) = listener.accept().await.unwrap();
        let mut lines = BufReader::new(stream).lines();

        client.send_now("file", "/tmp/a.wf").await.unwrap();
        client.flush_queued().await.unwrap();
        client.send("step", "").await.unwrap();

        assert_eq!(lines.next_line().await.unwrap().unwrap(), "file|/tmp/a.wf");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "continue|");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "step|");
    }

    #[tokio::test]
    async fn inbound_messages_are_decoded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = Client::new(tx);
        client.connect("127.0.0.1", port).await.unwrap();
        assert!(matches!(rx.recv().await, Some(Inbound::Connected)));

        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(b"end\n").await.unwrap();
        drop(stream);

        assert!(matches!(
            rx.recv().await,
            Some(Inbound::Message(ServerMessage::End))
        ));
        assert!(matches!(rx.recv().await, Some(Inbound::Closed)));
        assert!(!client.is_connected().await);
    }
}
