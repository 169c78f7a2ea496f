//! TCP Transport
//!
//! Length-framed transport over a TCP stream. The first frame exchange is the
//! authentication handshake; every later frame is a stanza body.
//!
//! Plain TCP carries no static key, so `peer_static_key_received` is never
//! reported. Deployments that need encryption wrap the stream (or provide
//! their own [`Transport`]) and pin the key there.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::error::NetworkError;
use super::protocol::{encode_frame, read_frame_length, FRAME_HEADER_SIZE, MAX_MESSAGE_SIZE};
use super::transport::{ConnectionState, Endpoint, Transport, TransportDelegate, TransportResult};

/// Default connect timeout in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Default time allowed for the authentication exchange in milliseconds.
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy)]
struct Timeouts {
    connect: Duration,
    handshake: Duration,
}

#[derive(Debug)]
enum Outbound {
    Frame(Vec<u8>),
    Close,
}

struct Link {
    outbound: mpsc::UnboundedSender<Outbound>,
    task: JoinHandle<()>,
}

/// Length-framed TCP transport.
///
/// Must be driven from within a tokio runtime: `connect` spawns the
/// connection task on the current runtime.
pub struct TcpTransport {
    timeouts: Timeouts,
    link: Option<Link>,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpTransport {
    /// Creates a transport with the default timeouts.
    pub fn new() -> Self {
        TcpTransport {
            timeouts: Timeouts {
                connect: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
                handshake: Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            },
            link: None,
        }
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connect = timeout;
        self
    }

    /// Sets how long the server may take to answer the connection payload.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.handshake = timeout;
        self
    }
}

impl Transport for TcpTransport {
    fn connect(
        &mut self,
        endpoint: &Endpoint,
        delegate: Arc<dyn TransportDelegate>,
    ) -> TransportResult<()> {
        if let Some(previous) = self.link.take() {
            previous.task.abort();
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;

        let (outbound, rx) = mpsc::unbounded_channel();
        delegate.state_changed(ConnectionState::Connecting);
        let task = runtime.spawn(run_link(
            endpoint.to_string(),
            delegate,
            rx,
            self.timeouts,
        ));
        self.link = Some(Link { outbound, task });
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            if link.outbound.send(Outbound::Close).is_err() {
                tracing::debug!("link task already finished");
            }
        }
    }

    fn send(&mut self, frame: Vec<u8>) {
        match &self.link {
            Some(link) => {
                if link.outbound.send(Outbound::Frame(frame)).is_err() {
                    tracing::debug!("dropping frame: link closed");
                }
            }
            None => tracing::debug!("dropping frame: not connected"),
        }
    }
}

async fn run_link(
    address: String,
    delegate: Arc<dyn TransportDelegate>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    timeouts: Timeouts,
) {
    match drive_link(&address, delegate.clone(), &mut rx, timeouts).await {
        Ok(()) => tracing::debug!(%address, "link closed"),
        Err(e) => tracing::warn!(%address, error = %e, "link failed"),
    }
    delegate.state_changed(ConnectionState::NotConnected);
}

async fn drive_link(
    address: &str,
    delegate: Arc<dyn TransportDelegate>,
    rx: &mut mpsc::UnboundedReceiver<Outbound>,
    timeouts: Timeouts,
) -> TransportResult<()> {
    let (reader, mut writer) = tokio::select! {
        halves = handshake(address, delegate.as_ref(), timeouts) => halves?,
        _ = wait_for_close(rx) => return Ok(()),
    };
    delegate.state_changed(ConnectionState::Connected);

    let mut reader_task = tokio::spawn(read_loop(reader, delegate.clone()));

    let result = loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(Outbound::Frame(frame)) => {
                    if let Err(e) = write_frame(&mut writer, &frame).await {
                        break Err(e);
                    }
                }
                Some(Outbound::Close) | None => {
                    delegate.state_changed(ConnectionState::Disconnecting);
                    let _ = writer.shutdown().await;
                    break Ok(());
                }
            },
            joined = &mut reader_task => {
                break match joined {
                    Ok(result) => result,
                    Err(e) => Err(NetworkError::ConnectionFailed(e.to_string())),
                };
            }
        }
    };

    reader_task.abort();
    result
}

async fn handshake(
    address: &str,
    delegate: &dyn TransportDelegate,
    timeouts: Timeouts,
) -> TransportResult<(OwnedReadHalf, OwnedWriteHalf)> {
    let stream = tokio::time::timeout(timeouts.connect, TcpStream::connect(address))
        .await
        .map_err(|_| NetworkError::ConnectionFailed("connect timed out".into()))?
        .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;
    let _ = stream.set_nodelay(true);
    let (mut reader, mut writer) = stream.into_split();

    let payload = delegate
        .connection_payload()
        .ok_or_else(|| NetworkError::AuthenticationFailed("no connection payload".into()))?;

    // Covers both the payload write and the result read.
    let response = tokio::time::timeout(timeouts.handshake, async {
        match write_frame(&mut writer, &payload).await {
            Ok(()) => read_frame(&mut reader).await,
            Err(e) => Err(e),
        }
    })
    .await
    .map_err(|_| NetworkError::ConnectionFailed("handshake timed out".into()))??;
    if !delegate.handshake_response(&response) {
        return Err(NetworkError::AuthenticationFailed(
            "rejected by server".into(),
        ));
    }

    Ok((reader, writer))
}

async fn wait_for_close(rx: &mut mpsc::UnboundedReceiver<Outbound>) {
    while let Some(outbound) = rx.recv().await {
        match outbound {
            Outbound::Close => return,
            Outbound::Frame(_) => tracing::debug!("dropping frame sent before handshake"),
        }
    }
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    delegate: Arc<dyn TransportDelegate>,
) -> TransportResult<()> {
    loop {
        let frame = read_frame(&mut reader).await?;
        delegate.frame_received(frame);
    }
}

/// Writes one length-prefixed frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, body: &[u8]) -> TransportResult<()> {
    let frame = encode_frame(body)?;
    writer
        .write_all(&frame)
        .await
        .map_err(|e| NetworkError::SendFailed(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| NetworkError::SendFailed(e.to_string()))
}

/// Reads one length-prefixed frame body.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> TransportResult<Vec<u8>> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    reader
        .read_exact(&mut header)
        .await
        .map_err(|_| NetworkError::ConnectionClosed)?;

    let len = read_frame_length(&header);
    if len > MAX_MESSAGE_SIZE {
        return Err(NetworkError::InvalidMessage(format!(
            "Frame too large: {} bytes (max {})",
            len, MAX_MESSAGE_SIZE
        )));
    }

    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|_| NetworkError::ConnectionClosed)?;
    Ok(body)
}
