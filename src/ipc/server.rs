//! Unix domain socket server for IPC
//!
//! Provides request-response control of the voice arbiter and pushes voice
//! events to subscribed clients.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::OwnedReadHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::events::VoiceEvent;
use crate::state::{Subscription, VoiceHandle};

use super::protocol::{DaemonStatus, Notification, Request, Response};

const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Read one length-prefixed message; `None` on a clean disconnect
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("message of {len} bytes is too large"),
        ));
    }

    let mut msg_buf = vec![0u8; len];
    reader.read_exact(&mut msg_buf).await?;
    Ok(Some(msg_buf))
}

/// Send a length-prefixed JSON message
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = u32::try_from(msg_bytes.len())
        .context("message too large")?
        .to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;
    writer.flush().await?;

    Ok(())
}

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    voice: VoiceHandle,
    started_at: Instant,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind the socket at `socket_path`, replacing a stale one
    pub fn new(socket_path: &Path, voice: VoiceHandle) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Owner-only access
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            voice,
            started_at: Instant::now(),
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let voice = self.voice.clone();
                    let started_at = self.started_at;
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, voice, started_at) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Serve one client: answer requests and forward subscribed events
    async fn handle_client(stream: UnixStream, voice: VoiceHandle, started_at: Instant) -> Result<()> {
        let (reader, mut writer) = stream.into_split();
        let (frames_tx, mut frames_rx) = mpsc::channel(8);
        let reader_task = tokio::spawn(read_frames(reader, frames_tx));

        let mut subscription: Option<Subscription> = None;

        let result = loop {
            tokio::select! {
                frame = frames_rx.recv() => {
                    let msg_buf = match frame {
                        Some(Ok(msg_buf)) => msg_buf,
                        Some(Err(e)) => break Err(e.into()),
                        None => {
                            debug!("client disconnected");
                            break Ok(());
                        }
                    };

                    let response = match serde_json::from_slice::<Request>(&msg_buf) {
                        Ok(request) => {
                            debug!(?request, "received request");
                            Self::process_request(request, &voice, started_at, &mut subscription).await
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to parse request");
                            Response::error("bad_request", e.to_string())
                        }
                    };

                    if let Err(e) = write_frame(&mut writer, &response).await {
                        break Err(e);
                    }
                }
                Some(event) = next_event(&mut subscription) => {
                    if let Err(e) = write_frame(&mut writer, &Notification::Event { event }).await {
                        break Err(e);
                    }
                }
            }
        };

        reader_task.abort();
        result
    }

    /// Process a request and return a response
    async fn process_request(
        request: Request,
        voice: &VoiceHandle,
        started_at: Instant,
        subscription: &mut Option<Subscription>,
    ) -> Response {
        let result = match request {
            Request::Ping => return Response::Pong,
            Request::GetStatus => return Response::Status(status(voice, started_at)),
            Request::Subscribe => {
                *subscription = Some(voice.subscribe());
                debug!("client subscribed to notifications");
                return Response::Subscribed;
            }
            Request::Init => voice.init().await,
            Request::Start => voice.start(),
            Request::Stop => voice.stop(),
            Request::Toggle => voice.toggle(),
            Request::Pause => voice.pause(),
            Request::Resume => voice.resume(),
            Request::Speak { text } => voice.speak(text),
            Request::StopSpeaking => voice.stop_speaking(),
            Request::SetMode { mode } => {
                info!(%mode, "mode change requested via IPC");
                voice.set_mode(mode)
            }
            Request::SubmitText { text } => voice.submit_text(text),
            Request::SetLocation { location } => voice.set_location(location),
        };

        match result {
            Ok(()) => Response::Ack,
            Err(e) => e.into(),
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

fn status(voice: &VoiceHandle, started_at: Instant) -> DaemonStatus {
    DaemonStatus {
        state: voice.state(),
        mode: voice.mode(),
        listening_requested: voice.listening_requested(),
        subscribers: voice.subscriber_count(),
        uptime_secs: started_at.elapsed().as_secs(),
        ..DaemonStatus::default()
    }
}

/// Pump frames off the socket so the select loop never cancels a partial read
async fn read_frames(mut reader: OwnedReadHalf, frames: mpsc::Sender<io::Result<Vec<u8>>>) {
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(msg_buf)) => {
                if frames.send(Ok(msg_buf)).await.is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                let _ = frames.send(Err(e)).await;
                return;
            }
        }
    }
}

async fn next_event(subscription: &mut Option<Subscription>) -> Option<VoiceEvent> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}
