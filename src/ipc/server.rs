//! Unix domain socket server for IPC
//!
//! Provides request-response communication and push notifications of guard
//! events to subscribed clients. UI clients answer code challenges here.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::events::GuardEvent;
use crate::guard::{ChallengeReply, GuardContext};

use super::protocol::{
    GuardStatus, Notification, Request, Response, ServerMessage, MAX_FRAME_LEN,
};

/// Read-only facts about the daemon reported in status responses
struct ServerInfo {
    start_time: Instant,
    hotkey_registered: bool,
}

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    ctx: GuardContext,
    info: Arc<ServerInfo>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Create a new IPC server
    pub fn new(socket_path: &Path, ctx: GuardContext, hotkey_registered: bool) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
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
            ctx,
            info: Arc::new(ServerInfo {
                start_time: Instant::now(),
                hotkey_registered,
            }),
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let ctx = self.ctx.clone();
                    let info = Arc::clone(&self.info);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = handle_client(stream, ctx, info) => {
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

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Handle a single client connection
async fn handle_client(stream: UnixStream, ctx: GuardContext, info: Arc<ServerInfo>) -> Result<()> {
    let (mut reader, mut writer) = stream.into_split();

    // Frames are read on their own task so a pending read is never
    // cancelled half-way by a notification.
    let (request_tx, mut request_rx) = mpsc::channel::<Request>(8);
    let read_task = tokio::spawn(async move {
        loop {
            match read_frame(&mut reader).await {
                Ok(Some(bytes)) => match serde_json::from_slice::<Request>(&bytes) {
                    Ok(request) => {
                        if request_tx.send(request).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to parse request, disconnecting");
                        break;
                    }
                },
                Ok(None) => {
                    debug!("client disconnected");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "failed to read request");
                    break;
                }
            }
        }
    });

    let mut events: Option<broadcast::Receiver<GuardEvent>> = None;

    let result = async {
        loop {
            tokio::select! {
                request = request_rx.recv() => {
                    let Some(request) = request else { return Ok::<(), anyhow::Error>(()) };
                    debug!(?request, "received request");

                    if request == Request::Subscribe && events.is_none() {
                        events = Some(ctx.event_tx.subscribe());
                        debug!("client subscribed to notifications");
                    }

                    let response = process_request(request, &ctx, &info).await;
                    write_frame(&mut writer, &ServerMessage::Response(response)).await?;
                }
                event = recv_event(&mut events) => {
                    let notification = match event {
                        Ok(event) => Notification::Event { event },
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "subscriber lagged");
                            Notification::Lagged { skipped }
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            events = None;
                            continue;
                        }
                    };
                    write_frame(&mut writer, &ServerMessage::Notification(notification)).await?;
                }
            }
        }
    }
    .await;

    read_task.abort();
    result
}

/// Next event for a subscribed client; never resolves when unsubscribed
async fn recv_event(
    events: &mut Option<broadcast::Receiver<GuardEvent>>,
) -> Result<GuardEvent, broadcast::error::RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Process a request and return a response
async fn process_request(request: Request, ctx: &GuardContext, info: &ServerInfo) -> Response {
    match request {
        Request::Ping => Response::Pong,

        Request::GetStatus => Response::Status(status(ctx, info).await),

        Request::Subscribe => Response::Subscribed,

        Request::SubmitCode { code } => answer(ctx, ChallengeReply::Code(code)),

        Request::CancelChallenge => answer(ctx, ChallengeReply::Cancelled),

        Request::ToggleTray => {
            ctx.toggle_tray().await;
            Response::Accepted
        }

        Request::ResetSecurity => {
            info!("security reset requested via IPC");
            ctx.reset_security().await;
            Response::Accepted
        }
    }
}

fn answer(ctx: &GuardContext, reply: ChallengeReply) -> Response {
    match ctx.broker.answer(reply) {
        Ok(()) => Response::Accepted,
        Err(e) => Response::error(e.code(), e.to_string()),
    }
}

async fn status(ctx: &GuardContext, info: &ServerInfo) -> GuardStatus {
    let security = ctx.security_snapshot().await;
    GuardStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: info.start_time.elapsed().as_secs(),
        locked: security.locked,
        failed_attempts: security.failed_attempts,
        seconds_remaining: security.seconds_remaining,
        status_message: security.status_message,
        tray_visible: ctx.tray_visible().await,
        hotkey_registered: info.hotkey_registered,
        challenge_pending: ctx.broker.is_pending(),
    }
}

/// Read one length-prefixed frame; `None` on clean EOF
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    anyhow::ensure!(len <= MAX_FRAME_LEN, "message too large: {} bytes", len);

    let mut msg_buf = vec![0u8; len];
    reader
        .read_exact(&mut msg_buf)
        .await
        .context("truncated message body")?;
    Ok(Some(msg_buf))
}

/// Send a length-prefixed JSON message
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;
    writer.flush().await?;

    Ok(())
}
