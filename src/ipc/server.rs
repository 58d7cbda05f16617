//! Unix domain socket server for IPC
//!
//! Provides request-response communication and push notifications of voice
//! events to subscribed clients.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::OwnedReadHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::events::VoiceEvent;
use crate::session::Command;

use super::protocol::{Notification, Request, Response, VoiceStatus, MAX_FRAME_LEN};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    context: ClientContext,
    shutdown_tx: broadcast::Sender<()>,
}

/// What every client handler needs
#[derive(Clone)]
struct ClientContext {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<VoiceEvent>,
    start_time: Instant,
}

impl Server {
    /// Create a new IPC server
    pub fn new(
        socket_path: &Path,
        commands: mpsc::Sender<Command>,
        events: broadcast::Sender<VoiceEvent>,
    ) -> Result<Self> {
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
            context: ClientContext {
                commands,
                events,
                start_time: Instant::now(),
            },
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let context = self.context.clone();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, context) => {
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

    /// Handle a single client connection
    async fn handle_client(stream: UnixStream, context: ClientContext) -> Result<()> {
        let (reader, mut writer) = stream.into_split();
        let (request_tx, mut request_rx) = mpsc::channel(8);
        let reader_task = tokio::spawn(Self::read_requests(reader, request_tx));
        let mut subscription: Option<broadcast::Receiver<VoiceEvent>> = None;

        let result = loop {
            tokio::select! {
                request = request_rx.recv() => {
                    let Some(request) = request else {
                        debug!("client disconnected");
                        break Ok(());
                    };

                    let response = match request {
                        Ok(Request::Subscribe) => {
                            if subscription.is_none() {
                                subscription = Some(context.events.subscribe());
                                debug!("client subscribed to notifications");
                            }
                            Response::Subscribed
                        }
                        Ok(request) => {
                            debug!(?request, "received request");
                            Self::process_request(request, &context).await
                        }
                        Err(message) => Response::Error {
                            code: "bad_request".to_string(),
                            message,
                        },
                    };

                    if let Err(e) = write_frame(&mut writer, &response).await {
                        break Err(e);
                    }
                }
                event = next_event(&mut subscription) => match event {
                    Ok(event) => {
                        let note = Notification::Voice { event };
                        if let Err(e) = write_frame(&mut writer, &note).await {
                            break Err(e);
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(skipped = n, "subscriber lagged behind voice events");
                    }
                    Err(RecvError::Closed) => {
                        subscription = None;
                    }
                }
            }
        };

        reader_task.abort();
        result
    }

    /// Read frames until EOF, handing parsed requests to the client loop
    async fn read_requests(
        mut reader: OwnedReadHalf,
        requests: mpsc::Sender<Result<Request, String>>,
    ) {
        loop {
            let frame = match read_frame(&mut reader).await {
                Ok(Some(frame)) => frame,
                Ok(None) => return,
                Err(e) => {
                    warn!(?e, "failed to read request frame");
                    return;
                }
            };

            let request = serde_json::from_slice::<Request>(&frame)
                .map_err(|e| format!("failed to parse request: {e}"));
            if requests.send(request).await.is_err() {
                return;
            }
        }
    }

    /// Process a request and return a response
    async fn process_request(request: Request, context: &ClientContext) -> Response {
        let command = match request {
            Request::Ping => return Response::Pong,
            Request::Subscribe => return Response::Subscribed,
            Request::GetStatus => {
                let (reply_tx, reply_rx) = oneshot::channel();
                if context.commands.send(Command::Status(reply_tx)).await.is_err() {
                    return controller_gone();
                }
                return match reply_rx.await {
                    Ok(session) => Response::Status(VoiceStatus::new(
                        session,
                        context.start_time.elapsed().as_secs(),
                    )),
                    Err(_) => controller_gone(),
                };
            }
            Request::Start => Command::Start,
            Request::Stop => Command::Stop,
            Request::SetEnabled { enabled } => Command::SetEnabled(enabled),
        };

        match context.commands.send(command).await {
            Ok(()) => Response::Accepted,
            Err(_) => controller_gone(),
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

fn controller_gone() -> Response {
    Response::Error {
        code: "unavailable".to_string(),
        message: "session controller is not running".to_string(),
    }
}

async fn next_event(
    subscription: &mut Option<broadcast::Receiver<VoiceEvent>>,
) -> Result<VoiceEvent, RecvError> {
    match subscription {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
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

    Ok(())
}

/// Read one length-prefixed frame; `None` on a clean disconnect
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        anyhow::bail!("frame of {len} bytes exceeds limit");
    }

    let mut msg_buf = vec![0u8; len];
    reader.read_exact(&mut msg_buf).await?;
    Ok(Some(msg_buf))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::backend::{AdapterFactory, Platform};
    use crate::session::SessionController;

    static SOCKET_ID: AtomicUsize = AtomicUsize::new(0);

    fn socket_path() -> PathBuf {
        std::env::temp_dir().join(format!(
            "voice-input-test-{}-{}.sock",
            std::process::id(),
            SOCKET_ID.fetch_add(1, Ordering::SeqCst)
        ))
    }

    async fn start_daemon() -> (PathBuf, Server) {
        let (command_tx, command_rx) = mpsc::channel(8);
        let (event_tx, _) = broadcast::channel(64);
        let mut controller =
            SessionController::new(AdapterFactory::new(Platform::Headless), true, event_tx.clone());
        tokio::spawn(async move { controller.run(command_rx).await });

        let path = socket_path();
        let server = Server::new(&path, command_tx, event_tx).unwrap();
        (path, server)
    }

    async fn call<T: serde::de::DeserializeOwned>(stream: &mut UnixStream, request: &Request) -> T {
        write_frame(stream, request).await.unwrap();
        receive(stream).await
    }

    async fn receive<T: serde::de::DeserializeOwned>(stream: &mut UnixStream) -> T {
        let frame = read_frame(stream).await.unwrap().unwrap();
        serde_json::from_slice(&frame).unwrap()
    }

    #[tokio::test]
    async fn test_ping_and_status() {
        let (path, server) = start_daemon().await;

        tokio::select! {
            _ = server.run() => unreachable!(),
            _ = async {
                let mut stream = UnixStream::connect(&path).await.unwrap();

                let pong: Response = call(&mut stream, &Request::Ping).await;
                assert_eq!(pong, Response::Pong);

                let status: Response = call(&mut stream, &Request::GetStatus).await;
                match status {
                    Response::Status(status) => {
                        assert_eq!(status.session.state, "idle");
                        assert_eq!(status.session.status_text, "Tekan untuk berbicara");
                    }
                    other => panic!("unexpected response {other:?}"),
                }
            } => {}
        }

        server.shutdown().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_subscriber_receives_voice_events() {
        let (path, server) = start_daemon().await;

        tokio::select! {
            _ = server.run() => unreachable!(),
            _ = async {
                let mut stream = UnixStream::connect(&path).await.unwrap();

                let subscribed: Response = call(&mut stream, &Request::Subscribe).await;
                assert_eq!(subscribed, Response::Subscribed);

                let accepted: Response = call(&mut stream, &Request::Start).await;
                assert_eq!(accepted, Response::Accepted);

                let note: Notification = receive(&mut stream).await;
                assert_eq!(
                    note,
                    Notification::Voice {
                        event: VoiceEvent::ListeningChanged { is_listening: true }
                    }
                );

                let note: Notification = receive(&mut stream).await;
                assert_eq!(
                    note,
                    Notification::Voice {
                        event: VoiceEvent::StatusChanged { status: "Mendengarkan...".into() }
                    }
                );
            } => {}
        }

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_bad_request_gets_error_response() {
        let (path, server) = start_daemon().await;

        tokio::select! {
            _ = server.run() => unreachable!(),
            _ = async {
                let mut stream = UnixStream::connect(&path).await.unwrap();
                write_frame(&mut stream, &serde_json::json!({"type": "explode"})).await.unwrap();

                let response: Response = receive(&mut stream).await;
                assert!(matches!(
                    response,
                    Response::Error { ref code, .. } if code == "bad_request"
                ));
            } => {}
        }

        server.shutdown().await;
    }
}
