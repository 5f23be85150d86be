// Listening side of the achievement pipe, built on Tokio named pipes.
// Each proxy call is one connection carrying one message.

#![cfg_attr(not(windows), allow(unused_imports))]

use super::notifier::pipe_endpoint;
use super::protocol::{decode_achievement, MAX_MESSAGE_SIZE};
use log::{debug, info, warn};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("Failed to create pipe {endpoint}: {source}")]
    Create {
        endpoint: PathBuf,
        source: std::io::Error,
    },
    #[error("Read error: {0}")]
    Read(#[from] std::io::Error),
    #[error("Message too large (limit {limit} bytes)")]
    MessageTooLarge { limit: usize },
    #[error("Named pipe listener is only supported on Windows")]
    Unsupported,
}

/// Accepts proxy connections and forwards decoded achievement names to a channel.
#[derive(Debug, Clone)]
pub struct AchievementListener {
    pipe_name: String,
    max_message_size: usize,
    read_timeout: Duration,
}

impl AchievementListener {
    pub fn new(pipe_name: impl Into<String>) -> Self {
        Self {
            pipe_name: pipe_name.into(),
            max_message_size: MAX_MESSAGE_SIZE,
            read_timeout: READ_TIMEOUT,
        }
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn pipe_name(&self) -> &str {
        &self.pipe_name
    }

    pub fn endpoint(&self) -> PathBuf {
        pipe_endpoint(&self.pipe_name)
    }

    /// Serve connections until `shutdown` fires or its sender is dropped.
    ///
    /// A new pipe instance is created before each accepted client is handed
    /// off, so a proxy calling in quick succession never finds the pipe missing.
    #[cfg(windows)]
    pub async fn run(
        &self,
        sink: mpsc::UnboundedSender<String>,
        mut shutdown: mpsc::UnboundedReceiver<()>,
    ) -> Result<(), ListenerError> {
        let endpoint = self.endpoint();
        let mut server = self.create_instance(&endpoint, true)?;

        info!("[IPC] Listening for achievements on {}", endpoint.display());

        loop {
            let accepted = tokio::select! {
                result = server.connect() => Some(result),
                _ = shutdown.recv() => None,
            };

            match accepted {
                Some(Ok(())) => {
                    let client = server;
                    server = self.create_instance(&endpoint, false)?;

                    tokio::spawn(handle_connection(
                        client,
                        sink.clone(),
                        self.max_message_size,
                        self.read_timeout,
                    ));
                }
                Some(Err(e)) => {
                    warn!("[IPC] Connection failed: {}", e);
                    server = self.create_instance(&endpoint, false)?;
                }
                None => {
                    info!("[IPC] Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    #[cfg(not(windows))]
    pub async fn run(
        &self,
        _sink: mpsc::UnboundedSender<String>,
        _shutdown: mpsc::UnboundedReceiver<()>,
    ) -> Result<(), ListenerError> {
        Err(ListenerError::Unsupported)
    }

    #[cfg(windows)]
    fn create_instance(
        &self,
        endpoint: &std::path::Path,
        first: bool,
    ) -> Result<tokio::net::windows::named_pipe::NamedPipeServer, ListenerError> {
        use tokio::net::windows::named_pipe::ServerOptions;

        ServerOptions::new()
            .first_pipe_instance(first)
            .access_outbound(false)
            .create(endpoint)
            .map_err(|source| ListenerError::Create {
                endpoint: endpoint.to_path_buf(),
                source,
            })
    }
}

#[cfg(windows)]
async fn handle_connection(
    mut pipe: tokio::net::windows::named_pipe::NamedPipeServer,
    sink: mpsc::UnboundedSender<String>,
    max_message_size: usize,
    read_timeout: Duration,
) {
    let read = read_message(&mut pipe, max_message_size);
    let payload = match tokio::time::timeout(read_timeout, read).await {
        Ok(Ok(payload)) => payload,
        Ok(Err(e)) => {
            warn!("[IPC] {}", e);
            return;
        }
        Err(_) => {
            warn!("[IPC] Client sent nothing within {:?}", read_timeout);
            return;
        }
    };

    match decode_achievement(&payload) {
        Some(name) => {
            info!("[IPC] Received achievement: {}", name);
            if sink.send(name).is_err() {
                debug!("[IPC] Achievement consumer gone, message dropped");
            }
        }
        None => debug!("[IPC] Ignoring empty message"),
    }
}

/// Read one whole message: everything until the writer closes its end.
pub async fn read_message<R>(
    reader: &mut R,
    max_message_size: usize,
) -> Result<Vec<u8>, ListenerError>
where
    R: AsyncRead + Unpin,
{
    let mut payload = Vec::new();

    match reader
        .take(max_message_size as u64 + 1)
        .read_to_end(&mut payload)
        .await
    {
        Ok(_) => {}
        // A writer closing the pipe surfaces as a broken pipe on some targets.
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {}
        Err(e) => return Err(ListenerError::Read(e)),
    }

    if payload.len() > max_message_size {
        return Err(ListenerError::MessageTooLarge {
            limit: max_message_size,
        });
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_until_writer_closes() {
        let mut source: &[u8] = b"ACH_WIN_ONE_GAME";
        let payload = read_message(&mut source, MAX_MESSAGE_SIZE).await.unwrap();
        assert_eq!(payload, b"ACH_WIN_ONE_GAME");
    }

    #[tokio::test]
    async fn message_at_limit_is_accepted() {
        let data = vec![b'A'; 32];
        let mut source: &[u8] = &data;
        let payload = read_message(&mut source, 32).await.unwrap();
        assert_eq!(payload.len(), 32);
    }

    #[tokio::test]
    async fn message_over_limit_is_rejected() {
        let data = vec![b'A'; 33];
        let mut source: &[u8] = &data;
        let result = read_message(&mut source, 32).await;
        assert!(matches!(
            result,
            Err(ListenerError::MessageTooLarge { limit: 32 })
        ));
    }

    struct BrokenPipeReader;

    impl AsyncRead for BrokenPipeReader {
        fn poll_read(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Err(std::io::Error::from(ErrorKind::BrokenPipe)))
        }
    }

    #[tokio::test]
    async fn broken_pipe_after_message_counts_as_end() {
        let mut source = (&b"ACH_WIN_100_GAMES\0"[..]).chain(BrokenPipeReader);

        let payload = read_message(&mut source, MAX_MESSAGE_SIZE).await.unwrap();

        assert_eq!(
            decode_achievement(&payload).as_deref(),
            Some("ACH_WIN_100_GAMES")
        );
    }

    #[tokio::test]
    async fn broken_pipe_without_data_is_dropped() {
        let mut source = BrokenPipeReader;

        let payload = read_message(&mut source, MAX_MESSAGE_SIZE).await.unwrap();

        assert!(payload.is_empty());
        assert!(decode_achievement(&payload).is_none());
    }

    #[tokio::test]
    async fn empty_connection_yields_empty_payload() {
        let mut source: &[u8] = b"";
        assert!(read_message(&mut source, 16).await.unwrap().is_empty());
    }

    #[test]
    fn builder_overrides() {
        let listener = AchievementListener::new("TestPipe")
            .with_max_message_size(128)
            .with_read_timeout(Duration::from_millis(250));

        assert_eq!(listener.pipe_name(), "TestPipe");
        assert_eq!(listener.max_message_size, 128);
        assert_eq!(listener.read_timeout, Duration::from_millis(250));
        assert_eq!(listener.endpoint(), pipe_endpoint("TestPipe"));
    }

    #[cfg(not(windows))]
    #[tokio::test]
    async fn run_is_unsupported_off_windows() {
        let (sink, _rx) = mpsc::unbounded_channel();
        let (_tx, shutdown) = mpsc::unbounded_channel();
        let result = AchievementListener::new("TestPipe").run(sink, shutdown).await;
        assert!(matches!(result, Err(ListenerError::Unsupported)));
    }
}
