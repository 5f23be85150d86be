// Best-effort, fire-and-forget delivery of achievement names to the listener pipe.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Listener endpoint {endpoint} unavailable: {source}")]
    Unavailable {
        endpoint: PathBuf,
        source: std::io::Error,
    },
    #[error("Write to {endpoint} failed: {source}")]
    Write {
        endpoint: PathBuf,
        source: std::io::Error,
    },
}

/// Something that can deliver one message to the listening side.
pub trait Notify {
    fn notify(&self, message: &[u8]) -> Result<(), NotifyError>;
}

/// Full path of the pipe endpoint for `pipe_name`.
///
/// Windows uses the local named pipe namespace. Other targets use a path in
/// the temp directory, which a listener can back with a FIFO.
pub fn pipe_endpoint(pipe_name: &str) -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(format!(r"\\.\pipe\{}", pipe_name))
    } else {
        std::env::temp_dir().join(pipe_name)
    }
}

/// Opens the endpoint per message, writes the bytes and closes it again.
#[derive(Debug, Clone)]
pub struct PipeNotifier {
    endpoint: PathBuf,
}

impl PipeNotifier {
    pub fn new(endpoint: impl Into<PathBuf>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    pub fn for_pipe(pipe_name: &str) -> Self {
        Self::new(pipe_endpoint(pipe_name))
    }

    pub fn endpoint(&self) -> &Path {
        &self.endpoint
    }
}

impl Notify for PipeNotifier {
    fn notify(&self, message: &[u8]) -> Result<(), NotifyError> {
        // Never create: a missing endpoint means no listener is running.
        let mut options = OpenOptions::new();
        options.write(true);

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;

            // A FIFO without a reader fails with ENXIO instead of blocking the game.
            options.append(true).custom_flags(libc::O_NONBLOCK);
        }

        let mut pipe = options
            .open(&self.endpoint)
            .map_err(|source| NotifyError::Unavailable {
                endpoint: self.endpoint.clone(),
                source,
            })?;

        pipe.write_all(message)
            .and_then(|_| pipe.flush())
            .map_err(|source| NotifyError::Write {
                endpoint: self.endpoint.clone(),
                source,
            })
    }
}
