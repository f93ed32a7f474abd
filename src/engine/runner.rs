//! Model runner engine.
//!
//! The quantized model is executed by a separate runner process that wraps
//! the inference interpreter. The engine starts it as
//! `runner <socket_path> <model_path>`, connects to the Unix socket the
//! runner creates, and exchanges newline-delimited JSON messages (see
//! [`messages`](super::messages)).
//!
//! The socket lives in a private temporary directory that is removed when
//! the engine is dropped.

use super::messages::{
    ClassifyMessage, ErrorResponse, HelloMessage, InferenceResponse, ModelInfo, ModelParameters,
    ReplyHeader,
};
use super::ClassifierEngine;
use crate::error::{InferenceError, LoadError};
use crate::labels::LabelSet;
use crate::types::{ClassifierInput, ConfidenceVector, InputShape};
use rand::{thread_rng, Rng};
use serde::de::DeserializeOwned;
use std::io::{BufRead, BufReader, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tempfile::{tempdir, TempDir};
use tracing::{debug, info, trace, warn};

/// Default time allowed for the runner to come up and for each inference.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Where to find the runner and the model it should load.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Runner executable
    pub runner: PathBuf,
    /// Quantized model file handed to the runner
    pub model: PathBuf,
    /// Startup and per-request timeout
    pub timeout: Duration,
}

impl RunnerConfig {
    pub fn new(runner: impl Into<PathBuf>, model: impl Into<PathBuf>) -> Self {
        Self {
            runner: runner.into(),
            model: model.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

pub struct RunnerEngine {
    /// Path to the Unix socket used for IPC
    socket_path: PathBuf,
    /// Handle to the temporary directory for the socket (ensures cleanup)
    _tempdir: Option<TempDir>,
    /// Write half of the connection
    socket: UnixStream,
    /// Buffered read half of the connection
    reader: BufReader<UnixStream>,
    /// Runner process, if this engine started it
    process: Option<Child>,
    /// Counter for generating unique message IDs
    message_id: AtomicU32,
    /// Parameters reported by the runner during the handshake
    parameters: ModelParameters,
    closed: bool,
}

impl RunnerEngine {
    /// Start a runner for the configured model and check it against the labels.
    pub fn load(
        config: &RunnerConfig,
        labels: &LabelSet,
        shape: InputShape,
    ) -> Result<Self, LoadError> {
        std::fs::metadata(&config.model).map_err(|source| LoadError::ModelFile {
            path: config.model.clone(),
            source,
        })?;
        Self::ensure_executable(&config.runner)?;

        let tempdir =
            tempdir().map_err(|e| LoadError::Socket(format!("Failed to create tempdir: {e}")))?;
        let socket_name = format!("classifier_{}.sock", thread_rng().gen::<u64>());
        let socket_path = tempdir.path().join(socket_name);

        info!(
            runner = %config.runner.display(),
            model = %config.model.display(),
            "Starting model runner"
        );
        let mut process = Command::new(&config.runner)
            .arg(&socket_path)
            .arg(&config.model)
            .spawn()
            .map_err(|e| LoadError::Spawn(format!("{}: {e}", config.runner.display())))?;

        let socket = match Self::connect_with_retry(&socket_path, config.timeout, Some(&mut process))
        {
            Ok(socket) => socket,
            Err(e) => {
                let _ = process.kill();
                let _ = process.wait();
                return Err(e);
            }
        };

        Self::handshake(
            socket,
            socket_path,
            Some(tempdir),
            Some(process),
            config.timeout,
            labels,
            shape,
        )
    }

    /// Attach to a runner that is already listening on `socket_path`.
    pub fn connect<P: AsRef<Path>>(
        socket_path: P,
        timeout: Duration,
        labels: &LabelSet,
        shape: InputShape,
    ) -> Result<Self, LoadError> {
        let socket_path = socket_path.as_ref().to_path_buf();
        let socket = Self::connect_with_retry(&socket_path, timeout, None)?;
        Self::handshake(socket, socket_path, None, None, timeout, labels, shape)
    }

    /// Ensure the runner has execution permissions for the current user
    fn ensure_executable(path: &Path) -> Result<(), LoadError> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = std::fs::metadata(path)
            .map_err(|e| LoadError::Spawn(format!("{}: {e}", path.display())))?;

        let perms = metadata.permissions();
        let current_mode = perms.mode();
        if current_mode & 0o100 == 0 {
            let mut new_perms = perms;
            new_perms.set_mode(current_mode | 0o100);
            std::fs::set_permissions(path, new_perms).map_err(|e| {
                LoadError::Spawn(format!("Failed to set executable permissions: {e}"))
            })?;
        }
        Ok(())
    }

    /// Connect to the socket with retry logic
    fn connect_with_retry(
        socket_path: &Path,
        timeout: Duration,
        mut process: Option<&mut Child>,
    ) -> Result<UnixStream, LoadError> {
        debug!(socket = %socket_path.display(), "Connecting to runner");
        let start = Instant::now();
        let retry_interval = Duration::from_millis(50);

        while start.elapsed() < timeout {
            match UnixStream::connect(socket_path) {
                Ok(stream) => return Ok(stream),
                Err(e)
                    if e.kind() != std::io::ErrorKind::NotFound
                        && e.kind() != std::io::ErrorKind::ConnectionRefused =>
                {
                    return Err(LoadError::Socket(format!("Failed to connect to socket: {e}")));
                }
                Err(_) => {}
            }
            if let Some(child) = process.as_deref_mut() {
                if let Ok(Some(status)) = child.try_wait() {
                    return Err(LoadError::Spawn(format!(
                        "Runner exited before opening its socket ({status})"
                    )));
                }
            }
            std::thread::sleep(retry_interval);
        }

        Err(LoadError::Socket(format!(
            "Timeout waiting for socket {} to become available",
            socket_path.display()
        )))
    }

    fn handshake(
        socket: UnixStream,
        socket_path: PathBuf,
        tempdir: Option<TempDir>,
        process: Option<Child>,
        timeout: Duration,
        labels: &LabelSet,
        shape: InputShape,
    ) -> Result<Self, LoadError> {
        let io_error = |e: std::io::Error| LoadError::Socket(e.to_string());
        socket.set_read_timeout(Some(timeout)).map_err(io_error)?;
        socket.set_write_timeout(Some(timeout)).map_err(io_error)?;
        let reader = BufReader::new(socket.try_clone().map_err(io_error)?);

        // Dropping `engine` on any error below stops the runner.
        let mut engine = Self {
            socket_path,
            _tempdir: tempdir,
            socket,
            reader,
            process,
            message_id: AtomicU32::new(1),
            parameters: ModelParameters {
                input_width: 0,
                input_height: 0,
                input_channels: 0,
                label_count: 0,
                quantized: false,
            },
            closed: false,
        };

        let hello = HelloMessage {
            id: engine.next_message_id(),
            hello: 1,
        };
        let info: ModelInfo = engine
            .request(hello.id, &hello)
            .map_err(|e| LoadError::Handshake(e.to_string()))?;
        if !info.success {
            return Err(LoadError::Handshake("runner failed to load the model".to_string()));
        }
        if info.id != hello.id {
            return Err(LoadError::Handshake(format!(
                "reply for message {} while waiting for {}",
                info.id, hello.id
            )));
        }

        let parameters = info.model_parameters;
        if parameters.label_count != labels.len() {
            return Err(LoadError::LabelCountMismatch {
                model: parameters.label_count,
                labels: labels.len(),
            });
        }
        if parameters.input_shape() != shape {
            return Err(LoadError::ShapeMismatch {
                model: parameters.input_shape().to_string(),
                configured: shape.to_string(),
            });
        }
        if !parameters.quantized {
            warn!("Runner reports a non-quantized model, inputs are still sent as raw bytes");
        }

        info!(
            input = %parameters.input_shape(),
            labels = parameters.label_count,
            "Model loaded"
        );
        engine.parameters = parameters;
        Ok(engine)
    }

    pub fn parameters(&self) -> &ModelParameters {
        &self.parameters
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Generate the next unique message ID
    fn next_message_id(&self) -> u32 {
        self.message_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Send message `id` and read its reply.
    ///
    /// Replies to earlier messages (a runner answering after a timed-out
    /// request) are skipped.
    fn request<M, R>(&mut self, id: u32, message: &M) -> Result<R, InferenceError>
    where
        M: serde::Serialize,
        R: DeserializeOwned,
    {
        let json = serde_json::to_string(message)
            .map_err(|e| InferenceError::Protocol(format!("Failed to serialize request: {e}")))?;
        trace!(id, bytes = json.len(), "Sending request");

        self.socket.write_all(json.as_bytes())?;
        self.socket.write_all(b"\n")?;

        loop {
            let mut response = String::new();
            if self.reader.read_line(&mut response)? == 0 {
                return Err(InferenceError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "runner closed the connection",
                )));
            }
            trace!(bytes = response.len(), "Received reply");
            if let Ok(ReplyHeader {
                id: Some(reply_id),
            }) = serde_json::from_str(&response)
            {
                if reply_id < id {
                    debug!(reply_id, waiting_for = id, "Discarding stale reply");
                    continue;
                }
            }
            return parse_reply(&response);
        }
    }
}

/// Parse a reply, turning `{"success":false,...}` into [`InferenceError::Runner`].
fn parse_reply<R: DeserializeOwned>(line: &str) -> Result<R, InferenceError> {
    match serde_json::from_str::<R>(line) {
        Ok(reply) => Ok(reply),
        Err(parse_error) => match serde_json::from_str::<ErrorResponse>(line) {
            Ok(ErrorResponse {
                success: false,
                error,
                ..
            }) => Err(InferenceError::Runner(
                error.unwrap_or_else(|| "unknown error".to_string()),
            )),
            _ => Err(InferenceError::Protocol(format!(
                "Failed to parse reply: {parse_error} (raw: {})",
                line.trim()
            ))),
        },
    }
}

impl ClassifierEngine for RunnerEngine {
    fn input_shape(&self) -> InputShape {
        self.parameters.input_shape()
    }

    fn label_count(&self) -> usize {
        self.parameters.label_count
    }

    fn infer(&mut self, input: &ClassifierInput) -> Result<ConfidenceVector, InferenceError> {
        if self.closed {
            return Err(InferenceError::Closed);
        }
        let expected = self.input_shape().byte_len();
        if input.len() != expected {
            return Err(InferenceError::InputSize {
                expected,
                actual: input.len(),
            });
        }

        let id = self.next_message_id();
        let started = Instant::now();
        let response: InferenceResponse = self.request(
            id,
            &ClassifyMessage {
                classify: input.as_bytes(),
                id,
            },
        )?;

        if !response.success {
            return Err(InferenceError::Runner("inference unsuccessful".to_string()));
        }
        if response.id != id {
            return Err(InferenceError::Protocol(format!(
                "Reply for message {} while waiting for {id}",
                response.id
            )));
        }
        let confidences = response.result.confidences;
        if confidences.len() != self.parameters.label_count {
            return Err(InferenceError::OutputSize {
                expected: self.parameters.label_count,
                actual: confidences.len(),
            });
        }

        debug!(
            id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Inference complete"
        );
        Ok(ConfidenceVector::new(confidences))
    }

    fn close(&mut self) -> Result<(), InferenceError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Err(e) = self.socket.shutdown(Shutdown::Both) {
            if e.kind() != std::io::ErrorKind::NotConnected {
                warn!(error = %e, "Failed to shut down runner socket");
            }
        }
        if let Some(mut process) = self.process.take() {
            // kill() fails with InvalidInput once the runner has exited on its own.
            if let Err(e) = process.kill() {
                if e.kind() != std::io::ErrorKind::InvalidInput {
                    return Err(InferenceError::Io(e));
                }
            }
            let status = process.wait()?;
            debug!(%status, "Model runner stopped");
        }
        Ok(())
    }
}

impl Drop for RunnerEngine {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "Failed to stop model runner");
        }
    }
}

impl std::fmt::Debug for RunnerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerEngine")
            .field("socket_path", &self.socket_path)
            .field("parameters", &self.parameters)
            .field("closed", &self.closed)
            .finish()
    }
}
