//! Error types for the image classifier.
//!
//! Each stage of a recognition cycle has its own error type so the
//! controller can tell capture failures from inference failures when it
//! logs them. Per-cycle errors are folded into [`CycleError`] at the
//! controller boundary; startup errors surface as [`AppError`].
//!
//! Optional peripherals (button, sensors) report [`ResourceError`], which
//! the application treats as non-fatal.

use crate::types::PixelFormat;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to obtain a still image from the camera source.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// The camera device or image source cannot be used.
    ///
    /// This error occurs when:
    /// - The configured image file or directory does not exist
    /// - A still-image directory contains no decodable images
    #[error("Camera unavailable: {0}")]
    Unavailable(String),

    /// Reading from the camera source failed.
    #[error("Camera I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The capture command exited unsuccessfully.
    #[error("Capture command failed ({status}): {stderr}")]
    CommandFailed { status: String, stderr: String },

    /// The captured bytes could not be decoded into pixels.
    #[error("Failed to decode captured image: {0}")]
    Decode(#[from] image::ImageError),

    /// A capture was requested after the camera was released.
    #[error("Camera has been released")]
    Released,
}

/// The raw image cannot be turned into classifier input.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PreprocessError {
    /// The source image has no pixels.
    #[error("Image has zero area ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    /// The pixel layout has no conversion to RGB bytes.
    #[error("Unsupported pixel format: {0:?}")]
    UnsupportedFormat(PixelFormat),

    /// The pixel buffer does not match the declared dimensions.
    #[error("Pixel buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    /// The target tensor shape is unusable.
    #[error("Invalid target shape: {0}")]
    InvalidShape(String),
}

/// Failure while running the classifier engine.
#[derive(Error, Debug)]
pub enum InferenceError {
    /// Socket communication with the engine failed.
    ///
    /// This error occurs when:
    /// - The runner process exited or closed its socket
    /// - A response did not arrive before the configured timeout
    #[error("Engine I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine answered with something that is not a valid response.
    #[error("Engine protocol error: {0}")]
    Protocol(String),

    /// The engine reported a failure of its own.
    #[error("Engine reported failure: {0}")]
    Runner(String),

    /// The input buffer does not match the model input tensor.
    #[error("Input holds {actual} bytes, model expects {expected}")]
    InputSize { expected: usize, actual: usize },

    /// The number of confidences does not match the label count.
    #[error("Engine returned {actual} confidences, expected {expected}")]
    OutputSize { expected: usize, actual: usize },

    /// The engine has been closed.
    #[error("Engine is closed")]
    Closed,
}

/// Failure to load the model, the labels or the engine at startup.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The model file cannot be read.
    #[error("Cannot read model file {path}: {source}")]
    ModelFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The labels file cannot be read.
    #[error("Cannot read labels: {0}")]
    Labels(#[from] std::io::Error),

    /// The labels file holds no labels.
    #[error("Label file is empty")]
    EmptyLabels,

    /// The runner process could not be started.
    #[error("Failed to start model runner: {0}")]
    Spawn(String),

    /// The runner socket could not be reached.
    #[error("Runner socket error: {0}")]
    Socket(String),

    /// The runner did not complete the hello exchange.
    #[error("Runner handshake failed: {0}")]
    Handshake(String),

    /// The model and the labels disagree on the number of classes.
    #[error("Model has {model} outputs but {labels} labels were loaded")]
    LabelCountMismatch { model: usize, labels: usize },

    /// The model input tensor differs from the configured input shape.
    #[error("Model expects {model} input, configured for {configured}")]
    ShapeMismatch { model: String, configured: String },
}

/// The confidence vector cannot be ranked against the labels.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RankError {
    #[error("Confidence vector is empty")]
    EmptyConfidences,

    #[error("Label set is empty")]
    EmptyLabels,

    #[error("{confidences} confidences for {labels} labels")]
    LengthMismatch { confidences: usize, labels: usize },
}

/// An optional peripheral could not be brought up.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The device is not present or not usable.
    #[error("{resource} unavailable: {reason}")]
    Unavailable {
        resource: &'static str,
        reason: String,
    },

    /// Accessing the device failed.
    #[error("Device I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResourceError {
    pub(crate) fn unavailable(resource: &'static str, reason: impl Into<String>) -> Self {
        ResourceError::Unavailable {
            resource,
            reason: reason.into(),
        }
    }
}

/// Any failure inside one capture-classify cycle.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("Capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("Preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),

    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("Ranking failed: {0}")]
    Rank(#[from] RankError),

    /// A camera, engine or pipeline step panicked. The worker keeps running.
    #[error("Recognition step panicked: {0}")]
    Panicked(String),
}

/// The last capture could not be written to disk.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Cannot convert capture: {0}")]
    Convert(#[from] PreprocessError),

    /// Unknown file extension, or the encoder failed.
    #[error("Cannot encode capture: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Cannot write capture: {0}")]
    Io(#[from] std::io::Error),
}

/// The configuration file is missing, malformed, or out of range.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Startup failures that stop the application.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// The engine's input tensor cannot be produced from camera images.
    #[error("Unusable model input: {0}")]
    Input(#[from] PreprocessError),

    #[error("Failed to start worker: {0}")]
    Io(#[from] std::io::Error),
}
