//! Push-button image classification for single-board devices.
//!
//! A button press (or the Enter key) takes a picture, the picture is
//! center-cropped and resized to the model input, a quantized model run by
//! an external runner scores it, and the best labels are shown as a status
//! line. Readings from an onboard barometer are shown between pictures.
//!
//! ```text
//!  button / keyboard ──▶ Controller ──▶ camera ──▶ preprocess ──▶ engine ──▶ rank
//!                            │                                              │
//!                            └────────────── Notification ◀─────────────────┘
//! ```

pub mod app;
pub mod camera;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod input;
pub mod labels;
pub mod lifecycle;
pub mod preprocess;
pub mod presenter;
pub mod ranker;
pub mod sensors;
pub mod types;

pub use config::AppConfig;
pub use controller::{Controller, ControllerConfig, FailurePolicy, Notification, PipelineState};
pub use engine::{ClassifierEngine, RunnerEngine};
pub use error::{
    AppError, CaptureError, CycleError, InferenceError, LoadError, PreprocessError, RankError,
    ResourceError, SnapshotError,
};
pub use labels::LabelSet;
pub use preprocess::Preprocessor;
pub use ranker::rank;
pub use types::{
    ClassifierInput, ConfidenceVector, InputShape, RawImage, Recognition, RecognitionResult,
};

#[cfg(test)]
mod tests;
