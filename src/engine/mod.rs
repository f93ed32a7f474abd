//! Classifier engine abstraction.
//!
//! The engine owns the loaded quantized model and turns one
//! [`ClassifierInput`] into one [`ConfidenceVector`]. Engines are not
//! assumed to be safe for concurrent use; the controller drives a single
//! instance from a single worker thread.
//!
//! - **Runner engine**: talks newline-delimited JSON to a model runner
//!   process (a TensorFlow Lite interpreter wrapper) over a Unix socket.
//!
//! Other engines can be added by implementing [`ClassifierEngine`].

use crate::error::InferenceError;
use crate::lifecycle::Release;
use crate::types::{ClassifierInput, ConfidenceVector, InputShape};

pub mod messages;
pub mod runner;

pub use runner::{RunnerConfig, RunnerEngine};

/// A loaded classification model.
pub trait ClassifierEngine: Send {
    /// Shape of the tensor [`infer`](Self::infer) accepts.
    fn input_shape(&self) -> InputShape;

    /// Number of output classes.
    fn label_count(&self) -> usize;

    /// Run the model once.
    fn infer(&mut self, input: &ClassifierInput) -> Result<ConfidenceVector, InferenceError>;

    /// Free the model. Idempotent; later inferences fail with
    /// [`InferenceError::Closed`].
    fn close(&mut self) -> Result<(), InferenceError>;
}

impl Release for Box<dyn ClassifierEngine> {
    type Error = InferenceError;

    fn release(&mut self) -> Result<(), InferenceError> {
        self.close()
    }
}
