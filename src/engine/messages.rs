//! Message types for model runner communication.
//!
//! Every message is one JSON object per line. The exchange is strictly
//! request-response:
//! - Handshake (`HelloMessage` → `ModelInfo`)
//! - Classification (`ClassifyMessage` → `InferenceResponse`)
//! - Failures of either (`ErrorResponse`)

use crate::types::InputShape;
use serde::{Deserialize, Serialize};

/// Initial handshake sent right after connecting.
#[derive(Serialize, Debug)]
pub struct HelloMessage {
    /// Protocol version number
    pub hello: u32,
    /// Unique message identifier
    pub id: u32,
}

/// Quantized input tensor for one classification.
#[derive(Serialize, Debug)]
pub struct ClassifyMessage<'a> {
    /// Tensor bytes in NHWC order
    pub classify: &'a [u8],
    /// Unique message identifier
    pub id: u32,
}

/// Description of the loaded model, returned by the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelParameters {
    /// Required input width in pixels
    pub input_width: u32,
    /// Required input height in pixels
    pub input_height: u32,
    /// Input color channels (3 = RGB, 1 = grayscale)
    pub input_channels: u32,
    /// Number of output classes
    pub label_count: usize,
    /// Whether the model takes and produces 8-bit values
    #[serde(default)]
    pub quantized: bool,
}

impl ModelParameters {
    pub fn input_shape(&self) -> InputShape {
        InputShape::new(self.input_width, self.input_height, self.input_channels)
    }
}

/// Reply to [`HelloMessage`].
#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    /// Indicates if the model loaded successfully
    pub success: bool,
    /// Message identifier matching the request
    pub id: u32,
    pub model_parameters: ModelParameters,
}

#[derive(Debug, Deserialize)]
pub struct InferenceResult {
    /// One quantized score per class
    pub confidences: Vec<u8>,
}

/// Reply to [`ClassifyMessage`].
#[derive(Debug, Deserialize)]
pub struct InferenceResponse {
    /// Indicates if the inference was successful
    pub success: bool,
    /// Message identifier matching the request
    pub id: u32,
    pub result: InferenceResult,
}

/// Reply indicating an error condition.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    /// Always false for error responses
    pub success: bool,
    /// Optional error message describing what went wrong
    #[serde(default)]
    pub error: Option<String>,
    /// Message identifier matching the request, if available
    #[serde(default)]
    pub id: Option<u32>,
}

/// The identifier of any reply, read before the full parse.
#[derive(Debug, Deserialize)]
pub struct ReplyHeader {
    #[serde(default)]
    pub id: Option<u32>,
}
