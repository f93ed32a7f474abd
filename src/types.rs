//! Data model shared by the capture-classify pipeline.
//!
//! Per-capture values ([`RawImage`], [`ClassifierInput`],
//! [`ConfidenceVector`], [`RecognitionResult`]) are owned by a single
//! recognition cycle and dropped when it ends. [`EnvironmentReading`] lives
//! for the whole process and is updated by sensor events.

use crate::sensors::{SensorEvent, SensorKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pixel layout of a decoded camera buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// Interleaved 8-bit red, green, blue
    Rgb8,
    /// Interleaved 8-bit red, green, blue, alpha
    Rgba8,
    /// Interleaved 8-bit blue, green, red
    Bgr8,
    /// Single 8-bit luminance channel
    Luma8,
    /// Semi-planar YCrCb 4:2:0, the default preview format of many camera stacks
    Nv21,
}

impl PixelFormat {
    /// Bytes per pixel for packed formats, `None` for planar ones.
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => Some(3),
            PixelFormat::Rgba8 => Some(4),
            PixelFormat::Luma8 => Some(1),
            PixelFormat::Nv21 => None,
        }
    }
}

/// A decoded still image as delivered by a camera source.
#[derive(Clone, PartialEq, Eq)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl RawImage {
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            data,
        }
    }
}

impl fmt::Debug for RawImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}

fn default_input_side() -> u32 {
    224
}

fn default_input_channels() -> u32 {
    3
}

/// Shape of the classifier input tensor, batch size fixed at one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputShape {
    /// Input width in pixels
    #[serde(default = "default_input_side")]
    pub width: u32,
    /// Input height in pixels
    #[serde(default = "default_input_side")]
    pub height: u32,
    /// Channels per pixel (3 = RGB, 1 = grayscale)
    #[serde(default = "default_input_channels")]
    pub channels: u32,
}

impl InputShape {
    pub const BATCH: usize = 1;

    pub fn new(width: u32, height: u32, channels: u32) -> Self {
        Self {
            width,
            height,
            channels,
        }
    }

    /// Exact number of bytes in a tensor of this shape.
    pub fn byte_len(&self) -> usize {
        Self::BATCH * self.width as usize * self.height as usize * self.channels as usize
    }
}

impl Default for InputShape {
    fn default() -> Self {
        Self::new(
            default_input_side(),
            default_input_side(),
            default_input_channels(),
        )
    }
}

impl fmt::Display for InputShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}x{}x{}",
            Self::BATCH,
            self.height,
            self.width,
            self.channels
        )
    }
}

/// Fixed-size quantized input buffer for the classifier.
#[derive(Clone, PartialEq, Eq)]
pub struct ClassifierInput {
    shape: InputShape,
    data: Vec<u8>,
}

impl ClassifierInput {
    pub(crate) fn new(shape: InputShape, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), shape.byte_len());
        Self { shape, data }
    }

    pub fn shape(&self) -> InputShape {
        self.shape
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for ClassifierInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierInput")
            .field("shape", &self.shape)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Per-label quantized scores, index-aligned with the label set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfidenceVector(Vec<u8>);

impl ConfidenceVector {
    pub fn new(scores: Vec<u8>) -> Self {
        Self(scores)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for ConfidenceVector {
    fn from(scores: Vec<u8>) -> Self {
        Self(scores)
    }
}

/// One label with its quantized confidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recognition {
    pub label: String,
    pub confidence: u8,
}

impl Recognition {
    pub fn new(label: impl Into<String>, confidence: u8) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }

    /// Confidence rescaled to the 0.0 to 1.0 range.
    pub fn probability(&self) -> f32 {
        f32::from(self.confidence) / 255.0
    }
}

/// Ranked recognitions, highest confidence first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecognitionResult(Vec<Recognition>);

impl RecognitionResult {
    pub fn new(recognitions: Vec<Recognition>) -> Self {
        Self(recognitions)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Recognition> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn best(&self) -> Option<&Recognition> {
        self.0.first()
    }
}

impl<'a> IntoIterator for &'a RecognitionResult {
    type Item = &'a Recognition;
    type IntoIter = std::slice::Iter<'a, Recognition>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Renders as `a, b or c`.
impl fmt::Display for RecognitionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.0.len();
        for (i, recognition) in self.0.iter().enumerate() {
            write!(f, "{}", recognition.label)?;
            let shown = i + 1;
            if shown + 1 < count {
                write!(f, ", ")?;
            } else if shown + 1 == count {
                write!(f, " or ")?;
            }
        }
        Ok(())
    }
}

/// Latest environmental values, `None` until the first reading arrives.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnvironmentReading {
    /// Degrees Celsius
    pub temperature: Option<f32>,
    /// Hectopascal
    pub pressure: Option<f32>,
}

impl EnvironmentReading {
    /// Fold a sensor event in. Returns true if a value changed.
    ///
    /// Disconnects keep the last known value.
    pub fn apply(&mut self, event: &SensorEvent) -> bool {
        let SensorEvent::Reading { kind, value } = *event else {
            return false;
        };
        let slot = match kind {
            SensorKind::Temperature => &mut self.temperature,
            SensorKind::Pressure => &mut self.pressure,
        };
        let changed = *slot != Some(value);
        *slot = Some(value);
        changed
    }
}

impl fmt::Display for EnvironmentReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.temperature {
            Some(t) => writeln!(f, "Onboard Temperature: {t:.2} °C.")?,
            None => writeln!(f, "Onboard Temperature: n/a.")?,
        }
        match self.pressure {
            Some(p) => writeln!(f, "Barometric Pressure: {p:.2} hPa.")?,
            None => writeln!(f, "Barometric Pressure: n/a.")?,
        }
        Ok(())
    }
}
