//! Camera sources producing one still image per request.
//!
//! - **Command**: runs a capture program (such as `libcamera-still`) that
//!   writes an encoded image to standard output.
//! - **Still**: serves image files from disk, for benches without a camera.
//!
//! Both decode with the `image` crate and deliver interleaved RGB pixels.

use crate::error::{CaptureError, SnapshotError};
use crate::lifecycle::Release;
use crate::preprocess::to_rgb;
use crate::types::{PixelFormat, RawImage};
use image::{DynamicImage, ImageFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub mod command;
pub mod still;

pub use command::CommandCamera;
pub use still::StillCamera;

/// Capture size requested from the camera.
pub const PREVIEW_WIDTH: u32 = 640;
pub const PREVIEW_HEIGHT: u32 = 480;

/// Configuration for the camera source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CameraConfig {
    /// External capture program writing one encoded image to stdout
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Image file, or a directory of images served in turn
    Still { path: PathBuf },
}

impl Default for CameraConfig {
    fn default() -> Self {
        let size = |v: u32| v.to_string();
        CameraConfig::Command {
            program: "libcamera-still".to_string(),
            args: vec![
                "--nopreview".to_string(),
                "-t".to_string(),
                "1".to_string(),
                "--width".to_string(),
                size(PREVIEW_WIDTH),
                "--height".to_string(),
                size(PREVIEW_HEIGHT),
                "-e".to_string(),
                "jpg".to_string(),
                "-o".to_string(),
                "-".to_string(),
            ],
        }
    }
}

/// A source of still images.
pub trait CameraSource: Send {
    /// Take one picture. Blocks until the image is available.
    fn request_capture(&mut self) -> Result<RawImage, CaptureError>;

    /// Free the device. Later captures fail with [`CaptureError::Released`].
    fn release(&mut self) -> Result<(), CaptureError>;
}

impl Release for Box<dyn CameraSource> {
    type Error = CaptureError;

    fn release(&mut self) -> Result<(), CaptureError> {
        CameraSource::release(self.as_mut())
    }
}

/// Open the configured camera source.
pub fn open_camera(config: &CameraConfig) -> Result<Box<dyn CameraSource>, CaptureError> {
    match config {
        CameraConfig::Command { program, args } => {
            Ok(Box::new(CommandCamera::new(program.clone(), args.clone())))
        }
        CameraConfig::Still { path } => Ok(Box::new(StillCamera::open(path)?)),
    }
}

pub(crate) fn to_raw_image(decoded: DynamicImage) -> RawImage {
    let rgb = decoded.to_rgb8();
    let (width, height) = rgb.dimensions();
    RawImage::new(width, height, PixelFormat::Rgb8, rgb.into_raw())
}

/// Write a capture to `path`, encoded as the file extension says.
///
/// The image goes to a temporary file next to `path` that then replaces
/// it, so a viewer polling the file never reads half an image.
pub fn save_snapshot(image: &RawImage, path: &Path) -> Result<(), SnapshotError> {
    let format = ImageFormat::from_path(path)?;
    let rgb = to_rgb(image)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir)?;
    rgb.write_to(file.as_file_mut(), format)?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
