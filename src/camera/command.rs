use super::{to_raw_image, CameraSource};
use crate::error::CaptureError;
use crate::types::RawImage;
use std::process::{Command, Stdio};
use std::time::Instant;
use tracing::debug;

/// Captures by running an external program and decoding its stdout.
#[derive(Debug, Clone)]
pub struct CommandCamera {
    program: String,
    args: Vec<String>,
    released: bool,
}

impl CommandCamera {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            released: false,
        }
    }
}

impl CameraSource for CommandCamera {
    fn request_capture(&mut self) -> Result<RawImage, CaptureError> {
        if self.released {
            return Err(CaptureError::Released);
        }

        let started = Instant::now();
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| CaptureError::Unavailable(format!("{}: {e}", self.program)))?;

        if !output.status.success() {
            return Err(CaptureError::CommandFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let decoded = image::load_from_memory(&output.stdout)?;
        let raw = to_raw_image(decoded);
        debug!(
            program = %self.program,
            bytes = output.stdout.len(),
            width = raw.width,
            height = raw.height,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Captured"
        );
        Ok(raw)
    }

    fn release(&mut self) -> Result<(), CaptureError> {
        self.released = true;
        Ok(())
    }
}
