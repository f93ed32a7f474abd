use super::{to_raw_image, CameraSource};
use crate::error::CaptureError;
use crate::types::RawImage;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Serves pictures from disk instead of a camera.
///
/// A file path yields the same picture every time; a directory yields its
/// images in file-name order, wrapping around at the end.
#[derive(Debug)]
pub struct StillCamera {
    files: Vec<PathBuf>,
    next: usize,
    released: bool,
}

impl StillCamera {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let files = if path.is_dir() {
            let mut files: Vec<PathBuf> = fs::read_dir(path)?
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|p| is_image(p))
                .collect();
            files.sort();
            files
        } else if path.is_file() {
            vec![path.to_path_buf()]
        } else {
            return Err(CaptureError::Unavailable(format!(
                "{} does not exist",
                path.display()
            )));
        };

        if files.is_empty() {
            return Err(CaptureError::Unavailable(format!(
                "no images in {}",
                path.display()
            )));
        }

        Ok(Self {
            files,
            next: 0,
            released: false,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

impl CameraSource for StillCamera {
    fn request_capture(&mut self) -> Result<RawImage, CaptureError> {
        if self.released {
            return Err(CaptureError::Released);
        }
        let path = &self.files[self.next % self.files.len()];
        self.next = (self.next + 1) % self.files.len();

        let decoded = image::open(path)?;
        debug!(path = %path.display(), "Loaded still image");
        Ok(to_raw_image(decoded))
    }

    fn release(&mut self) -> Result<(), CaptureError> {
        self.released = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn save(dir: &Path, name: &str, value: u8) {
        RgbImage::from_pixel(3, 2, Rgb([value, value, value]))
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn test_directory_round_robin() {
        let dir = tempfile::tempdir().unwrap();
        save(dir.path(), "b.png", 20);
        save(dir.path(), "a.png", 10);
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut camera = StillCamera::open(dir.path()).unwrap();
        assert_eq!(camera.len(), 2);
        let first = camera.request_capture().unwrap();
        let second = camera.request_capture().unwrap();
        let third = camera.request_capture().unwrap();
        assert_eq!(first.data[0], 10);
        assert_eq!(second.data[0], 20);
        assert_eq!(third.data[0], 10);
        assert_eq!((first.width, first.height), (3, 2));
    }

    #[test]
    fn test_missing_path() {
        let result = StillCamera::open("/nonexistent/penguins.png");
        assert!(matches!(result, Err(CaptureError::Unavailable(_))));
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            StillCamera::open(dir.path()),
            Err(CaptureError::Unavailable(_))
        ));
    }

    #[test]
    fn test_undecodable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        fs::write(&path, b"not a png").unwrap();
        let mut camera = StillCamera::open(&path).unwrap();
        assert!(matches!(
            camera.request_capture(),
            Err(CaptureError::Decode(_))
        ));
    }
}
