//! Conversion of camera images into classifier input tensors.
//!
//! The source is center-cropped to the aspect ratio of the target shape
//! (the largest centered window that fits, no padding) and then resampled
//! with a triangle filter to the exact target size. Channel bytes are passed
//! through unnormalized since the model is integer-quantized.
//!
//! The conversion is a pure function of its input: the same [`RawImage`]
//! always yields a byte-identical [`ClassifierInput`].

use crate::error::PreprocessError;
use crate::types::{ClassifierInput, InputShape, PixelFormat, RawImage};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageBuffer, RgbImage, RgbaImage};
use tracing::trace;

/// Crop window inside the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Largest centered window of `source` with the aspect ratio of `target`.
pub fn center_crop(source: (u32, u32), target: (u32, u32)) -> CropWindow {
    let (sw, sh) = (u64::from(source.0), u64::from(source.1));
    let (tw, th) = (u64::from(target.0), u64::from(target.1));

    // Compare sw/sh against tw/th without division.
    let (width, height) = if sw * th > sh * tw {
        ((sh * tw / th).max(1), sh)
    } else {
        (sw, (sw * th / tw).max(1))
    };

    CropWindow {
        x: ((sw - width) / 2) as u32,
        y: ((sh - height) / 2) as u32,
        width: width as u32,
        height: height as u32,
    }
}

#[derive(Debug, Clone)]
pub struct Preprocessor {
    target: InputShape,
}

impl Preprocessor {
    pub fn new(target: InputShape) -> Result<Self, PreprocessError> {
        if target.width == 0 || target.height == 0 {
            return Err(PreprocessError::InvalidShape(format!(
                "zero-sized target {target}"
            )));
        }
        if target.channels != 1 && target.channels != 3 {
            return Err(PreprocessError::InvalidShape(format!(
                "{} channels, expected 1 or 3",
                target.channels
            )));
        }
        Ok(Self { target })
    }

    pub fn target(&self) -> InputShape {
        self.target
    }

    pub fn preprocess(&self, image: &RawImage) -> Result<ClassifierInput, PreprocessError> {
        let rgb = to_rgb(image)?;
        let (tw, th) = (self.target.width, self.target.height);

        let window = center_crop((image.width, image.height), (tw, th));
        trace!(?window, source_width = image.width, source_height = image.height, "Cropping");

        let resized: RgbImage = if window.width == tw && window.height == th {
            imageops::crop_imm(&rgb, window.x, window.y, tw, th).to_image()
        } else {
            let cropped =
                imageops::crop_imm(&rgb, window.x, window.y, window.width, window.height)
                    .to_image();
            imageops::resize(&cropped, tw, th, FilterType::Triangle)
        };

        let data = if self.target.channels == 1 {
            DynamicImage::ImageRgb8(resized).to_luma8().into_raw()
        } else {
            resized.into_raw()
        };

        Ok(ClassifierInput::new(self.target, data))
    }
}

pub(crate) fn to_rgb(image: &RawImage) -> Result<RgbImage, PreprocessError> {
    if image.width == 0 || image.height == 0 {
        return Err(PreprocessError::EmptyImage {
            width: image.width,
            height: image.height,
        });
    }
    let bpp = image
        .format
        .bytes_per_pixel()
        .ok_or(PreprocessError::UnsupportedFormat(image.format))?;
    let expected = image.width as usize * image.height as usize * bpp;
    if image.data.len() != expected {
        return Err(PreprocessError::BufferSize {
            expected,
            actual: image.data.len(),
        });
    }

    let (w, h) = (image.width, image.height);
    let size_error = || PreprocessError::BufferSize {
        expected,
        actual: image.data.len(),
    };

    let rgb = match image.format {
        PixelFormat::Rgb8 => RgbImage::from_raw(w, h, image.data.clone()).ok_or_else(size_error)?,
        PixelFormat::Bgr8 => {
            let swapped = image
                .data
                .chunks_exact(3)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect();
            RgbImage::from_raw(w, h, swapped).ok_or_else(size_error)?
        }
        PixelFormat::Rgba8 => {
            let rgba: RgbaImage =
                ImageBuffer::from_raw(w, h, image.data.clone()).ok_or_else(size_error)?;
            DynamicImage::ImageRgba8(rgba).to_rgb8()
        }
        PixelFormat::Luma8 => {
            let gray: GrayImage =
                ImageBuffer::from_raw(w, h, image.data.clone()).ok_or_else(size_error)?;
            DynamicImage::ImageLuma8(gray).to_rgb8()
        }
        PixelFormat::Nv21 => return Err(PreprocessError::UnsupportedFormat(image.format)),
    };
    Ok(rgb)
}
