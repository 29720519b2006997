//! Conversions between 8-bit pixel buffers and `[H, W, C]` image tensors.
//!
//! Image tensors hold raw intensities in `[0, 255]` as `f32`, row-major with
//! interleaved channels.

use crate::autograd::Tensor;
use crate::error::{EnganarError, Result};

/// Smallest representable pixel intensity.
pub const PIXEL_MIN: f32 = 0.0;

/// Largest representable pixel intensity.
pub const PIXEL_MAX: f32 = 255.0;

/// Build an RGB image tensor from an interleaved 8-bit buffer.
///
/// Accepts RGB (`channels == 3`) or RGBA (`channels == 4`) input; alpha is
/// dropped so the result is always `[height, width, 3]`.
///
/// # Errors
///
/// Returns `InvalidArgument` for other channel counts, zero-sized images, or
/// a buffer whose length is not `height * width * channels`.
///
/// # Example
///
/// ```
/// use enganar::image::from_pixels;
///
/// let rgba = [10, 20, 30, 255, 40, 50, 60, 0];
/// let img = from_pixels(&rgba, 1, 2, 4).unwrap();
/// assert_eq!(img.shape(), &[1, 2, 3]);
/// assert_eq!(img.data(), &[10.0, 20.0, 30.0, 40.0, 50.0, 60.0]);
/// ```
pub fn from_pixels(bytes: &[u8], height: usize, width: usize, channels: usize) -> Result<Tensor> {
    if channels != 3 && channels != 4 {
        return Err(EnganarError::invalid_argument(
            "channels",
            channels,
            "3 (RGB) or 4 (RGBA)",
        ));
    }
    if height == 0 || width == 0 {
        return Err(EnganarError::invalid_argument(
            "dimensions",
            format!("{height}x{width}"),
            "non-zero height and width",
        ));
    }
    let expected = height * width * channels;
    if bytes.len() != expected {
        return Err(EnganarError::invalid_argument(
            "bytes.len()",
            bytes.len(),
            &format!("{expected} ({height}x{width}x{channels})"),
        ));
    }

    let data: Vec<f32> = bytes
        .chunks_exact(channels)
        .flat_map(|px| px[..3].iter().map(|&b| f32::from(b)))
        .collect();
    Ok(Tensor::from_vec(data, &[height, width, 3]))
}

/// Clip to `[0, 255]`, round, and convert to bytes.
///
/// NaN maps to 0.
#[must_use]
pub fn to_pixels(image: &Tensor) -> Vec<u8> {
    image
        .data()
        .iter()
        .map(|&v| {
            if v.is_nan() {
                0
            } else {
                // Clamped to the u8 range first, so the cast is exact.
                v.clamp(PIXEL_MIN, PIXEL_MAX).round() as u8
            }
        })
        .collect()
}

/// Scale raw intensities into `[0, 1]` for display.
#[must_use]
pub fn to_unit_range(image: &Tensor) -> Tensor {
    image.mul_scalar(1.0 / PIXEL_MAX)
}

/// Height, width and channel count of an image tensor.
///
/// # Errors
///
/// Returns `InvalidArgument` if `image` is not rank 3.
pub fn dims(image: &Tensor) -> Result<(usize, usize, usize)> {
    match *image.shape() {
        [h, w, c] => Ok((h, w, c)),
        _ => Err(EnganarError::shape_mismatch(
            "image",
            image.shape(),
            "rank 3 [H, W, C]",
        )),
    }
}

/// Constant image of the given size.
#[must_use]
pub fn filled(height: usize, width: usize, channels: usize, value: f32) -> Tensor {
    Tensor::full(&[height, width, channels], value)
}

/// L∞ distance between two images of the same shape.
///
/// # Errors
///
/// Returns `InvalidArgument` if the shapes differ.
pub fn max_abs_diff(a: &Tensor, b: &Tensor) -> Result<f32> {
    if a.shape() != b.shape() {
        return Err(EnganarError::shape_mismatch(
            "image",
            b.shape(),
            &format!("{:?}", a.shape()),
        ));
    }
    Ok(a.data()
        .iter()
        .zip(b.data())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f32::max))
}
