//! Pure Rust transform engine.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Blur | `imageproc::filter::gaussian_blur_f32`, sigma from kernel width |
//! | Edge detect | `imageproc::edges::canny` on the luma channel |
//! | Crop | `image::DynamicImage::crop_imm` |
//! | Combine | `image::imageops::overlay` onto a white canvas |
//! | Convert | `DynamicImage::to_rgba8` / `to_rgb8` / `to_luma8` |
//! | Invert | `DynamicImage::invert` |
//! | Outline | per-pixel paint of edge pixels |
//!
//! Blur preserves 8-bit Luma, RGB and RGBA layouts. Any other layout is
//! blurred as RGBA8.

use super::calculations::{describe_mismatch, gaussian_sigma, shapes_compatible};
use super::engine::TransformEngine;
use super::params::{CropRegion, EdgeThresholds, KernelSize, PixelLayout};
use crate::error::{BridgeError, Result};
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;

/// Colour painted over detected edges by [`RustEngine::outline`].
const OUTLINE_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);

/// Background the second image of a combine is laid onto.
const CANVAS_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

pub struct RustEngine;

impl RustEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn shape(image: &DynamicImage) -> (u32, u32, u8) {
    (image.width(), image.height(), image.color().channel_count())
}

/// Bring an RGBA working copy back to the channel layout of `like`.
fn restore_layout(rgba: RgbaImage, like: &DynamicImage) -> DynamicImage {
    let working = DynamicImage::ImageRgba8(rgba);
    match like.color().channel_count() {
        1 => DynamicImage::ImageLuma8(working.to_luma8()),
        2 => DynamicImage::ImageLumaA8(working.to_luma_alpha8()),
        3 => DynamicImage::ImageRgb8(working.to_rgb8()),
        _ => working,
    }
}

impl TransformEngine for RustEngine {
    fn blur(&self, image: &DynamicImage, kernel: KernelSize) -> Result<DynamicImage> {
        let sigma = gaussian_sigma(kernel.value());
        Ok(match image {
            DynamicImage::ImageLuma8(buf) => DynamicImage::ImageLuma8(gaussian_blur_f32(buf, sigma)),
            DynamicImage::ImageRgb8(buf) => DynamicImage::ImageRgb8(gaussian_blur_f32(buf, sigma)),
            DynamicImage::ImageRgba8(buf) => {
                DynamicImage::ImageRgba8(gaussian_blur_f32(buf, sigma))
            }
            other => DynamicImage::ImageRgba8(gaussian_blur_f32(&other.to_rgba8(), sigma)),
        })
    }

    fn detect_edges(
        &self,
        image: &DynamicImage,
        thresholds: EdgeThresholds,
    ) -> Result<DynamicImage> {
        let gray = image.to_luma8();
        let edges = canny(&gray, thresholds.low, thresholds.high);
        Ok(DynamicImage::ImageLuma8(edges))
    }

    fn crop(&self, image: &DynamicImage, region: CropRegion) -> Result<DynamicImage> {
        region.check_within(image.dimensions())?;
        Ok(image.crop_imm(region.x, region.y, region.width, region.height))
    }

    fn combine(&self, first: &DynamicImage, second: &DynamicImage) -> Result<DynamicImage> {
        if !shapes_compatible(shape(first), shape(second)) {
            return Err(BridgeError::incompatible(describe_mismatch(
                shape(first),
                shape(second),
            )));
        }
        let mut canvas = RgbaImage::from_pixel(first.width(), first.height(), CANVAS_COLOR);
        image::imageops::overlay(&mut canvas, &second.to_rgba8(), 0, 0);
        image::imageops::overlay(&mut canvas, &first.to_rgba8(), 0, 0);
        Ok(restore_layout(canvas, first))
    }

    fn convert(&self, image: &DynamicImage, layout: PixelLayout) -> Result<DynamicImage> {
        Ok(layout.apply(image))
    }

    fn invert(&self, image: &DynamicImage) -> Result<DynamicImage> {
        let mut inverted = image.clone();
        inverted.invert();
        Ok(inverted)
    }

    fn outline(&self, image: &DynamicImage, edges: &DynamicImage) -> Result<DynamicImage> {
        if image.dimensions() != edges.dimensions() {
            let (w, h) = edges.dimensions();
            return Err(BridgeError::incompatible(describe_mismatch(
                shape(image),
                (w, h, 1),
            )));
        }
        let mask = edges.to_luma8();
        let mut painted = image.to_rgba8();
        for (x, y, pixel) in painted.enumerate_pixels_mut() {
            if mask.get_pixel(x, y).0[0] > 0 {
                *pixel = OUTLINE_COLOR;
            }
        }
        Ok(restore_layout(painted, image))
    }
}
