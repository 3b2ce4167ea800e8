//! Parameter types for transform operations.
//!
//! These structs describe *what* to do, not *how*. Every constructor
//! validates its input, so a value of one of these types is always safe to
//! hand to a [`TransformEngine`](super::TransformEngine).
//!
//! ## Types
//!
//! | Type | Constraint |
//! |---|---|
//! | [`KernelSize`] | Gaussian kernel width, positive and odd; at most `2 * max(width, height) + 1` for a given image |
//! | [`EdgeThresholds`] | Canny hysteresis thresholds, finite, non-negative, `low <= high` |
//! | [`CropRegion`] | Non-zero extent; bounds checked by [`CropRegion::check_within`] |
//! | [`PixelLayout`] | Target channel layout for `Convert` |
//! | [`Quality`] | JPEG quality 1-100, default 80, clamped on construction |

use crate::error::{BridgeError, Result};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Width of a square Gaussian kernel in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelSize(u32);

impl KernelSize {
    pub fn new(radius: u32) -> Result<Self> {
        if radius == 0 {
            return Err(BridgeError::invalid_parameter(
                "blur radius must be positive",
            ));
        }
        if radius % 2 == 0 {
            return Err(BridgeError::invalid_parameter(format!(
                "blur radius must be odd, got {radius}"
            )));
        }
        Ok(Self(radius))
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Fail with `InvalidParameter` if the kernel is wider than
    /// `2 * max(width, height) + 1`, so blur cost stays bounded by the image.
    pub fn check_within(self, source: (u32, u32)) -> Result<()> {
        let (width, height) = source;
        let limit = 2 * u64::from(width.max(height)) + 1;
        if u64::from(self.0) > limit {
            return Err(BridgeError::invalid_parameter(format!(
                "blur radius {} exceeds {limit} for a {width}x{height} image",
                self.0
            )));
        }
        Ok(())
    }
}

/// Low/high hysteresis thresholds for Canny edge detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeThresholds {
    pub low: f32,
    pub high: f32,
}

impl EdgeThresholds {
    pub fn new(low: f32, high: f32) -> Result<Self> {
        for (name, value) in [("min", low), ("max", high)] {
            if !value.is_finite() || value < 0.0 {
                return Err(BridgeError::invalid_parameter(format!(
                    "edge threshold {name} must be a non-negative number, got {value}"
                )));
            }
        }
        if low > high {
            return Err(BridgeError::invalid_parameter(format!(
                "edge threshold min ({low}) exceeds max ({high})"
            )));
        }
        Ok(Self { low, high })
    }
}

/// Rectangle to cut out of a source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(BridgeError::invalid_parameter(format!(
                "crop size must be non-zero, got {width}x{height}"
            )));
        }
        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }

    /// Fail with `OutOfBounds` unless the region fits inside `source`.
    pub fn check_within(&self, source: (u32, u32)) -> Result<()> {
        let (source_width, source_height) = source;
        let fits_x = self
            .x
            .checked_add(self.width)
            .is_some_and(|right| right <= source_width);
        let fits_y = self
            .y
            .checked_add(self.height)
            .is_some_and(|bottom| bottom <= source_height);
        if fits_x && fits_y {
            Ok(())
        } else {
            Err(BridgeError::OutOfBounds {
                x: self.x,
                y: self.y,
                width: self.width,
                height: self.height,
                source_width,
                source_height,
            })
        }
    }
}

/// Channel layout a matrix is converted to before encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelLayout {
    /// 8-bit RGBA, the layout the bridge hands to bitmap consumers.
    #[default]
    Rgba8,
    Rgb8,
    Luma8,
}

impl PixelLayout {
    pub fn channels(self) -> u8 {
        match self {
            Self::Rgba8 => 4,
            Self::Rgb8 => 3,
            Self::Luma8 => 1,
        }
    }

    pub fn apply(self, image: &DynamicImage) -> DynamicImage {
        match self {
            Self::Rgba8 => DynamicImage::ImageRgba8(image.to_rgba8()),
            Self::Rgb8 => DynamicImage::ImageRgb8(image.to_rgb8()),
            Self::Luma8 => DynamicImage::ImageLuma8(image.to_luma8()),
        }
    }
}

impl fmt::Display for PixelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rgba8 => "rgba8",
            Self::Rgb8 => "rgb8",
            Self::Luma8 => "luma8",
        })
    }
}

impl FromStr for PixelLayout {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rgba8" | "rgba" => Ok(Self::Rgba8),
            "rgb8" | "rgb" => Ok(Self::Rgb8),
            "luma8" | "gray" | "grey" => Ok(Self::Luma8),
            other => Err(BridgeError::invalid_parameter(format!(
                "unknown pixel layout '{other}'"
            ))),
        }
    }
}

/// Quality setting for lossy JPEG encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn kernel_rejects_zero_and_even() {
        assert!(matches!(
            KernelSize::new(0),
            Err(BridgeError::InvalidParameter(_))
        ));
        assert!(matches!(
            KernelSize::new(4),
            Err(BridgeError::InvalidParameter(_))
        ));
        assert_eq!(KernelSize::new(5).unwrap().value(), 5);
        assert_eq!(KernelSize::new(1).unwrap().value(), 1);
    }

    #[test]
    fn kernel_limited_by_image_extent() {
        let kernel = KernelSize::new(65).unwrap();
        assert!(kernel.check_within((32, 20)).is_ok());
        assert!(matches!(
            KernelSize::new(67).unwrap().check_within((32, 20)),
            Err(BridgeError::InvalidParameter(_))
        ));
        assert!(KernelSize::new(u32::MAX).unwrap().check_within((u32::MAX, 1)).is_ok());
        assert!(
            KernelSize::new(u32::MAX)
                .unwrap()
                .check_within((32, 32))
                .is_err()
        );
    }

    #[test]
    fn thresholds_require_ordered_non_negative_values() {
        assert!(EdgeThresholds::new(50.0, 150.0).is_ok());
        assert!(EdgeThresholds::new(80.0, 80.0).is_ok());
        assert!(EdgeThresholds::new(150.0, 50.0).is_err());
        assert!(EdgeThresholds::new(-1.0, 50.0).is_err());
        assert!(EdgeThresholds::new(0.0, f32::NAN).is_err());
    }

    #[test]
    fn crop_rejects_empty_region() {
        assert!(matches!(
            CropRegion::new(0, 0, 0, 10),
            Err(BridgeError::InvalidParameter(_))
        ));
    }

    #[test]
    fn crop_bounds_are_inclusive_of_the_edge() {
        let region = CropRegion::new(540, 430, 100, 50).unwrap();
        assert!(region.check_within((640, 480)).is_ok());
    }

    #[test]
    fn crop_past_right_edge_is_out_of_bounds() {
        let region = CropRegion::new(600, 0, 100, 50).unwrap();
        assert!(matches!(
            region.check_within((640, 480)),
            Err(BridgeError::OutOfBounds {
                x: 600,
                source_width: 640,
                ..
            })
        ));
    }

    #[test]
    fn crop_overflowing_u32_is_out_of_bounds() {
        let region = CropRegion::new(u32::MAX, 0, 2, 2).unwrap();
        assert!(region.check_within((640, 480)).is_err());
    }

    #[test]
    fn layout_parses_aliases() {
        assert_eq!("RGBA".parse::<PixelLayout>().unwrap(), PixelLayout::Rgba8);
        assert_eq!("gray".parse::<PixelLayout>().unwrap(), PixelLayout::Luma8);
        assert!("cmyk".parse::<PixelLayout>().is_err());
    }

    #[test]
    fn layout_apply_changes_channel_count() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        for layout in [PixelLayout::Rgba8, PixelLayout::Rgb8, PixelLayout::Luma8] {
            let converted = layout.apply(&image);
            assert_eq!(converted.color().channel_count(), layout.channels());
        }
    }

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
        assert_eq!(Quality::default().value(), 80);
    }
}
