//! Transform engine trait.
//!
//! The [`TransformEngine`] trait is the seam between the pipeline (which
//! decides what runs, in which order, on which handles) and the pixel
//! algorithms. Implementations are pure: same input, same output, no side
//! effects. Parameters arrive already validated (see [`params`](super::params)),
//! so engines only fail on genuinely unexpected conditions.
//!
//! The production implementation is
//! [`RustEngine`](super::rust_engine::RustEngine).

use super::params::{CropRegion, EdgeThresholds, KernelSize, PixelLayout};
use crate::error::Result;
use image::DynamicImage;

pub trait TransformEngine: Sync {
    /// Gaussian blur with a square kernel.
    fn blur(&self, image: &DynamicImage, kernel: KernelSize) -> Result<DynamicImage>;

    /// Canny edge map: single channel, edges white on black.
    fn detect_edges(&self, image: &DynamicImage, thresholds: EdgeThresholds)
    -> Result<DynamicImage>;

    /// Cut a region that is already known to fit inside `image`.
    fn crop(&self, image: &DynamicImage, region: CropRegion) -> Result<DynamicImage>;

    /// Composite `first` over `second`. Both have identical shape.
    fn combine(&self, first: &DynamicImage, second: &DynamicImage) -> Result<DynamicImage>;

    fn convert(&self, image: &DynamicImage, layout: PixelLayout) -> Result<DynamicImage>;

    /// Invert every colour channel, leaving alpha untouched.
    fn invert(&self, image: &DynamicImage) -> Result<DynamicImage>;

    /// Paint the non-zero pixels of `edges` onto `image`.
    fn outline(&self, image: &DynamicImage, edges: &DynamicImage) -> Result<DynamicImage>;
}
