//! Pixel transforms in pure Rust, no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Blur** | `imageproc` Gaussian blur |
//! | **Edge detect** | `imageproc` Canny |
//! | **Crop / Convert / Invert** | `image::DynamicImage` |
//! | **Combine** | `image::imageops::overlay` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for parameter math (unit testable)
//! - **Parameters**: Validated descriptions of each transform
//! - **Engine**: [`TransformEngine`] trait + [`RustEngine`]

mod calculations;
pub mod engine;
mod params;
pub mod rust_engine;

pub use calculations::{describe_mismatch, gaussian_sigma, shapes_compatible};
pub use engine::TransformEngine;
pub use params::{CropRegion, EdgeThresholds, KernelSize, PixelLayout, Quality};
pub use rust_engine::RustEngine;
