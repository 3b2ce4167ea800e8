//! Shared test utilities for the imgbridge test suite.
//!
//! Synthetic images only: every fixture is generated on the fly so tests
//! never depend on binary files in the repository.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! let photo = tmp.path().join("photo.jpg");
//! create_test_jpeg(&photo, 640, 480);
//!
//! let mut arena = MatrixArena::new();
//! let handle = load_into(&mut arena, &photo);
//! assert_eq!(arena.describe(handle).unwrap().cols, 640);
//! ```

use std::path::Path;

use image::{DynamicImage, ImageEncoder, Rgb, RgbImage, Rgba, RgbaImage};

use crate::matrix::{MatrixArena, MatrixHandle};
use crate::storage::{ImagePath, StorageAdapter};

// =========================================================================
// Fixture images
// =========================================================================

/// Deterministic RGBA gradient with varying alpha, for exact round-trip checks.
pub fn gradient_rgba(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([
            (x * 7 % 256) as u8,
            (y * 11 % 256) as u8,
            ((x + y) % 256) as u8,
            (255 - (x % 128)) as u8,
        ])
    })
}

/// Write a small valid JPEG with the given dimensions.
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    ensure_parent(path);
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let file = std::fs::File::create(path).unwrap();
    let writer = std::io::BufWriter::new(file);
    image::codecs::jpeg::JpegEncoder::new(writer)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
}

/// Write an opaque RGB PNG with the given dimensions.
pub fn create_test_png(path: &Path, width: u32, height: u32) {
    ensure_parent(path);
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, 64, (y % 256) as u8])
    });
    DynamicImage::ImageRgb8(img).save(path).unwrap();
}

fn ensure_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
}

// =========================================================================
// Arena helpers
// =========================================================================

/// Load a file into `arena` with default storage settings. Panics on failure.
pub fn load_into(arena: &mut MatrixArena, path: &Path) -> MatrixHandle {
    let input = ImagePath::input(path)
        .unwrap_or_else(|e| panic!("invalid input {}: {e}", path.display()));
    StorageAdapter::default()
        .load(arena, &input)
        .unwrap_or_else(|e| panic!("failed to load {}: {e}", path.display()))
}
