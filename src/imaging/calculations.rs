//! Pure calculation functions for transform parameters.
//!
//! All functions here are pure and testable without any I/O or images.

/// Standard deviation of a Gaussian for a square kernel of width `kernel`.
///
/// Uses the conventional derivation for a kernel given without an explicit
/// sigma, so a 3px kernel blurs lightly and larger kernels scale linearly.
///
/// # Examples
/// ```
/// # use imgbridge::imaging::gaussian_sigma;
/// assert!((gaussian_sigma(3) - 0.8).abs() < 1e-6);
/// assert!((gaussian_sigma(5) - 1.1).abs() < 1e-6);
/// ```
pub fn gaussian_sigma(kernel: u32) -> f32 {
    let k = kernel.max(1) as f32;
    // imageproc panics on sigma <= 0; a 1px kernel still gets a tiny blur.
    (0.3 * ((k - 1.0) * 0.5 - 1.0) + 0.8).max(0.1)
}

/// Whether two matrices can be combined pixel-for-pixel.
///
/// Shapes are `(width, height, channels)`.
pub fn shapes_compatible(a: (u32, u32, u8), b: (u32, u32, u8)) -> bool {
    a == b
}

/// Describe a shape mismatch for error messages, e.g. `100x100x3 vs 200x200x3`.
pub fn describe_mismatch(a: (u32, u32, u8), b: (u32, u32, u8)) -> String {
    format!("{}x{}x{} vs {}x{}x{}", a.0, a.1, a.2, b.0, b.1, b.2)
}
