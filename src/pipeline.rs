//! Ordered transform sequences over matrix handles.
//!
//! A [`Pipeline`] is a list of [`Operation`]s plus an optional terminal
//! output path. [`Pipeline::run`] applies them strictly in order against one
//! input handle.
//!
//! ## Ownership
//!
//! The pipeline takes over the caller's reference to the input handle. From
//! then on it holds exactly one handle at a time, the current matrix:
//!
//! - every step produces a new handle and the pipeline's reference to the
//!   previous one is released (consumed);
//! - `Combine` borrows its `second` handle and never releases it, so the
//!   caller keeps that reference and must release it;
//! - on any failure the current handle is released before the error is
//!   returned, so an aborted run never leaks;
//! - on success the final handle is either handed back
//!   ([`Outcome::Matrix`]) or stored and released ([`Outcome::Stored`]).
//!
//! Parameters are validated before the engine runs, so a bad `Crop` or
//! `Blur` fails without doing any pixel work.

use crate::error::{BridgeError, Result};
use crate::imaging::{
    CropRegion, EdgeThresholds, KernelSize, PixelLayout, TransformEngine, describe_mismatch,
    shapes_compatible,
};
use crate::matrix::{MatrixArena, MatrixHandle, MatrixInfo};
use crate::storage::{ImagePath, StorageAdapter, StoredImage};
use image::GenericImageView;
use std::fmt;
use tracing::{debug, instrument, warn};

/// One named transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operation {
    /// Gaussian blur; `radius` is the kernel width and must be odd.
    Blur { radius: u32 },
    /// Canny edge detection with hysteresis thresholds `low <= high`.
    EdgeDetect { low: f32, high: f32 },
    Crop {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    /// Composite the current matrix over `second`; `second` is borrowed.
    Combine { second: MatrixHandle },
    Convert { layout: PixelLayout },
    /// Invert colour channels.
    Invert,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Blur { .. } => "blur",
            Self::EdgeDetect { .. } => "edge_detect",
            Self::Crop { .. } => "crop",
            Self::Combine { .. } => "combine",
            Self::Convert { .. } => "convert",
            Self::Invert => "invert",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blur { radius } => write!(f, "blur(radius={radius})"),
            Self::EdgeDetect { low, high } => write!(f, "edge_detect(min={low}, max={high})"),
            Self::Crop {
                x,
                y,
                width,
                height,
            } => write!(f, "crop({x}, {y}, {width}x{height})"),
            Self::Combine { second } => write!(f, "combine({second})"),
            Self::Convert { layout } => write!(f, "convert({layout})"),
            Self::Invert => f.write_str("invert"),
        }
    }
}

/// Successful result of a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The final matrix; the caller now owns this reference.
    Matrix(MatrixHandle),
    /// The final matrix was written to a terminal path and released.
    Stored(StoredImage),
}

pub type OperationResult = Result<Outcome>;

/// An ordered list of operations with an optional terminal path.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    ops: Vec<Operation>,
    output: Option<ImagePath>,
}

impl Pipeline {
    pub fn new(ops: Vec<Operation>) -> Self {
        Self { ops, output: None }
    }

    pub fn with_output(mut self, output: ImagePath) -> Self {
        self.output = Some(output);
        self
    }

    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }

    /// Run every operation against `input`. See the [module docs](self) for
    /// who releases what.
    pub fn run(
        &self,
        arena: &mut MatrixArena,
        engine: &impl TransformEngine,
        storage: &StorageAdapter,
        input: MatrixHandle,
    ) -> OperationResult {
        let current = self.transform(arena, engine, input)?;
        match &self.output {
            None => Ok(Outcome::Matrix(current)),
            Some(path) => {
                let stored = storage.store(arena, current, path);
                arena.release(current)?;
                stored.map(Outcome::Stored)
            }
        }
    }

    /// Apply the operations and hand back the final matrix, ignoring any
    /// terminal path. Ownership rules are the same as [`run`](Self::run).
    #[instrument(skip_all, fields(input = %input, steps = self.ops.len()))]
    pub fn transform(
        &self,
        arena: &mut MatrixArena,
        engine: &impl TransformEngine,
        input: MatrixHandle,
    ) -> Result<MatrixHandle> {
        // The input must be live before the pipeline claims it; a stale
        // handle is the caller's bug and there is nothing to release.
        arena.get(input)?;

        let mut current = input;
        for (index, op) in self.ops.iter().enumerate() {
            match apply(arena, engine, current, op) {
                Ok(next) => {
                    debug!(step = index, op = %op, output = %next, "step complete");
                    arena.release(current)?;
                    current = next;
                }
                Err(err) => {
                    warn!(step = index, op = %op, error = %err, "step failed, aborting");
                    arena.release(current)?;
                    return Err(err);
                }
            }
        }
        Ok(current)
    }
}

/// Validate `op` against the current matrix and run it, returning a new handle.
fn apply(
    arena: &mut MatrixArena,
    engine: &impl TransformEngine,
    current: MatrixHandle,
    op: &Operation,
) -> Result<MatrixHandle> {
    let source = arena.get(current)?;
    let produced = match *op {
        Operation::Blur { radius } => {
            let kernel = KernelSize::new(radius)?;
            kernel.check_within(source.dimensions())?;
            engine.blur(source, kernel)?
        }
        Operation::EdgeDetect { low, high } => {
            engine.detect_edges(source, EdgeThresholds::new(low, high)?)?
        }
        Operation::Crop {
            x,
            y,
            width,
            height,
        } => {
            let region = CropRegion::new(x, y, width, height)?;
            region.check_within(source.dimensions())?;
            engine.crop(source, region)?
        }
        Operation::Combine { second } => {
            let other = arena.get(second)?;
            check_compatible(source, other)?;
            engine.combine(source, other)?
        }
        Operation::Convert { layout } => engine.convert(source, layout)?,
        Operation::Invert => engine.invert(source)?,
    };
    Ok(arena.insert(produced))
}

fn check_compatible(a: &image::DynamicImage, b: &image::DynamicImage) -> Result<()> {
    let (a, b) = (MatrixInfo::of(a).shape(), MatrixInfo::of(b).shape());
    if shapes_compatible(a, b) {
        Ok(())
    } else {
        Err(BridgeError::incompatible(describe_mismatch(a, b)))
    }
}

/// Combine two handles without consuming either.
///
/// Both inputs stay valid and remain the caller's to release; the returned
/// handle is a new reference the caller also owns.
pub fn combine(
    arena: &mut MatrixArena,
    engine: &impl TransformEngine,
    first: MatrixHandle,
    second: MatrixHandle,
) -> Result<MatrixHandle> {
    apply(arena, engine, first, &Operation::Combine { second })
}
