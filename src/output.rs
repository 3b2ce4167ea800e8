//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Single request
//!
//! ```text
//! photo.jpg: 640x480, 3 channels
//! Wrote out/blurred.jpg (640x480)
//! Wrote out/outlined.png (640x480)
//!     Edge map: out/edges.png
//! Error [OUT_OF_BOUNDS]: region 600,0 100x50 exceeds source 640x480
//! ```
//!
//! ## Batch
//!
//! ```text
//! 001 a.jpg → out/a.png
//! 002 nested/b.png → out/nested/b.png
//! 003 broken.jpg
//!     Error [DECODE_ERROR]: unable to decode ...
//!
//! Processed 3 images, 1 failed
//! ```
//!
//! # Architecture
//!
//! Each view has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions are pure:
//! no I/O, no side effects.

use crate::bridge::BatchItem;
use crate::dispatch::{Payload, Response};
use crate::error::Failure;
use crate::request::ImageSource;
use std::path::Path;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn format_failure(failure: &Failure) -> String {
    format!("Error [{}]: {}", failure.code, failure.message)
}

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{count} {word}")
    } else {
        format!("{count} {word}s")
    }
}

/// Lines describing one request's response. `None` means the worker went
/// away without answering.
pub fn format_response(source: &ImageSource, response: Option<&Response>) -> Vec<String> {
    match response {
        None => vec![format!("Error: request for {source} ended without a result")],
        Some(Err(failure)) => vec![format_failure(failure)],
        Some(Ok(Payload::Matrix(info))) => vec![format!(
            "{source}: {}x{}, {}",
            info.cols,
            info.rows,
            plural(usize::from(info.channels), "channel")
        )],
        Some(Ok(Payload::Stored(stored))) => {
            let mut lines = vec![format!(
                "Wrote {} ({}x{})",
                stored.path.display(),
                stored.width,
                stored.height
            )];
            if let Some(map) = &stored.edge_map {
                lines.push(format!("{}Edge map: {}", indent(1), map.display()));
            }
            lines
        }
    }
}

/// Lines for a batch run. Source paths are shown relative to `root`.
pub fn format_batch(items: &[BatchItem], root: &Path) -> Vec<String> {
    let mut lines = Vec::new();
    let mut failed = 0;

    for (i, item) in items.iter().enumerate() {
        let name = item.source.strip_prefix(root).unwrap_or(&item.source);
        let header = format!("{} {}", format_index(i + 1), name.display());
        match &item.response {
            Some(Ok(Payload::Stored(stored))) => {
                lines.push(format!("{header} → {}", stored.path.display()));
            }
            Some(Ok(Payload::Matrix(info))) => {
                lines.push(format!("{header} ({}x{})", info.cols, info.rows));
            }
            Some(Err(failure)) => {
                failed += 1;
                lines.push(header);
                lines.push(format!("{}{}", indent(1), format_failure(failure)));
            }
            None => {
                failed += 1;
                lines.push(header);
                lines.push(format!("{}Error: ended without a result", indent(1)));
            }
        }
    }

    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(format!(
        "Processed {}, {} failed",
        plural(items.len(), "image"),
        failed
    ));
    lines
}

pub fn print_response(source: &ImageSource, response: Option<&Response>) {
    for line in format_response(source, response) {
        println!("{}", line);
    }
}

pub fn print_batch(items: &[BatchItem], root: &Path) {
    for line in format_batch(items, root) {
        println!("{}", line);
    }
}
