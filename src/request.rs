//! Serializable request types accepted by the bridge.
//!
//! A request names one input, an ordered list of steps and an optional
//! terminal output path:
//!
//! ```json
//! {
//!   "input": "photo.jpg",
//!   "steps": [
//!     { "op": "blur", "radius": 5 },
//!     { "op": "crop", "x": 0, "y": 0, "width": 320, "height": 240 },
//!     { "op": "combine", "with": "bundle:frame.png" }
//!   ],
//!   "output": "out/framed.png"
//! }
//! ```
//!
//! Sources written `bundle:<name>` are resolved through the bridge's
//! [`ResourceLocator`](crate::bridge::ResourceLocator); anything else is a
//! filesystem path.

use crate::error::Result;
use crate::imaging::PixelLayout;
use crate::matrix::MatrixHandle;
use crate::pipeline::Operation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

const BUNDLE_PREFIX: &str = "bundle:";

/// Where an input image comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ImageSource {
    Path(PathBuf),
    /// A resource name looked up in the bundle, with or without extension.
    Bundle(String),
}

impl From<String> for ImageSource {
    fn from(raw: String) -> Self {
        match raw.strip_prefix(BUNDLE_PREFIX) {
            Some(name) => Self::Bundle(name.to_string()),
            None => Self::Path(PathBuf::from(raw)),
        }
    }
}

impl From<&str> for ImageSource {
    fn from(raw: &str) -> Self {
        Self::from(raw.to_string())
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<ImageSource> for String {
    fn from(source: ImageSource) -> Self {
        source.to_string()
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Bundle(name) => write!(f, "{BUNDLE_PREFIX}{name}"),
        }
    }
}

/// One step of a request, as written in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum Step {
    Blur {
        radius: u32,
    },
    #[serde(alias = "edges")]
    EdgeDetect {
        low: f32,
        high: f32,
    },
    Crop {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    /// Composite the current image over another source of the same shape.
    Combine {
        with: ImageSource,
    },
    Convert {
        #[serde(default)]
        layout: PixelLayout,
    },
    Invert,
}

impl Step {
    /// Turn this step into a pipeline operation.
    ///
    /// `load` is called for `Combine` steps to bring the second source into
    /// the arena; the returned handle is borrowed by the operation.
    pub fn operation(
        &self,
        load: impl FnOnce(&ImageSource) -> Result<MatrixHandle>,
    ) -> Result<Operation> {
        Ok(match self {
            Self::Blur { radius } => Operation::Blur { radius: *radius },
            Self::EdgeDetect { low, high } => Operation::EdgeDetect {
                low: *low,
                high: *high,
            },
            Self::Crop {
                x,
                y,
                width,
                height,
            } => Operation::Crop {
                x: *x,
                y: *y,
                width: *width,
                height: *height,
            },
            Self::Combine { with } => Operation::Combine {
                second: load(with)?,
            },
            Self::Convert { layout } => Operation::Convert { layout: *layout },
            Self::Invert => Operation::Invert,
        })
    }
}

/// A full unit of work: load, transform, optionally store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub input: ImageSource,
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Terminal path. Without one the response describes the final matrix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

impl Request {
    pub fn new(input: impl Into<ImageSource>) -> Self {
        Self {
            input: input.into(),
            steps: Vec::new(),
            output: None,
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Steps applied to every image found by a batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchTemplate {
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Output extension; defaults to the source file's own extension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}
