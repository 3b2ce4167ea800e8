//! Failure taxonomy shared by every stage of a request.
//!
//! Every error is terminal for the request that raised it. Nothing in the
//! crate retries: a caller that wants a retry policy owns it.
//!
//! Each [`BridgeError`] maps to a stable [`ErrorCode`] so callers across the
//! bridge boundary can branch on the code and show the message.
//!
//! | Variant | Code | Raised by |
//! |---|---|---|
//! | `NotFound` | `NOT_FOUND` | load, bundle lookup |
//! | `PermissionError` | `PERMISSION_DENIED` | load |
//! | `DecodeError` | `DECODE_ERROR` | load |
//! | `EncodeError` | `ENCODE_ERROR` | store |
//! | `WriteError` | `WRITE_ERROR` | store |
//! | `InvalidParameter` | `INVALID_PARAMETER` | path validation, Blur, EdgeDetect, Crop |
//! | `OutOfBounds` | `OUT_OF_BOUNDS` | Crop |
//! | `IncompatibleInputs` | `INCOMPATIBLE_INPUTS` | Combine |
//! | `UseAfterRelease` | `USE_AFTER_RELEASE` | any handle access |
//! | `AlreadyCompleted` | `ALREADY_COMPLETED` | result dispatcher |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("no such file or directory: {0}")]
    NotFound(PathBuf),
    #[error("permission denied: {0}")]
    PermissionError(PathBuf),
    #[error("unable to decode {path}: {reason}")]
    DecodeError { path: PathBuf, reason: String },
    #[error("unable to encode image: {0}")]
    EncodeError(String),
    #[error("failed to write {path}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("region {x},{y} {width}x{height} exceeds source {source_width}x{source_height}")]
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        source_width: u32,
        source_height: u32,
    },
    #[error("incompatible inputs: {0}")]
    IncompatibleInputs(String),
    #[error("matrix handle {0} used after release")]
    UseAfterRelease(String),
    #[error("request already completed")]
    AlreadyCompleted,
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Stable, transport-friendly identifier for a [`BridgeError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    PermissionDenied,
    DecodeError,
    EncodeError,
    WriteError,
    InvalidParameter,
    OutOfBounds,
    IncompatibleInputs,
    UseAfterRelease,
    AlreadyCompleted,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::DecodeError => "DECODE_ERROR",
            Self::EncodeError => "ENCODE_ERROR",
            Self::WriteError => "WRITE_ERROR",
            Self::InvalidParameter => "INVALID_PARAMETER",
            Self::OutOfBounds => "OUT_OF_BOUNDS",
            Self::IncompatibleInputs => "INCOMPATIBLE_INPUTS",
            Self::UseAfterRelease => "USE_AFTER_RELEASE",
            Self::AlreadyCompleted => "ALREADY_COMPLETED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BridgeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::PermissionError(_) => ErrorCode::PermissionDenied,
            Self::DecodeError { .. } => ErrorCode::DecodeError,
            Self::EncodeError(_) => ErrorCode::EncodeError,
            Self::WriteError { .. } => ErrorCode::WriteError,
            Self::InvalidParameter(_) => ErrorCode::InvalidParameter,
            Self::OutOfBounds { .. } => ErrorCode::OutOfBounds,
            Self::IncompatibleInputs(_) => ErrorCode::IncompatibleInputs,
            Self::UseAfterRelease(_) => ErrorCode::UseAfterRelease,
            Self::AlreadyCompleted => ErrorCode::AlreadyCompleted,
        }
    }

    pub fn invalid_parameter<T: Into<String>>(msg: T) -> Self {
        Self::InvalidParameter(msg.into())
    }

    pub fn incompatible<T: Into<String>>(msg: T) -> Self {
        Self::IncompatibleInputs(msg.into())
    }

    /// Classify an I/O error raised while reading `path`.
    pub fn from_read(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionError(path.to_path_buf()),
            _ => Self::DecodeError {
                path: path.to_path_buf(),
                reason: err.to_string(),
            },
        }
    }

    pub fn write(path: &Path, source: io::Error) -> Self {
        Self::WriteError {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// What the caller sees when a request fails: a stable code plus a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&BridgeError> for Failure {
    fn from(err: &BridgeError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl From<BridgeError> for Failure {
    fn from(err: BridgeError) -> Self {
        Self::from(&err)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
