//! # imgbridge
//!
//! Stages images between disk and memory and runs ordered transform
//! pipelines over them, delivering each request's result exactly once.
//!
//! # Architecture: One Request, One Unit of Work
//!
//! ```text
//! caller ──submit──▶ Bridge ──spawn──▶ pool worker
//!                                       │ resolve paths / bundle names
//!                                       │ load      (storage → arena)
//!                                       │ pipeline  (engine, in order)
//!                                       │ store     (arena → storage, atomic)
//!                                       ▼
//! caller ◀──wait──── Pending ◀──complete (once)── Completer
//! ```
//!
//! Decoded pixels live in a per-request [`matrix::MatrixArena`] and are
//! referred to by copyable, generation-checked [`matrix::MatrixHandle`]s, so
//! a handle used after its last release is reported as an error rather than
//! touching freed memory.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`bridge`] | Caller entry points, bundle lookup, the worker pool and batch runs |
//! | [`request`] | Serde request, step and batch template types |
//! | [`pipeline`] | Ordered operations with explicit handle ownership |
//! | [`matrix`] | Refcounted arena of decoded images |
//! | [`storage`] | Path validation, decoding with orientation, atomic encoding |
//! | [`imaging`] | Transform engine trait, parameter types and the pure Rust engine |
//! | [`dispatch`] | Single-fire result channel |
//! | [`error`] | Error type and stable error codes |
//! | [`config`] | `imgbridge.toml` loading, validation and merging |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Atomic Writes
//!
//! Output bytes go to a temp file beside the target and are renamed into
//! place. Concurrent writers to one path end with one complete file, and a
//! failed request leaves nothing behind.
//!
//! ## Arena Per Request
//!
//! Handles never leave the worker that created them, so the arena needs no
//! locking. Dropping an arena frees whatever it still holds, but every code
//! path releases its handles explicitly and a leak is logged.
//!
//! ## Pure-Rust Imaging
//!
//! Blur and edge detection come from `imageproc`, codecs from `image`. There
//! are no system libraries to install.

pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod imaging;
pub mod matrix;
pub mod output;
pub mod pipeline;
pub mod request;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_helpers;
