//! Reference-counted decoded images with explicit lifetime.
//!
//! A [`MatrixArena`] owns every decoded image of one request. Callers hold
//! [`MatrixHandle`]s, which are `(index, generation)` pairs rather than
//! pointers, so a handle can cross the bridge boundary as plain data and
//! still be checked on every use.
//!
//! ## Lifetime rules
//!
//! - [`insert`](MatrixArena::insert) creates a slot with refcount 1.
//! - [`retain`](MatrixArena::retain) adds a reference; [`release`](MatrixArena::release)
//!   drops one. At zero the pixels are freed and the slot's generation is
//!   bumped, so every outstanding copy of the handle goes stale.
//! - Any access through a stale handle fails with
//!   [`BridgeError::UseAfterRelease`].
//! - Freed slots are reused, always under a new generation.
//! - Dropping the arena frees everything still allocated. A request drops its
//!   arena when it completes, so no handle outlives its request.
//!
//! An arena is never shared between threads: each request owns one.

use crate::error::{BridgeError, Result};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Opaque reference to a decoded image inside a [`MatrixArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatrixHandle {
    index: u32,
    generation: u32,
}

impl MatrixHandle {
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for MatrixHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.index, self.generation)
    }
}

/// Shape of a live matrix, as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixInfo {
    pub cols: u32,
    pub rows: u32,
    pub channels: u8,
}

impl MatrixInfo {
    pub fn of(image: &DynamicImage) -> Self {
        Self {
            cols: image.width(),
            rows: image.height(),
            channels: image.color().channel_count(),
        }
    }

    /// `(cols, rows, channels)`.
    pub fn shape(self) -> (u32, u32, u8) {
        (self.cols, self.rows, self.channels)
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    refcount: u32,
    pixels: Option<DynamicImage>,
}

/// Per-request store of decoded images.
#[derive(Debug, Default)]
pub struct MatrixArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl MatrixArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of decoded pixels and return the first reference to them.
    pub fn insert(&mut self, image: DynamicImage) -> MatrixHandle {
        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.refcount = 1;
                slot.pixels = Some(image);
                MatrixHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    refcount: 1,
                    pixels: Some(image),
                });
                MatrixHandle {
                    index,
                    generation: 0,
                }
            }
        };
        debug!(handle = %handle, "matrix allocated");
        handle
    }

    fn slot(&self, handle: MatrixHandle) -> Result<&Slot> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.generation == handle.generation && s.refcount > 0)
            .ok_or_else(|| BridgeError::UseAfterRelease(handle.to_string()))
    }

    fn slot_mut(&mut self, handle: MatrixHandle) -> Result<&mut Slot> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation && s.refcount > 0)
            .ok_or_else(|| BridgeError::UseAfterRelease(handle.to_string()))
    }

    /// Add a reference. The returned handle is identical to `handle`; each
    /// reference must be released separately.
    pub fn retain(&mut self, handle: MatrixHandle) -> Result<MatrixHandle> {
        let slot = self.slot_mut(handle)?;
        slot.refcount += 1;
        Ok(handle)
    }

    /// Drop one reference, freeing the pixels when the count reaches zero.
    pub fn release(&mut self, handle: MatrixHandle) -> Result<()> {
        let slot = self.slot_mut(handle)?;
        slot.refcount -= 1;
        if slot.refcount == 0 {
            slot.pixels = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(handle.index);
            debug!(handle = %handle, "matrix freed");
        }
        Ok(())
    }

    /// Borrow the decoded pixels behind a live handle.
    pub fn get(&self, handle: MatrixHandle) -> Result<&DynamicImage> {
        self.slot(handle)?
            .pixels
            .as_ref()
            .ok_or_else(|| BridgeError::UseAfterRelease(handle.to_string()))
    }

    pub fn describe(&self, handle: MatrixHandle) -> Result<MatrixInfo> {
        self.get(handle).map(MatrixInfo::of)
    }

    pub fn refcount(&self, handle: MatrixHandle) -> Result<u32> {
        self.slot(handle).map(|s| s.refcount)
    }

    pub fn is_live(&self, handle: MatrixHandle) -> bool {
        self.slot(handle).is_ok()
    }

    /// Number of slots currently holding pixels.
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.refcount > 0).count()
    }
}
