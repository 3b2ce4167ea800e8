//! Exactly-once delivery of a request's result.
//!
//! [`channel`] returns a [`Completer`] for the worker running the request and
//! a [`Pending`] for the caller waiting on it. The first
//! [`complete`](Completer::complete) delivers; every later call fails with
//! [`BridgeError::AlreadyCompleted`] and leaves the delivered result alone.
//!
//! A caller may drop its `Pending` at any time. The request still runs to the
//! end and frees its resources; the result is simply discarded.

use crate::error::{BridgeError, Failure, Result};
use crate::matrix::MatrixInfo;
use crate::storage::StoredImage;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError};
use tracing::debug;

/// What a successful request hands back: a matrix description or a terminal
/// path, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Matrix(MatrixInfo),
    Stored(StoredImage),
}

pub type Response = std::result::Result<Payload, Failure>;

/// Worker side of a single-fire result channel.
#[derive(Debug)]
pub struct Completer {
    sender: Mutex<Option<SyncSender<Response>>>,
}

/// Caller side of a single-fire result channel.
#[derive(Debug)]
pub struct Pending {
    receiver: Receiver<Response>,
}

pub fn channel() -> (Completer, Pending) {
    let (sender, receiver) = mpsc::sync_channel(1);
    (
        Completer {
            sender: Mutex::new(Some(sender)),
        },
        Pending { receiver },
    )
}

impl Completer {
    /// Deliver `response`. Only the first call succeeds.
    pub fn complete(&self, response: Response) -> Result<()> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or(BridgeError::AlreadyCompleted)?;
        if sender.send(response).is_err() {
            debug!("caller stopped waiting; result discarded");
        }
        Ok(())
    }

    pub fn resolve(&self, payload: Payload) -> Result<()> {
        self.complete(Ok(payload))
    }

    pub fn reject(&self, err: &BridgeError) -> Result<()> {
        self.complete(Err(Failure::from(err)))
    }

    pub fn is_completed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }
}

impl Pending {
    /// Block until the result arrives.
    ///
    /// Returns `None` only if the completer was dropped without completing.
    pub fn wait(self) -> Option<Response> {
        self.receiver.recv().ok()
    }

    /// Take the result if it has already arrived, without blocking.
    pub fn try_take(&self) -> Option<Response> {
        match self.receiver.try_recv() {
            Ok(response) => Some(response),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::path::PathBuf;

    fn stored(path: &str) -> Payload {
        Payload::Stored(StoredImage {
            path: PathBuf::from(path),
            width: 640,
            height: 480,
            edge_map: None,
        })
    }

    #[test]
    fn delivers_first_result() {
        let (completer, pending) = channel();
        completer.resolve(stored("out/blurred.jpg")).unwrap();

        assert_eq!(pending.wait(), Some(Ok(stored("out/blurred.jpg"))));
    }

    #[test]
    fn second_completion_is_rejected_and_first_wins() {
        let (completer, pending) = channel();
        completer.resolve(stored("first.png")).unwrap();

        let err = completer
            .reject(&BridgeError::invalid_parameter("late"))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::AlreadyCompleted);
        assert!(completer.is_completed());

        assert_eq!(pending.wait(), Some(Ok(stored("first.png"))));
    }

    #[test]
    fn rejection_carries_code_and_message() {
        let (completer, pending) = channel();
        completer
            .reject(&BridgeError::NotFound(PathBuf::from("photo.jpg")))
            .unwrap();

        let failure = pending.wait().unwrap().unwrap_err();
        assert_eq!(failure.code, ErrorCode::NotFound);
        assert!(failure.message.contains("photo.jpg"));
    }

    #[test]
    fn completing_after_caller_left_still_succeeds() {
        let (completer, pending) = channel();
        drop(pending);

        assert!(completer.resolve(stored("x.png")).is_ok());
        assert!(completer.resolve(stored("x.png")).is_err());
    }

    #[test]
    fn dropped_completer_unblocks_wait() {
        let (completer, pending) = channel();
        drop(completer);
        assert_eq!(pending.wait(), None);
    }

    #[test]
    fn try_take_before_and_after_completion() {
        let (completer, pending) = channel();
        assert_eq!(pending.try_take(), None);

        completer.resolve(stored("y.png")).unwrap();
        assert_eq!(pending.try_take(), Some(Ok(stored("y.png"))));
    }

    #[test]
    fn completes_across_threads() {
        let (completer, pending) = channel();
        let worker = std::thread::spawn(move || {
            completer.resolve(stored("threaded.png")).unwrap();
        });
        assert_eq!(pending.wait(), Some(Ok(stored("threaded.png"))));
        worker.join().unwrap();
    }

    #[test]
    fn payload_serializes_with_kind_tag() {
        let json = serde_json::to_value(Payload::Matrix(MatrixInfo {
            cols: 4,
            rows: 3,
            channels: 4,
        }))
        .unwrap();
        assert_eq!(json["kind"], "matrix");
        assert_eq!(json["cols"], 4);
    }
}
