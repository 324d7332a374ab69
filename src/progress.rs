//! Progress reporting between the encoder and a conversion job
//!
//! The transport makes no ordering promise, so the consumer side
//! ([`ProgressTracker`]) only ever moves forward: late or repeated updates are
//! dropped. The producer side never blocks; when the queue is full the update
//! is simply coalesced away.

use log::trace;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Queue length used when the settings do not say otherwise.
pub const DEFAULT_PROGRESS_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub frame_index: u64,
    pub percent: f32,
}

impl ProgressUpdate {
    pub fn new(frame_index: u64, percent: f32) -> Self {
        Self {
            frame_index,
            percent,
        }
    }

    /// Progress after `frame` of `total` frames were written, capped at 100%.
    pub fn from_frame(frame: u64, total: usize) -> Self {
        let percent = if total == 0 {
            100.0
        } else {
            (frame as f32 / total as f32 * 100.0).min(100.0)
        };
        Self::new(frame, percent)
    }
}

pub fn progress_channel(capacity: usize) -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ProgressSender { tx }, ProgressReceiver { rx })
}

#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::Sender<ProgressUpdate>,
}

impl ProgressSender {
    /// Queue an update without waiting. Returns false when it was dropped.
    pub fn report(&self, update: ProgressUpdate) -> bool {
        match self.tx.try_send(update) {
            Ok(()) => true,
            Err(TrySendError::Full(update)) => {
                trace!("Progress queue full, dropping {:?}", update);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

#[derive(Debug)]
pub struct ProgressReceiver {
    rx: mpsc::Receiver<ProgressUpdate>,
}

impl ProgressReceiver {
    /// Next update, or `None` once every sender is gone and the queue is empty.
    pub async fn recv(&mut self) -> Option<ProgressUpdate> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ProgressUpdate> {
        self.rx.try_recv().ok()
    }
}

/// Last applied progress; never goes backwards.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProgressTracker {
    last: Option<ProgressUpdate>,
}

impl ProgressTracker {
    /// Apply `update` if it moves progress forward.
    ///
    /// Returns the update as stored (percent clamped to 0..=100), or `None`
    /// when it was stale, repeated or not a number.
    pub fn apply(&mut self, update: ProgressUpdate) -> Option<ProgressUpdate> {
        if !update.percent.is_finite() {
            return None;
        }
        let update = ProgressUpdate::new(update.frame_index, update.percent.clamp(0.0, 100.0));
        if let Some(last) = self.last {
            if update.percent <= last.percent {
                trace!("Discarding stale progress {:?} (at {:?})", update, last);
                return None;
            }
        }
        self.last = Some(update);
        Some(update)
    }

    pub fn last(&self) -> Option<ProgressUpdate> {
        self.last
    }

    pub fn percent(&self) -> f32 {
        self.last.map_or(0.0, |update| update.percent)
    }
}
