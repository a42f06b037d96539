//! Frame-boundary event queue. Producers queue at any time; the update step drains everything
//! queued so far as one numbered batch, so consumers never see state change mid-frame.

use std::fmt;
use std::sync::mpsc;

use tracing::trace;

/// The draining side is gone. Carries the event back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueClosed<T>(pub T);

impl<T> fmt::Display for QueueClosed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("frame event queue is closed")
    }
}

impl<T: fmt::Debug> std::error::Error for QueueClosed<T> {}

pub struct EventSender<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Clone for EventSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> EventSender<T> {
    /// Queues `event` for the next frame boundary.
    pub fn queue(&self, event: T) -> Result<(), QueueClosed<T>> {
        self.tx.send(event).map_err(|mpsc::SendError(event)| QueueClosed(event))
    }
}

/// Everything queued between two frame boundaries, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBatch<T> {
    frame: u64,
    events: Vec<T>,
}

impl<T> FrameBatch<T> {
    /// Index of the boundary that produced this batch, starting at 0.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.events.iter()
    }

    pub fn into_events(self) -> Vec<T> {
        self.events
    }
}

impl<'a, T> IntoIterator for &'a FrameBatch<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

pub struct FrameEvents<T> {
    rx: mpsc::Receiver<T>,
    next_frame: u64,
}

impl<T> FrameEvents<T> {
    /// Closes the current frame: takes everything queued so far and advances the frame index,
    /// even when nothing was queued.
    pub fn drain(&mut self) -> FrameBatch<T> {
        let frame = self.next_frame;
        self.next_frame += 1;
        let events: Vec<T> = self.rx.try_iter().collect();
        if !events.is_empty() {
            trace!("Frame {frame} drained {} queued events", events.len());
        }
        FrameBatch { frame, events }
    }

    pub fn frames_drained(&self) -> u64 {
        self.next_frame
    }
}

pub fn frame_channel<T>() -> (EventSender<T>, FrameEvents<T>) {
    let (tx, rx) = mpsc::channel();
    (EventSender { tx }, FrameEvents { rx, next_frame: 0 })
}
