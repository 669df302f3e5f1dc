//! Deferred work run on the next frame tick.
//!
//! Name discovery has to wait until the rendering tree has committed, and
//! error updates are coalesced across one update. Both are queued here and
//! processed by [`SigForm::tick`](super::SigForm::tick). Work queued while a
//! frame runs belongs to the next frame.

use std::collections::{HashSet, VecDeque};

use super::field::FieldId;

/// One unit of deferred work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum FrameTask {
    /// Resolve the name of a newly mounted field.
    ResolveField(FieldId),
    /// Re-resolve every mounted field after the registered set changed.
    ResolveAll,
    /// Commit staged error updates.
    FlushErrors,
}

/// FIFO of unique frame tasks.
#[derive(Debug, Default)]
pub(crate) struct FrameQueue {
    queue: VecDeque<FrameTask>,
    queued: HashSet<FrameTask>,
}

impl FrameQueue {
    /// Queue `task` unless it is already waiting.
    pub(crate) fn schedule(&mut self, task: FrameTask) -> bool {
        if !self.queued.insert(task) {
            return false;
        }
        self.queue.push_back(task);
        true
    }

    /// Take everything queued for the current frame.
    pub(crate) fn take_frame(&mut self) -> Vec<FrameTask> {
        self.queued.clear();
        self.queue.drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
