// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Synchronization groups: named mutual exclusion across reactions.
//!
//! A worker that pops a task belonging to a group first asks the group to
//! reschedule it. If the group is busy the task is parked on the group's
//! priority queue and the worker moves on; the postcondition of the
//! finishing task pops the next parked task and resubmits it. At most one
//! task per group is ever running or queued in a pool at a time.

use parking_lot::Mutex;
use reflex_core::{GroupTag, Task};
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

#[derive(Debug)]
pub(crate) struct SyncGroup {
    tag: GroupTag,
    state: Mutex<GroupState>,
}

#[derive(Debug, Default)]
struct GroupState {
    active: bool,
    queue: BinaryHeap<Task>,
}

impl SyncGroup {
    fn new(tag: GroupTag) -> Self {
        Self { tag, state: Mutex::new(GroupState::default()) }
    }

    /// Claim the group for `task`, or park it.
    ///
    /// Returns the task back if the group was free; `None` if it was
    /// parked. A parked task does not count against its reaction's
    /// active-task counter.
    pub fn reschedule(&self, task: Task) -> Option<Task> {
        let mut state = self.state.lock();
        if state.active {
            state.queue.push(task);
            None
        } else {
            state.active = true;
            Some(task)
        }
    }

    /// Release the group after a task finished.
    ///
    /// Returns the highest-priority parked task, which the caller must
    /// resubmit to its pool; the group stays claimed for it. With an
    /// empty queue the group becomes free.
    pub fn release(&self) -> Option<Task> {
        let mut state = self.state.lock();
        match state.queue.pop() {
            Some(next) => Some(next),
            None => {
                state.active = false;
                None
            }
        }
    }

    /// Discard every parked task, releasing the group.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let dropped = state.queue.len();
        state.queue.clear();
        state.active = false;
        if dropped > 0 {
            tracing::debug!(group = self.tag.name(), dropped, "cleared sync queue");
        }
        dropped
    }
}

/// Plant-owned registry of sync groups, lazily inserted by tag.
#[derive(Debug, Default)]
pub(crate) struct SyncRegistry {
    groups: Mutex<HashMap<GroupTag, Arc<SyncGroup>>>,
}

impl SyncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(&self, tag: GroupTag) -> Arc<SyncGroup> {
        self.groups.lock().entry(tag).or_insert_with(|| Arc::new(SyncGroup::new(tag))).clone()
    }

    /// Discard parked tasks in every group; used during shutdown.
    pub fn clear_all(&self) -> usize {
        self.groups.lock().values().map(|group| group.clear()).sum()
    }
}

#[cfg(test)]
#[path = "sync_group_tests.rs"]
mod tests;
