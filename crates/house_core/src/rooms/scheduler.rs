use std::sync::mpsc::{self, Receiver, SendError, Sender};

use super::decode::RawRoomEvent;
use super::record::{RoomMap, RoomRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    #[default]
    Idle,
    ScheduledFlush,
}

/// What the caller must do after submitting a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// First room of this cycle: enqueue exactly one deferred flush.
    FlushScheduled,
    /// A flush is already pending; the room was merged into it.
    Merged,
}

/// Coalesces per-room updates so reconciliation runs at most once per frame.
///
/// Later submissions for the same index overwrite earlier ones until the
/// pending batch is taken.
#[derive(Debug, Default)]
pub struct BatchScheduler {
    state: SchedulerState,
    pending: RoomMap,
    flush_count: u64,
}

impl BatchScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn flush_count(&self) -> u64 {
        self.flush_count
    }

    pub fn submit(&mut self, room: RoomRecord) -> SubmitOutcome {
        self.pending.insert(room.index, room);
        match self.state {
            SchedulerState::Idle => {
                self.state = SchedulerState::ScheduledFlush;
                SubmitOutcome::FlushScheduled
            }
            SchedulerState::ScheduledFlush => SubmitOutcome::Merged,
        }
    }

    /// Fires the scheduled flush: hands over the accumulated batch and returns
    /// to idle. Returns `None` when no flush is scheduled.
    pub fn take_flush(&mut self) -> Option<RoomMap> {
        if self.state != SchedulerState::ScheduledFlush {
            return None;
        }
        self.state = SchedulerState::Idle;
        self.flush_count = self.flush_count.saturating_add(1);
        Some(std::mem::take(&mut self.pending))
    }
}

/// Cloneable producer half for hosts that deliver room events on another
/// thread than the one running reconciliation.
#[derive(Debug, Clone)]
pub struct RoomEventSender {
    tx: Sender<RawRoomEvent>,
}

impl RoomEventSender {
    pub fn send(&self, event: RawRoomEvent) -> Result<(), SendError<RawRoomEvent>> {
        self.tx.send(event)
    }
}

#[derive(Debug)]
pub struct RoomEventInbox {
    rx: Receiver<RawRoomEvent>,
}

impl RoomEventInbox {
    /// Everything received so far, without blocking.
    pub fn drain(&self) -> Vec<RawRoomEvent> {
        self.rx.try_iter().collect()
    }
}

pub fn room_event_channel() -> (RoomEventSender, RoomEventInbox) {
    let (tx, rx) = mpsc::channel();
    (RoomEventSender { tx }, RoomEventInbox { rx })
}
