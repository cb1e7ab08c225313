mod decode;
mod reconcile;
mod record;
mod scheduler;
mod state;

pub use decode::{decode, CachedNameLookup, NameLookup, RawRoomEvent, DEFAULT_NAME_CACHE_CAPACITY};
pub use reconcile::{reconcile, IndexRemap, ReconciliationResult, RoomMove};
pub use record::{
    orientation_in_range, rotate_orientation, snap_orientation, ObjectSpawn, RoomMap, RoomRecord,
    ORIENTATION_FULL_TURN, ORIENTATION_STEP,
};
pub use scheduler::{
    room_event_channel, BatchScheduler, RoomEventInbox, RoomEventSender, SchedulerState,
    SubmitOutcome,
};
pub use state::{BatchReport, HouseState};

#[cfg(test)]
pub(crate) use record::{test_object, test_room};
