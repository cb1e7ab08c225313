use std::collections::BTreeSet;

use super::record::{RoomMap, RoomRecord};

/// A matched room whose position or level changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomMove {
    pub old_room: RoomRecord,
    pub new_room: RoomRecord,
    pub old_index: i32,
    pub new_index: i32,
}

/// A matched room whose slot index changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRemap {
    pub old_index: i32,
    pub new_index: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationResult {
    pub moved_rooms: Vec<RoomMove>,
    pub added_count: usize,
    pub removed_count: usize,
    pub remapped_count: usize,
    pub added_indices: Vec<i32>,
    pub removed_indices: Vec<i32>,
    pub remaps: Vec<IndexRemap>,
    pub updated_rooms: RoomMap,
}

impl ReconciliationResult {
    pub fn is_noop(&self) -> bool {
        self.moved_rooms.is_empty()
            && self.added_count == 0
            && self.removed_count == 0
            && self.remapped_count == 0
    }
}

/// Matches a freshly observed batch against the known rooms.
///
/// Batch entries are visited in ascending new index; each takes the first
/// unconsumed old room (ascending old index) that satisfies
/// [`RoomRecord::matches_for_remapping`]. Matched rooms inherit the old room's
/// objects. Ties between identical rooms therefore go to the lowest old index.
/// Neither input is modified.
pub fn reconcile(old_state: &RoomMap, batch: &RoomMap) -> ReconciliationResult {
    if batch.is_empty() {
        return ReconciliationResult {
            updated_rooms: old_state.clone(),
            ..ReconciliationResult::default()
        };
    }

    let mut result = ReconciliationResult::default();
    let mut consumed = BTreeSet::<i32>::new();
    let mut updated_rooms = batch.clone();

    for (&new_index, new_room) in updated_rooms.iter_mut() {
        let matched = old_state.iter().find(|(old_index, old_room)| {
            !consumed.contains(*old_index) && old_room.matches_for_remapping(new_room)
        });
        let Some((&old_index, old_room)) = matched else {
            result.added_count += 1;
            result.added_indices.push(new_index);
            continue;
        };
        consumed.insert(old_index);

        if !old_room.objects.is_empty() {
            new_room.objects = old_room.objects.clone();
        }
        if old_index != new_index {
            result.remapped_count += 1;
            result.remaps.push(IndexRemap {
                old_index,
                new_index,
            });
        }
        if !old_room.same_position(new_room) {
            result.moved_rooms.push(RoomMove {
                old_room: old_room.clone(),
                new_room: new_room.clone(),
                old_index,
                new_index,
            });
        }
    }

    for &old_index in old_state.keys() {
        if !consumed.contains(&old_index) {
            result.removed_count += 1;
            result.removed_indices.push(old_index);
        }
    }

    result.updated_rooms = updated_rooms;
    result
}
