use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use super::reconcile::{reconcile, ReconciliationResult, RoomMove};
use super::record::{RoomMap, RoomRecord};

/// Outcome of swapping a reconciled batch into the authoritative state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub moved_rooms: Vec<RoomMove>,
    pub added_count: usize,
    pub removed_count: usize,
    pub remapped_count: usize,
    pub added_indices: Vec<i32>,
    pub removed_indices: Vec<i32>,
    /// Old indices whose spawned objects no longer belong there.
    pub despawn_indices: Vec<i32>,
    /// New indices whose carried-over objects need spawning.
    pub respawn_indices: Vec<i32>,
}

/// The authoritative `index -> RoomRecord` snapshot for one house.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HouseState {
    rooms: RoomMap,
}

impl HouseState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rooms(rooms: RoomMap) -> Self {
        Self { rooms }
    }

    pub fn rooms(&self) -> &RoomMap {
        &self.rooms
    }

    pub fn room(&self, index: i32) -> Option<&RoomRecord> {
        self.rooms.get(&index)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn replace_rooms(&mut self, rooms: RoomMap) {
        self.rooms = rooms;
    }

    /// Room occupying grid cell `(x, y)` on any level; lowest index wins.
    pub fn room_at(&self, x: i32, y: i32) -> Option<&RoomRecord> {
        self.rooms.values().find(|room| room.x == x && room.y == y)
    }

    pub fn room_at_mut(&mut self, x: i32, y: i32) -> Option<&mut RoomRecord> {
        self.rooms
            .values_mut()
            .find(|room| room.x == x && room.y == y)
    }

    /// Reconciles `batch` against the current rooms and swaps the result in.
    pub fn apply_batch(&mut self, batch: &RoomMap) -> BatchReport {
        let result = reconcile(&self.rooms, batch);
        let ReconciliationResult {
            moved_rooms,
            added_count,
            removed_count,
            remapped_count,
            added_indices,
            removed_indices,
            remaps,
            updated_rooms,
        } = result;

        let mut despawn = removed_indices.iter().copied().collect::<BTreeSet<_>>();
        let mut respawn = BTreeSet::new();
        for remap in &remaps {
            despawn.insert(remap.old_index);
            respawn.insert(remap.new_index);
        }
        for room_move in &moved_rooms {
            despawn.insert(room_move.old_index);
            respawn.insert(room_move.new_index);
        }

        let previous = std::mem::replace(&mut self.rooms, updated_rooms);
        let matched_old_index = remaps
            .iter()
            .map(|remap| (remap.new_index, remap.old_index))
            .collect::<BTreeMap<_, _>>();

        let report = BatchReport {
            moved_rooms,
            added_count,
            removed_count,
            remapped_count,
            added_indices,
            removed_indices,
            despawn_indices: despawn.into_iter().collect(),
            respawn_indices: respawn.into_iter().collect(),
        };
        self.log_room_changes(&report, &previous, &matched_old_index);
        report
    }

    fn log_room_changes(
        &self,
        report: &BatchReport,
        previous: &RoomMap,
        matched_old_index: &BTreeMap<i32, i32>,
    ) {
        for room_move in &report.moved_rooms {
            info!(
                room = room_move.new_room.display_name(),
                old_index = room_move.old_index,
                new_index = room_move.new_index,
                old_x = room_move.old_room.x,
                old_y = room_move.old_room.y,
                old_level = room_move.old_room.level,
                new_x = room_move.new_room.x,
                new_y = room_move.new_room.y,
                new_level = room_move.new_room.level,
                "room_moved"
            );
        }

        if !report.moved_rooms.is_empty() {
            for (&index, room) in &self.rooms {
                if report.added_indices.contains(&index) {
                    debug!(index, room = %room, "room_layout_new");
                    continue;
                }
                let old_index = matched_old_index.get(&index).copied().unwrap_or(index);
                let Some(old_room) = previous.get(&old_index) else {
                    continue;
                };
                if !old_room.same_position(room) {
                    debug!(
                        index,
                        was = old_index,
                        from = %old_room,
                        to = %room,
                        "room_layout_moved"
                    );
                } else if old_index != index {
                    debug!(index, was = old_index, room = %room, "room_layout_reindexed");
                } else {
                    debug!(index, room = %room, "room_layout_unchanged");
                }
            }
        }

        if report.added_count > 0 || report.remapped_count > 0 {
            info!(
                added = report.added_count,
                remapped = report.remapped_count,
                "rooms_added"
            );
        }
        if report.removed_count > 0 {
            info!(removed = report.removed_count, "rooms_removed");
        }
    }
}
