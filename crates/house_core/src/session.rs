use thiserror::Error;
use tracing::{debug, info, warn};

use crate::geometry::{LocalPoint, UsableRegionMap, ZoneTile};
use crate::rooms::{
    decode, orientation_in_range, BatchReport, BatchScheduler, CachedNameLookup, HouseState,
    NameLookup, ObjectSpawn, RawRoomEvent, RoomEventInbox, RoomRecord, SchedulerState,
    SubmitOutcome,
};
use crate::stats::HouseStatsHandle;
use crate::storage::HouseStorage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeferredTask {
    FlushRoomBatch,
}

/// Where a stored object should be spawned in the scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectPlacement {
    pub room_index: i32,
    pub gameval: String,
    pub point: LocalPoint,
    pub orientation: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub batch_size: usize,
    pub report: BatchReport,
    /// Objects of moved or reindexed rooms, at their new positions.
    pub spawns: Vec<ObjectPlacement>,
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedObject {
    pub room_index: i32,
    pub zone: ZoneTile,
    pub point: LocalPoint,
    pub spawn: ObjectSpawn,
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    #[error("no usable region is known for the current house")]
    RegionUnavailable,
    #[error("orientation {orientation} is outside 0..2048")]
    InvalidOrientation { orientation: i32 },
    #[error("local point ({x}, {y}) is outside the room grid")]
    OutsideRoomGrid { x: i32, y: i32 },
    #[error("no room at zone ({zone_x}, {zone_y})")]
    NoRoomAtZone { zone_x: i32, zone_y: i32 },
}

/// Long-lived owner of one player's house: the authoritative rooms, the
/// current usable region, event coalescing and persistence.
///
/// Everything runs on the host's driving thread. Events from other threads
/// arrive through a [`RoomEventInbox`] drained by [`HouseSession::pump`].
pub struct HouseSession<S, L> {
    storage: S,
    names: CachedNameLookup<L>,
    username: Option<String>,
    /// Whether the stored snapshot for `username` has been read. Nothing is
    /// written for a user until it has.
    snapshot_loaded: bool,
    state: HouseState,
    region: Option<UsableRegionMap>,
    scheduler: BatchScheduler,
    deferred: Vec<DeferredTask>,
    stats: HouseStatsHandle,
}

impl<S, L> HouseSession<S, L>
where
    S: HouseStorage,
    L: NameLookup,
{
    pub fn new(storage: S, names: L) -> Self {
        Self {
            storage,
            names: CachedNameLookup::new(names),
            username: None,
            snapshot_loaded: false,
            state: HouseState::new(),
            region: None,
            scheduler: BatchScheduler::new(),
            deferred: Vec::new(),
            stats: HouseStatsHandle::default(),
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.set_username(Some(username.into()));
        self
    }

    /// Switching identity reads that user's snapshot before anything else
    /// touches storage.
    pub fn set_username(&mut self, username: Option<String>) {
        if self.username != username {
            self.snapshot_loaded = false;
        }
        self.username = username;
        self.load_rooms();
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn state(&self) -> &HouseState {
        &self.state
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn region(&self) -> Option<&UsableRegionMap> {
        self.region.as_ref()
    }

    pub fn stats(&self) -> HouseStatsHandle {
        self.stats.clone()
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn room_at(&self, x: i32, y: i32) -> Option<&RoomRecord> {
        self.state.room_at(x, y)
    }

    /// Installs a freshly scanned region and returns where every stored object
    /// goes. The stored snapshot is read first if it has not been yet.
    pub fn enter_house(&mut self, map: UsableRegionMap) -> Vec<ObjectPlacement> {
        if !map.is_valid() {
            warn!(
                total_chunks = map.total_chunks(),
                "usable_region_invalid_after_scan"
            );
        }
        self.region = Some(map);

        self.load_rooms();
        self.publish_stats(None);

        let indices = self.state.rooms().keys().copied().collect::<Vec<_>>();
        let spawns = self.spawn_plan(&indices);
        info!(
            rooms = self.state.len(),
            objects = spawns.len(),
            "house_entered"
        );
        spawns
    }

    pub fn leave_house(&mut self) {
        self.region = None;
        self.publish_stats(None);
        info!("house_left");
    }

    pub fn on_room_event(&mut self, event: RawRoomEvent) -> SubmitOutcome {
        let room = decode(&event, &mut self.names);
        let outcome = self.scheduler.submit(room);
        if outcome == SubmitOutcome::FlushScheduled {
            self.deferred.push(DeferredTask::FlushRoomBatch);
        }
        outcome
    }

    /// Feeds every event received on `inbox` so far. Returns how many.
    pub fn pump(&mut self, inbox: &RoomEventInbox) -> usize {
        let events = inbox.drain();
        for event in &events {
            self.on_room_event(*event);
        }
        events.len()
    }

    /// Runs the work deferred during this frame. At most one reconciliation
    /// happens per call.
    pub fn end_frame(&mut self) -> Option<FlushReport> {
        let mut flushed = None;
        for task in std::mem::take(&mut self.deferred) {
            match task {
                DeferredTask::FlushRoomBatch => {
                    if let Some(report) = self.flush_room_batch() {
                        flushed = Some(report);
                    }
                }
            }
        }
        flushed
    }

    fn flush_room_batch(&mut self) -> Option<FlushReport> {
        let batch = self.scheduler.take_flush()?;
        self.load_rooms();
        let report = self.state.apply_batch(&batch);
        let spawns = self.spawn_plan(&report.respawn_indices);
        let persisted = self.save_rooms();
        self.publish_stats(Some(&report));
        debug!(
            batch_size = batch.len(),
            rooms = self.state.len(),
            persisted,
            "room_batch_flushed"
        );
        Some(FlushReport {
            batch_size: batch.len(),
            report,
            spawns,
            persisted,
        })
    }

    /// Stores an object on the tile under `point`, in whichever room occupies
    /// that zone.
    pub fn place_object(
        &mut self,
        point: LocalPoint,
        gameval: &str,
        orientation: i32,
    ) -> Result<PlacedObject, PlacementError> {
        self.try_place_object(point, gameval, orientation)
            .inspect_err(|error| {
                warn!(
                    error = %error,
                    gameval,
                    x = point.x,
                    y = point.y,
                    "object_placement_failed"
                );
            })
    }

    fn try_place_object(
        &mut self,
        point: LocalPoint,
        gameval: &str,
        orientation: i32,
    ) -> Result<PlacedObject, PlacementError> {
        let region = self
            .region
            .as_ref()
            .filter(|region| region.is_valid())
            .ok_or(PlacementError::RegionUnavailable)?;
        if !orientation_in_range(orientation) {
            return Err(PlacementError::InvalidOrientation { orientation });
        }
        let zone = region
            .local_to_zone_tile(point)
            .ok_or(PlacementError::OutsideRoomGrid {
                x: point.x,
                y: point.y,
            })?;
        let tile_point = region
            .zone_tile_to_local(zone.zone_x, zone.zone_y, zone.tile_x, zone.tile_y)
            .ok_or(PlacementError::OutsideRoomGrid {
                x: point.x,
                y: point.y,
            })?;
        let room = self
            .state
            .room_at_mut(zone.zone_x, zone.zone_y)
            .ok_or(PlacementError::NoRoomAtZone {
                zone_x: zone.zone_x,
                zone_y: zone.zone_y,
            })?;

        let spawn = ObjectSpawn {
            gameval: gameval.to_string(),
            tile_x: zone.tile_x,
            tile_y: zone.tile_y,
            orientation,
        };
        room.objects.push(spawn.clone());
        let room_index = room.index;
        info!(
            gameval,
            room = room.display_name(),
            zone_x = zone.zone_x,
            zone_y = zone.zone_y,
            tile_x = zone.tile_x,
            tile_y = zone.tile_y,
            objects_in_room = room.objects.len(),
            "object_placed"
        );

        let persisted = self.save_rooms();
        Ok(PlacedObject {
            room_index,
            zone,
            point: tile_point,
            spawn,
            persisted,
        })
    }

    /// Scene positions for the objects of the given rooms. Objects that cannot
    /// be located are skipped with a warning.
    pub fn spawn_plan(&self, room_indices: &[i32]) -> Vec<ObjectPlacement> {
        let Some(region) = self.region.as_ref().filter(|region| region.is_valid()) else {
            if !room_indices.is_empty() {
                warn!("cannot plan object spawns: usable region is not valid");
            }
            return Vec::new();
        };

        let mut placements = Vec::new();
        for &room_index in room_indices {
            let Some(room) = self.state.room(room_index) else {
                continue;
            };
            for object in &room.objects {
                let Some(point) =
                    region.zone_tile_to_local(room.x, room.y, object.tile_x, object.tile_y)
                else {
                    warn!(
                        gameval = %object.gameval,
                        zone_x = room.x,
                        zone_y = room.y,
                        tile_x = object.tile_x,
                        tile_y = object.tile_y,
                        "object_zone_tile_conversion_failed"
                    );
                    continue;
                };
                placements.push(ObjectPlacement {
                    room_index,
                    gameval: object.gameval.clone(),
                    point,
                    orientation: object.orientation,
                });
            }
        }
        placements
    }

    /// Reads the stored snapshot once per username. Stored rooms replace the
    /// in-memory ones only while none are known; otherwise the live state
    /// wins and takes over persistence.
    fn load_rooms(&mut self) {
        if self.snapshot_loaded {
            return;
        }
        let Some(username) = self.username.as_deref() else {
            return;
        };
        if !self.storage.exists(username) {
            self.snapshot_loaded = true;
            return;
        }
        match self.storage.load(username) {
            Ok(rooms) if self.state.is_empty() => {
                info!(rooms = rooms.len(), "house_rooms_loaded");
                self.state.replace_rooms(rooms);
                self.snapshot_loaded = true;
            }
            Ok(rooms) => {
                warn!(
                    stored_rooms = rooms.len(),
                    live_rooms = self.state.len(),
                    "house_rooms_snapshot_superseded"
                );
                self.snapshot_loaded = true;
            }
            Err(error) => warn!(error = %error, "house_rooms_load_failed"),
        }
    }

    fn save_rooms(&mut self) -> bool {
        let Some(username) = self.username.as_deref() else {
            debug!("no username; skipping room snapshot save");
            return false;
        };
        if !self.snapshot_loaded {
            warn!(username, "room_snapshot_unread_save_skipped");
            return false;
        }
        match self.storage.save(username, self.state.rooms()) {
            Ok(()) => true,
            Err(error) => {
                warn!(error = %error, "house_rooms_save_failed");
                false
            }
        }
    }

    fn publish_stats(&self, report: Option<&BatchReport>) {
        let known_rooms = self.state.len();
        let region_valid = self.region.as_ref().is_some_and(UsableRegionMap::is_valid);
        let usable_chunks = self
            .region
            .as_ref()
            .map_or(0, UsableRegionMap::usable_count);
        let flush_count = self.scheduler.flush_count();
        self.stats.update(|stats| {
            stats.known_rooms = known_rooms;
            stats.region_valid = region_valid;
            stats.usable_chunks = usable_chunks;
            stats.flush_count = flush_count;
            if let Some(report) = report {
                stats.last_added = report.added_count;
                stats.last_removed = report.removed_count;
                stats.last_moved = report.moved_rooms.len();
                stats.last_remapped = report.remapped_count;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::thread;

    use super::*;
    use crate::geometry::{scan, ScanRequest, LOCAL_COORD_BITS};
    use crate::rooms::room_event_channel;
    use crate::storage::{LocalFileStorage, MemoryStorage};
    use tempfile::TempDir;

    type TestSession = HouseSession<MemoryStorage, BTreeMap<i32, String>>;

    /// Chunk-grid cells 2..=9 on both axes are raised, so zone (1, 1) sits on
    /// chunk (2, 2).
    fn house_region() -> UsableRegionMap {
        let heights = |x: i32, z: i32, _plane: i32| {
            let tile_x = x >> LOCAL_COORD_BITS;
            let tile_z = z >> LOCAL_COORD_BITS;
            let raised = 24..88;
            if raised.contains(&tile_x) && raised.contains(&tile_z) {
                100
            } else {
                0
            }
        };
        scan(&ScanRequest::default(), &heights)
    }

    fn names() -> BTreeMap<i32, String> {
        BTreeMap::from([
            (10, "PARLOUR".to_string()),
            (11, "KITCHEN".to_string()),
            (12, "GARDEN".to_string()),
        ])
    }

    fn session() -> TestSession {
        HouseSession::new(MemoryStorage::new(), names()).with_username("alice")
    }

    fn room_event(index: i32, db_row_id: i32, x: i32, y: i32) -> RawRoomEvent {
        RawRoomEvent {
            index,
            db_row_id,
            bitpacked: 0x40 + db_row_id,
            flag1: (x - 1) | ((y - 1) << 3),
            flag2: 0,
        }
    }

    fn tile_point(session: &TestSession, zone: (i32, i32), tile: (i32, i32)) -> LocalPoint {
        session
            .region()
            .expect("region")
            .zone_tile_to_local(zone.0, zone.1, tile.0, tile.1)
            .expect("tile point")
    }

    #[test]
    fn events_in_one_frame_reconcile_once_with_last_write() {
        let mut session = session();
        session.enter_house(house_region());

        assert_eq!(
            session.on_room_event(room_event(1, 10, 1, 1)),
            SubmitOutcome::FlushScheduled
        );
        for x in 2..=4 {
            assert_eq!(
                session.on_room_event(room_event(1, 10, x, 1)),
                SubmitOutcome::Merged
            );
        }
        assert_eq!(session.scheduler_state(), SchedulerState::ScheduledFlush);

        let flushed = session.end_frame().expect("one flush");
        assert_eq!(flushed.batch_size, 1);
        assert_eq!(flushed.report.added_count, 1);
        assert!(flushed.persisted);
        assert_eq!(session.state().room(1).expect("room").x, 4);
        assert_eq!(session.scheduler_state(), SchedulerState::Idle);
        assert!(session.end_frame().is_none());
        assert_eq!(session.stats().snapshot().flush_count, 1);
    }

    #[test]
    fn decoded_rooms_carry_looked_up_names() {
        let mut session = session();
        session.on_room_event(room_event(1, 11, 2, 2));
        session.on_room_event(room_event(2, 99, 3, 2));
        session.end_frame().expect("flush");

        assert_eq!(
            session.state().room(1).and_then(|room| room.name.as_deref()),
            Some("KITCHEN")
        );
        assert_eq!(session.state().room(2).and_then(|room| room.name.clone()), None);
    }

    #[test]
    fn placed_objects_follow_their_room_across_a_move() {
        let mut session = session();
        session.enter_house(house_region());
        session.on_room_event(room_event(3, 10, 2, 2));
        session.on_room_event(room_event(4, 11, 5, 5));
        session.end_frame().expect("initial flush");

        let point = tile_point(&session, (2, 2), (6, 1));
        let placed = session
            .place_object(LocalPoint { x: point.x + 40, y: point.y + 90 }, "chair", 512)
            .expect("placed");
        assert_eq!(placed.room_index, 3);
        assert_eq!(placed.point, point);
        assert_eq!((placed.spawn.tile_x, placed.spawn.tile_y), (6, 1));
        assert!(placed.persisted);

        // The parlour comes back at index 7 and zone (6, 3); the kitchen is gone.
        session.on_room_event(room_event(7, 10, 6, 3));
        let flushed = session.end_frame().expect("move flush");

        assert_eq!(flushed.report.moved_rooms.len(), 1);
        assert_eq!(flushed.report.removed_count, 1);
        assert_eq!(flushed.report.despawn_indices, vec![3, 4]);
        assert_eq!(flushed.report.respawn_indices, vec![7]);
        assert_eq!(
            flushed.spawns,
            vec![ObjectPlacement {
                room_index: 7,
                gameval: "chair".to_string(),
                point: tile_point(&session, (6, 3), (6, 1)),
                orientation: 512,
            }]
        );

        let stored = session.storage().load("alice").expect("stored snapshot");
        assert_eq!(stored[&7].objects.len(), 1);
        assert!(!stored.contains_key(&3));
    }

    #[test]
    fn placement_failures_are_reported() {
        let mut session = session();
        let anywhere = LocalPoint { x: 4096, y: 4096 };
        assert_eq!(
            session.place_object(anywhere, "chair", 0),
            Err(PlacementError::RegionUnavailable)
        );

        session.enter_house(house_region());
        session.on_room_event(room_event(1, 10, 1, 1));
        session.end_frame().expect("flush");

        let in_room = tile_point(&session, (1, 1), (0, 0));
        assert_eq!(
            session.place_object(in_room, "chair", 2048),
            Err(PlacementError::InvalidOrientation { orientation: 2048 })
        );
        assert_eq!(
            session.place_object(LocalPoint { x: 0, y: 0 }, "chair", 0),
            Err(PlacementError::OutsideRoomGrid { x: 0, y: 0 })
        );
        let empty_zone = tile_point(&session, (3, 3), (0, 0));
        assert_eq!(
            session.place_object(empty_zone, "chair", 0),
            Err(PlacementError::NoRoomAtZone {
                zone_x: 3,
                zone_y: 3,
            })
        );
        assert!(session.state().room(1).expect("room").objects.is_empty());
    }

    #[test]
    fn entering_loads_snapshot_and_plans_object_spawns() {
        let mut first = session();
        first.enter_house(house_region());
        first.on_room_event(room_event(2, 12, 4, 4));
        first.end_frame().expect("flush");
        let point = tile_point(&first, (4, 4), (3, 3));
        first.place_object(point, "fountain", 256).expect("placed");
        let storage = first.storage().clone();

        let mut second = HouseSession::new(storage, names()).with_username("alice");
        let spawns = second.enter_house(house_region());
        assert_eq!(second.state().len(), 1);
        assert_eq!(
            spawns,
            vec![ObjectPlacement {
                room_index: 2,
                gameval: "fountain".to_string(),
                point,
                orientation: 256,
            }]
        );
    }

    #[test]
    fn invalid_region_plans_nothing_and_leaving_drops_region() {
        let mut session = session();
        session.on_room_event(room_event(1, 10, 1, 1));
        session.end_frame().expect("flush");
        let point = LocalPoint { x: 1024, y: 1024 };
        session.state.room_at_mut(1, 1).expect("room").objects.push(ObjectSpawn {
            gameval: "rug".to_string(),
            tile_x: 0,
            tile_y: 0,
            orientation: 0,
        });

        let spawns = session.enter_house(scan(&ScanRequest::default(), &|_: i32, _: i32, _: i32| 0));
        assert!(spawns.is_empty());
        assert!(!session.stats().snapshot().region_valid);

        session.enter_house(house_region());
        assert!(session.stats().snapshot().region_valid);
        session.leave_house();
        assert!(session.region().is_none());
        assert_eq!(
            session.place_object(point, "rug", 0),
            Err(PlacementError::RegionUnavailable)
        );
    }

    #[test]
    fn stored_objects_survive_events_that_arrive_before_entering() {
        let mut parlour = decode(&room_event(1, 10, 2, 2), &mut names());
        parlour.objects.push(ObjectSpawn {
            gameval: "chair".to_string(),
            tile_x: 1,
            tile_y: 1,
            orientation: 0,
        });
        let mut storage = MemoryStorage::new();
        storage
            .save("alice", &[(1, parlour)].into_iter().collect())
            .expect("seed snapshot");

        let mut session = HouseSession::new(storage, names()).with_username("alice");
        session.on_room_event(room_event(1, 10, 2, 2));
        let flushed = session.end_frame().expect("flush");

        assert!(flushed.report.added_indices.is_empty());
        assert!(flushed.persisted);
        let stored = session.storage().load("alice").expect("stored snapshot");
        assert_eq!(stored[&1].objects.len(), 1);
        assert_eq!(stored[&1].objects[0].gameval, "chair");
    }

    #[test]
    fn unreadable_snapshot_is_never_overwritten() {
        let temp = TempDir::new().expect("tempdir");
        let storage = LocalFileStorage::new(temp.path());
        let path = storage.save_file_path("alice").expect("path");
        std::fs::write(&path, "{ not json").expect("write corrupt snapshot");

        let mut session = HouseSession::new(storage, names()).with_username("alice");
        session.on_room_event(room_event(1, 10, 1, 1));
        let flushed = session.end_frame().expect("flush");

        assert!(!flushed.persisted);
        assert_eq!(session.state().len(), 1);
        assert_eq!(
            std::fs::read_to_string(&path).expect("read snapshot"),
            "{ not json"
        );
    }

    #[test]
    fn switching_user_reads_that_users_snapshot() {
        let mut storage = MemoryStorage::new();
        let bob_room = decode(&room_event(4, 11, 3, 3), &mut names());
        storage
            .save("bob", &[(4, bob_room)].into_iter().collect())
            .expect("seed snapshot");

        let mut session = HouseSession::new(storage, names());
        assert!(session.state().is_empty());
        session.set_username(Some("bob".to_string()));
        assert_eq!(session.state().room(4).map(|room| (room.x, room.y)), Some((3, 3)));
    }

    #[test]
    fn without_username_nothing_is_persisted() {
        let mut session: TestSession = HouseSession::new(MemoryStorage::new(), names());
        session.on_room_event(room_event(1, 10, 1, 1));
        let flushed = session.end_frame().expect("flush");
        assert!(!flushed.persisted);
        assert!(!session.storage().exists("alice"));
    }

    #[test]
    fn pump_feeds_events_from_another_thread() {
        let mut session = session();
        let (sender, inbox) = room_event_channel();
        thread::spawn(move || {
            for index in 1..=3 {
                sender.send(room_event(index, 10 + index % 2, index, 1)).expect("send");
            }
        })
        .join()
        .expect("producer");

        assert_eq!(session.pump(&inbox), 3);
        let flushed = session.end_frame().expect("flush");
        assert_eq!(flushed.batch_size, 3);
        assert_eq!(session.state().len(), 3);
        assert_eq!(session.stats().snapshot().last_added, 3);
    }
}
