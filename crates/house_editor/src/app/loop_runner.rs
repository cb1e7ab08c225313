use std::process::ExitCode;

use house_core::{scan, FlushReport, HouseSession, HouseStorage, NameLookup, TerrainError};
use tracing::{debug, error, info, warn};

use super::bootstrap::AppWiring;
use super::replay::{PlacementRow, Replay};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ReplaySummary {
    pub(crate) frames: usize,
    pub(crate) events: usize,
    pub(crate) flushes: usize,
    pub(crate) objects_placed: usize,
    pub(crate) placements_failed: usize,
    pub(crate) final_rooms: usize,
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let AppWiring {
        storage,
        username,
        replay,
    } = app;
    let mut session = HouseSession::new(storage, replay.room_names.clone());
    session.set_username(username);

    match replay_session(&replay, &mut session) {
        Ok(summary) => {
            info!(
                frames = summary.frames,
                events = summary.events,
                flushes = summary.flushes,
                objects_placed = summary.objects_placed,
                placements_failed = summary.placements_failed,
                rooms = summary.final_rooms,
                "replay_finished"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "replay_failed");
            ExitCode::FAILURE
        }
    }
}

/// Drives `session` through every frame of `replay` the way the host's
/// per-frame loop would.
pub(crate) fn replay_session<S, L>(
    replay: &Replay,
    session: &mut HouseSession<S, L>,
) -> Result<ReplaySummary, TerrainError>
where
    S: HouseStorage,
    L: NameLookup,
{
    let terrain = replay.build_terrain()?;
    let region = scan(&replay.scan_request(), &terrain);
    let spawns = session.enter_house(region);
    for spawn in &spawns {
        debug!(
            room_index = spawn.room_index,
            gameval = %spawn.gameval,
            x = spawn.point.x,
            y = spawn.point.y,
            orientation = spawn.orientation,
            "object_spawn_planned"
        );
    }

    let mut summary = ReplaySummary::default();
    for (frame_index, frame) in replay.frames.iter().enumerate() {
        summary.frames += 1;
        for row in &frame.events {
            session.on_room_event((*row).into());
            summary.events += 1;
        }

        if let Some(flushed) = session.end_frame() {
            summary.flushes += 1;
            log_flush(frame_index, &flushed);
        }

        for placement in &frame.placements {
            if place(session, placement) {
                summary.objects_placed += 1;
            } else {
                summary.placements_failed += 1;
            }
        }

        if frame.leave_house {
            session.leave_house();
        }
    }

    summary.final_rooms = session.state().len();
    Ok(summary)
}

fn place<S, L>(session: &mut HouseSession<S, L>, placement: &PlacementRow) -> bool
where
    S: HouseStorage,
    L: NameLookup,
{
    let point = session.region().and_then(|region| {
        region.zone_tile_to_local(
            placement.zone_x,
            placement.zone_y,
            placement.tile_x,
            placement.tile_y,
        )
    });
    let Some(point) = point else {
        warn!(
            gameval = %placement.gameval,
            zone_x = placement.zone_x,
            zone_y = placement.zone_y,
            tile_x = placement.tile_x,
            tile_y = placement.tile_y,
            "placement_zone_tile_unmapped"
        );
        return false;
    };

    match session.place_object(point, &placement.gameval, placement.facing()) {
        Ok(placed) => {
            debug!(
                room_index = placed.room_index,
                x = placed.point.x,
                y = placed.point.y,
                persisted = placed.persisted,
                "object_spawn_requested"
            );
            true
        }
        Err(err) => {
            debug!(error = %err, gameval = %placement.gameval, "placement_skipped");
            false
        }
    }
}

fn log_flush(frame_index: usize, flushed: &FlushReport) {
    let report = &flushed.report;
    info!(
        frame = frame_index,
        batch_size = flushed.batch_size,
        added = report.added_count,
        removed = report.removed_count,
        moved = report.moved_rooms.len(),
        remapped = report.remapped_count,
        despawn = ?report.despawn_indices,
        respawn = ?report.respawn_indices,
        persisted = flushed.persisted,
        "frame_flushed"
    );
    for spawn in &flushed.spawns {
        debug!(
            room_index = spawn.room_index,
            gameval = %spawn.gameval,
            x = spawn.point.x,
            y = spawn.point.y,
            orientation = spawn.orientation,
            "object_spawn_planned"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;

    use house_core::{LocalFileStorage, MemoryStorage};
    use tempfile::TempDir;

    use super::super::replay::parse_replay;
    use super::*;

    // Chunk-grid cells 2..=5 on both axes are raised: zones 1..=4 exist.
    const HOUSE_REPLAY: &str = r#"{
        "terrain": {"raised": [{"min_x": 24, "min_y": 24, "max_x": 55, "max_y": 55, "height": 90}]},
        "room_names": {"10": "PARLOUR", "11": "KITCHEN"},
        "frames": [
            {"events": [[1, 10, 74, 0, 0], [2, 11, 75, 9, 0], [2, 11, 75, 10, 0]]},
            {"placements": [
                {"zone_x": 1, "zone_y": 1, "tile_x": 3, "tile_y": 4, "gameval": "chair", "orientation": 500, "rotations": 1},
                {"zone_x": 4, "zone_y": 4, "tile_x": 0, "tile_y": 0, "gameval": "rug"}
            ]},
            {"events": [[5, 10, 74, 27, 0], [6, 11, 75, 10, 0]]},
            {"leave_house": true},
            {"placements": [
                {"zone_x": 1, "zone_y": 1, "tile_x": 0, "tile_y": 0, "gameval": "lamp"}
            ]}
        ]
    }"#;

    fn replay() -> Replay {
        parse_replay(HOUSE_REPLAY, "house.json".as_ref()).expect("replay")
    }

    #[test]
    fn replay_reconciles_places_and_follows_moves() {
        let replay = replay();
        let mut session = HouseSession::new(MemoryStorage::new(), replay.room_names.clone())
            .with_username("alice");

        let summary = replay_session(&replay, &mut session).expect("replay");
        assert_eq!(
            summary,
            ReplaySummary {
                frames: 5,
                events: 5,
                flushes: 2,
                objects_placed: 1,
                placements_failed: 2,
                final_rooms: 2,
            }
        );

        // The parlour moved from zone (1, 1) to (4, 4) and took the chair along.
        let parlour = session.state().room(5).expect("parlour at index 5");
        assert_eq!((parlour.x, parlour.y), (4, 4));
        assert_eq!(parlour.name.as_deref(), Some("PARLOUR"));
        assert_eq!(parlour.objects.len(), 1);
        assert_eq!(parlour.objects[0].gameval, "chair");
        assert_eq!(parlour.objects[0].orientation, 768);
        assert_eq!((parlour.objects[0].tile_x, parlour.objects[0].tile_y), (3, 4));

        let kitchen = session.state().room(6).expect("kitchen at index 6");
        assert_eq!((kitchen.x, kitchen.y), (3, 2));
        assert!(session.region().is_none());

        let stats = session.stats().snapshot();
        assert_eq!(stats.flush_count, 2);
        assert_eq!(stats.last_moved, 1);
        assert_eq!(stats.last_remapped, 2);
    }

    #[test]
    fn replay_persists_snapshot_to_disk() {
        let temp = TempDir::new().expect("tempdir");
        let replay = replay();
        let storage = LocalFileStorage::new(temp.path());
        let mut session =
            HouseSession::new(storage, replay.room_names.clone()).with_username("alice");

        replay_session(&replay, &mut session).expect("replay");

        let saved = fs::read_to_string(temp.path().join("alice-room-positions.json"))
            .expect("snapshot file");
        assert!(saved.contains("\"chair\""));

        let reloaded = session.storage().load("alice").expect("reload");
        assert_eq!(&reloaded, session.state().rooms());
    }

    #[test]
    fn flat_terrain_leaves_house_without_region() {
        let replay = parse_replay(
            r#"{"frames": [{"events": [[1, 10, 74, 0, 0]],
                "placements": [{"zone_x": 1, "zone_y": 1, "tile_x": 0, "tile_y": 0, "gameval": "rug"}]}]}"#,
            "flat.json".as_ref(),
        )
        .expect("replay");
        let mut session = HouseSession::new(MemoryStorage::new(), BTreeMap::<i32, String>::new());

        let summary = replay_session(&replay, &mut session).expect("replay");
        assert_eq!(summary.flushes, 1);
        assert_eq!(summary.placements_failed, 1);
        assert_eq!(summary.final_rooms, 1);
        assert!(!session.stats().snapshot().region_valid);
    }
}
