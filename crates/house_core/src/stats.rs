use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tracing::warn;

static STATS_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_stats_lock_poison_once(operation: &'static str) {
    if STATS_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(operation, "house stats lock poisoned; recovered inner value");
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HouseStatsSnapshot {
    pub known_rooms: usize,
    pub region_valid: bool,
    pub usable_chunks: usize,
    pub flush_count: u64,
    pub last_added: usize,
    pub last_removed: usize,
    pub last_moved: usize,
    pub last_remapped: usize,
}

/// Read side for overlays or other threads; the session publishes into it.
#[derive(Clone, Debug)]
pub struct HouseStatsHandle {
    snapshot: Arc<RwLock<HouseStatsSnapshot>>,
}

impl Default for HouseStatsHandle {
    fn default() -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(HouseStatsSnapshot::default())),
        }
    }
}

impl HouseStatsHandle {
    pub fn snapshot(&self) -> HouseStatsSnapshot {
        match self.snapshot.read() {
            Ok(guard) => *guard,
            Err(poisoned) => {
                warn_stats_lock_poison_once("read");
                *poisoned.into_inner()
            }
        }
    }

    pub(crate) fn update(&self, apply: impl FnOnce(&mut HouseStatsSnapshot)) {
        match self.snapshot.write() {
            Ok(mut guard) => apply(&mut *guard),
            Err(poisoned) => {
                warn_stats_lock_poison_once("write");
                let mut guard = poisoned.into_inner();
                apply(&mut *guard);
            }
        }
    }
}
