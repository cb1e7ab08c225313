use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::cache::LruCache;

use super::record::RoomRecord;

pub const DEFAULT_NAME_CACHE_CAPACITY: usize = 200;

const X_MASK: i32 = 0x7;
const Y_SHIFT: u32 = 3;
const Y_MASK: i32 = 0x7;
const LEVEL_SHIFT: u32 = 6;
const LEVEL_MASK: i32 = 0x3;
const ROTATION_SHIFT: u32 = 8;
const ROTATION_MASK: i32 = 0x3;
const ROOM_ID_SHIFT: u32 = 10;
const ROOM_ID_MASK: i32 = 0x3F;

/// One room update as delivered by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRoomEvent {
    pub index: i32,
    pub db_row_id: i32,
    pub bitpacked: i32,
    pub flag1: i32,
    pub flag2: i32,
}

/// Game-data lookup from a room definition row to its display name.
pub trait NameLookup {
    fn room_name(&mut self, db_row_id: i32) -> Option<String>;
}

impl NameLookup for HashMap<i32, String> {
    fn room_name(&mut self, db_row_id: i32) -> Option<String> {
        self.get(&db_row_id).cloned()
    }
}

impl NameLookup for BTreeMap<i32, String> {
    fn room_name(&mut self, db_row_id: i32) -> Option<String> {
        self.get(&db_row_id).cloned()
    }
}

impl<F> NameLookup for F
where
    F: FnMut(i32) -> Option<String>,
{
    fn room_name(&mut self, db_row_id: i32) -> Option<String> {
        self(db_row_id)
    }
}

/// Memoises another lookup, misses included.
#[derive(Debug)]
pub struct CachedNameLookup<L> {
    inner: L,
    cache: LruCache<i32, Option<String>>,
}

impl<L: NameLookup> CachedNameLookup<L> {
    pub fn new(inner: L) -> Self {
        Self::with_capacity(inner, DEFAULT_NAME_CACHE_CAPACITY)
    }

    pub fn with_capacity(inner: L, capacity: usize) -> Self {
        Self {
            inner,
            cache: LruCache::new(capacity),
        }
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

impl<L: NameLookup> NameLookup for CachedNameLookup<L> {
    fn room_name(&mut self, db_row_id: i32) -> Option<String> {
        if let Some(cached) = self.cache.get(&db_row_id) {
            return cached.clone();
        }
        let name = self.inner.room_name(db_row_id);
        self.cache.put(db_row_id, name.clone());
        name
    }
}

/// Unpacks the position bitfields of `flag1`. `bitpacked` and `flag2` are
/// kept verbatim as identity payload. A missing name is not an error.
pub fn decode<L>(event: &RawRoomEvent, names: &mut L) -> RoomRecord
where
    L: NameLookup + ?Sized,
{
    let flag1 = event.flag1;
    RoomRecord {
        index: event.index,
        db_row_id: event.db_row_id,
        x: (flag1 & X_MASK) + 1,
        y: ((flag1 >> Y_SHIFT) & Y_MASK) + 1,
        level: (flag1 >> LEVEL_SHIFT) & LEVEL_MASK,
        rotation: (flag1 >> ROTATION_SHIFT) & ROTATION_MASK,
        room_id: (flag1 >> ROOM_ID_SHIFT) & ROOM_ID_MASK,
        bitpacked: event.bitpacked,
        flag1,
        flag2: event.flag2,
        name: names.room_name(event.db_row_id),
        objects: Vec::new(),
    }
}
