//! Hash-keyed pool of immutable collision shapes with ref-counts, a deferred
//! GC ring, and an async mesh-build worker queue (§3.1 invariant 1, §4.A).
//!
//! `get` may be called only from the simulation thread. `accept_built_shape`
//! is delivered on the simulation thread via `poll_mesh_builds`, which drains
//! a cross-thread channel; worker threads never touch the map directly.

use std::collections::HashMap;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::time::Instant;

use rapier3d::prelude::SharedShape;

use crate::shape_factory;
use crate::shape_info::{ShapeHash, ShapeInfo};

#[derive(Debug, Clone)]
pub struct ShapeHandle {
    pub hash: ShapeHash,
    pub shape: Arc<SharedShape>,
}

struct ShapeEntry {
    shape: Arc<SharedShape>,
    ref_count: u32,
}

struct OrphanEntry {
    shape: Arc<SharedShape>,
    expires_at: Instant,
}

/// Message delivered from a mesh-build worker back to the simulation thread.
pub struct BuiltMeshShape {
    pub hash: ShapeHash,
    pub shape: SharedShape,
}

pub struct ShapeCache {
    shapes: HashMap<ShapeHash, ShapeEntry>,
    garbage_ring: Vec<Option<ShapeHash>>,
    ring_cursor: usize,
    orphans: HashMap<ShapeHash, OrphanEntry>,
    pending_mesh_builds: std::collections::HashSet<ShapeHash>,
    mesh_build_tx: Sender<BuiltMeshShape>,
    mesh_build_rx: Receiver<BuiltMeshShape>,
}

impl ShapeCache {
    pub fn new() -> Self {
        let (tx, rx) = std::sync::mpsc::channel();
        Self {
            shapes: HashMap::new(),
            garbage_ring: vec![None; crate::constants::SHAPE_GARBAGE_RING_CAPACITY],
            ring_cursor: 0,
            orphans: HashMap::new(),
            pending_mesh_builds: std::collections::HashSet::new(),
            mesh_build_tx: tx,
            mesh_build_rx: rx,
        }
    }

    /// A clone-able sender a mesh-build worker thread can hold to deliver
    /// finished shapes without ever touching the cache directly.
    pub fn mesh_build_sender(&self) -> Sender<BuiltMeshShape> {
        self.mesh_build_tx.clone()
    }

    /// Returns a handle and bumps the refcount. Returns `None` for
    /// `ShapeType::None`, or (temporarily) while a mesh build is pending.
    pub fn get(&mut self, info: &ShapeInfo) -> Option<ShapeHandle> {
        if info.is_none() {
            return None;
        }
        let hash = info.hash();

        if let Some(entry) = self.shapes.get_mut(&hash) {
            entry.ref_count += 1;
            return Some(ShapeHandle { hash, shape: entry.shape.clone() });
        }

        if let Some(orphan) = self.orphans.remove(&hash) {
            let shape = orphan.shape;
            self.shapes.insert(hash, ShapeEntry { shape: shape.clone(), ref_count: 1 });
            return Some(ShapeHandle { hash, shape });
        }

        if shape_factory::is_async_build_required(&info.shape_type) {
            if self.pending_mesh_builds.insert(hash) {
                log::trace!("queuing async mesh build for shape {:?}", hash);
                shape_factory::spawn_mesh_build(info.clone(), hash, self.mesh_build_tx.clone());
            }
            return None;
        }

        let built = shape_factory::build(info).ok()?;
        self.shapes.insert(hash, ShapeEntry { shape: Arc::new(built.clone()), ref_count: 1 });
        Some(ShapeHandle { hash, shape: Arc::new(built) })
    }

    /// Decrements the refcount; on zero, the key enters the garbage ring.
    /// Never frees synchronously.
    pub fn release(&mut self, handle: &ShapeHandle) -> bool {
        let Some(entry) = self.shapes.get_mut(&handle.hash) else {
            return false;
        };
        entry.ref_count = entry.ref_count.saturating_sub(1);
        if entry.ref_count == 0 {
            self.enqueue_garbage(handle.hash);
        }
        true
    }

    fn enqueue_garbage(&mut self, hash: ShapeHash) {
        let slot = self.ring_cursor;
        if let Some(displaced) = self.garbage_ring[slot].take() {
            self.delete_if_still_unreferenced(displaced);
        }
        self.garbage_ring[slot] = Some(hash);
        self.ring_cursor = (self.ring_cursor + 1) % self.garbage_ring.len();
    }

    fn delete_if_still_unreferenced(&mut self, hash: ShapeHash) {
        if let Some(entry) = self.shapes.get(&hash) {
            if entry.ref_count == 0 {
                self.shapes.remove(&hash);
            }
        }
    }

    /// Deletes all ring entries whose refcount is still zero; clears the ring.
    pub fn collect_garbage(&mut self) {
        for slot in self.garbage_ring.iter_mut() {
            if let Some(hash) = slot.take() {
                if let Some(entry) = self.shapes.get(&hash) {
                    if entry.ref_count == 0 {
                        self.shapes.remove(&hash);
                    }
                }
            }
        }
        self.ring_cursor = 0;

        let now = Instant::now();
        self.orphans.retain(|_, orphan| orphan.expires_at > now);
    }

    /// Callback from the mesh-builder worker: registers the shape with
    /// refcount 0 and places it on the orphan list with a 1s expiry.
    pub fn accept_built_shape(&mut self, hash: ShapeHash, shape: SharedShape) {
        self.pending_mesh_builds.remove(&hash);
        self.orphans.insert(
            hash,
            OrphanEntry {
                shape: Arc::new(shape),
                expires_at: Instant::now()
                    + std::time::Duration::from_secs_f32(crate::constants::ORPHAN_SHAPE_EXPIRY_SECONDS),
            },
        );
    }

    /// Drains shapes delivered by mesh-build workers since the last poll.
    /// Call once per tick, before processing adds, per §5's ordering rule
    /// that shape-build completions arriving mid-step aren't consumed until
    /// the next tick starts.
    pub fn poll_mesh_builds(&mut self) {
        while let Ok(built) = self.mesh_build_rx.try_recv() {
            self.accept_built_shape(built.hash, built.shape);
        }
    }

    pub fn num_shapes(&self) -> usize {
        self.shapes.len()
    }

    pub fn ref_count(&self, hash: ShapeHash) -> u32 {
        self.shapes.get(&hash).map(|e| e.ref_count).unwrap_or(0)
    }
}

impl Default for ShapeCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn get_bumps_refcount_and_returns_same_handle() {
        let mut cache = ShapeCache::new();
        let info = ShapeInfo::new_box(Vector3::new(1.0, 1.0, 1.0));
        let h1 = cache.get(&info).unwrap();
        let h2 = cache.get(&info).unwrap();
        assert_eq!(h1.hash, h2.hash);
        assert_eq!(cache.ref_count(h1.hash), 2);
    }

    #[test]
    fn release_to_zero_defers_deletion_until_collect() {
        let mut cache = ShapeCache::new();
        let info = ShapeInfo::new_box(Vector3::new(1.0, 1.0, 1.0));
        let handle = cache.get(&info).unwrap();
        assert!(cache.release(&handle));
        assert_eq!(cache.num_shapes(), 1, "shape must still exist, only enqueued");
        cache.collect_garbage();
        assert_eq!(cache.num_shapes(), 0);
    }

    #[test]
    fn reusing_a_ring_slot_collects_the_displaced_entry() {
        let mut cache = ShapeCache::new();
        let capacity = crate::constants::SHAPE_GARBAGE_RING_CAPACITY;
        let mut handles = Vec::new();
        for i in 0..=capacity {
            let info = ShapeInfo::new_box(Vector3::new(1.0 + i as f32, 1.0, 1.0));
            handles.push(cache.get(&info).unwrap());
        }
        for handle in &handles {
            cache.release(handle);
        }
        // The ring has capacity slots; the (capacity+1)-th release displaces
        // slot 0's original occupant, which should now be collected.
        assert!(cache.num_shapes() < handles.len());
    }

    #[test]
    fn none_shape_type_returns_none() {
        let mut cache = ShapeCache::new();
        let mut info = ShapeInfo::new_box(Vector3::new(1.0, 1.0, 1.0));
        info.shape_type = crate::shape_info::ShapeType::None;
        assert!(cache.get(&info).is_none());
    }
}
