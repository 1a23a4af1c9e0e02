use std::{sync::Arc, time::Instant};

use arc_swap::{ArcSwap, Guard};
use glam::Mat4;

use crate::skeleton::TRS;

/// Per-bone world transforms captured at one simulation tick. Immutable once
/// published; superseded by the next tick's snapshot.
pub struct PoseSnapshot {
    pub tick: u64,
    pub bones: Vec<TRS>,
}

impl PoseSnapshot {
    pub fn init(bone_count: usize) -> Self {
        Self {
            tick: 0,
            bones: vec![TRS::IDENTITY; bone_count],
        }
    }

    /// Expand to bone matrices, e.g. for a skinning upload.
    pub fn write_matrices(&self, out: &mut Vec<Mat4>) {
        out.clear();
        out.extend(self.bones.iter().map(|t| t.to_mat4()));
    }
}

/// GPU-ready view of a matrix slice.
pub fn matrix_bytes(matrices: &[Mat4]) -> &[u8] {
    bytemuck::cast_slice(matrices)
}

pub type SnapshotGuard = Guard<Arc<SnapshotPair>>;

/// prev/curr so a consumer can read the prior tick while the next is being
/// written; `publish` swaps a fully built snapshot in, so a reader never
/// observes a partial pose.
#[derive(Clone)]
pub struct SnapshotPair {
    pub prev: Arc<PoseSnapshot>,
    pub prev_timestamp: Instant,
    pub curr: Arc<PoseSnapshot>,
    pub curr_timestamp: Instant,
}

pub struct SnapshotHandoff {
    pair: ArcSwap<SnapshotPair>,
}

impl SnapshotHandoff {
    pub fn new(init: PoseSnapshot) -> Self {
        let init = Arc::new(init);
        let pair = SnapshotPair {
            prev: init.clone(),
            prev_timestamp: Instant::now(),
            curr: init,
            curr_timestamp: Instant::now(),
        };
        Self {
            pair: ArcSwap::from(Arc::new(pair)),
        }
    }

    pub fn publish(&self, snap: PoseSnapshot) {
        let old = self.pair.load();
        let next = SnapshotPair {
            prev: old.curr.clone(),
            prev_timestamp: old.curr_timestamp,
            curr: Arc::new(snap),
            curr_timestamp: Instant::now(),
        };
        self.pair.store(Arc::new(next));
    }

    pub fn load(&self) -> SnapshotGuard {
        self.pair.load()
    }

    /// Most recently completed snapshot.
    pub fn latest(&self) -> Arc<PoseSnapshot> {
        self.pair.load().curr.clone()
    }
}
