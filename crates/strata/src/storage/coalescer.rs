use std::{
    ops::Range,
    sync::atomic::{AtomicU64, Ordering},
};

use ash::vk;

use crate::recorder::CommandRecorder;

///Decouples "the logical size changed" (cheap, any thread) from "the backing storage was grown" (recorded once per update
/// on the recording thread).
///
/// Every size change bumps a monotonic request version. [sync](GrowthCoalescer::sync) compares it with the version
/// of the last growth and, if they differ, re-reads the *current* logical size. Changes that race the sync are either
/// covered by the size that was read, or leave the version dirty for the next sync. Either way no growth is lost.
#[derive(Debug, Default)]
pub struct GrowthCoalescer {
    requested: AtomicU64,
    synced: AtomicU64,
    //logical size covered by the last growth
    capacity: AtomicU64,
}

impl GrowthCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    ///Announces that the logical size changed. Must be called after the new size is visible.
    pub fn request_growth(&self) {
        self.requested.fetch_add(1, Ordering::AcqRel);
    }

    pub fn is_dirty(&self) -> bool {
        self.requested.load(Ordering::Acquire) != self.synced.load(Ordering::Acquire)
    }

    ///Logical size the storage was grown to by the last sync.
    pub fn capacity(&self) -> u64 {
        self.capacity.load(Ordering::Acquire)
    }

    ///If dirty, marks the current request version as synced and returns the logical size the storage has to be grown to.
    ///
    /// Must not be called concurrently with itself.
    pub fn sync(&self, logical_size: impl FnOnce() -> u64) -> Option<u64> {
        let requested = self.requested.load(Ordering::Acquire);
        if requested == self.synced.load(Ordering::Acquire) {
            return None;
        }
        self.synced.store(requested, Ordering::Release);

        //read *after* consuming the version, so every size change announced up to `requested` is included.
        let size = logical_size().max(self.capacity());
        self.capacity.store(size, Ordering::Release);
        Some(size)
    }

    ///Runs [sync](Self::sync) and records a single sparse bind of `0..size * stride` bytes of `buffer`, clamped
    /// to `max_bytes`. Returns the recorded range, if any.
    pub fn record_growth(
        &self,
        recorder: &mut CommandRecorder,
        buffer: vk::Buffer,
        stride: u64,
        max_bytes: u64,
        logical_size: impl FnOnce() -> u64,
    ) -> Option<Range<u64>> {
        let size = self.sync(logical_size)?;
        let range = 0..(size * stride).min(max_bytes);

        #[cfg(feature = "logging")]
        log::debug!(
            "growing sparse buffer {:?} to {} bytes ({} elements)",
            buffer,
            range.end,
            size
        );

        recorder.bind_sparse(buffer, range.clone());
        Some(range)
    }
}
