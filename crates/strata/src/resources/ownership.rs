//! Queue ownership tracking.
//!
//! Resources created with [SharingMode::Exclusive](super::SharingMode::Exclusive) are owned by exactly one queue family at a time.
//! Moving them to another family needs a *release* barrier on the old family's command stream and an *acquire* barrier on the new one.
//! The tracker never emits those barriers itself. It hands out an [OwnershipTransfer] token that is ticked off by the
//! [CommandRecorder](crate::recorder::CommandRecorder)s that record the two halves, and only switches the owner once both were recorded.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use ash::vk;

use crate::error::OwnershipError;

///The device object a transfer is issued for. Used by recorders to build the barrier halves.
#[derive(Clone, Copy, Debug)]
pub enum TransferObject {
    Buffer {
        buffer: vk::Buffer,
        offset: u64,
        size: u64,
    },
    Image {
        image: vk::Image,
        range: vk::ImageSubresourceRange,
    },
}

//ash does not implement PartialEq for vk::ImageSubresourceRange
impl PartialEq for TransferObject {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                TransferObject::Buffer {
                    buffer: a,
                    offset: ao,
                    size: asz,
                },
                TransferObject::Buffer {
                    buffer: b,
                    offset: bo,
                    size: bsz,
                },
            ) => a == b && ao == bo && asz == bsz,
            (
                TransferObject::Image { image: a, range: ar },
                TransferObject::Image { image: b, range: br },
            ) => {
                a == b
                    && ar.aspect_mask == br.aspect_mask
                    && ar.base_mip_level == br.base_mip_level
                    && ar.level_count == br.level_count
                    && ar.base_array_layer == br.base_array_layer
                    && ar.layer_count == br.layer_count
            }
            _ => false,
        }
    }
}

impl Eq for TransferObject {}

///Per resource record of the owning queue family.
#[derive(Debug)]
pub struct QueueOwnership {
    owner: AtomicU32,
    pending: AtomicBool,
}

impl QueueOwnership {
    pub fn new(family: u32) -> Self {
        QueueOwnership {
            owner: AtomicU32::new(family),
            pending: AtomicBool::new(false),
        }
    }

    ///The family that is currently allowed to use the resource. Does not change while a transfer is pending.
    pub fn current_owner(&self) -> u32 {
        self.owner.load(Ordering::Acquire)
    }

    pub fn is_transfer_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    ///Starts a transfer to `dst`. Only one transfer can be pending at a time.
    pub fn begin_transfer(
        &self,
        dst: u32,
        object: TransferObject,
    ) -> Result<OwnershipTransfer<'_>, OwnershipError> {
        if self
            .pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(OwnershipError::TransferPending);
        }

        let src = self.current_owner();
        Ok(OwnershipTransfer {
            tracker: self,
            src,
            dst,
            object,
            //transfers within the same family have no barrier halves.
            released: src == dst,
            acquired: src == dst,
            finished: false,
        })
    }

    ///Checks that `family` currently owns the resource. Only checked in debug builds, release builds always succeed.
    pub fn assert_owned_by(&self, family: u32) -> Result<(), OwnershipError> {
        if cfg!(debug_assertions) {
            let expected = self.current_owner();
            if expected != family {
                #[cfg(feature = "logging")]
                log::error!(
                    "Queue ownership violation: owned by {}, used on {}",
                    expected,
                    family
                );
                return Err(OwnershipError::Violation {
                    expected,
                    used: family,
                });
            }
        }
        Ok(())
    }
}

///Pending ownership transfer. Both halves need to be recorded before [complete](OwnershipTransfer::complete) switches
/// the owner. Dropping an unfinished transfer cancels it.
#[must_use = "a transfer only takes effect once completed"]
#[derive(Debug)]
pub struct OwnershipTransfer<'a> {
    tracker: &'a QueueOwnership,
    src: u32,
    dst: u32,
    object: TransferObject,
    released: bool,
    acquired: bool,
    finished: bool,
}

impl OwnershipTransfer<'_> {
    pub fn src_family(&self) -> u32 {
        self.src
    }
    pub fn dst_family(&self) -> u32 {
        self.dst
    }
    pub fn object(&self) -> TransferObject {
        self.object
    }
    pub fn is_noop(&self) -> bool {
        self.src == self.dst
    }
    pub(crate) fn mark_released(&mut self) {
        self.released = true;
    }
    pub(crate) fn mark_acquired(&mut self) {
        self.acquired = true;
    }

    ///Switches the owner to the destination family. Fails (and cancels the transfer) if one of the barrier halves was not recorded.
    pub fn complete(mut self) -> Result<u32, OwnershipError> {
        let missing = match (self.released, self.acquired) {
            (true, true) => None,
            (false, _) => Some("release"),
            (true, false) => Some("acquire"),
        };

        if let Some(missing) = missing {
            #[cfg(feature = "logging")]
            log::warn!(
                "Cancelling queue transfer {} -> {}, {} barrier was not recorded",
                self.src,
                self.dst,
                missing
            );
            return Err(OwnershipError::IncompleteTransfer {
                src: self.src,
                dst: self.dst,
                missing,
            });
        }

        self.tracker.owner.store(self.dst, Ordering::Release);
        self.finished = true;
        self.tracker.pending.store(false, Ordering::Release);

        #[cfg(feature = "logging")]
        log::trace!("queue ownership {} -> {}", self.src, self.dst);

        Ok(self.dst)
    }
}

impl Drop for OwnershipTransfer<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.tracker.pending.store(false, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use static_assertions::assert_impl_all;

    fn object() -> TransferObject {
        TransferObject::Buffer {
            buffer: vk::Buffer::from_raw(3),
            offset: 0,
            size: vk::WHOLE_SIZE,
        }
    }

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(QueueOwnership: Send, Sync);
    }

    #[test]
    fn image_objects_compare_by_range() {
        let image = |level_count| TransferObject::Image {
            image: vk::Image::from_raw(5),
            range: vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count,
                base_array_layer: 0,
                layer_count: 1,
            },
        };
        assert_eq!(image(1), image(1));
        assert_ne!(image(1), image(2));
        assert_ne!(image(1), object());
    }

    #[test]
    fn owner_switches_only_after_both_halves() {
        let ownership = QueueOwnership::new(0);
        let mut transfer = ownership.begin_transfer(2, object()).unwrap();
        assert!(ownership.is_transfer_pending());

        transfer.mark_released();
        //no intermediate state is visible
        assert_eq!(ownership.current_owner(), 0);
        transfer.mark_acquired();
        assert_eq!(transfer.complete(), Ok(2));

        assert_eq!(ownership.current_owner(), 2);
        assert!(!ownership.is_transfer_pending());
    }

    #[test]
    fn incomplete_transfer_is_cancelled() {
        let ownership = QueueOwnership::new(0);
        let mut transfer = ownership.begin_transfer(1, object()).unwrap();
        transfer.mark_released();
        assert_eq!(
            transfer.complete(),
            Err(OwnershipError::IncompleteTransfer {
                src: 0,
                dst: 1,
                missing: "acquire"
            })
        );
        assert_eq!(ownership.current_owner(), 0);
        assert!(!ownership.is_transfer_pending());

        //dropping cancels as well
        let transfer = ownership.begin_transfer(1, object()).unwrap();
        drop(transfer);
        assert!(!ownership.is_transfer_pending());
    }

    #[test]
    fn only_one_pending_transfer() {
        let ownership = QueueOwnership::new(0);
        let _first = ownership.begin_transfer(1, object()).unwrap();
        assert_eq!(
            ownership.begin_transfer(2, object()).unwrap_err(),
            OwnershipError::TransferPending
        );
    }

    #[test]
    fn same_family_transfer_is_noop() {
        let ownership = QueueOwnership::new(4);
        let transfer = ownership.begin_transfer(4, object()).unwrap();
        assert!(transfer.is_noop());
        assert_eq!(transfer.complete(), Ok(4));
    }

    #[test]
    fn violation_in_debug_builds() {
        let ownership = QueueOwnership::new(0);
        assert!(ownership.assert_owned_by(0).is_ok());
        if cfg!(debug_assertions) {
            assert_eq!(
                ownership.assert_owned_by(1),
                Err(OwnershipError::Violation {
                    expected: 0,
                    used: 1
                })
            );
        } else {
            assert!(ownership.assert_owned_by(1).is_ok());
        }
    }
}
