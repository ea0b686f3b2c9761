//! ## Recorder
//!
//! Strata never talks to a command buffer directly. Everything that needs to be executed on a queue (sparse binds,
//! buffer uploads, the two halves of a queue ownership transfer) is recorded as a [Command] into a [CommandRecorder]
//! for a specific queue family. The rendering code then translates those commands into its own command buffers, for
//! instance the ownership commands via [barriers](CommandRecorder::barriers) and [Device::cmd_pipeline_barrier](crate::context::Device::cmd_pipeline_barrier).

use std::ops::Range;

use ash::vk;

use crate::{
    error::OwnershipError,
    resources::{DeviceObject, DeviceResource, OwnershipTransfer, QueueOwnership, TransferObject},
};

mod barrier;
pub use barrier::BarrierBuilder;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    ///Binds memory to the byte `range` of a sparse buffer.
    BindSparse {
        buffer: vk::Buffer,
        range: Range<u64>,
    },
    ///Writes `data` at `offset` into `buffer`.
    UpdateBuffer {
        buffer: vk::Buffer,
        offset: u64,
        data: Vec<u8>,
    },
    FillBuffer {
        buffer: vk::Buffer,
        offset: u64,
        size: u64,
        data: u32,
    },
    ///Release half of an ownership transfer, recorded on the source family.
    QueueRelease {
        object: TransferObject,
        src_family: u32,
        dst_family: u32,
    },
    ///Acquire half of an ownership transfer, recorded on the destination family.
    QueueAcquire {
        object: TransferObject,
        src_family: u32,
        dst_family: u32,
    },
}

///Command stream of one queue family.
#[derive(Debug)]
pub struct CommandRecorder {
    family: u32,
    commands: Vec<Command>,
}

impl CommandRecorder {
    pub fn new(family: u32) -> Self {
        CommandRecorder {
            family,
            commands: Vec::new(),
        }
    }

    pub fn family(&self) -> u32 {
        self.family
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    ///Returns all recorded commands and leaves the recorder empty.
    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn record(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn bind_sparse(&mut self, buffer: vk::Buffer, range: Range<u64>) {
        self.record(Command::BindSparse { buffer, range });
    }

    pub fn update_buffer(&mut self, buffer: vk::Buffer, offset: u64, data: &[u8]) {
        self.record(Command::UpdateBuffer {
            buffer,
            offset,
            data: data.to_vec(),
        });
    }

    pub fn fill_buffer(&mut self, buffer: vk::Buffer, offset: u64, size: u64, data: u32) {
        self.record(Command::FillBuffer {
            buffer,
            offset,
            size,
            data,
        });
    }

    ///All sparse bind commands recorded so far.
    pub fn sparse_binds(&self) -> impl Iterator<Item = (vk::Buffer, &Range<u64>)> + '_ {
        self.commands.iter().filter_map(|c| match c {
            Command::BindSparse { buffer, range } => Some((*buffer, range)),
            _ => None,
        })
    }

    ///Records the release half of `transfer`. Must be recorded on the transfer's source family.
    pub fn release(&mut self, transfer: &mut OwnershipTransfer<'_>) -> Result<(), OwnershipError> {
        if self.family != transfer.src_family() {
            return Err(OwnershipError::Violation {
                expected: transfer.src_family(),
                used: self.family,
            });
        }
        if !transfer.is_noop() {
            self.record(Command::QueueRelease {
                object: transfer.object(),
                src_family: transfer.src_family(),
                dst_family: transfer.dst_family(),
            });
        }
        transfer.mark_released();
        Ok(())
    }

    ///Records the acquire half of `transfer`. Must be recorded on the transfer's destination family.
    pub fn acquire(&mut self, transfer: &mut OwnershipTransfer<'_>) -> Result<(), OwnershipError> {
        if self.family != transfer.dst_family() {
            return Err(OwnershipError::Violation {
                expected: transfer.dst_family(),
                used: self.family,
            });
        }
        if !transfer.is_noop() {
            self.record(Command::QueueAcquire {
                object: transfer.object(),
                src_family: transfer.src_family(),
                dst_family: transfer.dst_family(),
            });
        }
        transfer.mark_acquired();
        Ok(())
    }

    ///Checks that `resource` may be used on this recorder's family. Only checked in debug builds.
    pub fn use_resource<T: DeviceObject>(
        &self,
        resource: &DeviceResource<T>,
    ) -> Result<(), OwnershipError> {
        self.use_ownership(resource.queue_ownership())
    }

    pub fn use_ownership(&self, ownership: &QueueOwnership) -> Result<(), OwnershipError> {
        ownership.assert_owned_by(self.family)
    }

    ///Builds the pipeline barriers for all ownership transfer halves recorded so far.
    pub fn barriers(&self) -> BarrierBuilder {
        let mut builder = BarrierBuilder::new();
        for command in &self.commands {
            let (object, src, dst) = match command {
                Command::QueueRelease {
                    object,
                    src_family,
                    dst_family,
                }
                | Command::QueueAcquire {
                    object,
                    src_family,
                    dst_family,
                } => (object, *src_family, *dst_family),
                _ => continue,
            };

            match object {
                TransferObject::Buffer {
                    buffer,
                    offset,
                    size,
                } => {
                    builder.buffer_queue_transition(*buffer, *offset, *size, src, dst);
                }
                TransferObject::Image { image, range } => {
                    builder.image_queue_transition(*image, *range, src, dst);
                }
            }
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn buffer_object() -> TransferObject {
        TransferObject::Buffer {
            buffer: vk::Buffer::from_raw(5),
            offset: 0,
            size: vk::WHOLE_SIZE,
        }
    }

    #[test]
    fn release_and_acquire_on_matching_families() {
        let ownership = QueueOwnership::new(0);
        let mut graphics = CommandRecorder::new(0);
        let mut transfer_queue = CommandRecorder::new(2);

        let mut transfer = ownership.begin_transfer(2, buffer_object()).unwrap();
        //wrong way round
        assert!(transfer_queue.release(&mut transfer).is_err());
        assert!(graphics.acquire(&mut transfer).is_err());

        graphics.release(&mut transfer).unwrap();
        transfer_queue.acquire(&mut transfer).unwrap();
        assert_eq!(transfer.complete(), Ok(2));

        assert_eq!(graphics.commands().len(), 1);
        assert_eq!(transfer_queue.commands().len(), 1);
        assert!(transfer_queue.use_ownership(&ownership).is_ok());
    }

    #[test]
    fn noop_transfer_records_nothing() {
        let ownership = QueueOwnership::new(1);
        let mut compute = CommandRecorder::new(1);
        let mut transfer = ownership.begin_transfer(1, buffer_object()).unwrap();
        compute.release(&mut transfer).unwrap();
        compute.acquire(&mut transfer).unwrap();
        assert_eq!(transfer.complete(), Ok(1));
        assert!(compute.is_empty());
    }

    #[test]
    fn barriers_from_ownership_commands() {
        let ownership = QueueOwnership::new(0);
        let mut graphics = CommandRecorder::new(0);
        let mut compute = CommandRecorder::new(1);
        graphics.fill_buffer(vk::Buffer::from_raw(9), 0, 64, 0);

        let image = TransferObject::Image {
            image: vk::Image::from_raw(3),
            range: vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
        };
        let mut transfer = ownership.begin_transfer(1, image).unwrap();
        graphics.release(&mut transfer).unwrap();
        compute.acquire(&mut transfer).unwrap();
        transfer.complete().unwrap();

        let barriers = graphics.barriers();
        assert_eq!(barriers.images.len(), 1);
        assert!(barriers.buffers.is_empty());
        assert_eq!(barriers.images[0].src_queue_family_index, 0);
        assert_eq!(barriers.images[0].dst_queue_family_index, 1);
        assert_eq!(compute.barriers().images.len(), 1);
    }

    #[test]
    fn sparse_binds_and_take() {
        let mut recorder = CommandRecorder::new(0);
        recorder.bind_sparse(vk::Buffer::from_raw(1), 0..128);
        recorder.update_buffer(vk::Buffer::from_raw(1), 0, &[1, 2, 3, 4]);
        recorder.bind_sparse(vk::Buffer::from_raw(2), 0..64);
        assert_eq!(recorder.sparse_binds().count(), 2);

        let taken = recorder.take_commands();
        assert_eq!(taken.len(), 3);
        assert!(recorder.is_empty());
    }
}
