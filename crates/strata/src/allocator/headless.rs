use ahash::AHashMap;
use ash::vk::{self, Handle};

use super::{Allocation, DedicatedObject, MemoryUsage};
use crate::error::AllocationError;

///Allocation handed out by the [HeadlessAllocator].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessAllocation {
    memory: vk::DeviceMemory,
    offset: u64,
    size: u64,
    private: bool,
}

impl Allocation for HeadlessAllocation {
    fn memory(&self) -> vk::DeviceMemory {
        self.memory
    }
    fn offset(&self) -> u64 {
        self.offset
    }
    fn size(&self) -> u64 {
        self.size
    }
    fn is_private(&self) -> bool {
        self.private
    }
}

struct Block {
    size: u64,
    //bump head for shared blocks
    head: u64,
    live: usize,
    shared: bool,
}

///Software allocator with a fixed memory budget. Private allocations get their own block that is released together
/// with the allocation. Shared allocations are bump allocated from shared blocks. A shared block is kept alive while
/// empty, and only given back to the budget by [trim](HeadlessAllocator::trim).
pub struct HeadlessAllocator {
    budget: u64,
    block_size: u64,
    in_use: u64,
    next_memory: u64,
    blocks: AHashMap<u64, Block>,
}

impl HeadlessAllocator {
    pub const DEFAULT_BLOCK_SIZE: u64 = 64 * 1024 * 1024;

    pub fn new(budget: u64, block_size: u64) -> Self {
        HeadlessAllocator {
            budget,
            block_size: block_size.max(1),
            in_use: 0,
            next_memory: 1,
            blocks: AHashMap::default(),
        }
    }

    ///Bytes of the budget that are currently taken by memory blocks.
    pub fn allocated_bytes(&self) -> u64 {
        self.in_use
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    ///Number of memory blocks (private and shared) that are currently alive.
    pub fn live_blocks(&self) -> usize {
        self.blocks.len()
    }

    ///Number of live allocations that point into `memory`.
    pub fn block_users(&self, memory: vk::DeviceMemory) -> usize {
        self.blocks
            .get(&memory.as_raw())
            .map(|b| b.live)
            .unwrap_or(0)
    }

    ///Releases all shared blocks that have no allocation left.
    pub fn trim(&mut self) -> usize {
        let before = self.blocks.len();
        let mut released = 0;
        self.blocks.retain(|_, block| {
            if block.shared && block.live == 0 {
                released += block.size;
                false
            } else {
                true
            }
        });
        self.in_use -= released;
        before - self.blocks.len()
    }

    fn new_block(&mut self, size: u64, shared: bool) -> Result<u64, AllocationError> {
        let available = self.budget - self.in_use;
        if size > available {
            #[cfg(feature = "logging")]
            log::warn!(
                "Headless allocator exhausted: requested {} bytes, {} available",
                size,
                available
            );
            return Err(AllocationError::Exhausted {
                requested: size,
                available,
            });
        }
        let id = self.next_memory;
        self.next_memory += 1;
        self.in_use += size;
        self.blocks.insert(
            id,
            Block {
                size,
                head: 0,
                live: 0,
                shared,
            },
        );
        Ok(id)
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    let alignment = alignment.max(1);
    value.div_ceil(alignment) * alignment
}

impl super::Allocator for HeadlessAllocator {
    type Allocation = HeadlessAllocation;

    fn allocate(
        &mut self,
        _name: Option<&str>,
        requirements: vk::MemoryRequirements,
        _usage: MemoryUsage,
        _is_linear: bool,
        dedicated: Option<DedicatedObject>,
    ) -> Result<Self::Allocation, AllocationError> {
        if dedicated.is_some() {
            let id = self.new_block(requirements.size, false)?;
            if let Some(block) = self.blocks.get_mut(&id) {
                block.live = 1;
                block.head = requirements.size;
            }
            return Ok(HeadlessAllocation {
                memory: vk::DeviceMemory::from_raw(id),
                offset: 0,
                size: requirements.size,
                private: true,
            });
        }

        //first fit in one of the shared blocks
        let fitting = self.blocks.iter().find_map(|(id, block)| {
            let offset = align_up(block.head, requirements.alignment);
            (block.shared && offset + requirements.size <= block.size).then_some((*id, offset))
        });

        let (id, offset) = match fitting {
            Some(fit) => fit,
            None => (
                self.new_block(self.block_size.max(requirements.size), true)?,
                0,
            ),
        };

        let block = self
            .blocks
            .get_mut(&id)
            .ok_or(AllocationError::Unsupported)?;
        block.head = offset + requirements.size;
        block.live += 1;

        Ok(HeadlessAllocation {
            memory: vk::DeviceMemory::from_raw(id),
            offset,
            size: requirements.size,
            private: false,
        })
    }

    fn free(&mut self, allocation: Self::Allocation) -> Result<(), AllocationError> {
        let id = allocation.memory.as_raw();
        let Some(block) = self.blocks.get_mut(&id) else {
            return Err(AllocationError::Backend(
                format!("memory block {:#x} is not allocated", id).into(),
            ));
        };
        block.live = block.live.saturating_sub(1);
        if block.live == 0 {
            if block.shared {
                //keep the block around, but start handing it out from the start again
                block.head = 0;
            } else {
                let size = block.size;
                self.blocks.remove(&id);
                self.in_use -= size;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::Allocator;

    fn req(size: u64) -> vk::MemoryRequirements {
        vk::MemoryRequirements {
            size,
            alignment: 256,
            memory_type_bits: 1,
        }
    }

    #[test]
    fn private_block_lives_with_allocation() {
        let mut alloc = HeadlessAllocator::new(1024 * 1024, 64 * 1024);
        let a = alloc
            .allocate(
                None,
                req(4096),
                MemoryUsage::GpuOnly,
                true,
                Some(DedicatedObject::Buffer(vk::Buffer::from_raw(7))),
            )
            .unwrap();
        assert!(a.is_private());
        assert_eq!(alloc.live_blocks(), 1);
        assert_eq!(alloc.allocated_bytes(), 4096);

        alloc.free(a).unwrap();
        assert_eq!(alloc.live_blocks(), 0);
        assert_eq!(alloc.allocated_bytes(), 0);
    }

    #[test]
    fn shared_block_outlives_allocations() {
        let mut alloc = HeadlessAllocator::new(1024 * 1024, 64 * 1024);
        let a = alloc
            .allocate(None, req(1000), MemoryUsage::GpuOnly, true, None)
            .unwrap();
        let b = alloc
            .allocate(None, req(1000), MemoryUsage::GpuOnly, true, None)
            .unwrap();
        assert_eq!(a.memory(), b.memory());
        assert_eq!(b.offset(), 1024);
        assert_eq!(alloc.block_users(a.memory()), 2);
        assert_eq!(alloc.live_blocks(), 1);

        let memory = a.memory();
        alloc.free(a).unwrap();
        alloc.free(b).unwrap();
        //block is still there until trimmed
        assert_eq!(alloc.live_blocks(), 1);
        assert_eq!(alloc.block_users(memory), 0);
        assert_eq!(alloc.trim(), 1);
        assert_eq!(alloc.allocated_bytes(), 0);
    }

    #[test]
    fn exhaustion_is_reported() {
        let mut alloc = HeadlessAllocator::new(8 * 1024, 4 * 1024);
        let err = alloc
            .allocate(
                None,
                req(16 * 1024),
                MemoryUsage::GpuOnly,
                true,
                Some(DedicatedObject::Buffer(vk::Buffer::from_raw(1))),
            )
            .unwrap_err();
        assert!(matches!(err, AllocationError::Exhausted { .. }));
    }

    #[test]
    fn double_free_is_an_error() {
        let mut alloc = HeadlessAllocator::new(8 * 1024, 4 * 1024);
        let a = alloc
            .allocate(
                None,
                req(512),
                MemoryUsage::GpuOnly,
                true,
                Some(DedicatedObject::Buffer(vk::Buffer::from_raw(1))),
            )
            .unwrap();
        let copy = a.clone();
        alloc.free(a).unwrap();
        assert!(alloc.free(copy).is_err());
    }
}
