/// Buffer allocation types shared by every graphics device backend

use bitflags::bitflags;

bitflags! {
    /// How a buffer is going to be used by the GPU
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsageFlags: u32 {
        /// Source of a transfer (staging buffers)
        const TRANSFER_SRC = 1 << 0;
        /// Destination of a transfer (device-local buffers filled via staging)
        const TRANSFER_DST = 1 << 1;
        /// Index source for indexed draws
        const INDEX = 1 << 2;
    }
}

bitflags! {
    /// Memory properties requested for an allocation
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryPropertyFlags: u32 {
        /// Fast GPU memory, typically not CPU-mappable
        const DEVICE_LOCAL = 1 << 0;
        /// CPU can read/write through a mapped pointer
        const HOST_VISIBLE = 1 << 1;
        /// Host writes are visible to the GPU without an explicit flush
        const HOST_COHERENT = 1 << 2;
    }
}

/// Descriptor for a raw buffer allocation
#[derive(Debug, Clone, Copy)]
pub struct BufferAllocationDesc<'a> {
    /// Allocator label (shows up in allocator reports)
    pub name: &'a str,
    /// Size in bytes
    pub size: u64,
    /// Buffer usage
    pub usage: BufferUsageFlags,
    /// Requested memory properties
    pub memory_properties: MemoryPropertyFlags,
}

/// Opaque native buffer handle (e.g. the raw value of a `VkBuffer`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(u64);

impl BufferHandle {
    /// Wrap a raw backend handle value
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw backend handle value
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

slotmap::new_key_type! {
    /// Opaque token for a GPU memory allocation, issued by the backend
    pub struct AllocationHandle;
}

/// A buffer together with the allocation backing it
///
/// Both handles are created and destroyed as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferAllocation {
    pub buffer: BufferHandle,
    pub allocation: AllocationHandle,
}

/// Queue a command is submitted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueType {
    /// General purpose graphics queue
    Graphics,
    /// Transfer queue (falls back to graphics when the GPU has no dedicated one)
    Copy,
}

/// Command buffer recording an immediate submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImmediateCommand(u64);

impl ImmediateCommand {
    /// Wrap a raw backend command buffer handle
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw backend command buffer handle
    pub fn as_raw(self) -> u64 {
        self.0
    }
}
