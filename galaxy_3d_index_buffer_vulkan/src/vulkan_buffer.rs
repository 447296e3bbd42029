/// Buffer records - Vulkan side of a BufferAllocation

use galaxy_3d_index_buffer::galaxy3d::render::{BufferUsageFlags, MemoryPropertyFlags};
use ash::vk;
use gpu_allocator::vulkan::Allocation;
use gpu_allocator::MemoryLocation;

use crate::vulkan_context::GpuContext;

/// A live buffer and its memory, owned by the device registry
pub(crate) struct BufferRecord {
    /// Vulkan buffer
    pub buffer: vk::Buffer,
    /// GPU memory allocation
    pub allocation: Option<Allocation>,
    /// Buffer size
    pub size: u64,
    /// Set between map_memory and unmap_memory
    pub mapped: bool,
}

impl BufferRecord {
    pub fn new(buffer: vk::Buffer, allocation: Allocation, size: u64) -> Self {
        Self {
            buffer,
            allocation: Some(allocation),
            size,
            mapped: false,
        }
    }

    /// Free the memory and destroy the buffer
    pub unsafe fn release(mut self, ctx: &GpuContext) {
        if let Some(allocation) = self.allocation.take() {
            // Don't panic if lock fails - we still need to destroy the buffer
            if let Ok(mut allocator) = ctx.allocator.lock() {
                allocator.free(allocation).ok();
            }
        }
        ctx.device.destroy_buffer(self.buffer, None);
    }
}

/// Convert engine buffer usage to Vulkan usage flags
pub(crate) fn usage_to_vk(usage: BufferUsageFlags) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::empty();
    if usage.contains(BufferUsageFlags::TRANSFER_SRC) {
        flags |= vk::BufferUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(BufferUsageFlags::TRANSFER_DST) {
        flags |= vk::BufferUsageFlags::TRANSFER_DST;
    }
    if usage.contains(BufferUsageFlags::INDEX) {
        flags |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    flags
}

/// Pick the gpu-allocator location for requested memory properties
///
/// Anything host-visible goes to CpuToGpu (persistently mapped by the
/// allocator), everything else is GpuOnly.
///
/// gpu-allocator requires HOST_COHERENT for every CpuToGpu memory type, so a
/// request without HOST_COHERENT still gets coherent memory. Persistent
/// buffers therefore never see non-coherent memory on this backend and
/// their flush on unmap changes nothing.
pub(crate) fn memory_location(properties: MemoryPropertyFlags) -> MemoryLocation {
    if properties.contains(MemoryPropertyFlags::HOST_VISIBLE) {
        MemoryLocation::CpuToGpu
    } else {
        MemoryLocation::GpuOnly
    }
}

/// Expand a flush range to `atom` alignment
///
/// `offset` is relative to the VkDeviceMemory. Returns (offset, size).
pub(crate) fn flush_range(offset: u64, size: u64, atom: u64) -> (u64, u64) {
    if atom <= 1 {
        return (offset, size);
    }
    let start = offset / atom * atom;
    let end = (offset + size).div_ceil(atom) * atom;
    (start, end - start)
}

#[cfg(test)]
#[path = "vulkan_buffer_tests.rs"]
mod tests;
