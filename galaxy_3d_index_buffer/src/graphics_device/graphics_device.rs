/// GraphicsDevice trait - the GPU services an index buffer depends on

use std::ptr::NonNull;

use crate::error::Result;
use crate::graphics_device::{
    AllocationHandle, BufferAllocation, BufferAllocationDesc, BufferHandle,
    ImmediateCommand, QueueType,
};

/// Graphics device trait
///
/// Groups the collaborators of a GPU resource: queue synchronization, the
/// buffer allocation utility, immediate command submission and debug naming.
/// Implemented by backend-specific devices (e.g., VulkanGraphicsDevice).
///
/// Implementations are shared between resources through `Arc<dyn GraphicsDevice>`.
pub trait GraphicsDevice: Send + Sync {
    /// Block until every queue of the device is idle
    fn queue_wait_all(&self) -> Result<()>;

    /// Create a buffer and the allocation backing it
    ///
    /// # Arguments
    ///
    /// * `desc` - Size, usage and memory properties
    /// * `initial_data` - Bytes copied into the buffer (requires host-visible memory)
    ///
    /// # Errors
    ///
    /// `Error::AllocationFailed` when the allocator cannot satisfy the request.
    fn create_buffer(
        &self,
        desc: &BufferAllocationDesc,
        initial_data: Option<&[u8]>,
    ) -> Result<BufferAllocation>;

    /// Destroy a buffer and free its allocation
    fn destroy_buffer(&self, buffer: BufferAllocation);

    /// Map an allocation into host memory
    ///
    /// # Errors
    ///
    /// `Error::MapFailed` when the memory is not host-visible or mapping fails.
    fn map_memory(&self, allocation: AllocationHandle) -> Result<NonNull<u8>>;

    /// Unmap an allocation previously mapped with `map_memory`
    fn unmap_memory(&self, allocation: AllocationHandle);

    /// Make host writes in `[offset, offset + size)` visible to the device
    ///
    /// # Errors
    ///
    /// `Error::FlushFailed` when the flush call fails.
    fn flush_allocation(&self, allocation: AllocationHandle, offset: u64, size: u64) -> Result<()>;

    /// Start recording an immediate command buffer on `queue`
    ///
    /// The device has one immediate context per queue, owned by the calling
    /// thread until `end_immediate`. A call from another thread blocks until
    /// the context is free; a second call from the owning thread fails with
    /// `Error::BackendError`.
    fn begin_immediate(&self, queue: QueueType) -> Result<ImmediateCommand>;

    /// Record a copy of `size` bytes from the start of `src` to the start of `dst`
    ///
    /// Must be called from the thread that began the recording.
    fn cmd_copy_buffer(
        &self,
        cmd: ImmediateCommand,
        src: BufferHandle,
        dst: BufferHandle,
        size: u64,
    ) -> Result<()>;

    /// Submit the immediate command buffer of `queue` and block until it completes
    ///
    /// Releases the context even when submission fails.
    fn end_immediate(&self, queue: QueueType) -> Result<()>;

    /// Attach a debug name to a buffer (visible in capture tools)
    fn set_debug_name(&self, buffer: BufferHandle, name: &str) -> Result<()>;
}
