/// VulkanGraphicsDevice - Vulkan implementation of the GraphicsDevice trait
///
/// Buffers live in a slot map keyed by AllocationHandle. Host-visible
/// memory is persistently mapped by gpu-allocator, so map/unmap only track
/// state. Host-visible requests are served from gpu-allocator's CpuToGpu
/// location, which is always HOST_COHERENT, so in practice flushes stop at
/// the coherence check. The non-coherent path stays for allocations that
/// report no HOST_COHERENT bit.
///
/// Each queue has one immediate slot. The thread that calls `begin_immediate`
/// owns it until `end_immediate`; other threads block in `begin_immediate`.

use ash::vk;
use ash::vk::Handle;
use galaxy_3d_index_buffer::galaxy3d::{Error, GraphicsDevice, Result};
use galaxy_3d_index_buffer::galaxy3d::render::{
    AllocationHandle, BufferAllocation, BufferAllocationDesc, BufferHandle,
    ImmediateCommand, MemoryPropertyFlags, QueueType,
};
use galaxy_3d_index_buffer::{engine_err, engine_error, engine_trace, engine_warn};
use gpu_allocator::vulkan::{AllocationCreateDesc, AllocationScheme};
use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use std::ffi::CString;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::vulkan_buffer::{flush_range, memory_location, usage_to_vk, BufferRecord};
use crate::vulkan_config::Config;
use crate::vulkan_context::GpuContext;
use crate::vulkan_immediate::ImmediateQueue;

const SOURCE: &str = "galaxy3d::vulkan";

/// Vulkan graphics device
pub struct VulkanGraphicsDevice {
    /// Live buffers
    buffers: Mutex<SlotMap<AllocationHandle, BufferRecord>>,

    /// Immediate slots (Graphics and Copy share one when the queue families match)
    immediate: FxHashMap<QueueType, Arc<ImmediateQueue>>,

    /// Instance, device, queues and allocator (dropped last)
    ctx: GpuContext,
}

impl VulkanGraphicsDevice {
    /// Create a headless Vulkan device
    pub fn new(config: Config) -> Result<Self> {
        let ctx = GpuContext::new(&config)?;
        let immediate = Self::create_immediate_contexts(&ctx)?;

        Ok(Self {
            buffers: Mutex::new(SlotMap::with_key()),
            immediate,
            ctx,
        })
    }

    fn create_immediate_contexts(ctx: &GpuContext) -> Result<FxHashMap<QueueType, Arc<ImmediateQueue>>> {
        unsafe {
            let graphics = ImmediateQueue::new(&ctx.device, ctx.graphics_queue_family, ctx.graphics_queue)?;

            let copy = if ctx.copy_queue_family == ctx.graphics_queue_family {
                None
            } else {
                match ImmediateQueue::new(&ctx.device, ctx.copy_queue_family, ctx.copy_queue) {
                    Ok(copy) => Some(copy),
                    Err(e) => {
                        graphics.destroy(&ctx.device);
                        return Err(e);
                    }
                }
            };

            let graphics = Arc::new(graphics);
            let copy = match copy {
                Some(copy) => Arc::new(copy),
                None => Arc::clone(&graphics),
            };

            let mut immediate = FxHashMap::default();
            immediate.insert(QueueType::Graphics, graphics);
            immediate.insert(QueueType::Copy, copy);
            Ok(immediate)
        }
    }

    /// Number of buffers currently alive on this device
    pub fn live_buffer_count(&self) -> usize {
        self.buffers.lock().map(|buffers| buffers.len()).unwrap_or(0)
    }

    /// Whether static uploads run on a dedicated transfer queue
    pub fn has_dedicated_copy_queue(&self) -> bool {
        self.ctx.copy_queue_family != self.ctx.graphics_queue_family
    }

    fn lock_buffers(&self) -> Result<MutexGuard<'_, SlotMap<AllocationHandle, BufferRecord>>> {
        self.buffers
            .lock()
            .map_err(|_| engine_err!(SOURCE, "Buffer registry lock poisoned"))
    }

    fn immediate_queue(&self, queue: QueueType) -> Result<&ImmediateQueue> {
        self.immediate
            .get(&queue)
            .map(|slot| slot.as_ref())
            .ok_or_else(|| engine_err!(SOURCE, "No immediate context for {:?} queue", queue))
    }

    fn buffer_size(buffers: &SlotMap<AllocationHandle, BufferRecord>, buffer: BufferHandle) -> Option<u64> {
        buffers
            .values()
            .find(|record| record.buffer.as_raw() == buffer.as_raw())
            .map(|record| record.size)
    }

    /// Allocate and bind memory for a freshly created vk::Buffer
    unsafe fn allocate_record(&self, desc: &BufferAllocationDesc, buffer: vk::Buffer) -> Result<BufferRecord> {
        let requirements = self.ctx.device.get_buffer_memory_requirements(buffer);

        let allocation = {
            let mut allocator = self.ctx.allocator
                .lock()
                .map_err(|_| engine_err!(SOURCE, "Allocator lock poisoned"))?;
            allocator
                .allocate(&AllocationCreateDesc {
                    name: desc.name,
                    requirements,
                    location: memory_location(desc.memory_properties),
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|e| {
                    engine_error!(
                        SOURCE,
                        "Out of GPU memory for '{}' ({:.2} MB): {:?}",
                        desc.name, desc.size as f64 / (1024.0 * 1024.0), e
                    );
                    Error::AllocationFailed
                })?
        };

        if let Err(e) = self.ctx.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) {
            engine_error!(SOURCE, "Failed to bind memory for '{}': {:?}", desc.name, e);
            if let Ok(mut allocator) = self.ctx.allocator.lock() {
                allocator.free(allocation).ok();
            }
            return Err(Error::AllocationFailed);
        }

        Ok(BufferRecord::new(buffer, allocation, desc.size))
    }
}

impl GraphicsDevice for VulkanGraphicsDevice {
    fn queue_wait_all(&self) -> Result<()> {
        unsafe {
            self.ctx.device
                .device_wait_idle()
                .map_err(|e| engine_err!(SOURCE, "device_wait_idle failed: {:?}", e))
        }
    }

    fn create_buffer(&self, desc: &BufferAllocationDesc, initial_data: Option<&[u8]>) -> Result<BufferAllocation> {
        if desc.size == 0 {
            engine_error!(SOURCE, "Cannot create zero-sized buffer '{}'", desc.name);
            return Err(Error::AllocationFailed);
        }
        if let Some(data) = initial_data {
            if data.len() as u64 > desc.size {
                return Err(Error::InvalidResource(format!(
                    "Initial data for '{}' ({} bytes) exceeds buffer size ({} bytes)",
                    desc.name, data.len(), desc.size
                )));
            }
            if !desc.memory_properties.contains(MemoryPropertyFlags::HOST_VISIBLE) {
                return Err(Error::InvalidResource(format!(
                    "Initial data for '{}' requires host-visible memory",
                    desc.name
                )));
            }
        }

        unsafe {
            let queue_families = [self.ctx.graphics_queue_family, self.ctx.copy_queue_family];
            let mut buffer_info = vk::BufferCreateInfo::default()
                .size(desc.size)
                .usage(usage_to_vk(desc.usage));
            buffer_info = if self.has_dedicated_copy_queue() {
                buffer_info
                    .sharing_mode(vk::SharingMode::CONCURRENT)
                    .queue_family_indices(&queue_families)
            } else {
                buffer_info.sharing_mode(vk::SharingMode::EXCLUSIVE)
            };

            let buffer = self.ctx.device
                .create_buffer(&buffer_info, None)
                .map_err(|e| {
                    engine_error!(SOURCE, "Failed to create buffer '{}': {:?}", desc.name, e);
                    Error::AllocationFailed
                })?;

            let mut record = match self.allocate_record(desc, buffer) {
                Ok(record) => record,
                Err(e) => {
                    self.ctx.device.destroy_buffer(buffer, None);
                    return Err(e);
                }
            };

            if let Some(data) = initial_data {
                let mapped = record.allocation
                    .as_mut()
                    .and_then(|allocation| allocation.mapped_slice_mut());
                match mapped {
                    Some(slice) => slice[..data.len()].copy_from_slice(data),
                    None => {
                        engine_error!(SOURCE, "Buffer '{}' is not CPU-accessible", desc.name);
                        record.release(&self.ctx);
                        return Err(Error::MapFailed);
                    }
                }
            }

            let allocation = match self.lock_buffers() {
                Ok(mut buffers) => buffers.insert(record),
                Err(e) => {
                    record.release(&self.ctx);
                    return Err(e);
                }
            };

            engine_trace!(SOURCE, "Created buffer '{}' ({} bytes)", desc.name, desc.size);

            Ok(BufferAllocation {
                buffer: BufferHandle::from_raw(buffer.as_raw()),
                allocation,
            })
        }
    }

    fn destroy_buffer(&self, buffer: BufferAllocation) {
        let record = match self.buffers.lock() {
            Ok(mut buffers) => buffers.remove(buffer.allocation),
            Err(_) => {
                engine_error!(SOURCE, "Buffer registry lock poisoned, leaking buffer");
                return;
            }
        };

        match record {
            Some(record) => {
                if record.mapped {
                    engine_warn!(SOURCE, "Buffer destroyed while still mapped");
                }
                unsafe { record.release(&self.ctx) };
            }
            None => engine_warn!(SOURCE, "destroy_buffer called with an unknown allocation"),
        }
    }

    fn map_memory(&self, allocation: AllocationHandle) -> Result<NonNull<u8>> {
        let mut buffers = self.lock_buffers().map_err(|_| Error::MapFailed)?;
        let record = buffers.get_mut(allocation).ok_or_else(|| {
            engine_error!(SOURCE, "map_memory called with an unknown allocation");
            Error::MapFailed
        })?;

        let ptr = record.allocation
            .as_ref()
            .and_then(|allocation| allocation.mapped_ptr())
            .ok_or_else(|| {
                engine_error!(SOURCE, "Cannot map buffer: memory is not host-visible");
                Error::MapFailed
            })?;

        record.mapped = true;
        Ok(ptr.cast::<u8>())
    }

    fn unmap_memory(&self, allocation: AllocationHandle) {
        if let Ok(mut buffers) = self.buffers.lock() {
            if let Some(record) = buffers.get_mut(allocation) {
                record.mapped = false;
            }
        }
    }

    fn flush_allocation(&self, allocation: AllocationHandle, offset: u64, size: u64) -> Result<()> {
        let buffers = self.lock_buffers().map_err(|_| Error::FlushFailed)?;
        let record = buffers.get(allocation).ok_or_else(|| {
            engine_error!(SOURCE, "flush_allocation called with an unknown allocation");
            Error::FlushFailed
        })?;

        if offset.checked_add(size).map_or(true, |end| end > record.size) {
            engine_error!(
                SOURCE,
                "Flush range {}+{} exceeds buffer size {}",
                offset, size, record.size
            );
            return Err(Error::FlushFailed);
        }

        let memory = record.allocation.as_ref().ok_or(Error::FlushFailed)?;
        // CpuToGpu memory is always coherent, so this is the usual exit
        if memory.memory_properties().contains(vk::MemoryPropertyFlags::HOST_COHERENT) {
            return Ok(());
        }

        unsafe {
            let (start, length) = flush_range(memory.offset() + offset, size, self.ctx.non_coherent_atom_size);
            let range = vk::MappedMemoryRange::default()
                .memory(memory.memory())
                .offset(start)
                .size(length);

            self.ctx.device
                .flush_mapped_memory_ranges(&[range])
                .map_err(|e| {
                    engine_error!(SOURCE, "Failed to flush mapped memory: {:?}", e);
                    Error::FlushFailed
                })
        }
    }

    fn begin_immediate(&self, queue: QueueType) -> Result<ImmediateCommand> {
        let slot = self.immediate_queue(queue)?;
        let cmd = unsafe { slot.begin(&self.ctx.device)? };
        Ok(ImmediateCommand::from_raw(cmd.as_raw()))
    }

    fn cmd_copy_buffer(&self, cmd: ImmediateCommand, src: BufferHandle, dst: BufferHandle, size: u64) -> Result<()> {
        let command_buffer = vk::CommandBuffer::from_raw(cmd.as_raw());

        {
            let buffers = self.lock_buffers()?;
            let src_size = Self::buffer_size(&buffers, src)
                .ok_or_else(|| engine_err!(SOURCE, "cmd_copy_buffer: unknown source buffer"))?;
            let dst_size = Self::buffer_size(&buffers, dst)
                .ok_or_else(|| engine_err!(SOURCE, "cmd_copy_buffer: unknown destination buffer"))?;
            if size > src_size || size > dst_size {
                return Err(engine_err!(
                    SOURCE,
                    "cmd_copy_buffer: {} bytes exceeds source ({}) or destination ({})",
                    size, src_size, dst_size
                ));
            }
        }

        let region = vk::BufferCopy::default()
            .src_offset(0)
            .dst_offset(0)
            .size(size);

        // Recorded under the slot's lock, only by the thread that began it
        for slot in self.immediate.values() {
            let recorded = slot.record_if_owner(command_buffer, |command_buffer| unsafe {
                self.ctx.device.cmd_copy_buffer(
                    command_buffer,
                    vk::Buffer::from_raw(src.as_raw()),
                    vk::Buffer::from_raw(dst.as_raw()),
                    &[region],
                );
            })?;
            if recorded {
                return Ok(());
            }
        }

        Err(engine_err!(SOURCE, "cmd_copy_buffer on a command buffer this thread is not recording"))
    }

    fn end_immediate(&self, queue: QueueType) -> Result<()> {
        let slot = self.immediate_queue(queue)?;
        unsafe { slot.end(&self.ctx.device) }
    }

    fn set_debug_name(&self, buffer: BufferHandle, name: &str) -> Result<()> {
        let Some(debug_utils) = &self.ctx.debug_utils_device else {
            return Ok(());
        };

        let name = CString::new(name)
            .map_err(|e| Error::InvalidResource(format!("Invalid debug name: {}", e)))?;
        let name_info = vk::DebugUtilsObjectNameInfoEXT::default()
            .object_handle(vk::Buffer::from_raw(buffer.as_raw()))
            .object_name(&name);

        unsafe {
            debug_utils
                .set_debug_utils_object_name(&name_info)
                .map_err(|e| Error::BackendError(format!("Failed to set debug name: {:?}", e)))
        }
    }
}

impl Drop for VulkanGraphicsDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.ctx.device.device_wait_idle() {
                engine_warn!(SOURCE, "device_wait_idle failed during shutdown: {:?}", e);
            }

            if let Ok(buffers) = self.buffers.get_mut() {
                if !buffers.is_empty() {
                    engine_warn!(SOURCE, "{} buffer(s) still alive at device shutdown", buffers.len());
                }
                for (_, record) in buffers.drain() {
                    record.release(&self.ctx);
                }
            }

            // Graphics and Copy may share the same slot; destroy() is idempotent
            for slot in self.immediate.values() {
                slot.destroy(&self.ctx.device);
            }
        }
    }
}
