/// IndexBuffer - GPU index buffer resource
///
/// Owns one GPU buffer holding indices for indexed draws, in one of two modes:
///
/// - **Dynamic**: host-visible memory, written by the CPU through `map`/`unmap`.
///   With persistent mapping the pointer survives `unmap` and the written
///   range is flushed instead. HOST_COHERENT is left out of the request, but
///   a backend may still hand out coherent memory (the Vulkan one always does).
/// - **Static**: device-local memory filled once through a staging upload.
///   Not mappable; re-create the buffer to change its contents.

use std::ptr::NonNull;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::graphics_device::{
    GraphicsDevice, BufferAllocation, BufferAllocationDesc, BufferHandle,
    BufferUsageFlags, MemoryPropertyFlags,
};
use crate::index_buffer::{staging, IndexBufferConfig, IndexData, IndexElement, IndexFormat};
use crate::{engine_debug, engine_error, engine_trace, engine_warn};

const SOURCE: &str = "galaxy3d::IndexBuffer";

/// GPU index buffer
///
/// # Example
///
/// ```ignore
/// let mut indices = IndexBuffer::new(device, IndexBufferConfig::default().with_name("quad"));
/// indices.create_from_indices(&[0u16, 1, 2, 2, 3, 0])?;
/// ```
pub struct IndexBuffer {
    device: Arc<dyn GraphicsDevice>,
    config: IndexBufferConfig,
    /// Buffer + allocation, both present or both absent
    buffer: Option<BufferAllocation>,
    size_bytes: u64,
    index_format: IndexFormat,
    index_count: u32,
    mappable: bool,
    /// Persistent mapping mode the current buffer was created with
    persistent_mapping: bool,
    /// View into allocator-owned memory, only while mapped
    mapped: Option<NonNull<u8>>,
}

// The mapped pointer is only dereferenced through `&mut self`.
unsafe impl Send for IndexBuffer {}

impl IndexBuffer {
    /// Create an empty index buffer bound to `device`
    ///
    /// No GPU memory is allocated until `create` is called.
    pub fn new(device: Arc<dyn GraphicsDevice>, config: IndexBufferConfig) -> Self {
        let index_format = config.index_format;
        let persistent_mapping = config.persistent_mapping;
        Self {
            device,
            config,
            buffer: None,
            size_bytes: 0,
            index_format,
            index_count: 0,
            mappable: true,
            persistent_mapping,
            mapped: None,
        }
    }

    /// Create (or re-create) the GPU buffer
    ///
    /// Any previously held buffer is destroyed first, so a failed
    /// re-creation leaves the resource empty rather than reverted.
    ///
    /// # Arguments
    ///
    /// * `size_bytes` - Buffer size, must be > 0
    /// * `data` - `Dynamic` for a mappable buffer, `Static(bytes)` for a
    ///   device-local buffer uploaded via staging (`bytes.len() == size_bytes`)
    pub fn create(&mut self, size_bytes: u64, data: IndexData<'_>) -> Result<()> {
        self.destroy();

        self.mappable = matches!(data, IndexData::Dynamic);
        self.persistent_mapping = self.config.persistent_mapping;

        let index_count = self.validate(size_bytes, data)?;

        let buffer = match data {
            IndexData::Dynamic => {
                // Persistent mappings drop the coherence requirement and flush
                // on unmap. The backend may still pick coherent memory.
                let mut memory_properties = MemoryPropertyFlags::HOST_VISIBLE;
                if !self.persistent_mapping {
                    memory_properties |= MemoryPropertyFlags::HOST_COHERENT;
                }

                self.device
                    .create_buffer(
                        &BufferAllocationDesc {
                            name: &self.config.name,
                            size: size_bytes,
                            usage: BufferUsageFlags::INDEX,
                            memory_properties,
                        },
                        None,
                    )
                    .map_err(|e| {
                        engine_error!(SOURCE, "Failed to allocate '{}' ({} bytes): {}", self.config.name, size_bytes, e);
                        e
                    })?
            }
            IndexData::Static(bytes) => {
                staging::upload_via_staging(self.device.as_ref(), bytes, BufferUsageFlags::INDEX, &self.config.name)?
            }
        };

        if let Err(e) = self.device.set_debug_name(buffer.buffer, &self.config.name) {
            engine_warn!(SOURCE, "Failed to set debug name '{}': {}", self.config.name, e);
        }

        self.buffer = Some(buffer);
        self.size_bytes = size_bytes;
        self.index_count = index_count;

        engine_debug!(
            SOURCE,
            "Created '{}': {} indices ({:?}), {} bytes, {}",
            self.config.name,
            index_count,
            self.index_format,
            size_bytes,
            if self.mappable { "dynamic" } else { "static" }
        );

        Ok(())
    }

    /// Create a static buffer from typed indices
    ///
    /// The index format follows `T` (`u16` or `u32`).
    pub fn create_from_indices<T: IndexElement>(&mut self, indices: &[T]) -> Result<()> {
        self.index_format = T::FORMAT;
        let bytes: &[u8] = bytemuck::cast_slice(indices);
        self.create(bytes.len() as u64, IndexData::Static(bytes))
    }

    /// Create a mappable buffer with room for `index_count` indices of type `T`
    pub fn create_dynamic<T: IndexElement>(&mut self, index_count: u32) -> Result<()> {
        self.index_format = T::FORMAT;
        self.create(u64::from(index_count) * T::FORMAT.stride(), IndexData::Dynamic)
    }

    /// Free the GPU buffer
    ///
    /// Waits for all device queues first: the buffer may still be read by an
    /// in-flight draw. Unmaps before freeing. Safe to call on an empty
    /// resource and any number of times.
    pub fn destroy(&mut self) {
        let Some(buffer) = self.buffer.take() else {
            self.mapped = None;
            return;
        };

        if let Err(e) = self.device.queue_wait_all() {
            engine_warn!(SOURCE, "Queue wait failed before destroying '{}': {}", self.config.name, e);
        }

        if self.mapped.take().is_some() {
            self.device.unmap_memory(buffer.allocation);
        }

        self.device.destroy_buffer(buffer);
        self.size_bytes = 0;
        self.index_count = 0;

        engine_trace!(SOURCE, "Destroyed '{}'", self.config.name);
    }

    /// Map the buffer and return a pointer to its `size_bytes()` bytes
    ///
    /// Calling `map` again while mapped returns the same pointer without
    /// mapping twice.
    ///
    /// # Errors
    ///
    /// - `Error::NotMappable` if the buffer was created from static data
    /// - `Error::InvalidState` if no buffer exists
    /// - `Error::MapFailed` if the allocator could not map the memory
    pub fn map(&mut self) -> Result<NonNull<u8>> {
        let buffer = self.live_mappable_buffer()?;

        if let Some(ptr) = self.mapped {
            return Ok(ptr);
        }

        let ptr = self.device.map_memory(buffer.allocation).map_err(|e| {
            engine_error!(SOURCE, "Failed to map '{}': {}", self.config.name, e);
            Error::MapFailed
        })?;

        self.mapped = Some(ptr);
        engine_trace!(SOURCE, "Mapped '{}' ({} bytes)", self.config.name, self.size_bytes);
        Ok(ptr)
    }

    /// End a write session
    ///
    /// With persistent mapping the whole buffer is flushed and the pointer
    /// stays valid for the next write. Otherwise the buffer is unmapped.
    ///
    /// # Errors
    ///
    /// - `Error::NotMappable` if the buffer was created from static data
    /// - `Error::InvalidState` if no buffer exists
    /// - `Error::FlushFailed` if the flush failed (persistent mapping only)
    pub fn unmap(&mut self) -> Result<()> {
        let buffer = self.live_mappable_buffer()?;

        if self.persistent_mapping {
            self.device
                .flush_allocation(buffer.allocation, 0, self.size_bytes)
                .map_err(|e| {
                    engine_error!(SOURCE, "Failed to flush '{}': {}", self.config.name, e);
                    Error::FlushFailed
                })?;
        } else if self.mapped.take().is_some() {
            self.device.unmap_memory(buffer.allocation);
        }

        Ok(())
    }

    /// Copy `data` into the buffer at byte `offset`
    ///
    /// Maps the buffer for the write and unmaps it again, unless the caller
    /// already holds a mapping, which is left open.
    pub fn update(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.live_mappable_buffer()?;

        let in_bounds = offset
            .checked_add(data.len() as u64)
            .is_some_and(|end| end <= self.size_bytes);
        if !in_bounds {
            engine_error!(
                SOURCE,
                "Write of {} bytes at offset {} exceeds '{}' ({} bytes)",
                data.len(),
                offset,
                self.config.name,
                self.size_bytes
            );
            return Err(Error::InvalidResource(format!(
                "write of {} bytes at offset {} exceeds buffer size {}",
                data.len(),
                offset,
                self.size_bytes
            )));
        }

        // A mapping opened by the caller stays open
        let was_mapped = self.mapped.is_some();
        let ptr = self.map()?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.as_ptr().add(offset as usize), data.len());
        }
        if was_mapped {
            return Ok(());
        }
        self.unmap()
    }

    /// Write typed indices starting at index `first_index`
    pub fn update_indices<T: IndexElement>(&mut self, first_index: u32, indices: &[T]) -> Result<()> {
        if T::FORMAT != self.index_format {
            engine_error!(
                SOURCE,
                "'{}' holds {:?} indices, got {:?}",
                self.config.name,
                self.index_format,
                T::FORMAT
            );
            return Err(Error::InvalidResource(format!(
                "index format mismatch: buffer is {:?}, data is {:?}",
                self.index_format,
                T::FORMAT
            )));
        }

        let offset = u64::from(first_index) * self.index_format.stride();
        self.update(offset, bytemuck::cast_slice(indices))
    }

    /// Active mapping as a byte slice, `None` when not mapped
    pub fn mapped_slice_mut(&mut self) -> Option<&mut [u8]> {
        let ptr = self.mapped?;
        Some(unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), self.size_bytes as usize) })
    }

    /// Switch persistent mapping for the next `create`
    pub fn set_persistent_mapping(&mut self, persistent_mapping: bool) {
        if self.buffer.is_some() && persistent_mapping != self.persistent_mapping {
            engine_warn!(
                SOURCE,
                "Persistent mapping change on '{}' applies on the next create",
                self.config.name
            );
        }
        self.config.persistent_mapping = persistent_mapping;
    }

    /// Rename the buffer (applied to the GPU object on the next `create`)
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.config.name = name.into();
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn is_valid(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn is_mappable(&self) -> bool {
        self.mappable
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped.is_some()
    }

    pub fn uses_persistent_mapping(&self) -> bool {
        self.persistent_mapping
    }

    pub fn buffer_handle(&self) -> Option<BufferHandle> {
        self.buffer.map(|b| b.buffer)
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn index_format(&self) -> IndexFormat {
        self.index_format
    }

    pub fn stride(&self) -> u64 {
        self.index_format.stride()
    }

    pub fn is_16bit(&self) -> bool {
        self.index_format == IndexFormat::U16
    }

    pub fn is_32bit(&self) -> bool {
        self.index_format == IndexFormat::U32
    }

    /// Check `create` arguments, returning the index count
    fn validate(&self, size_bytes: u64, data: IndexData<'_>) -> Result<u32> {
        let problem = match data {
            _ if size_bytes == 0 => Some("size must be greater than zero".to_string()),
            IndexData::Static(bytes) if bytes.is_empty() => Some("static index data is empty".to_string()),
            IndexData::Static(bytes) if bytes.len() as u64 != size_bytes => Some(format!(
                "static index data is {} bytes, expected {}",
                bytes.len(),
                size_bytes
            )),
            _ => None,
        };
        if let Some(problem) = problem {
            engine_error!(SOURCE, "Cannot create '{}': {}", self.config.name, problem);
            return Err(Error::InvalidResource(problem));
        }

        u32::try_from(size_bytes / self.index_format.stride()).map_err(|_| {
            engine_error!(SOURCE, "Cannot create '{}': {} bytes is too many indices", self.config.name, size_bytes);
            Error::InvalidResource(format!("{} bytes exceeds the index count limit", size_bytes))
        })
    }

    /// Buffer to map/unmap, or the error explaining why there is none
    fn live_mappable_buffer(&self) -> Result<BufferAllocation> {
        if !self.mappable {
            engine_error!(SOURCE, "'{}' is not mappable, it can only be updated via staging", self.config.name);
            return Err(Error::NotMappable);
        }

        self.buffer.ok_or_else(|| {
            engine_error!(SOURCE, "'{}' has no allocation", self.config.name);
            Error::InvalidState
        })
    }
}

impl Drop for IndexBuffer {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
#[path = "index_buffer_tests.rs"]
mod tests;
