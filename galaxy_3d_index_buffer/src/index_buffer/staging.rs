/// Staging transfer pipeline
///
/// Uploads CPU data into device-local memory: the bytes go into a temporary
/// host-visible buffer, a GPU copy moves them into the destination, and the
/// temporary buffer is freed once the copy has completed.

use crate::error::{Error, Result};
use crate::graphics_device::{
    GraphicsDevice, BufferAllocation, BufferAllocationDesc, BufferHandle,
    BufferUsageFlags, MemoryPropertyFlags, QueueType,
};
use crate::{engine_error, engine_trace};

const SOURCE: &str = "galaxy3d::staging";

/// Create a device-local buffer initialized with `data`
///
/// # Arguments
///
/// * `device` - Device used for allocation and the copy submission
/// * `data` - Bytes to upload (the buffer is exactly this size)
/// * `usage` - Usage of the destination buffer (TRANSFER_DST is added)
/// * `name` - Allocator label for the destination buffer
///
/// Blocks until the GPU copy has completed. Nothing is leaked on failure:
/// every buffer created here is destroyed before the error is returned.
pub fn upload_via_staging(
    device: &dyn GraphicsDevice,
    data: &[u8],
    usage: BufferUsageFlags,
    name: &str,
) -> Result<BufferAllocation> {
    if data.is_empty() {
        engine_error!(SOURCE, "Cannot upload '{}': no data", name);
        return Err(Error::InvalidResource("staging upload with empty data".to_string()));
    }
    let size = data.len() as u64;

    let staging = device
        .create_buffer(
            &BufferAllocationDesc {
                name: "staging_buffer",
                size,
                usage: BufferUsageFlags::TRANSFER_SRC,
                memory_properties: MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT,
            },
            Some(data),
        )
        .map_err(|e| {
            engine_error!(SOURCE, "Failed to create staging buffer for '{}' ({} bytes): {}", name, size, e);
            e
        })?;

    let destination = match device.create_buffer(
        &BufferAllocationDesc {
            name,
            size,
            usage: usage | BufferUsageFlags::TRANSFER_DST,
            memory_properties: MemoryPropertyFlags::DEVICE_LOCAL,
        },
        None,
    ) {
        Ok(destination) => destination,
        Err(e) => {
            engine_error!(SOURCE, "Failed to create device-local buffer '{}' ({} bytes): {}", name, size, e);
            device.destroy_buffer(staging);
            return Err(e);
        }
    };

    if let Err(e) = copy_buffer_immediate(device, staging.buffer, destination.buffer, size) {
        engine_error!(SOURCE, "Staging copy into '{}' failed: {}", name, e);
        device.destroy_buffer(staging);
        device.destroy_buffer(destination);
        return Err(e);
    }

    device.destroy_buffer(staging);
    engine_trace!(SOURCE, "Uploaded {} bytes into '{}'", size, name);

    Ok(destination)
}

/// Record a full-size copy on the copy queue, submit it and wait
///
/// The submission is always ended once begun so the device's immediate
/// context is left idle even when recording fails.
fn copy_buffer_immediate(
    device: &dyn GraphicsDevice,
    src: BufferHandle,
    dst: BufferHandle,
    size: u64,
) -> Result<()> {
    let cmd = device.begin_immediate(QueueType::Copy)?;
    let recorded = device.cmd_copy_buffer(cmd, src, dst, size);
    let submitted = device.end_immediate(QueueType::Copy);
    recorded.and(submitted)
}

#[cfg(test)]
#[path = "staging_tests.rs"]
mod tests;
