/// Unit tests for MockGraphicsDevice.
///
/// The index buffer tests lean on the mock behaving like a real allocator,
/// so its own contract is pinned down here.

use crate::error::Error;
use crate::graphics_device::mock_graphics_device::*;
use crate::graphics_device::{
    GraphicsDevice, BufferAllocationDesc, BufferUsageFlags, MemoryPropertyFlags, QueueType,
};

fn host_desc(size: u64) -> BufferAllocationDesc<'static> {
    BufferAllocationDesc {
        name: "test_buffer",
        size,
        usage: BufferUsageFlags::INDEX,
        memory_properties: MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT,
    }
}

fn device_local_desc(size: u64) -> BufferAllocationDesc<'static> {
    BufferAllocationDesc {
        name: "test_buffer",
        size,
        usage: BufferUsageFlags::INDEX | BufferUsageFlags::TRANSFER_DST,
        memory_properties: MemoryPropertyFlags::DEVICE_LOCAL,
    }
}

// ============================================================================
// Allocation
// ============================================================================

#[test]
fn test_mock_create_buffer_with_data() {
    let device = MockGraphicsDevice::new();
    let buffer = device.create_buffer(&host_desc(4), Some(&[1, 2, 3, 4])).unwrap();

    assert_eq!(device.buffer_contents(buffer.buffer).unwrap(), vec![1, 2, 3, 4]);
    assert_eq!(device.usage(buffer.buffer), Some(BufferUsageFlags::INDEX));
    assert_eq!(device.live_buffers(), 1);
}

#[test]
fn test_mock_initial_data_requires_host_visible() {
    let device = MockGraphicsDevice::new();
    let result = device.create_buffer(&device_local_desc(4), Some(&[1, 2, 3, 4]));
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

#[test]
fn test_mock_allocation_budget() {
    let device = MockGraphicsDevice::new();
    device.set_failures(MockFailures {
        allocations_before_failure: Some(1),
        ..Default::default()
    });

    assert!(device.create_buffer(&host_desc(16), None).is_ok());
    assert_eq!(device.create_buffer(&host_desc(16), None), Err(Error::AllocationFailed));
}

#[test]
fn test_mock_destroy_buffer() {
    let device = MockGraphicsDevice::new();
    let buffer = device.create_buffer(&host_desc(16), None).unwrap();
    device.destroy_buffer(buffer);
    device.destroy_buffer(buffer);

    assert_eq!(device.live_buffers(), 0);
    assert_eq!(device.stats().buffers_destroyed, 1);
}

// ============================================================================
// Mapping
// ============================================================================

#[test]
fn test_mock_map_host_visible() {
    let device = MockGraphicsDevice::new();
    let buffer = device.create_buffer(&host_desc(8), None).unwrap();

    let ptr = device.map_memory(buffer.allocation).unwrap();
    unsafe { ptr.as_ptr().write(0x7F) };
    assert!(device.is_mapped(buffer.allocation));

    device.unmap_memory(buffer.allocation);
    assert!(!device.is_mapped(buffer.allocation));
    assert_eq!(device.buffer_contents(buffer.buffer).unwrap()[0], 0x7F);
}

#[test]
fn test_mock_map_device_local_fails() {
    let device = MockGraphicsDevice::new();
    let buffer = device.create_buffer(&device_local_desc(8), None).unwrap();
    assert_eq!(device.map_memory(buffer.allocation), Err(Error::MapFailed));
}

#[test]
fn test_mock_flush_range_checked() {
    let device = MockGraphicsDevice::new();
    let buffer = device.create_buffer(&host_desc(8), None).unwrap();

    assert!(device.flush_allocation(buffer.allocation, 0, 8).is_ok());
    assert_eq!(device.flush_allocation(buffer.allocation, 4, 8), Err(Error::FlushFailed));
    assert_eq!(device.stats().last_flush, Some((0, 8)));
}

// ============================================================================
// Immediate submission
// ============================================================================

#[test]
fn test_mock_immediate_copy_runs_on_submit() {
    let device = MockGraphicsDevice::new();
    let src = device.create_buffer(&host_desc(4), Some(&[9, 8, 7, 6])).unwrap();
    let dst = device.create_buffer(&device_local_desc(4), None).unwrap();

    let cmd = device.begin_immediate(QueueType::Copy).unwrap();
    device.cmd_copy_buffer(cmd, src.buffer, dst.buffer, 4).unwrap();
    assert_eq!(device.buffer_contents(dst.buffer).unwrap(), vec![0, 0, 0, 0]);

    device.end_immediate(QueueType::Copy).unwrap();
    assert_eq!(device.buffer_contents(dst.buffer).unwrap(), vec![9, 8, 7, 6]);
    assert_eq!(device.stats().submissions, 1);
    assert_eq!(device.stats().last_submit_queue, Some(QueueType::Copy));
}

#[test]
fn test_mock_end_without_begin_fails() {
    let device = MockGraphicsDevice::new();
    assert!(matches!(device.end_immediate(QueueType::Copy), Err(Error::BackendError(_))));
}

#[test]
fn test_mock_begin_twice_on_same_thread_fails() {
    let device = MockGraphicsDevice::new();
    device.begin_immediate(QueueType::Copy).unwrap();

    assert!(matches!(device.begin_immediate(QueueType::Graphics), Err(Error::BackendError(_))));

    device.end_immediate(QueueType::Copy).unwrap();
    device.begin_immediate(QueueType::Graphics).unwrap();
    device.end_immediate(QueueType::Graphics).unwrap();
}

#[test]
fn test_mock_begin_from_other_thread_waits_for_end() {
    let device = std::sync::Arc::new(MockGraphicsDevice::new());
    device.begin_immediate(QueueType::Copy).unwrap();

    let other = device.clone();
    let waiter = std::thread::spawn(move || {
        other.begin_immediate(QueueType::Copy)?;
        other.end_immediate(QueueType::Copy)
    });

    std::thread::sleep(std::time::Duration::from_millis(50));
    assert!(!waiter.is_finished());

    device.end_immediate(QueueType::Copy).unwrap();
    assert_eq!(waiter.join().unwrap(), Ok(()));
    assert_eq!(device.stats().submissions, 2);
}

#[test]
fn test_mock_submit_failure_releases_context() {
    let device = MockGraphicsDevice::new();
    device.set_failures(MockFailures { submit: true, ..Default::default() });

    device.begin_immediate(QueueType::Copy).unwrap();
    assert!(device.end_immediate(QueueType::Copy).is_err());

    assert!(device.begin_immediate(QueueType::Copy).is_ok());
}

#[test]
fn test_mock_debug_name() {
    let device = MockGraphicsDevice::new();
    let buffer = device.create_buffer(&host_desc(4), None).unwrap();

    device.set_debug_name(buffer.buffer, "mesh_indices").unwrap();
    assert_eq!(device.debug_name(buffer.buffer).as_deref(), Some("mesh_indices"));
}
