/// Mock GraphicsDevice for unit tests (no GPU required)
///
/// Allocations are backed by host memory, immediate copies are executed when
/// the command buffer is submitted, a second `begin_immediate` from another
/// thread blocks until the first recording ends, and every call is counted so tests can
/// check what the resource layer asked of the device. Failures can be
/// injected per operation.

use std::ptr::NonNull;
use std::sync::{Condvar, Mutex};
use std::thread::{self, ThreadId};
use slotmap::SlotMap;

use crate::error::{Error, Result};
use crate::graphics_device::{
    GraphicsDevice, AllocationHandle, BufferAllocation, BufferAllocationDesc,
    BufferHandle, BufferUsageFlags, ImmediateCommand, MemoryPropertyFlags, QueueType,
};

// ============================================================================
// Mock Allocation
// ============================================================================

#[derive(Debug)]
pub struct MockAllocation {
    pub buffer: BufferHandle,
    pub name: String,
    pub usage: BufferUsageFlags,
    pub memory_properties: MemoryPropertyFlags,
    pub memory: Box<[u8]>,
    pub mapped: bool,
    pub debug_name: Option<String>,
}

// ============================================================================
// Counters and failure injection
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockStats {
    pub buffers_created: u32,
    pub buffers_destroyed: u32,
    pub destroyed_while_mapped: u32,
    pub maps: u32,
    pub unmaps: u32,
    pub flushes: u32,
    pub last_flush: Option<(u64, u64)>,
    pub queue_waits: u32,
    pub copies: u32,
    pub submissions: u32,
    pub last_submit_queue: Option<QueueType>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MockFailures {
    /// Allocations that still succeed before `create_buffer` starts failing
    pub allocations_before_failure: Option<u32>,
    pub map: bool,
    pub flush: bool,
    pub submit: bool,
    pub debug_name: bool,
}

struct MockState {
    allocations: SlotMap<AllocationHandle, MockAllocation>,
    next_buffer: u64,
    /// Queue being recorded and the thread that owns the recording
    recording: Option<(QueueType, ThreadId)>,
    pending_copies: Vec<(BufferHandle, BufferHandle, u64)>,
    stats: MockStats,
    failures: MockFailures,
}

impl MockState {
    fn find(&self, buffer: BufferHandle) -> Option<AllocationHandle> {
        self.allocations
            .iter()
            .find(|(_, allocation)| allocation.buffer == buffer)
            .map(|(handle, _)| handle)
    }
}

// ============================================================================
// Mock GraphicsDevice
// ============================================================================

pub struct MockGraphicsDevice {
    state: Mutex<MockState>,
    /// Signalled when an immediate recording ends
    recording_done: Condvar,
}

impl MockGraphicsDevice {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                allocations: SlotMap::with_key(),
                next_buffer: 0x1000,
                recording: None,
                pending_copies: Vec::new(),
                stats: MockStats::default(),
                failures: MockFailures::default(),
            }),
            recording_done: Condvar::new(),
        }
    }

    pub fn stats(&self) -> MockStats {
        self.state.lock().unwrap().stats
    }

    pub fn set_failures(&self, failures: MockFailures) {
        self.state.lock().unwrap().failures = failures;
    }

    pub fn live_buffers(&self) -> usize {
        self.state.lock().unwrap().allocations.len()
    }

    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        let handle = state.find(buffer)?;
        Some(state.allocations[handle].memory.to_vec())
    }

    pub fn memory_properties(&self, buffer: BufferHandle) -> Option<MemoryPropertyFlags> {
        let state = self.state.lock().unwrap();
        let handle = state.find(buffer)?;
        Some(state.allocations[handle].memory_properties)
    }

    pub fn usage(&self, buffer: BufferHandle) -> Option<BufferUsageFlags> {
        let state = self.state.lock().unwrap();
        let handle = state.find(buffer)?;
        Some(state.allocations[handle].usage)
    }

    pub fn debug_name(&self, buffer: BufferHandle) -> Option<String> {
        let state = self.state.lock().unwrap();
        let handle = state.find(buffer)?;
        state.allocations[handle].debug_name.clone()
    }

    pub fn is_mapped(&self, allocation: AllocationHandle) -> bool {
        self.state
            .lock()
            .unwrap()
            .allocations
            .get(allocation)
            .map_or(false, |a| a.mapped)
    }
}

impl GraphicsDevice for MockGraphicsDevice {
    fn queue_wait_all(&self) -> Result<()> {
        self.state.lock().unwrap().stats.queue_waits += 1;
        Ok(())
    }

    fn create_buffer(
        &self,
        desc: &BufferAllocationDesc,
        initial_data: Option<&[u8]>,
    ) -> Result<BufferAllocation> {
        let mut state = self.state.lock().unwrap();

        if let Some(remaining) = state.failures.allocations_before_failure.as_mut() {
            if *remaining == 0 {
                return Err(Error::AllocationFailed);
            }
            *remaining -= 1;
        }

        if desc.size == 0 {
            return Err(Error::AllocationFailed);
        }

        let mut memory = vec![0u8; desc.size as usize].into_boxed_slice();
        if let Some(data) = initial_data {
            if !desc.memory_properties.contains(MemoryPropertyFlags::HOST_VISIBLE) {
                return Err(Error::InvalidResource("initial data requires host-visible memory".to_string()));
            }
            if data.len() as u64 > desc.size {
                return Err(Error::InvalidResource("initial data larger than buffer".to_string()));
            }
            memory[..data.len()].copy_from_slice(data);
        }

        let buffer = BufferHandle::from_raw(state.next_buffer);
        state.next_buffer += 1;

        let allocation = state.allocations.insert(MockAllocation {
            buffer,
            name: desc.name.to_string(),
            usage: desc.usage,
            memory_properties: desc.memory_properties,
            memory,
            mapped: false,
            debug_name: None,
        });
        state.stats.buffers_created += 1;

        Ok(BufferAllocation { buffer, allocation })
    }

    fn destroy_buffer(&self, buffer: BufferAllocation) {
        let mut state = self.state.lock().unwrap();
        if let Some(allocation) = state.allocations.remove(buffer.allocation) {
            state.stats.buffers_destroyed += 1;
            if allocation.mapped {
                state.stats.destroyed_while_mapped += 1;
            }
        }
    }

    fn map_memory(&self, allocation: AllocationHandle) -> Result<NonNull<u8>> {
        let mut state = self.state.lock().unwrap();
        if state.failures.map {
            return Err(Error::MapFailed);
        }

        let entry = state.allocations.get_mut(allocation).ok_or(Error::MapFailed)?;
        if !entry.memory_properties.contains(MemoryPropertyFlags::HOST_VISIBLE) {
            return Err(Error::MapFailed);
        }
        entry.mapped = true;
        let ptr = NonNull::new(entry.memory.as_mut_ptr()).ok_or(Error::MapFailed)?;
        state.stats.maps += 1;
        Ok(ptr)
    }

    fn unmap_memory(&self, allocation: AllocationHandle) {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.allocations.get_mut(allocation) {
            entry.mapped = false;
            state.stats.unmaps += 1;
        }
    }

    fn flush_allocation(&self, allocation: AllocationHandle, offset: u64, size: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.failures.flush {
            return Err(Error::FlushFailed);
        }

        let len = state.allocations.get(allocation).ok_or(Error::FlushFailed)?.memory.len() as u64;
        if offset + size > len {
            return Err(Error::FlushFailed);
        }
        state.stats.flushes += 1;
        state.stats.last_flush = Some((offset, size));
        Ok(())
    }

    fn begin_immediate(&self, queue: QueueType) -> Result<ImmediateCommand> {
        let current = thread::current().id();
        let mut state = self.state.lock().unwrap();
        while let Some((_, owner)) = state.recording {
            if owner == current {
                return Err(Error::BackendError("immediate command buffer already recording on this thread".to_string()));
            }
            state = self.recording_done.wait(state).unwrap();
        }
        state.recording = Some((queue, current));
        Ok(ImmediateCommand::from_raw(0xC0DE))
    }

    fn cmd_copy_buffer(
        &self,
        _cmd: ImmediateCommand,
        src: BufferHandle,
        dst: BufferHandle,
        size: u64,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !matches!(state.recording, Some((_, owner)) if owner == thread::current().id()) {
            return Err(Error::BackendError("no immediate command buffer recording".to_string()));
        }
        if state.find(src).is_none() || state.find(dst).is_none() {
            return Err(Error::InvalidResource("unknown buffer in copy".to_string()));
        }
        state.pending_copies.push((src, dst, size));
        state.stats.copies += 1;
        Ok(())
    }

    fn end_immediate(&self, queue: QueueType) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.recording != Some((queue, thread::current().id())) {
            return Err(Error::BackendError("immediate command buffer not recording on this queue".to_string()));
        }
        state.recording = None;
        self.recording_done.notify_all();
        let copies = std::mem::take(&mut state.pending_copies);

        if state.failures.submit {
            return Err(Error::BackendError("queue submit failed".to_string()));
        }

        // Execute the recorded copies, as the GPU would before the wait returns
        for (src, dst, size) in copies {
            let (Some(src), Some(dst)) = (state.find(src), state.find(dst)) else {
                return Err(Error::InvalidResource("buffer destroyed before submit".to_string()));
            };
            let bytes = state.allocations[src].memory[..size as usize].to_vec();
            state.allocations[dst].memory[..bytes.len()].copy_from_slice(&bytes);
        }

        state.stats.submissions += 1;
        state.stats.last_submit_queue = Some(queue);
        Ok(())
    }

    fn set_debug_name(&self, buffer: BufferHandle, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.failures.debug_name {
            return Err(Error::BackendError("debug utils not available".to_string()));
        }
        let handle = state
            .find(buffer)
            .ok_or_else(|| Error::InvalidResource("unknown buffer".to_string()))?;
        state.allocations[handle].debug_name = Some(name.to_string());
        Ok(())
    }
}
