/// ImmediateQueue - one-shot command recording and blocking submission
///
/// One queue slot exists per queue family. `begin` hands the command buffer
/// to the calling thread until `end`, which submits it and waits on the
/// fence. Other threads calling `begin` meanwhile wait for the slot.
/// Every access to the command pool happens under the slot's mutex.

use ash::vk;
use galaxy_3d_index_buffer::galaxy3d::{Error, Result};
use galaxy_3d_index_buffer::{engine_err, engine_error};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

const SOURCE: &str = "galaxy3d::vulkan";

struct ImmediateContext {
    queue: vk::Queue,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
    /// Thread currently recording
    owner: Option<ThreadId>,
}

pub(crate) struct ImmediateQueue {
    context: Mutex<ImmediateContext>,
    /// Signalled when a recording ends
    released: Condvar,
}

impl ImmediateQueue {
    pub unsafe fn new(device: &ash::Device, queue_family: u32, queue: vk::Queue) -> Result<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let command_pool = device.create_command_pool(&pool_create_info, None)
            .map_err(|e| {
                engine_error!(SOURCE, "Failed to create immediate command pool: {:?}", e);
                Error::InitializationFailed(format!("Failed to create command pool: {:?}", e))
            })?;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let command_buffer = match device.allocate_command_buffers(&alloc_info) {
            Ok(buffers) => buffers[0],
            Err(e) => {
                engine_error!(SOURCE, "Failed to allocate immediate command buffer: {:?}", e);
                device.destroy_command_pool(command_pool, None);
                return Err(Error::InitializationFailed(format!("Failed to allocate command buffer: {:?}", e)));
            }
        };

        let fence = match device.create_fence(&vk::FenceCreateInfo::default(), None) {
            Ok(fence) => fence,
            Err(e) => {
                engine_error!(SOURCE, "Failed to create immediate fence: {:?}", e);
                device.destroy_command_pool(command_pool, None);
                return Err(Error::InitializationFailed(format!("Failed to create fence: {:?}", e)));
            }
        };

        Ok(Self {
            context: Mutex::new(ImmediateContext {
                queue,
                command_pool,
                command_buffer,
                fence,
                owner: None,
            }),
            released: Condvar::new(),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, ImmediateContext>> {
        self.context
            .lock()
            .map_err(|_| engine_err!(SOURCE, "Immediate context lock poisoned"))
    }

    /// Wait for the slot, then reset and open the command buffer for this thread
    pub unsafe fn begin(&self, device: &ash::Device) -> Result<vk::CommandBuffer> {
        let current = thread::current().id();
        let mut context = self.lock()?;
        while let Some(owner) = context.owner {
            if owner == current {
                return Err(engine_err!(SOURCE, "Immediate command buffer is already recording on this thread"));
            }
            context = self.released
                .wait(context)
                .map_err(|_| engine_err!(SOURCE, "Immediate context lock poisoned"))?;
        }

        device.reset_command_buffer(context.command_buffer, vk::CommandBufferResetFlags::empty())
            .map_err(|e| engine_err!(SOURCE, "Failed to reset immediate command buffer: {:?}", e))?;

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        device.begin_command_buffer(context.command_buffer, &begin_info)
            .map_err(|e| engine_err!(SOURCE, "Failed to begin immediate command buffer: {:?}", e))?;

        context.owner = Some(current);
        Ok(context.command_buffer)
    }

    /// Run `record` on the command buffer if `cmd` is the one this thread is recording
    ///
    /// Returns false without calling `record` otherwise.
    pub fn record_if_owner(&self, cmd: vk::CommandBuffer, record: impl FnOnce(vk::CommandBuffer)) -> Result<bool> {
        let context = self.lock()?;
        if context.owner != Some(thread::current().id()) || context.command_buffer != cmd {
            return Ok(false);
        }
        record(context.command_buffer);
        Ok(true)
    }

    /// Close, submit and wait for completion, then release the slot
    pub unsafe fn end(&self, device: &ash::Device) -> Result<()> {
        let mut context = self.lock()?;
        if context.owner != Some(thread::current().id()) {
            return Err(engine_err!(SOURCE, "Immediate command buffer is not recording on this thread"));
        }

        let submitted = Self::submit(device, &context);

        context.owner = None;
        self.released.notify_all();
        submitted
    }

    unsafe fn submit(device: &ash::Device, context: &ImmediateContext) -> Result<()> {
        device.end_command_buffer(context.command_buffer)
            .map_err(|e| engine_err!(SOURCE, "Failed to end immediate command buffer: {:?}", e))?;

        device.reset_fences(&[context.fence])
            .map_err(|e| engine_err!(SOURCE, "Failed to reset immediate fence: {:?}", e))?;

        let command_buffers = [context.command_buffer];
        let submit_info = vk::SubmitInfo::default()
            .command_buffers(&command_buffers);

        device.queue_submit(context.queue, &[submit_info], context.fence)
            .map_err(|e| engine_err!(SOURCE, "Failed to submit immediate commands: {:?}", e))?;

        device.wait_for_fences(&[context.fence], true, u64::MAX)
            .map_err(|e| engine_err!(SOURCE, "Failed to wait for immediate fence: {:?}", e))?;

        Ok(())
    }

    /// Release the pool (and its command buffer) and the fence
    pub unsafe fn destroy(&self, device: &ash::Device) {
        let Ok(mut context) = self.context.lock() else {
            return;
        };
        if context.command_pool != vk::CommandPool::null() {
            device.destroy_command_pool(context.command_pool, None);
            context.command_pool = vk::CommandPool::null();
            context.command_buffer = vk::CommandBuffer::null();
        }
        if context.fence != vk::Fence::null() {
            device.destroy_fence(context.fence, None);
            context.fence = vk::Fence::null();
        }
        context.owner = None;
    }
}
