/*!
# Galaxy 3D Index Buffer - Vulkan Backend

Vulkan implementation of the `GraphicsDevice` trait used by `IndexBuffer`.

This crate uses the Ash library for Vulkan bindings and gpu-allocator for
memory management. The device is headless: it owns an instance, a logical
device, a graphics queue and (when the GPU has one) a dedicated transfer
queue used for staging uploads.
*/

// Vulkan implementation modules
mod vulkan_config;
mod vulkan_context;
mod vulkan_buffer;
mod vulkan_immediate;
mod vulkan_graphics_device;
#[cfg(feature = "vulkan-validation")]
mod debug;

// Main galaxy3d namespace module
pub mod galaxy3d {
    pub use crate::vulkan_config::{Config, DebugSeverity};
    pub use crate::vulkan_graphics_device::VulkanGraphicsDevice;

    // Validation statistics (only with the `vulkan-validation` feature)
    #[cfg(feature = "vulkan-validation")]
    pub use crate::debug::{get_validation_stats, ValidationStats};
}
