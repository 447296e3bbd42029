/// Graphics device module - GPU services consumed by resources

// Module declarations
pub mod graphics_device;
pub mod buffer;

// Re-export everything from graphics_device.rs
pub use graphics_device::*;

// Re-export from other modules
pub use buffer::*;

// Mock graphics device for tests (no GPU required)
#[cfg(test)]
pub mod mock_graphics_device;

#[cfg(test)]
#[path = "mock_graphics_device_tests.rs"]
mod mock_graphics_device_tests;
