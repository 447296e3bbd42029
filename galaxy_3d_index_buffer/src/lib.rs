/*!
# Galaxy 3D Index Buffer

GPU index buffer resource for the Galaxy 3D rendering engine.

This crate provides the platform-agnostic part: the `IndexBuffer` resource,
its staging upload path, and the `GraphicsDevice` trait that backend
implementations (Vulkan, ...) provide.

## Architecture

- **GraphicsDevice**: allocation, mapping, immediate submission and debug naming
- **IndexBuffer**: owns one GPU buffer, created either mappable (dynamic) or
  device-local through staging (static)
- **upload_via_staging**: one-shot transfer into device-local memory
- **Engine**: logging hub used by every component
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod graphics_device;
pub mod index_buffer;

// Main galaxy3d namespace module
pub mod galaxy3d {
    // Error types
    pub use crate::error::{Error, Result};

    // Logging entry point
    pub use crate::engine::Engine;

    // Device trait
    pub use crate::graphics_device::GraphicsDevice;

    // Index buffer resource
    pub use crate::index_buffer::{IndexBuffer, IndexBufferConfig, IndexData, IndexElement, IndexFormat};

    // Logging sub-module (types only, macros live at the crate root)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    // Render sub-module with the device-level types
    pub mod render {
        pub use crate::graphics_device::*;
        pub use crate::index_buffer::upload_via_staging;
    }
}
