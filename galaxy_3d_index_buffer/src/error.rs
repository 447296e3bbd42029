//! Error types for the Galaxy3D index buffer
//!
//! This module defines the error types used by the index buffer resource,
//! the staging pipeline and the graphics device backends.

use std::fmt;

/// Result type for Galaxy3D index buffer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Galaxy3D index buffer errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The GPU allocator could not satisfy the request
    /// (out of device memory or invalid usage/property combination)
    AllocationFailed,

    /// Map/unmap called on a buffer created through the staging path
    NotMappable,

    /// Map/unmap called while no allocation is alive
    InvalidState,

    /// The allocator failed to map the allocation into host memory
    MapFailed,

    /// The allocator failed to flush host writes to the device
    FlushFailed,

    /// Invalid argument or resource description (empty data, out of range write, ...)
    InvalidResource(String),

    /// Backend-specific error (Vulkan, DirectX, etc.)
    BackendError(String),

    /// Initialization failed (device, allocator, queues)
    InitializationFailed(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AllocationFailed => write!(f, "GPU memory allocation failed"),
            Error::NotMappable => write!(f, "Buffer is not mappable, it can only be updated via staging"),
            Error::InvalidState => write!(f, "Buffer has no allocation"),
            Error::MapFailed => write!(f, "Failed to map memory"),
            Error::FlushFailed => write!(f, "Failed to flush memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
