/// Vulkan device configuration

/// Which validation messages are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugSeverity {
    /// Only errors
    ErrorsOnly,
    /// Errors and warnings
    ErrorsAndWarnings,
    /// Everything, including info and verbose messages
    All,
}

/// Configuration for VulkanGraphicsDevice
#[derive(Debug, Clone)]
pub struct Config {
    /// Application name reported to the driver
    pub app_name: String,
    /// Enable VK_LAYER_KHRONOS_validation (needs the `vulkan-validation` feature)
    pub enable_validation: bool,
    /// Validation messages forwarded to the engine logger
    pub debug_severity: DebugSeverity,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "Galaxy3D Application".to_string(),
            enable_validation: cfg!(all(debug_assertions, feature = "vulkan-validation")),
            debug_severity: DebugSeverity::ErrorsAndWarnings,
        }
    }
}
