/// GpuContext - Vulkan instance, device, queues and allocator
///
/// Contains everything needed for GPU operations:
/// - Device for Vulkan API calls
/// - Allocator for memory management
/// - Graphics and copy queues for command submission
/// - Debug utils loaders for validation and object naming
///
/// The context is headless: no surface or swapchain is created.

use ash::vk;
use galaxy_3d_index_buffer::galaxy3d::{Error, Result};
use galaxy_3d_index_buffer::{engine_error, engine_info, engine_warn};
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use std::ffi::CStr;
use std::mem::ManuallyDrop;
use std::sync::Mutex;

use crate::vulkan_config::Config;

const SOURCE: &str = "galaxy3d::vulkan";

pub struct GpuContext {
    /// Vulkan logical device
    pub device: ash::Device,

    /// GPU memory allocator
    /// Wrapped in ManuallyDrop to ensure it's dropped BEFORE the device is destroyed
    pub allocator: ManuallyDrop<Mutex<Allocator>>,

    /// Graphics queue and its family index
    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,

    /// Transfer queue (dedicated family if the GPU has one, graphics otherwise)
    pub copy_queue: vk::Queue,
    pub copy_queue_family: u32,

    /// Alignment required for flushes of non-coherent memory
    pub non_coherent_atom_size: u64,

    /// Object naming loader (None when VK_EXT_debug_utils is unavailable)
    pub debug_utils_device: Option<ash::ext::debug_utils::Device>,

    debug_utils_instance: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    instance: ash::Instance,
    _entry: ash::Entry,
}

impl GpuContext {
    /// Create instance, pick a GPU and create the logical device and allocator
    pub fn new(config: &Config) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load()
                .map_err(|e| {
                    engine_error!(SOURCE, "Failed to load Vulkan library: {:?}", e);
                    Error::InitializationFailed(format!("Failed to load Vulkan library: {:?}", e))
                })?;

            let app_name = std::ffi::CString::new(config.app_name.as_str())
                .map_err(|e| Error::InitializationFailed(format!("Invalid application name: {}", e)))?;

            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, 1, 0, 0))
                .engine_name(c"Galaxy3D")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_3);

            // Debug utils is used for object names even without validation
            let available_extensions = entry
                .enumerate_instance_extension_properties(None)
                .map_err(|e| {
                    engine_error!(SOURCE, "Failed to enumerate instance extensions: {:?}", e);
                    Error::InitializationFailed(format!("Failed to enumerate instance extensions: {:?}", e))
                })?;
            let has_debug_utils = available_extensions.iter().any(|ext| {
                ext.extension_name_as_c_str()
                    .map_or(false, |name| name == ash::ext::debug_utils::NAME)
            });

            let mut extension_names = Vec::new();
            if has_debug_utils {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
            }

            let enable_validation = Self::validation_requested(config, has_debug_utils);

            let layer_names: Vec<*const std::os::raw::c_char> = if enable_validation {
                vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
            } else {
                vec![]
            };

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry
                .create_instance(&create_info, None)
                .map_err(|e| {
                    engine_error!(SOURCE, "Failed to create Vulkan instance: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create instance: {:?}", e))
                })?;

            let debug_utils_instance = if has_debug_utils {
                Some(ash::ext::debug_utils::Instance::new(&entry, &instance))
            } else {
                None
            };

            let debug_messenger = match (&debug_utils_instance, enable_validation) {
                (Some(debug_utils), true) => Self::create_messenger(debug_utils, config),
                _ => None,
            };

            // From here on, failures must release the instance
            let device_parts = Self::create_device(&instance);
            let (physical_device, device, graphics_family, copy_family) = match device_parts {
                Ok(parts) => parts,
                Err(e) => {
                    Self::destroy_instance(&instance, &debug_utils_instance, debug_messenger);
                    return Err(e);
                }
            };

            let allocator = match Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            }) {
                Ok(allocator) => allocator,
                Err(e) => {
                    engine_error!(SOURCE, "Failed to create GPU allocator: {:?}", e);
                    device.destroy_device(None);
                    Self::destroy_instance(&instance, &debug_utils_instance, debug_messenger);
                    return Err(Error::InitializationFailed(format!("Failed to create allocator: {:?}", e)));
                }
            };

            let properties = instance.get_physical_device_properties(physical_device);
            engine_info!(
                SOURCE,
                "Using {} (graphics family {}, copy family {})",
                device_name(&properties), graphics_family, copy_family
            );

            let debug_utils_device = debug_utils_instance
                .as_ref()
                .map(|_| ash::ext::debug_utils::Device::new(&instance, &device));

            Ok(Self {
                graphics_queue: device.get_device_queue(graphics_family, 0),
                graphics_queue_family: graphics_family,
                copy_queue: device.get_device_queue(copy_family, 0),
                copy_queue_family: copy_family,
                non_coherent_atom_size: properties.limits.non_coherent_atom_size,
                allocator: ManuallyDrop::new(Mutex::new(allocator)),
                device,
                debug_utils_device,
                debug_utils_instance,
                debug_messenger,
                instance,
                _entry: entry,
            })
        }
    }

    #[cfg(feature = "vulkan-validation")]
    fn validation_requested(config: &Config, has_debug_utils: bool) -> bool {
        if config.enable_validation && !has_debug_utils {
            engine_warn!(SOURCE, "VK_EXT_debug_utils unavailable, validation disabled");
            return false;
        }
        config.enable_validation
    }

    #[cfg(not(feature = "vulkan-validation"))]
    fn validation_requested(config: &Config, _has_debug_utils: bool) -> bool {
        if config.enable_validation {
            engine_warn!(SOURCE, "Validation requested but the `vulkan-validation` feature is disabled");
        }
        false
    }

    #[cfg(feature = "vulkan-validation")]
    unsafe fn create_messenger(
        debug_utils: &ash::ext::debug_utils::Instance,
        config: &Config,
    ) -> Option<vk::DebugUtilsMessengerEXT> {
        crate::debug::init_debug_config(config.debug_severity);

        let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(crate::debug::severity_flags(config.debug_severity))
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
            )
            .pfn_user_callback(Some(crate::debug::vulkan_debug_callback));

        match debug_utils.create_debug_utils_messenger(&debug_info, None) {
            Ok(messenger) => Some(messenger),
            Err(e) => {
                engine_warn!(SOURCE, "Failed to create debug messenger: {:?}", e);
                None
            }
        }
    }

    #[cfg(not(feature = "vulkan-validation"))]
    unsafe fn create_messenger(
        _debug_utils: &ash::ext::debug_utils::Instance,
        _config: &Config,
    ) -> Option<vk::DebugUtilsMessengerEXT> {
        None
    }

    /// Pick the first GPU with a graphics queue and create the logical device
    ///
    /// Returns (physical device, device, graphics family, copy family).
    unsafe fn create_device(
        instance: &ash::Instance,
    ) -> Result<(vk::PhysicalDevice, ash::Device, u32, u32)> {
        let physical_devices = instance
            .enumerate_physical_devices()
            .map_err(|e| {
                engine_error!(SOURCE, "Failed to enumerate physical devices: {:?}", e);
                Error::InitializationFailed(format!("Failed to enumerate physical devices: {:?}", e))
            })?;

        let (physical_device, queue_families) = physical_devices
            .into_iter()
            .map(|pd| (pd, instance.get_physical_device_queue_family_properties(pd)))
            .find(|(_, families)| {
                families.iter().any(|qf| qf.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            })
            .ok_or_else(|| {
                engine_error!(SOURCE, "No Vulkan-capable GPU with a graphics queue found");
                Error::InitializationFailed("No Vulkan-capable GPU found".to_string())
            })?;

        let graphics_family = queue_families
            .iter()
            .position(|qf| qf.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .map(|i| i as u32)
            .ok_or_else(|| Error::InitializationFailed("No graphics queue family found".to_string()))?;

        let copy_family = select_copy_family(&queue_families).unwrap_or(graphics_family);

        let queue_priorities = [1.0];
        let mut queue_create_infos = vec![
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(graphics_family)
                .queue_priorities(&queue_priorities),
        ];
        if copy_family != graphics_family {
            queue_create_infos.push(
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(copy_family)
                    .queue_priorities(&queue_priorities),
            );
        }

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos);

        let device = instance
            .create_device(physical_device, &device_create_info, None)
            .map_err(|e| {
                engine_error!(SOURCE, "Failed to create logical device: {:?}", e);
                Error::InitializationFailed(format!("Failed to create device: {:?}", e))
            })?;

        Ok((physical_device, device, graphics_family, copy_family))
    }

    unsafe fn destroy_instance(
        instance: &ash::Instance,
        debug_utils: &Option<ash::ext::debug_utils::Instance>,
        messenger: Option<vk::DebugUtilsMessengerEXT>,
    ) {
        if let (Some(debug_utils), Some(messenger)) = (debug_utils, messenger) {
            #[cfg(feature = "vulkan-validation")]
            crate::debug::cleanup_debug_config();
            debug_utils.destroy_debug_utils_messenger(messenger, None);
        }
        instance.destroy_instance(None);
    }
}

/// Queue family for transfers: a family with TRANSFER but neither GRAPHICS nor COMPUTE
pub(crate) fn select_copy_family(queue_families: &[vk::QueueFamilyProperties]) -> Option<u32> {
    queue_families
        .iter()
        .position(|qf| {
            qf.queue_count > 0
                && qf.queue_flags.contains(vk::QueueFlags::TRANSFER)
                && !qf.queue_flags.intersects(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
        })
        .map(|i| i as u32)
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                engine_warn!(SOURCE, "device_wait_idle failed during shutdown: {:?}", e);
            }

            // Free VkDeviceMemory pages BEFORE destroying the device
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
            Self::destroy_instance(&self.instance, &self.debug_utils_instance, self.debug_messenger.take());
        }
    }
}

/// Name reported by the driver for a physical device
pub(crate) fn device_name(properties: &vk::PhysicalDeviceProperties) -> String {
    properties
        .device_name_as_c_str()
        .map(CStr::to_string_lossy)
        .map(|name| name.into_owned())
        .unwrap_or_else(|_| "Unknown GPU".to_string())
}
