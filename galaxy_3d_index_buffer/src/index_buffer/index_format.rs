/// Index formats, creation data and index buffer configuration

/// Index element type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    /// 16-bit unsigned indices
    U16,
    /// 32-bit unsigned indices
    U32,
}

impl IndexFormat {
    /// Size of one index in bytes
    pub fn stride(self) -> u64 {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

/// Integer types that can be stored in an index buffer
pub trait IndexElement: bytemuck::Pod {
    const FORMAT: IndexFormat;
}

impl IndexElement for u16 {
    const FORMAT: IndexFormat = IndexFormat::U16;
}

impl IndexElement for u32 {
    const FORMAT: IndexFormat = IndexFormat::U32;
}

/// How an index buffer receives its contents
///
/// The two variants map to two different memory strategies:
/// `Dynamic` allocates host-visible memory the CPU writes through a mapping,
/// `Static` uploads the bytes once into device-local memory via staging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexData<'a> {
    /// Mappable buffer, contents written later through `map`
    Dynamic,
    /// Immutable buffer initialized from these bytes
    Static(&'a [u8]),
}

/// Index buffer configuration
///
/// Set before `create`; changes take effect on the next creation.
#[derive(Debug, Clone)]
pub struct IndexBufferConfig {
    /// Debug name attached to the GPU buffer
    pub name: String,
    /// Keep the mapping alive across unmap and flush instead.
    /// Drops HOST_COHERENT from the memory request.
    pub persistent_mapping: bool,
    /// Format used when the buffer is created from raw bytes
    pub index_format: IndexFormat,
}

impl Default for IndexBufferConfig {
    fn default() -> Self {
        Self {
            name: "index_buffer".to_string(),
            persistent_mapping: false,
            index_format: IndexFormat::U32,
        }
    }
}

impl IndexBufferConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_persistent_mapping(mut self, persistent_mapping: bool) -> Self {
        self.persistent_mapping = persistent_mapping;
        self
    }

    pub fn with_index_format(mut self, index_format: IndexFormat) -> Self {
        self.index_format = index_format;
        self
    }
}
