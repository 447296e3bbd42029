/// Index buffer module - the index buffer resource and its upload path

pub mod index_buffer;
pub mod index_format;
pub mod staging;

pub use index_buffer::*;
pub use index_format::*;
pub use staging::upload_via_staging;
