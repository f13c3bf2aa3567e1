pub mod cgbi;
mod error;
pub mod png;
mod traits;

pub use error::{RepairError, Result};
pub use traits::{ToolInvoker, ToolOutput};

/// Sniffs image dimensions from raw bytes, for reporting only.
pub fn image_dimensions(data: &[u8]) -> Option<(usize, usize)> {
    imagesize::blob_size(data)
        .ok()
        .map(|size| (size.width, size.height))
}
