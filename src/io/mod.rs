/// I/O operations for reading image files

/// Reader implementation for raw images
pub mod raw_reader;

pub use raw_reader::{is_raw_image, RawImage};
