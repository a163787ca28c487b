//! Frame compression.

pub mod image;

pub use self::image::{GrowableBuffer, ImageEncoder, ImageFormat, MIN_CAPACITY};
