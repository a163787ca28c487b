use std::io::{self, Write};

use image::{
    ExtendedColorType, ImageEncoder as _,
    codecs::{jpeg::JpegEncoder, png::PngEncoder},
};

use crate::foundation::error::{VolserveError, VolserveResult};

/// Initial capacity of a [`GrowableBuffer`].
pub const MIN_CAPACITY: usize = 1024;

/// Append-only byte sink that doubles its capacity whenever the next chunk would not fit.
///
/// The allocation survives [`GrowableBuffer::clear`], so a steady stream of similar frames
/// settles on one backing allocation. Capacity is not the content length: read [`len`] or
/// [`as_slice`].
///
/// [`len`]: GrowableBuffer::len
/// [`as_slice`]: GrowableBuffer::as_slice
#[derive(Debug)]
pub struct GrowableBuffer {
    data: Vec<u8>,
    reallocations: u64,
}

impl Default for GrowableBuffer {
    fn default() -> Self {
        Self {
            data: Vec::with_capacity(MIN_CAPACITY),
            reallocations: 0,
        }
    }
}

impl GrowableBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Number of times the backing allocation has grown.
    pub fn reallocations(&self) -> u64 {
        self.reallocations
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn reserve_chunk(&mut self, additional: usize) {
        let needed = self.data.len().saturating_add(additional);
        if needed <= self.data.capacity() {
            return;
        }
        let mut cap = self.data.capacity().max(MIN_CAPACITY);
        while cap < needed {
            cap = cap.saturating_mul(2);
        }
        self.data.reserve_exact(cap - self.data.len());
        self.reallocations += 1;
    }
}

impl Write for GrowableBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.reserve_chunk(buf.len());
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Output codec of the image encoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageFormat {
    /// Lossy; alpha is dropped.
    Jpeg { quality: u8 },
    Png,
}

impl Default for ImageFormat {
    fn default() -> Self {
        ImageFormat::Jpeg { quality: 95 }
    }
}

impl ImageFormat {
    pub fn jpeg(quality: u8) -> VolserveResult<Self> {
        if !(1..=100).contains(&quality) {
            return Err(VolserveError::validation(format!(
                "jpeg quality must be in 1..=100, got {quality}"
            )));
        }
        Ok(ImageFormat::Jpeg { quality })
    }
}

/// RGBA8 frame to compressed image bytes, reusing its buffers across calls.
#[derive(Debug)]
pub struct ImageEncoder {
    format: ImageFormat,
    out: GrowableBuffer,
    rgb: Vec<u8>,
}

impl ImageEncoder {
    pub fn new(format: ImageFormat) -> Self {
        Self {
            format,
            out: GrowableBuffer::new(),
            rgb: Vec::new(),
        }
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Encode `rgba` (`width * height * 4` bytes, top row first). Returns the encoded length.
    ///
    /// The bytes stay valid until the next call; read them with [`ImageEncoder::bytes`].
    pub fn encode(&mut self, rgba: &[u8], width: u32, height: u32) -> VolserveResult<usize> {
        let expected = (width as usize) * (height as usize) * 4;
        if rgba.len() != expected {
            return Err(VolserveError::encode(format!(
                "pixel buffer holds {} bytes, {width}x{height} RGBA needs {expected}",
                rgba.len()
            )));
        }

        self.out.clear();
        match self.format {
            ImageFormat::Jpeg { quality } => {
                self.rgb.clear();
                self.rgb
                    .extend(rgba.chunks_exact(4).flat_map(|px| [px[0], px[1], px[2]]));
                JpegEncoder::new_with_quality(&mut self.out, quality)
                    .write_image(&self.rgb, width, height, ExtendedColorType::Rgb8)
                    .map_err(|e| VolserveError::encode(format!("jpeg: {e}")))?;
            }
            ImageFormat::Png => {
                PngEncoder::new(&mut self.out)
                    .write_image(rgba, width, height, ExtendedColorType::Rgba8)
                    .map_err(|e| VolserveError::encode(format!("png: {e}")))?;
            }
        }
        Ok(self.out.len())
    }

    pub fn bytes(&self) -> &[u8] {
        self.out.as_slice()
    }

    pub fn buffer(&self) -> &GrowableBuffer {
        &self.out
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/image.rs"]
mod tests;
