use std::{
    io::{ErrorKind, Read, Write},
    time::Duration,
};

use anyhow::Context as _;

use crate::foundation::error::{VolserveError, VolserveResult};

pub const HEADER_LEN: usize = 24;

/// Fixed response header: three little-endian `u64` values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameHeader {
    pub render_micros: u64,
    pub encode_micros: u64,
    pub image_len: u64,
}

impl FrameHeader {
    pub fn new(render: Duration, encode: Duration, image_len: usize) -> Self {
        Self {
            render_micros: micros(render),
            encode_micros: micros(encode),
            image_len: image_len as u64,
        }
    }

    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..8].copy_from_slice(&self.render_micros.to_le_bytes());
        out[8..16].copy_from_slice(&self.encode_micros.to_le_bytes());
        out[16..24].copy_from_slice(&self.image_len.to_le_bytes());
        out
    }

    pub fn from_bytes(b: [u8; HEADER_LEN]) -> Self {
        let word = |i: usize| {
            let mut w = [0u8; 8];
            w.copy_from_slice(&b[i * 8..i * 8 + 8]);
            u64::from_le_bytes(w)
        };
        Self {
            render_micros: word(0),
            encode_micros: word(1),
            image_len: word(2),
        }
    }
}

fn micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

/// Write one framed response (header, then exactly `image.len()` bytes) and flush.
pub fn write_response<W: Write + ?Sized>(
    out: &mut W,
    render: Duration,
    encode: Duration,
    image: &[u8],
) -> VolserveResult<FrameHeader> {
    let header = FrameHeader::new(render, encode, image.len());
    out.write_all(&header.to_bytes())
        .context("write response header")?;
    out.write_all(image).context("write response image")?;
    out.flush().context("flush response")?;
    Ok(header)
}

/// One decoded response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderResponse {
    pub header: FrameHeader,
    pub image: Vec<u8>,
}

/// Read one framed response. `None` when the stream ends cleanly between frames.
pub fn read_response<R: Read + ?Sized>(input: &mut R) -> VolserveResult<Option<RenderResponse>> {
    let mut head = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        match input.read(&mut head[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(VolserveError::truncated(format!(
                    "response header ended after {filled} of {HEADER_LEN} bytes"
                )));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }

    let header = FrameHeader::from_bytes(head);
    let len = usize::try_from(header.image_len)
        .map_err(|_| VolserveError::validation("response image length overflows usize"))?;
    let mut image = vec![0u8; len];
    input.read_exact(&mut image).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            VolserveError::truncated(format!("response image shorter than {len} bytes"))
        } else {
            e.into()
        }
    })?;
    Ok(Some(RenderResponse { header, image }))
}

#[cfg(test)]
#[path = "../../tests/unit/protocol/framing.rs"]
mod tests;
