use std::io::BufRead;

use crate::foundation::error::{VolserveError, VolserveResult};

/// Whitespace-delimited tokens from a buffered byte stream.
///
/// Reads no further than the end of the token it returns, so an interactive client can send one
/// command and wait for the reply without the reader blocking on the next line.
pub struct TokenReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: BufRead> TokenReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
        }
    }

    /// Next token, or `None` once the stream is exhausted.
    pub fn next_token(&mut self) -> VolserveResult<Option<String>> {
        match self.next_raw()? {
            None => Ok(None),
            Some(bytes) => std::str::from_utf8(bytes)
                .map(|s| Some(s.to_owned()))
                .map_err(|_| VolserveError::protocol("token is not valid UTF-8")),
        }
    }

    /// Next token as raw bytes, without UTF-8 validation.
    pub fn next_raw(&mut self) -> VolserveResult<Option<&[u8]>> {
        loop {
            let available = self.inner.fill_buf()?;
            if available.is_empty() {
                return Ok(None);
            }
            let skip = available
                .iter()
                .take_while(|b| b.is_ascii_whitespace())
                .count();
            let found = skip < available.len();
            self.inner.consume(skip);
            if found {
                break;
            }
        }

        self.buf.clear();
        loop {
            let available = self.inner.fill_buf()?;
            if available.is_empty() {
                break;
            }
            let n = available
                .iter()
                .take_while(|b| !b.is_ascii_whitespace())
                .count();
            self.buf.extend_from_slice(&available[..n]);
            let ended = n < available.len();
            self.inner.consume(n);
            if ended {
                break;
            }
        }

        Ok(Some(self.buf.as_slice()))
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

#[cfg(test)]
#[path = "../../tests/unit/protocol/token.rs"]
mod tests;
