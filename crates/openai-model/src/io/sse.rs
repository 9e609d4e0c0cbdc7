use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
    InvalidPayload,
}

/// A type for reading server-sent events from a chunk stream.
///
/// Only the `data` field is surfaced; multiple `data` lines of one event
/// are joined with a line feed. Events without data are skipped.
pub struct Sse {
    buf: Vec<u8>,
    chunks: Chunks,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: Vec::new(),
            chunks,
        }
    }

    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            // Drain what is already buffered before waiting for the network.
            while let Some(block) = self.take_block() {
                if let Some(data) = parse_block(&block)? {
                    return Ok(Some(data));
                }
            }

            let Some(bytes) =
                self.chunks.next_chunk().await.map_err(Error::ChunksError)?
            else {
                // An unterminated trailing event is discarded.
                return Ok(None);
            };
            self.buf.extend_from_slice(&bytes);
        }
    }

    /// Removes one complete event block (without its terminator) from the
    /// buffer. Bytes are kept raw until then, so a multi-byte character
    /// split across two chunks is reassembled correctly.
    fn take_block(&mut self) -> Option<Vec<u8>> {
        let (end, terminator_len) = find_event_end(&self.buf)?;
        let block = self.buf[..end].to_vec();
        self.buf.drain(..end + terminator_len);
        Some(block)
    }
}

// event         = *( comment / field ) end-of-line
// field         = 1*name-char [ colon [ space ] *any-char ] end-of-line
// end-of-line   = ( cr lf / cr / lf )
//
// A lone `cr` is not treated as a line break.
fn find_event_end(buf: &[u8]) -> Option<(usize, usize)> {
    let mut idx = 0;
    while idx < buf.len() {
        if buf[idx..].starts_with(b"\n\n") {
            return Some((idx, 2));
        }
        if buf[idx..].starts_with(b"\r\n\r\n") {
            return Some((idx, 4));
        }
        idx += 1;
    }
    None
}

fn parse_block(block: &[u8]) -> Result<Option<String>, Error> {
    let Ok(block) = str::from_utf8(block) else {
        return Err(Error::InvalidPayload);
    };

    let mut data: Option<String> = None;
    for line in block.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => {
                (field, value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };
        if field != "data" {
            trace!("ignored sse field: {field}");
            continue;
        }
        match &mut data {
            Some(data) => {
                data.push('\n');
                data.push_str(value);
            }
            None => data = Some(value.to_owned()),
        }
    }
    Ok(data)
}
