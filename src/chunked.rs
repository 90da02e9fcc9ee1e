//! Chunked transfer encoding
//!
//! Framing for bodies whose length is unknown at serialization time, and the
//! incremental decoder the response parser drives while body bytes arrive.

use crate::{Error, Result, CRLF};

/// Append one chunk frame to `out`
///
/// Empty input is skipped; a zero-length chunk would terminate the stream.
pub fn encode_chunk(out: &mut Vec<u8>, data: &[u8]) {
    if data.is_empty() {
        return;
    }
    out.extend_from_slice(format!("{:x}{}", data.len(), CRLF).as_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(CRLF.as_bytes());
}

/// Append the terminal zero-length chunk to `out`
pub fn encode_final(out: &mut Vec<u8>) {
    out.extend_from_slice(format!("0{}{}", CRLF, CRLF).as_bytes());
}

/// Frame a complete payload as a single chunk plus terminator
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 16);
    encode_chunk(&mut out, data);
    encode_final(&mut out);
    out
}

/// Incremental chunked decoder
///
/// Feed wire bytes in as they arrive; decoded payload bytes accumulate into
/// the caller's buffer.
pub struct ChunkedDecoder {
    state: DecoderState,
    remaining: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DecoderState {
    ChunkSize,
    ChunkData,
    ChunkEnd,
    Trailer,
    Complete,
}

impl ChunkedDecoder {
    /// Create a new chunked decoder
    pub fn new() -> Self {
        ChunkedDecoder {
            state: DecoderState::ChunkSize,
            remaining: 0,
        }
    }

    /// Decode as much of `input` as possible, appending payload to `out`
    ///
    /// Returns (bytes consumed, stream complete). Unconsumed input must be
    /// offered again with the next call.
    pub fn decode(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(usize, bool)> {
        let mut pos = 0;

        loop {
            match self.state {
                DecoderState::ChunkSize => {
                    let Some(eol) = find_crlf(&input[pos..]) else {
                        break;
                    };
                    let line = String::from_utf8_lossy(&input[pos..pos + eol]);
                    // Chunk extensions after ';' are ignored
                    let size_str = line.split(';').next().unwrap_or("").trim();
                    self.remaining = usize::from_str_radix(size_str, 16)
                        .map_err(|_| Error::InvalidChunkSize(size_str.to_string()))?;
                    pos += eol + 2;

                    self.state = if self.remaining == 0 {
                        DecoderState::Trailer
                    } else {
                        DecoderState::ChunkData
                    };
                }

                DecoderState::ChunkData => {
                    let take = self.remaining.min(input.len() - pos);
                    out.extend_from_slice(&input[pos..pos + take]);
                    pos += take;
                    self.remaining -= take;

                    if self.remaining > 0 {
                        break;
                    }
                    self.state = DecoderState::ChunkEnd;
                }

                DecoderState::ChunkEnd => {
                    if input.len() - pos < 2 {
                        break;
                    }
                    if &input[pos..pos + 2] != b"\r\n" {
                        return Err(Error::Malformed("missing CRLF after chunk".to_string()));
                    }
                    pos += 2;
                    self.state = DecoderState::ChunkSize;
                }

                DecoderState::Trailer => {
                    let Some(eol) = find_crlf(&input[pos..]) else {
                        break;
                    };
                    pos += eol + 2;
                    if eol == 0 {
                        // Empty line ends the trailer section
                        self.state = DecoderState::Complete;
                    }
                    // Non-empty trailer lines are skipped
                }

                DecoderState::Complete => break,
            }
        }

        Ok((pos, self.state == DecoderState::Complete))
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}
