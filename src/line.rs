//! CRLF line framing over the raw byte stream.
//!
//! IRC is line-oriented: every protocol message is a `\r\n`-terminated
//! line. [`LineCodec`] turns the TCP byte stream into complete lines
//! (buffering any partial tail, including a terminator split across two
//! reads) and frames outgoing lines with the terminator appended.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Codec framing the connection into `\r\n`-terminated lines.
///
/// No line length limit is enforced here; IRC's traditional 512-byte
/// cap is left to callers that want it.
#[derive(Debug, Default)]
pub struct LineCodec {
    /// Offset the terminator scan resumes from, so repeated decode
    /// calls over a growing buffer stay linear.
    next_index: usize,
}

impl LineCodec {
    /// Create a new codec with an empty receive state.
    pub fn new() -> Self {
        Self::default()
    }
}

fn find_crlf(haystack: &[u8]) -> Option<usize> {
    haystack.windows(2).position(|w| w == b"\r\n")
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        // Back up one byte: a '\r' may sit at the end of the previous scan.
        let start = self.next_index.saturating_sub(1);
        match find_crlf(&buf[start..]) {
            Some(pos) => {
                let line = buf.split_to(start + pos + 2);
                self.next_index = 0;
                let line = &line[..line.len() - 2];
                Ok(Some(String::from_utf8_lossy(line).into_owned()))
            }
            None => {
                self.next_index = buf.len();
                Ok(None)
            }
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = std::io::Error;

    fn encode(&mut self, line: String, buf: &mut BytesMut) -> Result<(), Self::Error> {
        buf.reserve(line.len() + 2);
        buf.put_slice(line.as_bytes());
        if !line.ends_with("\r\n") {
            buf.put_slice(b"\r\n");
        }
        Ok(())
    }
}
