//! Frame codecs. Pure bytes-in, bytes/structured-out — no I/O here.
//!
//! Two distinct framings are used by the engine:
//!
//! - [`dap`]: the client-facing `Content-Length`-prefixed text framing DAP
//!   itself specifies.
//! - [`ipc`]: a compact binary framing used only between the adapter and an
//!   external launcher process.

use crate::error::DapperError;

/// Client-facing DAP text framing.
pub mod dap {
    use super::DapperError;

    /// Encodes a JSON payload into a `Content-Length`-framed message.
    #[must_use]
    pub fn encode(payload: &[u8]) -> Vec<u8> {
        let mut out = format!("Content-Length: {}\r\n\r\n", payload.len()).into_bytes();
        out.extend_from_slice(payload);
        out
    }

    /// Incremental decoder for the `Content-Length` framing. Feed it bytes as
    /// they arrive; it yields complete payloads as they become available.
    #[derive(Debug, Default)]
    pub struct Decoder {
        buf: Vec<u8>,
    }

    impl Decoder {
        #[must_use]
        pub fn new() -> Self {
            Self { buf: Vec::new() }
        }

        pub fn feed(&mut self, bytes: &[u8]) {
            self.buf.extend_from_slice(bytes);
        }

        /// Pops one complete message if the buffer holds one, else `None`.
        /// Returns an error on a malformed header block.
        pub fn try_decode(&mut self) -> Result<Option<Vec<u8>>, DapperError> {
            let header_end = match find_header_end(&self.buf) {
                Some(idx) => idx,
                None => return Ok(None),
            };

            let header_text = std::str::from_utf8(&self.buf[..header_end])
                .map_err(|e| DapperError::Framing(format!("non-utf8 header: {e}")))?;

            let content_length = header_text
                .split("\r\n")
                .find_map(|line| line.strip_prefix("Content-Length:").map(str::trim))
                .ok_or_else(|| DapperError::Framing("missing Content-Length header".into()))?
                .parse::<usize>()
                .map_err(|e| DapperError::Framing(format!("invalid Content-Length: {e}")))?;

            let body_start = header_end + 4; // past the blank-line terminator
            let body_end = body_start + content_length;
            if self.buf.len() < body_end {
                return Ok(None);
            }

            let payload = self.buf[body_start..body_end].to_vec();
            self.buf.drain(..body_end);
            Ok(Some(payload))
        }
    }

    fn find_header_end(buf: &[u8]) -> Option<usize> {
        buf.windows(4).position(|w| w == b"\r\n\r\n")
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn encode_decode_roundtrip() {
            let payload = br#"{"seq":1,"type":"request"}"#;
            let framed = encode(payload);

            let mut decoder = Decoder::new();
            decoder.feed(&framed);
            let decoded = decoder.try_decode().unwrap().unwrap();
            assert_eq!(decoded, payload);
        }

        #[test]
        fn decoder_handles_partial_feeds() {
            let payload = b"{}";
            let framed = encode(payload);

            let mut decoder = Decoder::new();
            decoder.feed(&framed[..5]);
            assert!(decoder.try_decode().unwrap().is_none());

            decoder.feed(&framed[5..]);
            assert_eq!(decoder.try_decode().unwrap().unwrap(), payload);
        }

        #[test]
        fn decoder_handles_back_to_back_messages() {
            let mut decoder = Decoder::new();
            decoder.feed(&encode(b"one"));
            decoder.feed(&encode(b"two"));

            assert_eq!(decoder.try_decode().unwrap().unwrap(), b"one");
            assert_eq!(decoder.try_decode().unwrap().unwrap(), b"two");
            assert!(decoder.try_decode().unwrap().is_none());
        }

        #[test]
        fn missing_content_length_is_a_framing_error() {
            let mut decoder = Decoder::new();
            decoder.feed(b"X-Other: 1\r\n\r\n");
            assert!(decoder.try_decode().is_err());
        }
    }
}

/// Binary framing used between the adapter and an external launcher.
pub mod ipc {
    use super::DapperError;

    pub const MAGIC: [u8; 2] = [0x44, 0x50]; // "DP"
    pub const VERSION: u8 = 1;
    const HEADER_LEN: usize = 2 + 1 + 1 + 4;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum MessageKind {
        Event = 1,
        Command = 2,
        Response = 3,
    }

    impl MessageKind {
        fn from_byte(b: u8) -> Result<Self, DapperError> {
            match b {
                1 => Ok(MessageKind::Event),
                2 => Ok(MessageKind::Command),
                3 => Ok(MessageKind::Response),
                other => Err(DapperError::Framing(format!("unknown IPC message kind {other}"))),
            }
        }
    }

    /// Encodes a payload with the `MAGIC|VERSION|KIND|LEN` header.
    #[must_use]
    pub fn encode(kind: MessageKind, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
        out.extend_from_slice(&MAGIC);
        out.push(VERSION);
        out.push(kind as u8);
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[derive(Debug, Default)]
    pub struct Decoder {
        buf: Vec<u8>,
    }

    impl Decoder {
        #[must_use]
        pub fn new() -> Self {
            Self { buf: Vec::new() }
        }

        pub fn feed(&mut self, bytes: &[u8]) {
            self.buf.extend_from_slice(bytes);
        }

        /// Pops one complete `(kind, payload)` frame, else `None`.
        pub fn try_decode(&mut self) -> Result<Option<(MessageKind, Vec<u8>)>, DapperError> {
            if self.buf.len() < HEADER_LEN {
                return Ok(None);
            }

            if self.buf[0..2] != MAGIC {
                return Err(DapperError::Framing("bad IPC magic bytes".into()));
            }
            if self.buf[2] != VERSION {
                return Err(DapperError::Framing(format!("unsupported IPC version {}", self.buf[2])));
            }
            let kind = MessageKind::from_byte(self.buf[3])?;
            let len =
                u32::from_be_bytes([self.buf[4], self.buf[5], self.buf[6], self.buf[7]]) as usize;

            let frame_end = HEADER_LEN + len;
            if self.buf.len() < frame_end {
                return Ok(None);
            }

            let payload = self.buf[HEADER_LEN..frame_end].to_vec();
            self.buf.drain(..frame_end);
            Ok(Some((kind, payload)))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn encode_decode_roundtrip() {
            let payload = b"hello ipc";
            let framed = encode(MessageKind::Command, payload);

            let mut decoder = Decoder::new();
            decoder.feed(&framed);
            let (kind, decoded) = decoder.try_decode().unwrap().unwrap();
            assert_eq!(kind, MessageKind::Command);
            assert_eq!(decoded, payload);
        }

        #[test]
        fn rejects_bad_magic() {
            let mut decoder = Decoder::new();
            decoder.feed(&[0, 0, VERSION, 1, 0, 0, 0, 0]);
            assert!(decoder.try_decode().is_err());
        }

        #[test]
        fn rejects_unknown_version() {
            let mut decoder = Decoder::new();
            decoder.feed(&[MAGIC[0], MAGIC[1], VERSION + 1, 1, 0, 0, 0, 0]);
            assert!(decoder.try_decode().is_err());
        }

        #[test]
        fn handles_partial_frames() {
            let framed = encode(MessageKind::Event, b"partial-test");
            let mut decoder = Decoder::new();
            decoder.feed(&framed[..6]);
            assert!(decoder.try_decode().unwrap().is_none());
            decoder.feed(&framed[6..]);
            assert!(decoder.try_decode().unwrap().is_some());
        }
    }
}
