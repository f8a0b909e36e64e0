//! Single-frame wire codec.
//!
//! # Wire Layout
//! ```text
//! byte0: bit7 = continuation (0x00 final, 0x80 not final)   bits0-3 = opcode
//! byte1: bit7 = MASK   bits0-6 = len7 (126 → u16 follows, 127 → u64 follows)
//! [mask: 4 bytes, if MASK]
//! payload: len bytes, XORed with mask if MASK
//! ```
//!
//! The byte 0 polarity matches the deployed peers of this proxy and is the
//! inverse of RFC 6455. Fragmented messages are not reassembled: `is_final`
//! is decoded and returned as-is.

use std::fmt;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::ws::WsError;

/// Set in byte 0 when the frame is *not* final.
const CONTINUATION_BIT: u8 = 0x80;
const MASK_BIT: u8 = 0x80;
const OPCODE_BITS: u8 = 0x0F;
const LEN7_BITS: u8 = 0x7F;

const LEN16_CODE: u8 = 126;
const LEN64_CODE: u8 = 127;
const MAX_LEN7: usize = 125;

/// Payload chunk reserved up front while reading; larger payloads grow as
/// bytes actually arrive.
const READ_RESERVE: u64 = 64 * 1024;

/// Frame purpose tag (low 4 bits of byte 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    Text,
    Binary,
    Close,
    Ping,
    Pong,
    /// Any other 4-bit value, carried through untouched.
    Other(u8),
}

impl OpCode {
    pub const TEXT: u8 = 0x00;
    pub const BINARY: u8 = 0x01;
    pub const CLOSE: u8 = 0x08;
    pub const PING: u8 = 0x09;
    pub const PONG: u8 = 0x0A;

    pub fn from_u8(value: u8) -> Self {
        match value & OPCODE_BITS {
            Self::TEXT => OpCode::Text,
            Self::BINARY => OpCode::Binary,
            Self::CLOSE => OpCode::Close,
            Self::PING => OpCode::Ping,
            Self::PONG => OpCode::Pong,
            other => OpCode::Other(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            OpCode::Text => Self::TEXT,
            OpCode::Binary => Self::BINARY,
            OpCode::Close => Self::CLOSE,
            OpCode::Ping => Self::PING,
            OpCode::Pong => Self::PONG,
            OpCode::Other(value) => value & OPCODE_BITS,
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpCode::Text => write!(f, "text"),
            OpCode::Binary => write!(f, "binary"),
            OpCode::Close => write!(f, "close"),
            OpCode::Ping => write!(f, "ping"),
            OpCode::Pong => write!(f, "pong"),
            OpCode::Other(value) => write!(f, "0x{:x}", value),
        }
    }
}

/// One complete WebSocket message unit.
///
/// The payload is always held unmasked; the mask is only applied while
/// encoding. The length on the wire is always `payload.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: OpCode,
    pub is_final: bool,
    pub mask: Option<[u8; 4]>,
    pub payload: Vec<u8>,
}

impl Frame {
    /// A final, unmasked frame.
    pub fn new(opcode: OpCode, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            opcode,
            is_final: true,
            mask: None,
            payload: payload.into(),
        }
    }

    pub fn text(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(OpCode::Text, payload)
    }

    pub fn binary(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(OpCode::Binary, payload)
    }

    pub fn ping(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(OpCode::Ping, payload)
    }

    pub fn close(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(OpCode::Close, payload)
    }

    pub fn with_mask(mut self, mask: [u8; 4]) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn is_masked(&self) -> bool {
        self.mask.is_some()
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Serialize to the wire layout, masking the payload copy if a mask is set.
    pub fn encode(&self) -> BytesMut {
        let len = self.payload.len();
        let mut buf = BytesMut::with_capacity(2 + 8 + 4 + len);

        let fin = if self.is_final { 0x00 } else { CONTINUATION_BIT };
        buf.put_u8(fin | self.opcode.as_u8());

        let mask_flag = if self.mask.is_some() { MASK_BIT } else { 0x00 };
        if len <= MAX_LEN7 {
            buf.put_u8(mask_flag | len as u8);
        } else if len <= u16::MAX as usize {
            buf.put_u8(mask_flag | LEN16_CODE);
            buf.put_u16(len as u16);
        } else {
            buf.put_u8(mask_flag | LEN64_CODE);
            buf.put_u64(len as u64);
        }

        match self.mask {
            Some(mask) => {
                buf.put_slice(&mask);
                let start = buf.len();
                buf.put_slice(&self.payload);
                apply_mask(&mut buf[start..], mask);
            }
            None => buf.put_slice(&self.payload),
        }
        buf
    }

    /// Read exactly one frame. Any failed read fails the whole frame.
    pub async fn decode<R>(reader: &mut R) -> Result<Frame, WsError>
    where
        R: AsyncRead + Unpin,
    {
        let mut head = [0u8; 2];
        reader.read_exact(&mut head).await?;

        let is_final = head[0] & CONTINUATION_BIT == 0;
        let opcode = OpCode::from_u8(head[0]);
        let masked = head[1] & MASK_BIT == MASK_BIT;

        let len = match head[1] & LEN7_BITS {
            LEN16_CODE => u64::from(reader.read_u16().await?),
            LEN64_CODE => {
                let len = reader.read_u64().await?;
                if len >> 63 != 0 {
                    return Err(WsError::MalformedLength(len));
                }
                len
            }
            len7 => u64::from(len7),
        };

        let mask = if masked {
            let mut mask = [0u8; 4];
            reader.read_exact(&mut mask).await?;
            Some(mask)
        } else {
            None
        };

        let mut payload = Vec::with_capacity(len.min(READ_RESERVE) as usize);
        let read = (&mut *reader).take(len).read_to_end(&mut payload).await?;
        if (read as u64) < len {
            return Err(WsError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("frame payload truncated: {} of {} bytes", read, len),
            )));
        }

        if let Some(mask) = mask {
            apply_mask(&mut payload, mask);
        }

        Ok(Frame {
            opcode,
            is_final,
            mask,
            payload,
        })
    }
}

/// XOR `data` with the 4-byte key in place. Applying it twice restores `data`.
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// A fresh random masking key for client frames.
pub fn random_mask() -> [u8; 4] {
    rand::random()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn roundtrip(frame: &Frame) -> Frame {
        let wire = frame.encode();
        let mut reader = &wire[..];
        Frame::decode(&mut reader).await.unwrap()
    }

    #[test]
    fn final_frame_clears_high_bit() {
        let wire = Frame::text("hi").encode();
        assert_eq!(&wire[..], &[0x00, 0x02, b'h', b'i']);

        let mut frame = Frame::binary("x");
        frame.is_final = false;
        assert_eq!(frame.encode()[0], 0x81);
    }

    #[test]
    fn length_codes_follow_magnitude() {
        assert_eq!(Frame::text(vec![0; 125]).encode()[1], 125);

        let wire = Frame::text(vec![0; 126]).encode();
        assert_eq!(wire[1], 126);
        assert_eq!(&wire[2..4], &[0x00, 0x7E]);
        assert_eq!(wire.len(), 4 + 126);

        let wire = Frame::text(vec![0; 65536]).encode();
        assert_eq!(wire[1], 127);
        assert_eq!(&wire[2..10], &65536u64.to_be_bytes());
    }

    #[test]
    fn mask_follows_length_and_payload_is_masked() {
        let mask = [1, 2, 3, 4];
        let frame = Frame::text("abcd").with_mask(mask);
        let wire = frame.encode();
        assert_eq!(wire[1], 0x80 | 4);
        assert_eq!(&wire[2..6], &mask);
        assert_eq!(&wire[6..], &[b'a' ^ 1, b'b' ^ 2, b'c' ^ 3, b'd' ^ 4]);
        // encoding leaves the frame itself untouched
        assert_eq!(frame.payload, b"abcd");
    }

    #[tokio::test]
    async fn roundtrip_across_length_boundaries() {
        for len in [0usize, 1, 125, 126, 65535, 65536] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();

            let plain = Frame::binary(payload.clone());
            let decoded = roundtrip(&plain).await;
            assert_eq!(decoded, plain, "unmasked len {}", len);

            let masked = Frame::text(payload.clone()).with_mask([0xA1, 0x00, 0x7F, 0xFE]);
            let decoded = roundtrip(&masked).await;
            assert_eq!(decoded.opcode, OpCode::Text);
            assert!(decoded.is_final);
            assert_eq!(decoded.mask, Some([0xA1, 0x00, 0x7F, 0xFE]));
            assert_eq!(decoded.payload, payload, "masked len {}", len);
        }
    }

    #[tokio::test]
    async fn non_final_flag_survives_decode() {
        let mut frame = Frame::new(OpCode::Other(0x03), "part");
        frame.is_final = false;
        let decoded = roundtrip(&frame).await;
        assert!(!decoded.is_final);
        assert_eq!(decoded.opcode, OpCode::Other(0x03));
    }

    #[test]
    fn masking_is_involutive() {
        let original: Vec<u8> = (0..=255).collect();
        for mask in [[0, 0, 0, 0], [0xFF, 0x10, 0x01, 0x80], [7, 7, 7, 7]] {
            let mut data = original.clone();
            apply_mask(&mut data, mask);
            apply_mask(&mut data, mask);
            assert_eq!(data, original);
        }
    }

    #[tokio::test]
    async fn truncated_payload_fails_decode() {
        let wire = Frame::text("hello").encode();
        let mut reader = &wire[..wire.len() - 2];
        let err = Frame::decode(&mut reader).await.unwrap_err();
        match err {
            WsError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn truncated_extended_length_fails_decode() {
        let wire = [0x00u8, 126, 0x01];
        let mut reader = &wire[..];
        assert!(matches!(
            Frame::decode(&mut reader).await,
            Err(WsError::Io(_))
        ));
    }

    #[tokio::test]
    async fn top_bit_in_64bit_length_is_malformed() {
        let mut wire = vec![0x01u8, 127];
        wire.extend_from_slice(&(1u64 << 63).to_be_bytes());
        let mut reader = &wire[..];
        assert!(matches!(
            Frame::decode(&mut reader).await,
            Err(WsError::MalformedLength(_))
        ));
    }

    #[test]
    fn opcode_values() {
        assert_eq!(OpCode::from_u8(0x0A), OpCode::Pong);
        assert_eq!(OpCode::Close.as_u8(), 0x08);
        assert_eq!(OpCode::from_u8(0x8F), OpCode::Other(0x0F));
    }
}
