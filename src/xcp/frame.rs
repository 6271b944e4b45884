//! Command and response frame codecs
//!
//! Inbound frames are never indexed directly. Every field is read through a bounded
//! accessor on [CommandFrame], which returns [XcpError::CommandSyntax] when the master
//! sent fewer bytes than the command needs.

use crate::{XcpError, XcpResult};

use super::ErrorCode;

/// Packet identifier of a positive response
pub const PID_RES: u8 = 0xFF;
/// Packet identifier of a negative response
pub const PID_ERR: u8 = 0xFE;

/// Largest frame on classic CAN
pub const MAX_FRAME_LEN: usize = 8;

/// A command (CTO) sent by the master
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CommandFrame<'a> {
    bytes: &'a [u8],
}

impl<'a> CommandFrame<'a> {
    /// Wraps a received payload. Returns None for an empty payload, which carries no command
    pub fn new(bytes: &'a [u8]) -> Option<Self> {
        if bytes.is_empty() {
            None
        } else {
            Some(Self { bytes })
        }
    }

    /// Command code (byte 0)
    pub fn opcode(&self) -> u8 {
        self.bytes[0]
    }

    /// Number of bytes the master sent, including the command code
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false, empty frames are rejected by [CommandFrame::new]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Reads a single byte
    pub fn byte(&self, idx: usize) -> XcpResult<u8> {
        self.bytes.get(idx).copied().ok_or(XcpError::CommandSyntax)
    }

    /// Reads a big endian u16 starting at `idx`
    pub fn u16_be(&self, idx: usize) -> XcpResult<u16> {
        let b = self.bytes(idx, 2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Reads a big endian u32 starting at `idx`
    pub fn u32_be(&self, idx: usize) -> XcpResult<u32> {
        let b = self.bytes(idx, 4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Borrows `len` bytes starting at `start`
    pub fn bytes(&self, start: usize, len: usize) -> XcpResult<&'a [u8]> {
        let end = start.checked_add(len).ok_or(XcpError::CommandSyntax)?;
        self.bytes.get(start..end).ok_or(XcpError::CommandSyntax)
    }
}

/// A response frame sent back to the master
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    data: [u8; MAX_FRAME_LEN],
    len: usize,
}

impl ResponseFrame {
    /// Positive response with no payload
    pub fn ok() -> Self {
        Self::positive(&[])
    }

    /// Positive response. Payload beyond 7 bytes is dropped
    pub fn positive(payload: &[u8]) -> Self {
        Self::with_pid(PID_RES, payload)
    }

    /// Negative response carrying `code`
    pub fn negative(code: ErrorCode) -> Self {
        Self::with_pid(PID_ERR, &[code.into()])
    }

    fn with_pid(pid: u8, payload: &[u8]) -> Self {
        let mut data = [0u8; MAX_FRAME_LEN];
        data[0] = pid;
        let n = payload.len().min(MAX_FRAME_LEN - 1);
        data[1..=n].copy_from_slice(&payload[..n]);
        Self { data, len: n + 1 }
    }

    /// Packet identifier, [PID_RES] or [PID_ERR]
    pub fn pid(&self) -> u8 {
        self.data[0]
    }

    /// True for a positive response
    pub fn is_positive(&self) -> bool {
        self.pid() == PID_RES
    }

    /// Error code of a negative response
    pub fn error_code(&self) -> Option<ErrorCode> {
        if self.pid() == PID_ERR {
            Some(ErrorCode::from(self.data[1]))
        } else {
            None
        }
    }

    /// Bytes following the packet identifier
    pub fn payload(&self) -> &[u8] {
        &self.data[1..self.len]
    }

    /// Full frame as it goes onto the bus
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

impl From<&XcpError> for ResponseFrame {
    fn from(e: &XcpError) -> Self {
        Self::negative(e.error_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_is_not_a_command() {
        assert!(CommandFrame::new(&[]).is_none());
    }

    #[test]
    fn bounded_reads() {
        let raw = [0xF6, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00];
        let f = CommandFrame::new(&raw).unwrap();
        assert_eq!(f.opcode(), 0xF6);
        assert_eq!(f.u32_be(4).unwrap(), 0x100);
        assert_eq!(f.u16_be(6).unwrap(), 0x100);
        assert!(matches!(f.u32_be(5), Err(XcpError::CommandSyntax)));
        assert!(matches!(f.byte(8), Err(XcpError::CommandSyntax)));
        assert!(matches!(f.bytes(2, usize::MAX), Err(XcpError::CommandSyntax)));
    }

    #[test]
    fn response_layouts() {
        let r = ResponseFrame::positive(&[0x11, 0x22, 0x33]);
        assert_eq!(r.as_bytes(), &[PID_RES, 0x11, 0x22, 0x33]);
        assert_eq!(r.payload(), &[0x11, 0x22, 0x33]);
        assert!(r.error_code().is_none());

        let r = ResponseFrame::negative(ErrorCode::Sequence);
        assert_eq!(r.as_bytes(), &[PID_ERR, 0x29]);
        assert_eq!(r.error_code(), Some(ErrorCode::Sequence));

        let r = ResponseFrame::positive(&[1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(r.as_bytes().len(), MAX_FRAME_LEN);
        assert_eq!(ResponseFrame::ok().as_bytes(), &[PID_RES]);
    }
}
