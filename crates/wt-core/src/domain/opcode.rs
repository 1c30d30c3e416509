//! WebSocket opcodes and close codes.
//!
//! The transport (tokio-tungstenite) hands us de-framed messages; this module
//! gives the rest of the workspace a small, transport-independent vocabulary
//! for "what kind of frame was this?".
//!
//! # Wire values (RFC 6455 §5.2)
//!
//! | Opcode       | Value |
//! |--------------|-------|
//! | Continuation | `0x0` |
//! | Text         | `0x1` |
//! | Binary       | `0x2` |
//! | Close        | `0x8` |
//! | Ping         | `0x9` |
//! | Pong         | `0xA` |
//!
//! Every other 4-bit value is reserved.  Reserved values are kept as
//! [`Opcode::Unknown`] instead of being rejected so that the dispatcher can
//! log and skip them without tearing down the connection.

use std::fmt;

/// The type tag of a WebSocket frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// A continuation fragment of a previously started message.
    Continuation,
    /// A UTF-8 text message.
    Text,
    /// An opaque binary message.
    Binary,
    /// A close frame, optionally carrying a [`CloseCode`].
    Close,
    /// A ping control frame.
    Ping,
    /// A pong control frame.
    Pong,
    /// A reserved opcode value the protocol does not define.
    Unknown(u8),
}

impl Opcode {
    /// Returns the 4-bit wire value for this opcode.
    pub fn as_u8(self) -> u8 {
        match self {
            Opcode::Continuation => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
            Opcode::Unknown(value) => value,
        }
    }

    /// Returns `true` for the control opcodes (close, ping, pong).
    pub fn is_control(self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }
}

impl From<u8> for Opcode {
    fn from(value: u8) -> Self {
        match value {
            0x0 => Opcode::Continuation,
            0x1 => Opcode::Text,
            0x2 => Opcode::Binary,
            0x8 => Opcode::Close,
            0x9 => Opcode::Ping,
            0xA => Opcode::Pong,
            other => Opcode::Unknown(other),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::Continuation => f.write_str("continuation"),
            Opcode::Text => f.write_str("text"),
            Opcode::Binary => f.write_str("binary"),
            Opcode::Close => f.write_str("close"),
            Opcode::Ping => f.write_str("ping"),
            Opcode::Pong => f.write_str("pong"),
            Opcode::Unknown(value) => write!(f, "unknown(0x{value:X})"),
        }
    }
}

// ── Close codes ───────────────────────────────────────────────────────────────

/// A WebSocket close status code (RFC 6455 §7.4).
///
/// Only the codes the server itself refers to get named constants; any other
/// `u16` can be wrapped directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(pub u16);

impl CloseCode {
    /// 1000: the purpose of the connection has been fulfilled.
    pub const NORMAL_CLOSURE: CloseCode = CloseCode(1000);
    /// 1001: the endpoint is going away (server shutdown, page navigation).
    pub const GOING_AWAY: CloseCode = CloseCode(1001);
    /// 1002: the peer violated the protocol.
    pub const PROTOCOL_ERROR: CloseCode = CloseCode(1002);
    /// 1007: a text message was not valid UTF-8.
    pub const INVALID_PAYLOAD: CloseCode = CloseCode(1007);
    /// 1009: a message exceeded the negotiated size cap.
    pub const MESSAGE_TOO_BIG: CloseCode = CloseCode(1009);

    /// Returns `true` for [`CloseCode::NORMAL_CLOSURE`].
    pub fn is_normal(self) -> bool {
        self == Self::NORMAL_CLOSURE
    }
}

impl Default for CloseCode {
    fn default() -> Self {
        Self::NORMAL_CLOSURE
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        CloseCode(code)
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.0
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
