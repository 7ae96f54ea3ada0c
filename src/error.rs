//! Crate-wide error kinds. Each is local to a single connection; the
//! propagation policy documented on every variant follows `valence_network`'s
//! use of `thiserror` for named leaf errors surfaced through `anyhow::Result`
//! at call sites (`valence_network::connect` uses `anyhow::bail!`/`ensure!`
//! around a mix of named and ad hoc errors the same way).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Malformed length or insufficient bytes while decoding a frame.
    /// Logged and skipped; the connection is not closed.
    #[error("framing error: {0}")]
    Framing(String),

    /// An opcode not present in the command table. Logged and skipped.
    #[error("unknown command opcode 0x{opcode:02x}")]
    UnknownCommand { opcode: u8 },

    /// The socket was closed or reset mid-write. Closes the connection.
    #[error("write error: {0}")]
    Write(#[from] std::io::Error),

    /// A frame's payload would push the total length past 4095 bytes.
    /// Dropped at runtime rather than sent.
    #[error("payload of {len} bytes exceeds the maximum encodable frame")]
    OverlongPacket { len: usize },

    /// No slot was available at admission time. Closes the incoming
    /// connection.
    #[error("no room has a free slot")]
    RoomFull,

    /// A normal disconnect triggered by the idle reaper.
    #[error("idle timeout")]
    IdleTimeout,
}
