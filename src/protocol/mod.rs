//! Everything pure about the wire format: opcode tables, frame codec, and
//! the command parser. Nothing in this module touches rooms, sessions, or
//! sockets.

pub mod command;
pub mod frame;
pub mod opcode;
