//! Core of the Dark Colony lobby-and-battle relay: the wire protocol, the
//! room/slot state machine, the battle-ping driver, and the connection
//! lifecycle that wires them together. The binary (`src/main.rs`) is a thin
//! shell around [`server::ServerState`] plus the listener/ticker glue.

pub mod battle_ping;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod lobby;
pub mod protocol;
pub mod room;
pub mod server;
pub mod session;
pub mod ticker;
