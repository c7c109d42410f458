//! Backend module - spawns mpg123/mpg321 and speaks their remote-control protocol.
//!
//! Architecture:
//! - `process.rs` - executable detection, version probe and process spawning
//! - `pipe.rs` - line-oriented stdin writer task and stdout reader
//! - `protocol.rs` - command lines, status-line and error tables

mod pipe;
mod process;
mod protocol;

pub use pipe::{BackendReader, BackendWriter, IoError, ReadOutcome};
pub use process::{check_version, find_player, player_args, spawn_player, ProcessError};
pub use protocol::{
  classify_error, classify_status, error_message, Action, Backend, ErrorKind, ErrorRule,
  JumpPosition, LineClass, ParseJumpError, PlayerCommand, ProtocolEntry, ERROR_RULES,
};
