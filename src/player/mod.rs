//! Player module - playback state, events and the background status reader.
//!
//! Architecture:
//! - `state.rs` - status state machine, user command planning and backend transitions
//! - `events.rs` - event names, callback context and subscriber registry
//! - `reader.rs` - reader loop classifying status lines and dispatching events
//! - `client.rs` - public `Player` with command methods

mod client;
mod events;
mod reader;
mod state;

pub use client::{Player, PlayerError};
pub use events::{Event, EventContext, EventDispatcher, UnknownEvent};
pub use state::{PlayerStatus, Song, StateMachine, Step, Transition};
