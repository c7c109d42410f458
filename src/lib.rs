//! Remote control for the `mpg123` and `mpg321` command-line audio players.
//!
//! A [`Player`] spawns the backend in remote-control mode, writes commands to
//! its stdin and parses its status lines in a background task, emitting
//! [`Event`]s to subscribed callbacks.
//!
//! ```no_run
//! use mpgctl::{Backend, Event, Player, PlayerConfig};
//!
//! # async fn demo() -> Result<(), mpgctl::PlayerError> {
//! let player = Player::spawn(PlayerConfig::for_backend(Backend::Mpg123)).await?;
//! player.subscribe(Event::MusicEnd, |_| println!("The music has ended"));
//! player.play_song("sample.mp3", false)?;
//! player.jump_str("+20")?;
//! player.quit()?;
//! player.wait().await
//! # }
//! ```

mod backend;
mod config;
mod player;

pub use backend::{
  check_version, classify_error, classify_status, error_message, find_player, player_args,
  Action, Backend, ErrorKind, ErrorRule, IoError, JumpPosition, LineClass, ParseJumpError,
  PlayerCommand, ProcessError, ProtocolEntry, ERROR_RULES,
};
pub use config::{ConfigError, PlayerConfig};
pub use player::{
  Event, EventContext, EventDispatcher, Player, PlayerError, PlayerStatus, Song, StateMachine,
  Step, Transition, UnknownEvent,
};
