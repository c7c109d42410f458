//! Named playback events and their subscriber registry.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::client::Player;
use crate::backend::ErrorKind;

/// Events emitted by the reader loop.
///
/// Composite notifications are separate names: a user stop emits both
/// `AnyStop` and `UserStop`, subscribe to whichever you need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
  /// Music stopped for any reason (pause, user stop, end of song).
  AnyStop,
  UserPause,
  UserResume,
  UserStop,
  /// The song reached its end. Emitted on every cycle of a looped song.
  MusicEnd,
  /// mpg123 only.
  UserMute,
  /// mpg123 only.
  UserUnmute,
}

impl Event {
  pub const ALL: [Event; 7] = [
    Event::AnyStop,
    Event::UserPause,
    Event::UserResume,
    Event::UserStop,
    Event::MusicEnd,
    Event::UserMute,
    Event::UserUnmute,
  ];

  pub fn name(self) -> &'static str {
    match self {
      Event::AnyStop => "any_stop",
      Event::UserPause => "user_pause",
      Event::UserResume => "user_resume",
      Event::UserStop => "user_stop",
      Event::MusicEnd => "music_end",
      Event::UserMute => "user_mute",
      Event::UserUnmute => "user_unmute",
    }
  }
}

impl fmt::Display for Event {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown event: {0}")]
pub struct UnknownEvent(pub String);

impl FromStr for Event {
  type Err = UnknownEvent;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Event::ALL
      .into_iter()
      .find(|event| event.name() == s)
      .ok_or_else(|| UnknownEvent(s.to_string()))
  }
}

/// Context handed to callbacks.
pub struct EventContext {
  /// Player that emitted the event. Use it instead of capturing a clone in
  /// the callback, which would keep the player alive forever.
  pub player: Player,
  pub error_kind: Option<ErrorKind>,
  pub error_message: Option<String>,
}

impl EventContext {
  pub fn new(player: Player) -> Self {
    Self {
      player,
      error_kind: None,
      error_message: None,
    }
  }

  pub fn error(player: Player, kind: ErrorKind, message: String) -> Self {
    Self {
      player,
      error_kind: Some(kind),
      error_message: Some(message),
    }
  }
}

type Callback<C> = Arc<dyn Fn(&C) + Send + Sync>;

/// Callbacks per event plus the error handlers.
pub struct EventDispatcher<C = EventContext> {
  subscribers: RwLock<HashMap<Event, Vec<Callback<C>>>>,
  error_handlers: RwLock<Vec<Callback<C>>>,
}

impl<C> Default for EventDispatcher<C> {
  fn default() -> Self {
    Self {
      subscribers: RwLock::new(HashMap::new()),
      error_handlers: RwLock::new(Vec::new()),
    }
  }
}

impl<C> EventDispatcher<C> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append a callback. Registering the same function twice runs it twice.
  pub fn subscribe<F>(&self, event: Event, callback: F)
  where
    F: Fn(&C) + Send + Sync + 'static,
  {
    self
      .subscribers
      .write()
      .entry(event)
      .or_default()
      .push(Arc::new(callback));
  }

  /// Install a handler for backend errors.
  pub fn on_error<F>(&self, handler: F)
  where
    F: Fn(&C) + Send + Sync + 'static,
  {
    self.error_handlers.write().push(Arc::new(handler));
  }

  pub fn subscriber_count(&self, event: Event) -> usize {
    self.subscribers.read().get(&event).map_or(0, Vec::len)
  }

  /// Run the callbacks of `event` in registration order on the current task.
  pub fn emit(&self, event: Event, context: &C) {
    // Snapshot so callbacks may subscribe without deadlocking.
    let callbacks = self
      .subscribers
      .read()
      .get(&event)
      .cloned()
      .unwrap_or_default();
    log::debug!("Emitting {} to {} callback(s)", event, callbacks.len());
    Self::invoke_all(event.name(), &callbacks, context);
  }

  /// Run the error handlers.
  pub fn report_error(&self, context: &C) {
    let handlers = self.error_handlers.read().clone();
    Self::invoke_all("error", &handlers, context);
  }

  fn invoke_all(label: &str, callbacks: &[Callback<C>], context: &C) {
    for (index, callback) in callbacks.iter().enumerate() {
      if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(context))) {
        log::error!(
          "{} callback #{} panicked: {}",
          label,
          index,
          panic_message(payload.as_ref())
        );
      }
    }
  }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
  if let Some(s) = payload.downcast_ref::<&str>() {
    s
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s
  } else {
    "non-string panic payload"
  }
}
