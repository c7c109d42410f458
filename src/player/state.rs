//! Playback state machine.
//!
//! User commands are planned as a [`Step`] (command to write, provisional
//! status) and committed once the command is queued. Backend status lines are
//! applied directly and yield a [`Transition`] listing the events to emit.

use serde::Serialize;

use super::events::Event;
use crate::backend::{Action, PlayerCommand};

/// Playback status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStatus {
  #[default]
  Instantiated,
  Playing,
  Paused,
  /// Resume requested, waiting for the backend to confirm.
  Resuming,
  /// Stop requested, waiting for the backend to confirm.
  Stopping,
  Stopped,
  Quitted,
}

impl PlayerStatus {
  pub fn is_terminal(self) -> bool {
    self == PlayerStatus::Quitted
  }
}

/// Song currently handed to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Song {
  pub path: String,
  /// Replay the song each time it ends.
  pub looping: bool,
}

/// A user command allowed from the current status.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
  pub command: PlayerCommand,
  /// Provisional status once the command is written.
  pub next: PlayerStatus,
}

/// Effects of a backend status line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transition {
  /// Command to write before emitting, used to replay looped songs.
  pub replay: Option<PlayerCommand>,
  /// Events to emit, in order.
  pub events: Vec<Event>,
}

impl Transition {
  fn emit(events: &[Event]) -> Self {
    Self {
      replay: None,
      events: events.to_vec(),
    }
  }
}

/// Status, song path and loop flag of one player.
#[derive(Debug, Default)]
pub struct StateMachine {
  status: PlayerStatus,
  song_path: Option<String>,
  looping: bool,
}

impl StateMachine {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn status(&self) -> PlayerStatus {
    self.status
  }

  pub fn song(&self) -> Option<Song> {
    self.song_path.as_ref().map(|path| Song {
      path: path.clone(),
      looping: self.looping,
    })
  }

  pub fn set_song(&mut self, path: &str) {
    self.song_path = Some(path.to_string());
  }

  pub fn set_loop(&mut self, looping: bool) {
    self.looping = looping;
  }

  /// Apply a planned step after its command has been queued.
  pub fn commit(&mut self, step: &Step) {
    self.status = step.next;
  }

  /// `LOAD` the current song. Needs a song and a non-terminal status.
  pub fn play(&self) -> Option<Step> {
    if self.status.is_terminal() {
      return None;
    }
    let path = self.song_path.clone()?;
    Some(Step {
      command: PlayerCommand::Load(path),
      next: PlayerStatus::Playing,
    })
  }

  /// `LOADLIST` an entry of a playlist.
  pub fn load_list(&self, index: u32, path: &str) -> Option<Step> {
    if self.status.is_terminal() {
      return None;
    }
    Some(Step {
      command: PlayerCommand::LoadList(index, path.to_string()),
      next: PlayerStatus::Playing,
    })
  }

  pub fn pause(&self) -> Option<Step> {
    (self.status == PlayerStatus::Playing).then_some(Step {
      command: PlayerCommand::Pause,
      next: PlayerStatus::Paused,
    })
  }

  /// `PAUSE` toggles back to playing. The backend's `@P 2` confirms it.
  pub fn resume(&self) -> Option<Step> {
    (self.status == PlayerStatus::Paused).then_some(Step {
      command: PlayerCommand::Pause,
      next: PlayerStatus::Resuming,
    })
  }

  pub fn stop(&self) -> Option<Step> {
    matches!(
      self.status,
      PlayerStatus::Playing | PlayerStatus::Paused | PlayerStatus::Resuming
    )
    .then_some(Step {
      command: PlayerCommand::Stop,
      next: PlayerStatus::Stopping,
    })
  }

  pub fn quit(&self) -> Option<Step> {
    (!self.status.is_terminal()).then_some(Step {
      command: PlayerCommand::Quit,
      next: PlayerStatus::Quitted,
    })
  }

  /// Commands without a status change (jump, volume, mute...).
  pub fn passthrough(&self, command: PlayerCommand) -> Option<Step> {
    (!self.status.is_terminal()).then_some(Step {
      command,
      next: self.status,
    })
  }

  /// Apply a backend-confirmed action.
  pub fn apply(&mut self, action: Action) -> Transition {
    if self.status.is_terminal() {
      return Transition::default();
    }

    match action {
      Action::MusicStop => self.on_stop_code_received(),
      Action::EndOfSong => self.on_end_of_song(),
      // A late confirmation must not replace a pending stop, or the following
      // `@P 0` reads as the end of the song.
      Action::UserPause => {
        if self.status != PlayerStatus::Stopping {
          self.status = PlayerStatus::Paused;
        }
        Transition::emit(&[Event::AnyStop, Event::UserPause])
      }
      Action::UserStartOrResume if self.status == PlayerStatus::Stopping => {
        Transition::default()
      }
      Action::UserStartOrResume => {
        let resumed = matches!(self.status, PlayerStatus::Paused | PlayerStatus::Resuming);
        self.status = PlayerStatus::Playing;
        if resumed {
          Transition::emit(&[Event::UserResume])
        } else {
          Transition::default()
        }
      }
      Action::UserMute => Transition::emit(&[Event::UserMute]),
      Action::UserUnmute => Transition::emit(&[Event::UserUnmute]),
      Action::Error => Transition::default(),
    }
  }

  /// `@P 0` means a user stop only when a stop was requested, otherwise the
  /// song ended. Racy if several stop codes arrive before a pending `STOP`
  /// lands; hardening needs sequence-numbered acknowledgements.
  fn on_stop_code_received(&mut self) -> Transition {
    if self.status == PlayerStatus::Stopping {
      self.status = PlayerStatus::Stopped;
      Transition::emit(&[Event::AnyStop, Event::UserStop])
    } else {
      self.on_end_of_song()
    }
  }

  fn on_end_of_song(&mut self) -> Transition {
    if self.looping {
      if let Some(path) = &self.song_path {
        self.status = PlayerStatus::Playing;
        return Transition {
          replay: Some(PlayerCommand::Load(path.clone())),
          events: vec![Event::MusicEnd],
        };
      }
      log::warn!("Loop enabled without a song, treating end of song as a stop");
    }
    self.status = PlayerStatus::Stopped;
    Transition::emit(&[Event::AnyStop, Event::MusicEnd])
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn playing(looping: bool) -> StateMachine {
    let mut sm = StateMachine::new();
    sm.set_song("song.mp3");
    sm.set_loop(looping);
    let step = sm.play().unwrap();
    sm.commit(&step);
    sm
  }

  #[test]
  fn test_play_requires_song() {
    let sm = StateMachine::new();
    assert_eq!(sm.status(), PlayerStatus::Instantiated);
    assert!(sm.play().is_none());

    let sm = playing(false);
    assert_eq!(sm.status(), PlayerStatus::Playing);
    assert_eq!(
      sm.song(),
      Some(Song {
        path: "song.mp3".into(),
        looping: false
      })
    );
  }

  #[test]
  fn test_user_transitions() {
    let mut sm = playing(false);

    let step = sm.pause().unwrap();
    assert_eq!(step.command, PlayerCommand::Pause);
    sm.commit(&step);
    assert_eq!(sm.status(), PlayerStatus::Paused);

    let step = sm.resume().unwrap();
    assert_eq!(step.command, PlayerCommand::Pause);
    sm.commit(&step);
    assert_eq!(sm.status(), PlayerStatus::Resuming);

    let step = sm.stop().unwrap();
    assert_eq!(step.command, PlayerCommand::Stop);
    sm.commit(&step);
    assert_eq!(sm.status(), PlayerStatus::Stopping);

    let step = sm.quit().unwrap();
    assert_eq!(step.command, PlayerCommand::Quit);
    sm.commit(&step);
    assert_eq!(sm.status(), PlayerStatus::Quitted);
  }

  #[test]
  fn test_invalid_sources_are_rejected() {
    let mut sm = StateMachine::new();
    sm.set_song("song.mp3");
    assert!(sm.pause().is_none());
    assert!(sm.resume().is_none());
    assert!(sm.stop().is_none());

    let mut sm = playing(false);
    assert!(sm.resume().is_none());
    sm.apply(Action::MusicStop);
    assert_eq!(sm.status(), PlayerStatus::Stopped);
    assert!(sm.pause().is_none());
    assert!(sm.stop().is_none());

    let step = sm.quit().unwrap();
    sm.commit(&step);
    assert!(sm.play().is_none());
    assert!(sm.quit().is_none());
    assert!(sm.passthrough(PlayerCommand::Mute).is_none());
  }

  #[test]
  fn test_stop_code_while_stopping_is_user_stop() {
    let mut sm = playing(false);
    let step = sm.stop().unwrap();
    sm.commit(&step);

    let t = sm.apply(Action::MusicStop);
    assert_eq!(t.events, [Event::AnyStop, Event::UserStop]);
    assert_eq!(t.replay, None);
    assert_eq!(sm.status(), PlayerStatus::Stopped);
  }

  #[test]
  fn test_late_pause_confirmation_keeps_pending_stop() {
    let mut sm = playing(true);
    let step = sm.pause().unwrap();
    sm.commit(&step);
    let step = sm.stop().unwrap();
    sm.commit(&step);

    let t = sm.apply(Action::UserPause);
    assert_eq!(t.events, [Event::AnyStop, Event::UserPause]);
    assert_eq!(sm.status(), PlayerStatus::Stopping);

    let t = sm.apply(Action::MusicStop);
    assert_eq!(t.events, [Event::AnyStop, Event::UserStop]);
    assert_eq!(t.replay, None);
    assert_eq!(sm.status(), PlayerStatus::Stopped);
  }

  #[test]
  fn test_late_resume_confirmation_keeps_pending_stop() {
    let mut sm = playing(true);
    let step = sm.pause().unwrap();
    sm.commit(&step);
    let step = sm.resume().unwrap();
    sm.commit(&step);
    let step = sm.stop().unwrap();
    sm.commit(&step);
    assert_eq!(sm.status(), PlayerStatus::Stopping);

    assert!(sm.apply(Action::UserStartOrResume).events.is_empty());
    assert_eq!(sm.status(), PlayerStatus::Stopping);

    let t = sm.apply(Action::MusicStop);
    assert_eq!(t.events, [Event::AnyStop, Event::UserStop]);
    assert_eq!(t.replay, None);
  }

  #[test]
  fn test_stop_code_while_playing_is_end_of_song() {
    let mut sm = playing(false);
    let t = sm.apply(Action::MusicStop);
    assert_eq!(t.events, [Event::AnyStop, Event::MusicEnd]);
    assert_eq!(t.replay, None);
    assert_eq!(sm.status(), PlayerStatus::Stopped);
  }

  #[test]
  fn test_looping_replays_without_stop_events() {
    let mut sm = playing(true);
    for _ in 0..3 {
      let t = sm.apply(Action::MusicStop);
      assert_eq!(t.events, [Event::MusicEnd]);
      assert_eq!(t.replay, Some(PlayerCommand::Load("song.mp3".into())));
      assert_eq!(sm.status(), PlayerStatus::Playing);
    }
  }

  #[test]
  fn test_end_of_song_code() {
    let mut sm = playing(false);
    let t = sm.apply(Action::EndOfSong);
    assert_eq!(t.events, [Event::AnyStop, Event::MusicEnd]);
  }

  #[test]
  fn test_pause_and_resume_confirmation() {
    let mut sm = playing(false);
    let t = sm.apply(Action::UserPause);
    assert_eq!(t.events, [Event::AnyStop, Event::UserPause]);
    assert_eq!(sm.status(), PlayerStatus::Paused);

    let step = sm.resume().unwrap();
    sm.commit(&step);
    let t = sm.apply(Action::UserStartOrResume);
    assert_eq!(t.events, [Event::UserResume]);
    assert_eq!(sm.status(), PlayerStatus::Playing);

    // A fresh start is not a resume.
    let t = sm.apply(Action::UserStartOrResume);
    assert!(t.events.is_empty());
  }

  #[test]
  fn test_mute_events_keep_status() {
    let mut sm = playing(false);
    assert_eq!(sm.apply(Action::UserMute).events, [Event::UserMute]);
    assert_eq!(sm.apply(Action::UserUnmute).events, [Event::UserUnmute]);
    assert_eq!(sm.status(), PlayerStatus::Playing);
  }

  #[test]
  fn test_quitted_ignores_backend() {
    let mut sm = playing(true);
    let step = sm.quit().unwrap();
    sm.commit(&step);
    assert_eq!(sm.apply(Action::MusicStop), Transition::default());
    assert_eq!(sm.status(), PlayerStatus::Quitted);
  }
}
