//! mpg123/mpg321 remote-control protocol types.
//!
//! Commands are uppercase verb lines written to the backend's stdin. Status
//! lines arrive on stdout and start with `@`.
//!
//! Reference: `mpg123 --long-help`, section "remote control" (`-R`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Backend variant driven by a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
  /// Modern backend. Reports mute changes, `@P 0` means any stop.
  #[default]
  Mpg123,
  /// Legacy backend. Reports end of song as `@P 3`.
  Mpg321,
}

impl Backend {
  /// Executable name searched on `PATH`, also the marker expected in `--version`.
  pub fn binary_name(self) -> &'static str {
    match self {
      Backend::Mpg123 => "mpg123",
      Backend::Mpg321 => "mpg321",
    }
  }

  /// Full protocol table: shared entries first, then the variant extension.
  pub fn protocol(self) -> impl Iterator<Item = &'static ProtocolEntry> {
    let ext: &'static [ProtocolEntry] = match self {
      Backend::Mpg123 => &MPG123_EXT,
      Backend::Mpg321 => &MPG321_EXT,
    };
    SHARED_ENTRIES.iter().chain(ext.iter())
  }

  /// Whether the backend understands `MUTE`, `UNMUTE`, `SILENCE` and `LOADLIST`.
  pub fn is_extended(self) -> bool {
    matches!(self, Backend::Mpg123)
  }
}

impl fmt::Display for Backend {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.binary_name())
  }
}

/// Semantic meaning of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
  /// `@P 0`: stopped by the user, or (mpg123) the song ended.
  MusicStop,
  /// `@P 1`
  UserPause,
  /// `@P 2`: playback started or resumed.
  UserStartOrResume,
  /// `@P 3` (mpg321 only).
  EndOfSong,
  UserMute,
  UserUnmute,
  /// `@E`, the message follows on the same line or the next one.
  Error,
}

/// One row of a protocol table.
#[derive(Debug)]
pub struct ProtocolEntry {
  /// Status code the line starts with, e.g. `@P 1`.
  pub code: &'static str,
  /// `None` marks a recognized line that carries no state change.
  pub action: Option<Action>,
  pub description: &'static str,
}

impl ProtocolEntry {
  /// A line matches when it is the code itself or the code followed by whitespace.
  pub fn matches(&self, line: &str) -> bool {
    match line.strip_prefix(self.code) {
      Some(rest) => rest.is_empty() || rest.starts_with(char::is_whitespace),
      None => false,
    }
  }
}

static SHARED_ENTRIES: [ProtocolEntry; 9] = [
  ProtocolEntry {
    code: "@P 0",
    action: Some(Action::MusicStop),
    description: "mpg123: any stop. mpg321: user stop only.",
  },
  ProtocolEntry {
    code: "@P 1",
    action: Some(Action::UserPause),
    description: "Music has been paused by the user.",
  },
  ProtocolEntry {
    code: "@P 2",
    action: Some(Action::UserStartOrResume),
    description: "Music has been started or resumed by the user.",
  },
  ProtocolEntry {
    code: "@E",
    action: Some(Action::Error),
    description: "Player has encountered an error.",
  },
  ProtocolEntry {
    code: "@silence",
    action: None,
    description: "Player has been silenced by the user.",
  },
  ProtocolEntry {
    code: "@V",
    action: None,
    description: "Volume change event.",
  },
  ProtocolEntry {
    code: "@S",
    action: None,
    description: "Stereo info event.",
  },
  ProtocolEntry {
    code: "@I",
    action: None,
    description: "Information event.",
  },
  ProtocolEntry {
    code: "@R",
    action: None,
    description: "Remote interface version banner.",
  },
];

static MPG123_EXT: [ProtocolEntry; 2] = [
  ProtocolEntry {
    code: "@mute",
    action: Some(Action::UserMute),
    description: "Player has been muted by the user.",
  },
  ProtocolEntry {
    code: "@unmute",
    action: Some(Action::UserUnmute),
    description: "Player has been unmuted by the user.",
  },
];

static MPG321_EXT: [ProtocolEntry; 1] = [ProtocolEntry {
  code: "@P 3",
  action: Some(Action::EndOfSong),
  description: "Player has reached the end of the song.",
}];

/// Result of matching a status line against a protocol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
  Action(Action),
  /// Known line without effect (volume echo, stereo info, acks...).
  Ignorable,
  Unrecognized,
}

/// Classify a status line, first matching entry wins.
pub fn classify_status(backend: Backend, line: &str) -> LineClass {
  let line = line.trim();
  match backend.protocol().find(|entry| entry.matches(line)) {
    Some(ProtocolEntry {
      action: Some(action),
      ..
    }) => LineClass::Action(*action),
    Some(_) => LineClass::Ignorable,
    None => LineClass::Unrecognized,
  }
}

/// Message part of an `@E` line, empty when the body comes on the next line.
pub fn error_message(line: &str) -> &str {
  line
    .trim()
    .strip_prefix("@E")
    .map(str::trim_start)
    .unwrap_or(line)
}

/// Kind of runtime error reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
  Generic,
  File,
  Command,
  Argument,
  EQ,
  Seek,
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ErrorKind::Generic => "player error",
      ErrorKind::File => "file error",
      ErrorKind::Command => "command error",
      ErrorKind::Argument => "argument error",
      ErrorKind::EQ => "equalizer error",
      ErrorKind::Seek => "seek error",
    };
    f.write_str(name)
  }
}

/// Substring of an error message and the kind it maps to.
#[derive(Debug)]
pub struct ErrorRule {
  pub substring: &'static str,
  pub kind: ErrorKind,
}

/// Error rules in match order. Specific messages precede generic ones.
pub static ERROR_RULES: [ErrorRule; 12] = [
  ErrorRule {
    substring: "empty list name",
    kind: ErrorKind::Generic,
  },
  ErrorRule {
    substring: "No track loaded!",
    kind: ErrorKind::Generic,
  },
  ErrorRule {
    substring: "Error opening stream",
    kind: ErrorKind::File,
  },
  ErrorRule {
    substring: "failed to parse given eq file:",
    kind: ErrorKind::File,
  },
  ErrorRule {
    substring: "Corrupted file:",
    kind: ErrorKind::File,
  },
  ErrorRule {
    substring: "Unknown command:",
    kind: ErrorKind::Command,
  },
  ErrorRule {
    substring: "Unfinished command:",
    kind: ErrorKind::Command,
  },
  ErrorRule {
    substring: "Unknown command or no arguments:",
    kind: ErrorKind::Argument,
  },
  ErrorRule {
    substring: "invalid arguments for",
    kind: ErrorKind::Argument,
  },
  ErrorRule {
    substring: "Missing argument to",
    kind: ErrorKind::Argument,
  },
  ErrorRule {
    substring: "failed to set eq:",
    kind: ErrorKind::EQ,
  },
  ErrorRule {
    substring: "Error while seeking",
    kind: ErrorKind::Seek,
  },
];

/// Map an error message to its kind. Unlisted messages are generic errors.
pub fn classify_error(message: &str) -> ErrorKind {
  ERROR_RULES
    .iter()
    .find(|rule| message.contains(rule.substring))
    .map(|rule| rule.kind)
    .unwrap_or(ErrorKind::Generic)
}

/// Target of a `JUMP` command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JumpPosition {
  /// Absolute MPEG frame, `JUMP 200`.
  Frame(u64),
  /// Absolute time, `JUMP 1s`.
  Seconds(f64),
  /// Frames relative to the current one, `JUMP +20`.
  RelativeFrames(i64),
  /// Seconds relative to the current position, `JUMP -1s`.
  RelativeSeconds(f64),
}

impl fmt::Display for JumpPosition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      JumpPosition::Frame(frame) => write!(f, "{}", frame),
      JumpPosition::Seconds(secs) => write!(f, "{}s", secs),
      JumpPosition::RelativeFrames(frames) => write!(f, "{:+}", frames),
      JumpPosition::RelativeSeconds(secs) => write!(f, "{:+}s", secs),
    }
  }
}

impl From<u64> for JumpPosition {
  fn from(frame: u64) -> Self {
    JumpPosition::Frame(frame)
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid jump position: {0:?}")]
pub struct ParseJumpError(pub String);

impl FromStr for JumpPosition {
  type Err = ParseJumpError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let invalid = || ParseJumpError(s.to_string());
    let trimmed = s.trim();
    let relative = trimmed.starts_with(['+', '-']);

    if let Some(secs) = trimmed.strip_suffix('s') {
      let secs: f64 = secs.parse().map_err(|_| invalid())?;
      if !secs.is_finite() || (!relative && secs < 0.0) {
        return Err(invalid());
      }
      return Ok(if relative {
        JumpPosition::RelativeSeconds(secs)
      } else {
        JumpPosition::Seconds(secs)
      });
    }

    if relative {
      trimmed
        .parse()
        .map(JumpPosition::RelativeFrames)
        .map_err(|_| invalid())
    } else {
      trimmed.parse().map(JumpPosition::Frame).map_err(|_| invalid())
    }
  }
}

/// Command line written to the backend's stdin.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
  Load(String),
  LoadList(u32, String),
  Pause,
  Stop,
  Quit,
  Jump(JumpPosition),
  /// mpg123 volume in percent.
  Volume(u32),
  /// mpg321 volume in percent.
  Gain(u32),
  Mute,
  Unmute,
  Silence,
}

impl PlayerCommand {
  /// Volume command understood by the given backend.
  pub fn volume(backend: Backend, percent: u32) -> Self {
    match backend {
      Backend::Mpg123 => PlayerCommand::Volume(percent),
      Backend::Mpg321 => PlayerCommand::Gain(percent),
    }
  }

  /// Protocol verb, used in logs and errors.
  pub fn verb(&self) -> &'static str {
    match self {
      PlayerCommand::Load(_) => "LOAD",
      PlayerCommand::LoadList(..) => "LOADLIST",
      PlayerCommand::Pause => "PAUSE",
      PlayerCommand::Stop => "STOP",
      PlayerCommand::Quit => "QUIT",
      PlayerCommand::Jump(_) => "JUMP",
      PlayerCommand::Volume(_) => "VOLUME",
      PlayerCommand::Gain(_) => "GAIN",
      PlayerCommand::Mute => "MUTE",
      PlayerCommand::Unmute => "UNMUTE",
      PlayerCommand::Silence => "SILENCE",
    }
  }

  /// Whether only the extended (mpg123) protocol knows this command.
  pub fn is_extended(&self) -> bool {
    matches!(
      self,
      PlayerCommand::LoadList(..)
        | PlayerCommand::Volume(_)
        | PlayerCommand::Mute
        | PlayerCommand::Unmute
        | PlayerCommand::Silence
    )
  }
}

impl fmt::Display for PlayerCommand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let verb = self.verb();
    match self {
      PlayerCommand::Load(path) => write!(f, "{} {}", verb, path),
      PlayerCommand::LoadList(index, path) => write!(f, "{} {} {}", verb, index, path),
      PlayerCommand::Jump(pos) => write!(f, "{} {}", verb, pos),
      PlayerCommand::Volume(percent) | PlayerCommand::Gain(percent) => {
        write!(f, "{} {}", verb, percent)
      }
      _ => f.write_str(verb),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_classification() {
    let b = Backend::Mpg123;
    assert_eq!(classify_status(b, "@P 0"), LineClass::Action(Action::MusicStop));
    assert_eq!(classify_status(b, "@P 1\n"), LineClass::Action(Action::UserPause));
    assert_eq!(
      classify_status(b, "@P 2"),
      LineClass::Action(Action::UserStartOrResume)
    );
    assert_eq!(
      classify_status(b, "@E Error opening stream: nope.mp3"),
      LineClass::Action(Action::Error)
    );
    assert_eq!(classify_status(b, "@V 50.000000%"), LineClass::Ignorable);
    assert_eq!(
      classify_status(b, "@S 1.0 3 44100 Joint-Stereo 0 417 2 0 0 0 128 0 1"),
      LineClass::Ignorable
    );
    assert_eq!(classify_status(b, "@I ID3v2.title:Song"), LineClass::Ignorable);
    assert_eq!(classify_status(b, "@R MPG123 (ThOr) v10"), LineClass::Ignorable);
    assert_eq!(classify_status(b, "@silence"), LineClass::Ignorable);
    assert_eq!(classify_status(b, "@F 10 20 0.26 0.52"), LineClass::Unrecognized);
    assert_eq!(classify_status(b, "random noise"), LineClass::Unrecognized);
  }

  #[test]
  fn test_variant_extensions() {
    assert_eq!(
      classify_status(Backend::Mpg123, "@mute"),
      LineClass::Action(Action::UserMute)
    );
    assert_eq!(
      classify_status(Backend::Mpg123, "@unmute"),
      LineClass::Action(Action::UserUnmute)
    );
    assert_eq!(classify_status(Backend::Mpg123, "@P 3"), LineClass::Unrecognized);

    assert_eq!(
      classify_status(Backend::Mpg321, "@P 3"),
      LineClass::Action(Action::EndOfSong)
    );
    assert_eq!(classify_status(Backend::Mpg321, "@mute"), LineClass::Unrecognized);
  }

  #[test]
  fn test_code_must_end_at_word_boundary() {
    assert_eq!(classify_status(Backend::Mpg123, "@P 10"), LineClass::Unrecognized);
    assert_eq!(classify_status(Backend::Mpg123, "@Everything"), LineClass::Unrecognized);
    assert_eq!(classify_status(Backend::Mpg123, "@E"), LineClass::Action(Action::Error));
  }

  #[test]
  fn test_error_classification() {
    assert_eq!(classify_error("Error opening stream: a.mp3"), ErrorKind::File);
    assert_eq!(classify_error("Corrupted file: b.mp3"), ErrorKind::File);
    assert_eq!(classify_error("No track loaded!"), ErrorKind::Generic);
    assert_eq!(classify_error("Unfinished command: JUMP"), ErrorKind::Command);
    assert_eq!(classify_error("invalid arguments for EQ"), ErrorKind::Argument);
    assert_eq!(classify_error("failed to set eq: 1 2 3"), ErrorKind::EQ);
    assert_eq!(classify_error("Error while seeking"), ErrorKind::Seek);
    assert_eq!(classify_error("something exploded"), ErrorKind::Generic);
  }

  #[test]
  fn test_error_classification_is_first_match() {
    assert_eq!(classify_error("Unknown command: FOO"), ErrorKind::Command);
    assert_eq!(
      classify_error("Unknown command or no arguments: LOAD"),
      ErrorKind::Argument
    );
    assert_eq!(
      classify_error("No track loaded! Error while seeking"),
      ErrorKind::Generic
    );
  }

  #[test]
  fn test_error_message() {
    assert_eq!(error_message("@E Error opening stream: x"), "Error opening stream: x");
    assert_eq!(error_message("@E"), "");
    assert_eq!(error_message("@E   \n"), "");
  }

  #[test]
  fn test_jump_lines() {
    let lines: Vec<String> = [
      JumpPosition::Frame(200),
      "1s".parse().unwrap(),
      "+20".parse().unwrap(),
      "-1s".parse().unwrap(),
    ]
    .into_iter()
    .map(|pos| PlayerCommand::Jump(pos).to_string())
    .collect();
    assert_eq!(lines, ["JUMP 200", "JUMP 1s", "JUMP +20", "JUMP -1s"]);
  }

  #[test]
  fn test_jump_parsing() {
    assert_eq!("200".parse(), Ok(JumpPosition::Frame(200)));
    assert_eq!("2.5s".parse(), Ok(JumpPosition::Seconds(2.5)));
    assert_eq!("-20".parse(), Ok(JumpPosition::RelativeFrames(-20)));
    assert_eq!("+3s".parse(), Ok(JumpPosition::RelativeSeconds(3.0)));
    assert!("".parse::<JumpPosition>().is_err());
    assert!("s".parse::<JumpPosition>().is_err());
    assert!("ten".parse::<JumpPosition>().is_err());
    assert!("1m".parse::<JumpPosition>().is_err());
  }

  #[test]
  fn test_command_lines() {
    assert_eq!(PlayerCommand::Load("song.mp3".into()).to_string(), "LOAD song.mp3");
    assert_eq!(
      PlayerCommand::LoadList(2, "list.m3u".into()).to_string(),
      "LOADLIST 2 list.m3u"
    );
    assert_eq!(PlayerCommand::volume(Backend::Mpg123, 40).to_string(), "VOLUME 40");
    assert_eq!(PlayerCommand::volume(Backend::Mpg321, 40).to_string(), "GAIN 40");
    assert_eq!(PlayerCommand::Silence.to_string(), "SILENCE");
    assert_eq!(PlayerCommand::Quit.to_string(), "QUIT");
  }
}
