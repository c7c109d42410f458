//! High-level player with command methods.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Child;
use tokio::task::JoinHandle;

use super::events::{Event, EventContext, EventDispatcher, UnknownEvent};
use super::reader::reader_loop;
use super::state::{PlayerStatus, Song, StateMachine, Step};
use crate::backend::{
  check_version, find_player, spawn_player, Backend, BackendReader, BackendWriter, ErrorKind,
  IoError, JumpPosition, ParseJumpError, PlayerCommand, ProcessError,
};
use crate::config::{ConfigError, PlayerConfig};

#[derive(Error, Debug)]
pub enum PlayerError {
  #[error("Process error: {0}")]
  Process(#[from] ProcessError),
  #[error("Backend I/O error: {0}")]
  Io(#[from] IoError),
  #[error("{kind}: {message}")]
  Backend { kind: ErrorKind, message: String },
  #[error("{command} is not supported by {backend}")]
  Unsupported {
    command: &'static str,
    backend: Backend,
  },
  #[error("No song set")]
  NoSong,
  #[error(transparent)]
  InvalidJump(#[from] ParseJumpError),
  #[error(transparent)]
  UnknownEvent(#[from] UnknownEvent),
  #[error(transparent)]
  Config(#[from] ConfigError),
  #[error("Reader task failed: {0}")]
  ReaderTask(#[from] tokio::task::JoinError),
}

/// State shared between player handles and the reader loop.
pub(crate) struct Shared {
  pub(crate) backend: Backend,
  pub(crate) stop_on_backend_error: bool,
  pub(crate) state: Mutex<StateMachine>,
  pub(crate) dispatcher: EventDispatcher,
  pub(crate) writer: BackendWriter,
  process: Mutex<Option<Child>>,
  reader: Mutex<Option<JoinHandle<Result<(), PlayerError>>>>,
  _writer_handle: JoinHandle<()>,
}

/// Handle to a remote-controlled mpg123/mpg321 process.
///
/// Commands are fire-and-forget: they update the status provisionally and
/// return once the line is queued. The backend's answers are processed by a
/// background reader task, which runs the subscribed callbacks. Callbacks run
/// on that task, so a slow callback delays every later status line.
///
/// Clones share the same process.
#[derive(Clone)]
pub struct Player {
  inner: Arc<Shared>,
}

impl Player {
  /// Locate, probe and start the backend, then attach a player to it.
  pub async fn spawn(config: PlayerConfig) -> Result<Self, PlayerError> {
    config.validate().map_err(ConfigError::Invalid)?;

    let exe = match &config.player_path {
      Some(path) => path.clone(),
      None => find_player(config.backend)
        .ok_or_else(|| ProcessError::NotFound(config.backend.binary_name().to_string()))?,
    };
    check_version(&exe, config.backend).await?;

    let mut child = spawn_player(&exe, &config)?;
    let stdin = child.stdin.take().ok_or(ProcessError::MissingPipe("stdin"))?;
    let stdout = child.stdout.take().ok_or(ProcessError::MissingPipe("stdout"))?;

    let player = Self::from_streams(&config, stdout, stdin);
    *player.inner.process.lock() = Some(child);

    if config.performance_mode && config.backend.is_extended() {
      player.silence()?;
    }

    log::info!("{} player started (pid: {:?})", config.backend, player.pid());
    Ok(player)
  }

  /// Attach a player to any pair of streams speaking the remote-control
  /// protocol: `output` carries status lines, `input` receives commands.
  ///
  /// Must be called from within a tokio runtime.
  pub fn from_streams<R, W>(config: &PlayerConfig, output: R, input: W) -> Self
  where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
  {
    let (writer, writer_handle) = BackendWriter::spawn(input);
    let inner = Arc::new(Shared {
      backend: config.backend,
      stop_on_backend_error: config.stop_on_backend_error,
      state: Mutex::new(StateMachine::new()),
      dispatcher: EventDispatcher::new(),
      writer,
      process: Mutex::new(None),
      reader: Mutex::new(None),
      _writer_handle: writer_handle,
    });

    let reader = BackendReader::new(output, config.read_timeout());
    let weak = Arc::downgrade(&inner);
    let handle = tokio::spawn(async move {
      let result = reader_loop(reader, weak).await;
      if let Err(e) = &result {
        log::error!("Player reader loop ended: {}", e);
      }
      result
    });
    *inner.reader.lock() = Some(handle);

    Self { inner }
  }

  pub(crate) fn from_shared(inner: Arc<Shared>) -> Self {
    Self { inner }
  }

  pub fn backend(&self) -> Backend {
    self.inner.backend
  }

  pub fn status(&self) -> PlayerStatus {
    self.inner.state.lock().status()
  }

  pub fn song(&self) -> Option<Song> {
    self.inner.state.lock().song()
  }

  /// Process id of a spawned backend.
  pub fn pid(&self) -> Option<u32> {
    self.inner.process.lock().as_ref().and_then(Child::id)
  }

  // ==========================================================================
  // Events
  // ==========================================================================

  /// Run `callback` each time `event` is emitted.
  pub fn subscribe<F>(&self, event: Event, callback: F)
  where
    F: Fn(&EventContext) + Send + Sync + 'static,
  {
    self.inner.dispatcher.subscribe(event, callback);
  }

  /// Subscribe by event name, e.g. `"music_end"`.
  pub fn subscribe_named<F>(&self, event: &str, callback: F) -> Result<(), PlayerError>
  where
    F: Fn(&EventContext) + Send + Sync + 'static,
  {
    let event: Event = event.parse()?;
    self.subscribe(event, callback);
    Ok(())
  }

  /// Run `handler` when the backend reports an error. The context carries the
  /// error kind and message.
  pub fn on_error<F>(&self, handler: F)
  where
    F: Fn(&EventContext) + Send + Sync + 'static,
  {
    self.inner.dispatcher.on_error(handler);
  }

  // ==========================================================================
  // Commands
  // ==========================================================================

  /// Write the planned command and commit its status, or do nothing when the
  /// current status does not allow it.
  fn issue<F>(&self, what: &str, plan: F) -> Result<(), PlayerError>
  where
    F: FnOnce(&StateMachine) -> Option<Step>,
  {
    let mut state = self.inner.state.lock();
    let Some(step) = plan(&*state) else {
      log::debug!("Ignoring {} while {:?}", what, state.status());
      return Ok(());
    };

    log::info!("Sending command: {}", step.command);
    self.inner.writer.write_line(&step.command.to_string())?;
    state.commit(&step);
    Ok(())
  }

  fn issue_extended(&self, command: PlayerCommand) -> Result<(), PlayerError> {
    if command.is_extended() && !self.inner.backend.is_extended() {
      return Err(PlayerError::Unsupported {
        command: command.verb(),
        backend: self.inner.backend,
      });
    }
    self.issue(command.verb(), |state| state.passthrough(command))
  }

  /// Set the song and loop flag, then play it.
  pub fn play_song(&self, path: &str, looping: bool) -> Result<(), PlayerError> {
    {
      let mut state = self.inner.state.lock();
      state.set_song(path);
      state.set_loop(looping);
    }
    self.play()
  }

  /// Load the current song from the start.
  pub fn play(&self) -> Result<(), PlayerError> {
    if self.status().is_terminal() {
      log::debug!("Ignoring play: player already quitted");
      return Ok(());
    }
    if self.song().is_none() {
      return Err(PlayerError::NoSong);
    }
    self.issue("play", StateMachine::play)
  }

  pub fn set_song(&self, path: &str) {
    self.inner.state.lock().set_song(path);
  }

  /// Replay the song each time it ends.
  pub fn set_loop(&self, looping: bool) {
    self.inner.state.lock().set_loop(looping);
  }

  /// Pause playback. Does nothing unless playing.
  pub fn pause(&self) -> Result<(), PlayerError> {
    self.issue("pause", StateMachine::pause)
  }

  /// Resume playback. Does nothing unless paused. The status becomes
  /// `Playing` once the backend confirms.
  pub fn resume(&self) -> Result<(), PlayerError> {
    self.issue("resume", StateMachine::resume)
  }

  /// Stop playback. The status becomes `Stopped` once the backend confirms.
  pub fn stop(&self) -> Result<(), PlayerError> {
    self.issue("stop", StateMachine::stop)
  }

  /// Ask the backend to exit. Nothing is written after this.
  pub fn quit(&self) -> Result<(), PlayerError> {
    self.issue("quit", StateMachine::quit)
  }

  /// Jump to a frame or time, absolute or relative.
  pub fn jump(&self, pos: impl Into<JumpPosition>) -> Result<(), PlayerError> {
    let command = PlayerCommand::Jump(pos.into());
    self.issue("jump", |state| state.passthrough(command))
  }

  /// Jump using the backend's notation: `200`, `1s`, `+20`, `-1s`.
  pub fn jump_str(&self, pos: &str) -> Result<(), PlayerError> {
    let pos: JumpPosition = pos.parse()?;
    self.jump(pos)
  }

  /// Set the volume in percent (`VOLUME` on mpg123, `GAIN` on mpg321).
  pub fn volume(&self, percent: u32) -> Result<(), PlayerError> {
    let command = PlayerCommand::volume(self.inner.backend, percent);
    self.issue_extended(command)
  }

  pub fn mute(&self) -> Result<(), PlayerError> {
    self.issue_extended(PlayerCommand::Mute)
  }

  pub fn unmute(&self) -> Result<(), PlayerError> {
    self.issue_extended(PlayerCommand::Unmute)
  }

  /// Stop per-frame status output.
  pub fn silence(&self) -> Result<(), PlayerError> {
    self.issue_extended(PlayerCommand::Silence)
  }

  /// Play entry `index` (0-based) of the playlist at `path`.
  pub fn load_list(&self, index: u32, path: &str) -> Result<(), PlayerError> {
    if !self.inner.backend.is_extended() {
      return Err(PlayerError::Unsupported {
        command: "LOADLIST",
        backend: self.inner.backend,
      });
    }
    self.issue("load list", |state| state.load_list(index, path))
  }

  // ==========================================================================
  // Lifecycle
  // ==========================================================================

  /// Wait for the reader loop to finish and return how it ended.
  ///
  /// Backend errors that ended the loop surface here. After a clean end the
  /// process is reaped; after an error it is left running, see [`Player::kill`].
  pub async fn wait(&self) -> Result<(), PlayerError> {
    let handle = self.inner.reader.lock().take();
    let result = match handle {
      Some(handle) => handle.await?,
      None => Ok(()),
    };

    if result.is_ok() {
      let child = self.inner.process.lock().take();
      if let Some(mut child) = child {
        match child.wait().await {
          Ok(status) => log::info!("Player process exited with: {}", status),
          Err(e) => log::error!("wait() failed: {}", e),
        }
      }
    }

    result
  }

  /// Kill the backend process without asking it to quit.
  pub async fn kill(&self) {
    {
      let mut state = self.inner.state.lock();
      if let Some(step) = state.quit() {
        state.commit(&step);
      }
    }
    self.inner.writer.close();

    let child = self.inner.process.lock().take();
    if let Some(mut child) = child {
      let pid = child.id();
      log::info!("Killing player process (pid: {:?})", pid);
      match child.kill().await {
        Ok(()) => log::info!("Player process killed"),
        Err(e) => log::error!("kill() failed: {}", e),
      }
    } else {
      log::warn!("No player process to kill");
    }
  }
}

impl fmt::Debug for Player {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Player")
      .field("backend", &self.inner.backend)
      .field("status", &self.status())
      .finish()
  }
}
