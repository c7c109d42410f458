//! Backend executable detection, version probing and process spawning.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::process::{Child, Command};

use super::protocol::Backend;
use crate::config::PlayerConfig;

/// Dummy argument `-R` expects; both backends ignore its value.
const REMOTE_TAG: &str = "mpgctl";

#[derive(Error, Debug)]
pub enum ProcessError {
  #[error("{0} executable not found")]
  NotFound(String),
  #[error("No suitable player found: {path} does not identify as {backend}")]
  NoSuitablePlayer { path: PathBuf, backend: Backend },
  #[error("Failed to spawn player: {0}")]
  SpawnFailed(#[from] std::io::Error),
  #[error("Player process has no {0} pipe")]
  MissingPipe(&'static str),
}

/// Find the backend executable in `PATH` and common locations.
pub fn find_player(backend: Backend) -> Option<PathBuf> {
  let name = backend.binary_name();

  // Check PATH first
  if let Ok(path) = which::which(name) {
    return Some(path);
  }

  #[cfg(windows)]
  let common_dirs: &[&str] = &[r"C:\Program Files\mpg123", r"C:\mpg123"];
  #[cfg(target_os = "macos")]
  let common_dirs: &[&str] = &["/usr/local/bin", "/opt/homebrew/bin", "/opt/local/bin"];
  #[cfg(not(any(windows, target_os = "macos")))]
  let common_dirs: &[&str] = &["/usr/bin", "/usr/local/bin", "/bin"];

  common_dirs
    .iter()
    .map(|dir| Path::new(dir).join(name).with_extension(std::env::consts::EXE_EXTENSION))
    .find(|p| p.exists())
}

/// Run `<exe> --version` and check it exits cleanly and reports the expected
/// backend.
/// Returns the first line of the version output.
pub async fn check_version(exe: &Path, backend: Backend) -> Result<String, ProcessError> {
  let output = Command::new(exe)
    .arg("--version")
    .stdin(Stdio::null())
    .output()
    .await
    .map_err(|e| spawn_error(exe, e))?;

  let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
  text.push_str(&String::from_utf8_lossy(&output.stderr));

  if !output.status.success() || !text.contains(backend.binary_name()) {
    log::warn!("{} is not a usable {} ({})", exe.display(), backend, output.status);
    return Err(ProcessError::NoSuitablePlayer {
      path: exe.to_path_buf(),
      backend,
    });
  }

  let version = text.lines().next().unwrap_or_default().trim().to_string();
  log::info!("Found {}: {}", backend, version);
  Ok(version)
}

/// Command-line arguments for a remote-controlled backend.
pub fn player_args(config: &PlayerConfig) -> Vec<String> {
  let mut args = config.extra_args.clone();
  if config.rva_mix {
    args.push("--rva-mix".to_string());
  }
  if let Some(device) = &config.audio_device {
    args.push("--audiodevice".to_string());
    args.push(device.clone());
  }
  args.push("-R".to_string());
  args.push(REMOTE_TAG.to_string());
  args
}

/// Spawn the backend in remote-control mode with piped stdin/stdout.
pub fn spawn_player(exe: &Path, config: &PlayerConfig) -> Result<Child, ProcessError> {
  let args = player_args(config);
  log::info!("Spawning {}: {:?} {:?}", config.backend, exe, args);

  Command::new(exe)
    .args(&args)
    .stdin(Stdio::piped())
    .stdout(Stdio::piped())
    .stderr(Stdio::null())
    .kill_on_drop(true)
    .spawn()
    .map_err(|e| spawn_error(exe, e))
}

fn spawn_error(exe: &Path, e: std::io::Error) -> ProcessError {
  if e.kind() == std::io::ErrorKind::NotFound {
    ProcessError::NotFound(exe.display().to_string())
  } else {
    ProcessError::SpawnFailed(e)
  }
}
