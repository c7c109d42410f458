//! Line-oriented I/O with the backend process.
//!
//! Writes go through a channel to a single writer task that owns stdin.
//! Reads are pulled by the reader loop, one line per call.

use std::time::Duration;

use async_channel::{Receiver, Sender};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;

#[derive(Error, Debug)]
pub enum IoError {
  #[error("Read failed: {0}")]
  ReadFailed(#[from] std::io::Error),
  #[error("Disconnected")]
  Disconnected,
}

/// Writer channel message.
enum WriteMessage {
  Line(String),
  Close,
}

/// Write half of the backend connection.
#[derive(Clone)]
pub struct BackendWriter {
  write_tx: Sender<WriteMessage>,
}

impl BackendWriter {
  /// Spawn the writer task over `writer`.
  pub fn spawn<W>(writer: W) -> (Self, JoinHandle<()>)
  where
    W: AsyncWrite + Send + Unpin + 'static,
  {
    let (write_tx, write_rx) = async_channel::unbounded::<WriteMessage>();
    let handle = tokio::spawn(async move {
      Self::writer_loop(writer, write_rx).await;
    });
    (Self { write_tx }, handle)
  }

  async fn writer_loop<W: AsyncWrite + Unpin>(mut writer: W, write_rx: Receiver<WriteMessage>) {
    log::debug!("Backend writer loop started");

    while let Ok(msg) = write_rx.recv().await {
      match msg {
        WriteMessage::Line(line) => {
          if let Err(e) = writer.write_all(line.as_bytes()).await {
            log::error!("Backend write error: {}", e);
            break;
          }
          if let Err(e) = writer.write_all(b"\n").await {
            log::error!("Backend write newline error: {}", e);
            break;
          }
          if let Err(e) = writer.flush().await {
            log::error!("Backend flush error: {}", e);
            break;
          }
          log::debug!("Command written to backend: {}", line);
        }
        WriteMessage::Close => {
          log::debug!("Backend writer closing");
          break;
        }
      }
    }

    let _ = writer.shutdown().await;
  }

  /// Queue one command line. Returns immediately, the backend answers
  /// asynchronously on its output, if at all.
  pub fn write_line(&self, line: &str) -> Result<(), IoError> {
    self
      .write_tx
      .try_send(WriteMessage::Line(line.to_string()))
      .map_err(|_| IoError::Disconnected)
  }

  /// Close stdin once the queued lines are written.
  pub fn close(&self) {
    let _ = self.write_tx.try_send(WriteMessage::Close);
  }
}

/// Outcome of waiting for the next status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
  Line(String),
  /// No output within the idle timeout.
  Timeout,
  /// The backend closed its output, usually because it exited.
  Closed,
}

/// Read half of the backend connection.
pub struct BackendReader<R> {
  reader: BufReader<R>,
  buf: Vec<u8>,
  idle_timeout: Option<Duration>,
}

impl<R: AsyncRead + Unpin> BackendReader<R> {
  pub fn new(reader: R, idle_timeout: Option<Duration>) -> Self {
    Self {
      reader: BufReader::new(reader),
      buf: Vec::new(),
      idle_timeout,
    }
  }

  /// Wait for the next line, honouring the idle timeout.
  ///
  /// A timed out read keeps the partial line, the next call completes it.
  pub async fn read_line(&mut self) -> Result<ReadOutcome, IoError> {
    let Some(limit) = self.idle_timeout else {
      return self.read_raw_line().await.map(Self::outcome);
    };

    match tokio::time::timeout(limit, Self::fill_line(&mut self.reader, &mut self.buf)).await {
      Ok(read) => {
        read?;
        Ok(Self::outcome(self.take_line()))
      }
      Err(_) => Ok(ReadOutcome::Timeout),
    }
  }

  /// Read one full line without timeout, `None` at end of output.
  pub async fn read_raw_line(&mut self) -> Result<Option<String>, IoError> {
    Self::fill_line(&mut self.reader, &mut self.buf).await?;
    Ok(self.take_line())
  }

  // read_until is cancel safe: bytes read before a timeout stay in `buf`.
  async fn fill_line(reader: &mut BufReader<R>, buf: &mut Vec<u8>) -> std::io::Result<usize> {
    reader.read_until(b'\n', buf).await
  }

  fn take_line(&mut self) -> Option<String> {
    if self.buf.is_empty() {
      return None;
    }
    let line = String::from_utf8_lossy(&self.buf)
      .trim_end_matches(['\r', '\n'])
      .to_string();
    self.buf.clear();
    Some(line)
  }

  fn outcome(line: Option<String>) -> ReadOutcome {
    match line {
      Some(line) => ReadOutcome::Line(line),
      None => ReadOutcome::Closed,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::io::AsyncReadExt;

  #[tokio::test]
  async fn test_writer_appends_newlines() {
    let (ours, theirs) = tokio::io::duplex(256);
    let (writer, handle) = BackendWriter::spawn(ours);
    writer.write_line("LOAD a.mp3").unwrap();
    writer.write_line("PAUSE").unwrap();
    writer.close();
    handle.await.unwrap();

    let mut out = String::new();
    let mut theirs = theirs;
    theirs.read_to_string(&mut out).await.unwrap();
    assert_eq!(out, "LOAD a.mp3\nPAUSE\n");
  }

  #[tokio::test]
  async fn test_write_after_close_is_disconnected() {
    let (ours, _theirs) = tokio::io::duplex(256);
    let (writer, handle) = BackendWriter::spawn(ours);
    writer.close();
    handle.await.unwrap();
    assert!(matches!(writer.write_line("STOP"), Err(IoError::Disconnected)));
  }

  #[tokio::test]
  async fn test_reader_lines_and_eof() {
    let (mut theirs, ours) = tokio::io::duplex(256);
    let mut reader = BackendReader::new(ours, None);
    theirs.write_all(b"@R MPG123\r\n@P 0\npartial").await.unwrap();
    drop(theirs);

    assert_eq!(reader.read_line().await.unwrap(), ReadOutcome::Line("@R MPG123".into()));
    assert_eq!(reader.read_line().await.unwrap(), ReadOutcome::Line("@P 0".into()));
    assert_eq!(reader.read_raw_line().await.unwrap(), Some("partial".into()));
    assert_eq!(reader.read_line().await.unwrap(), ReadOutcome::Closed);
  }

  #[tokio::test]
  async fn test_reader_timeout_keeps_partial_line() {
    let (mut theirs, ours) = tokio::io::duplex(256);
    let mut reader = BackendReader::new(ours, Some(Duration::from_millis(50)));

    theirs.write_all(b"@P ").await.unwrap();
    assert_eq!(reader.read_line().await.unwrap(), ReadOutcome::Timeout);

    theirs.write_all(b"1\n").await.unwrap();
    assert_eq!(reader.read_line().await.unwrap(), ReadOutcome::Line("@P 1".into()));
  }
}
