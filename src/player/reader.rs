//! Background task turning backend status lines into state changes and events.

use std::sync::Weak;

use tokio::io::AsyncRead;

use super::client::{Player, PlayerError, Shared};
use super::events::EventContext;
use super::state::PlayerStatus;
use crate::backend::{
  classify_error, classify_status, error_message, Action, BackendReader, LineClass, ReadOutcome,
};

/// Process status lines until the backend closes its output, the player quits,
/// a read fails or the backend reports an error.
///
/// Holds the player weakly so dropping every handle kills the process, which
/// in turn ends this loop.
pub(crate) async fn reader_loop<R>(
  mut reader: BackendReader<R>,
  player: Weak<Shared>,
) -> Result<(), PlayerError>
where
  R: AsyncRead + Unpin,
{
  log::info!("Player reader loop started");

  loop {
    let line = match reader.read_line().await? {
      ReadOutcome::Line(line) => line,
      ReadOutcome::Timeout => {
        log::trace!("No backend output within timeout");
        continue;
      }
      ReadOutcome::Closed => {
        log::info!("Backend output closed");
        break;
      }
    };

    let Some(shared) = player.upgrade() else {
      log::debug!("Player dropped, reader loop exiting");
      break;
    };
    let status = shared.state.lock().status();
    if status == PlayerStatus::Quitted {
      log::info!("Player quitted, reader loop exiting");
      break;
    }

    match classify_status(shared.backend, &line) {
      LineClass::Unrecognized => log::debug!("Ignoring unrecognized line: {}", line),
      LineClass::Ignorable => log::trace!("Ignoring status line: {}", line),
      LineClass::Action(Action::Error) => {
        let mut message = error_message(&line).to_string();
        if message.is_empty() {
          message = reader.read_raw_line().await?.unwrap_or_default();
        }
        let kind = classify_error(&message);
        log::error!("Backend reported {}: {}", kind, message);

        let player = Player::from_shared(shared.clone());
        let context = EventContext::error(player, kind, message.clone());
        shared.dispatcher.report_error(&context);

        if shared.stop_on_backend_error {
          return Err(PlayerError::Backend { kind, message });
        }
      }
      LineClass::Action(action) => {
        log::debug!("Backend action {:?} from line: {}", action, line);
        let transition = shared.state.lock().apply(action);

        if let Some(command) = &transition.replay {
          log::info!("Looping song: {}", command);
          if let Err(e) = shared.writer.write_line(&command.to_string()) {
            log::warn!("Failed to replay song: {}", e);
          }
        }

        if transition.events.is_empty() {
          continue;
        }
        let context = EventContext::new(Player::from_shared(shared.clone()));
        for event in transition.events {
          shared.dispatcher.emit(event, &context);
        }
      }
    }
  }

  Ok(())
}
