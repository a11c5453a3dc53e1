//! Background listen loop feeding the controller

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::controller::Event;
use crate::error::RecognitionError;
use crate::voice::Listener;

/// Pause before retrying after the recognizer failed
pub const SERVICE_BACKOFF: Duration = Duration::from_secs(1);

/// Listen continuously and send each utterance to the controller
///
/// Utterances are lower-cased and sent in capture order. The recognizer
/// locale is re-read from `locale` before every listen. Returns when
/// `shutdown_rx` fires or the controller's channel is closed.
pub async fn run_listen_loop(
    listener: Arc<dyn Listener>,
    timeout: Duration,
    locale: watch::Receiver<String>,
    events: mpsc::UnboundedSender<Event>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    tracing::info!("listening for voice commands");

    loop {
        if events.is_closed() {
            break;
        }

        let current_locale = locale.borrow().clone();

        let heard = tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::debug!("listen loop shutdown requested");
                break;
            }
            heard = listener.listen(timeout, &current_locale) => heard,
        };

        match heard {
            Ok(text) => {
                let text = text.to_lowercase();
                tracing::info!(utterance = %text, locale = %current_locale, "heard");
                if events.send(Event::Utterance(text)).is_err() {
                    break;
                }
            }
            Err(RecognitionError::Timeout | RecognitionError::Unintelligible) => {}
            Err(RecognitionError::ServiceUnavailable(cause)) => {
                tracing::warn!(error = %cause, "speech recognition unavailable");
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    () = tokio::time::sleep(SERVICE_BACKOFF) => {}
                }
            }
        }
    }

    tracing::info!("listen loop stopped");
}
