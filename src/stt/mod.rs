//! Speech-capture adapter contract.
//!
//! The recogniser itself lives outside the core. The orchestrator starts a
//! capture session, reads [`CaptureEvent`]s until a final transcript, an
//! error or the end of the session, and never retries a failed capture.

use crate::config::CaptureConfig;
use crate::error::CaptureError;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

/// Events emitted by one capture session, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// The recogniser is listening.
    Started,
    /// Partial transcript while the user is still speaking.
    Interim(String),
    /// Final transcript for the utterance.
    Final(String),
    /// The session ended (after a result, a stop, or silence).
    Ended,
    /// The session failed.
    Error(CaptureError),
}

/// A speech recogniser the orchestrator can drive.
pub trait CaptureAdapter: Send + Sync {
    /// Begin a capture session. The returned stream ends when the session ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the recogniser cannot start at all.
    fn start(
        &self,
        config: &CaptureConfig,
    ) -> Result<mpsc::UnboundedReceiver<CaptureEvent>, CaptureError>;

    /// Stop listening; a final result for speech already heard may still arrive.
    fn stop(&self);

    /// Cancel the session without a result.
    fn abort(&self);
}

type Session = Arc<Mutex<Option<mpsc::UnboundedSender<CaptureEvent>>>>;

/// Capture adapter bridged to an external recogniser through a [`CaptureFeed`].
///
/// The recogniser (platform speech API, remote service, or a terminal) pushes
/// events into the feed; they are delivered to whichever session is active.
#[derive(Debug, Clone, Default)]
pub struct ChannelCapture {
    session: Session,
}

/// Producer side of a [`ChannelCapture`].
#[derive(Debug, Clone)]
pub struct CaptureFeed {
    session: Session,
}

impl ChannelCapture {
    /// Create an adapter and the feed that drives it.
    pub fn new() -> (Self, CaptureFeed) {
        let session: Session = Arc::new(Mutex::new(None));
        (
            Self {
                session: Arc::clone(&session),
            },
            CaptureFeed { session },
        )
    }

    fn take_session(&self) -> Option<mpsc::UnboundedSender<CaptureEvent>> {
        match self.session.lock() {
            Ok(mut g) => g.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

impl CaptureAdapter for ChannelCapture {
    fn start(
        &self,
        config: &CaptureConfig,
    ) -> Result<mpsc::UnboundedReceiver<CaptureEvent>, CaptureError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(CaptureEvent::Started);
        let mut guard = self
            .session
            .lock()
            .map_err(|_| CaptureError::Other("capture session lock poisoned".into()))?;
        *guard = Some(tx);
        debug!(lang = config.lang.as_str(), "capture session started");
        Ok(rx)
    }

    fn stop(&self) {
        if let Some(tx) = self.take_session() {
            let _ = tx.send(CaptureEvent::Ended);
            debug!("capture session stopped");
        }
    }

    fn abort(&self) {
        if self.take_session().is_some() {
            debug!("capture session aborted");
        }
    }
}

impl CaptureFeed {
    /// Deliver an event to the active session. Returns `false` when no
    /// session is listening. `Ended` and `Error` close the session.
    pub fn send(&self, event: CaptureEvent) -> bool {
        let mut guard = match self.session.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let closes = matches!(event, CaptureEvent::Ended | CaptureEvent::Error(_));
        let delivered = guard.as_ref().is_some_and(|tx| tx.send(event).is_ok());
        if closes || !delivered {
            *guard = None;
        }
        delivered
    }

    /// Whether a capture session is currently listening.
    pub fn is_listening(&self) -> bool {
        match self.session.lock() {
            Ok(g) => g.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }
}
