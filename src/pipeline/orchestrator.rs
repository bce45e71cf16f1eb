//! Single-flight turn orchestration.
//!
//! ```text
//! Idle ─► Listening ─► Thinking ─► Speaking ─► Idle
//!   │                     ▲           │
//!   └── submit_text ──────┘           └─(failure)─► Error ─► Idle
//! ```
//!
//! Each turn runs in one spawned task that owns the capture stream, the
//! generation call and the synthesis stream in sequence. The orchestrator
//! keeps the active turn behind a mutex; every transition re-checks that the
//! task's turn is still the active one, so a task whose turn was interrupted
//! never touches history, state or the animator again.

use crate::avatar::AnimationSynchronizer;
use crate::config::{CaptureConfig, NannaConfig};
use crate::error::{CaptureError, GenerationError, SynthesisError};
use crate::history::{ConversationHistory, Exchange};
use crate::llm::TextGenerator;
use crate::pipeline::messages::{Turn, TurnId, TurnState};
use crate::runtime::RuntimeEvent;
use crate::sentiment::{Emotion, detect_emotion};
use crate::settings::SettingsStore;
use crate::stt::{CaptureAdapter, CaptureEvent};
use crate::tts::{ProviderChain, ProviderKind, SynthesisEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Phrase spoken by [`TurnOrchestrator::speak_test_phrase`].
pub const TEST_PHRASE: &str = "Ra Chinna, nenu Nanna. Test successful!";

const APOLOGY_PREFIX: &str = "Chinna, something went wrong ra.";
const EVENT_CHANNEL_SIZE: usize = 256;

/// Why a new turn was not started.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TurnRejected {
    /// Another turn is in flight.
    #[error("a turn is already in progress ({0})")]
    Busy(TurnState),
    /// The submitted text was empty.
    #[error("nothing to say")]
    EmptyInput,
    /// The capture adapter could not start.
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// The external collaborators a [`TurnOrchestrator`] drives.
pub struct Collaborators {
    /// Speech capture.
    pub capture: Arc<dyn CaptureAdapter>,
    /// Reply generation.
    pub generator: Arc<dyn TextGenerator>,
    /// Speech synthesis and playback.
    pub chain: Arc<ProviderChain>,
    /// Avatar animation.
    pub animator: Arc<AnimationSynchronizer>,
    /// Synthesis settings, read per reply.
    pub settings: Arc<dyn SettingsStore>,
}

/// Runs conversational turns one at a time.
///
/// Cloning yields another handle to the same orchestrator.
#[derive(Clone)]
pub struct TurnOrchestrator {
    inner: Arc<Inner>,
}

struct ActiveTurn {
    turn: Turn,
    cancel: CancellationToken,
}

struct Inner {
    capture: Arc<dyn CaptureAdapter>,
    generator: Arc<dyn TextGenerator>,
    chain: Arc<ProviderChain>,
    animator: Arc<AnimationSynchronizer>,
    settings: Arc<dyn SettingsStore>,
    capture_config: CaptureConfig,
    auto_speak: bool,
    generation_timeout: Duration,
    history: Mutex<ConversationHistory>,
    active: Mutex<Option<ActiveTurn>>,
    state: watch::Sender<TurnState>,
    events: broadcast::Sender<RuntimeEvent>,
    next_id: AtomicU64,
}

enum SpeechOutcome {
    Ended(ProviderKind),
    Failed(SynthesisError),
}

impl TurnOrchestrator {
    /// Create an idle orchestrator.
    pub fn new(config: &NannaConfig, parts: Collaborators) -> Self {
        let (state, _) = watch::channel(TurnState::Idle);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            inner: Arc::new(Inner {
                capture: parts.capture,
                generator: parts.generator,
                chain: parts.chain,
                animator: parts.animator,
                settings: parts.settings,
                capture_config: config.capture.clone(),
                auto_speak: config.conversation.auto_speak,
                generation_timeout: config.llm.timeout(),
                history: Mutex::new(ConversationHistory::new(config.conversation.max_turns)),
                active: Mutex::new(None),
                state,
                events,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> TurnState {
        *self.inner.state.borrow()
    }

    /// Follow state changes.
    pub fn watch_state(&self) -> watch::Receiver<TurnState> {
        self.inner.state.subscribe()
    }

    /// Receive runtime events.
    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.inner.events.subscribe()
    }

    /// Snapshot of the conversation history, oldest first.
    pub fn history(&self) -> Vec<Exchange> {
        self.inner.lock_history().exchanges().cloned().collect()
    }

    /// The turn in flight, if any.
    pub fn current_turn(&self) -> Option<Turn> {
        self.inner.lock_active().as_ref().map(|a| a.turn.clone())
    }

    /// The animator driven by this orchestrator.
    pub fn animator(&self) -> &Arc<AnimationSynchronizer> {
        &self.inner.animator
    }

    /// Start listening for a spoken turn.
    ///
    /// # Errors
    ///
    /// [`TurnRejected::Busy`] unless idle; [`TurnRejected::Capture`] if the
    /// capture adapter cannot start.
    pub fn start_capture(&self) -> Result<TurnId, TurnRejected> {
        let inner = &self.inner;
        let mut active = inner.lock_active();
        if let Some(current) = active.as_ref() {
            debug!(state = %current.turn.state, "capture rejected: turn in flight");
            return Err(TurnRejected::Busy(current.turn.state));
        }

        let id = inner.allocate_id();
        let events = match inner.capture.start(&inner.capture_config) {
            Ok(events) => events,
            Err(error) => {
                warn!(turn = %id, "capture could not start: {error}");
                inner.emit(RuntimeEvent::CaptureFailed {
                    turn: id,
                    error: error.clone(),
                });
                return Err(TurnRejected::Capture(error));
            }
        };

        let cancel = inner.install(&mut active, Turn::new(id, TurnState::Listening, ""));
        drop(active);
        info!(turn = %id, "listening");

        let task = Arc::clone(inner);
        tokio::spawn(async move { task.run_capture(id, events, cancel).await });
        Ok(id)
    }

    /// Release push-to-talk. A final transcript may still arrive.
    pub fn stop_capture(&self) {
        let active = self.inner.lock_active();
        if active
            .as_ref()
            .is_some_and(|a| a.turn.state == TurnState::Listening)
        {
            debug!("capture stop requested");
            self.inner.capture.stop();
        }
    }

    /// Start a turn from typed text.
    ///
    /// # Errors
    ///
    /// [`TurnRejected::EmptyInput`] for blank text; [`TurnRejected::Busy`]
    /// unless idle.
    pub fn submit_text(&self, text: &str) -> Result<TurnId, TurnRejected> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TurnRejected::EmptyInput);
        }
        let (id, cancel) = self.inner.begin(TurnState::Thinking, text)?;
        info!(turn = %id, "typed turn");

        let task = Arc::clone(&self.inner);
        let text = text.to_owned();
        tokio::spawn(async move { task.run_reply(id, text, cancel).await });
        Ok(id)
    }

    /// Speak [`TEST_PHRASE`] as a standalone turn. History is untouched.
    ///
    /// # Errors
    ///
    /// [`TurnRejected::Busy`] unless idle.
    pub fn speak_test_phrase(&self) -> Result<TurnId, TurnRejected> {
        let (id, cancel) = self.inner.begin(TurnState::Speaking, "")?;
        info!(turn = %id, "speaking test phrase");

        let task = Arc::clone(&self.inner);
        tokio::spawn(async move { task.speak(id, TEST_PHRASE.to_owned(), cancel).await });
        Ok(id)
    }

    /// Abandon the turn in flight and return to `Idle` immediately.
    ///
    /// Capture is aborted, a pending reply is discarded, synthesis and
    /// animation are stopped.
    pub fn interrupt(&self) {
        let inner = &self.inner;
        let mut active = inner.lock_active();
        let Some(current) = active.take() else {
            debug!("interrupt with no turn in flight");
            return;
        };
        current.cancel.cancel();
        let id = current.turn.id;
        let was = current.turn.state;
        info!(turn = %id, state = %was, "turn interrupted");

        if was == TurnState::Listening {
            inner.capture.abort();
        }
        inner.chain.cancel();
        inner.animator.stop(Emotion::Neutral);
        if was == TurnState::Speaking {
            inner.emit(RuntimeEvent::AnimationStopped { turn: id });
        }
        inner.emit(RuntimeEvent::Interrupted { turn: id });
        inner.publish_state(Some(id), TurnState::Idle);
    }

    /// Forget the conversation so far.
    pub fn clear_history(&self) {
        self.inner.lock_history().clear();
        info!("history cleared");
        self.inner.emit(RuntimeEvent::HistoryCleared);
    }
}

impl Inner {
    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveTurn>> {
        match self.active.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_history(&self) -> MutexGuard<'_, ConversationHistory> {
        match self.history.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn emit(&self, event: RuntimeEvent) {
        let _ = self.events.send(event);
    }

    fn publish_state(&self, turn: Option<TurnId>, state: TurnState) {
        self.state.send_replace(state);
        self.emit(RuntimeEvent::StateChanged { turn, state });
    }

    fn allocate_id(&self) -> TurnId {
        TurnId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn install(&self, active: &mut Option<ActiveTurn>, turn: Turn) -> CancellationToken {
        let cancel = CancellationToken::new();
        let (id, state) = (turn.id, turn.state);
        *active = Some(ActiveTurn {
            turn,
            cancel: cancel.clone(),
        });
        self.publish_state(Some(id), state);
        cancel
    }

    /// Claim the single turn slot.
    fn begin(
        &self,
        state: TurnState,
        user_text: &str,
    ) -> Result<(TurnId, CancellationToken), TurnRejected> {
        let mut active = self.lock_active();
        if let Some(current) = active.as_ref() {
            debug!(state = %current.turn.state, "turn rejected: turn in flight");
            return Err(TurnRejected::Busy(current.turn.state));
        }
        let id = self.allocate_id();
        let cancel = self.install(&mut active, Turn::new(id, state, user_text));
        Ok((id, cancel))
    }

    /// Run `f` on the active turn if it is still `id`.
    fn with_current<R>(&self, id: TurnId, f: impl FnOnce(&mut Turn) -> R) -> Option<R> {
        let mut active = self.lock_active();
        match active.as_mut() {
            Some(current) if current.turn.id == id && !current.cancel.is_cancelled() => {
                Some(f(&mut current.turn))
            }
            _ => None,
        }
    }

    /// Move turn `id` to `state`. False if the turn is no longer active.
    fn advance(&self, id: TurnId, state: TurnState) -> bool {
        self.with_current(id, |turn| {
            if turn.state != state {
                turn.state = state;
                self.publish_state(Some(id), state);
            }
        })
        .is_some()
    }

    /// End turn `id`, passing through `Error` when it failed.
    fn finish(&self, id: TurnId, failed: bool) -> bool {
        let mut active = self.lock_active();
        self.finish_locked(&mut active, id, failed)
    }

    fn finish_locked(
        &self,
        active: &mut Option<ActiveTurn>,
        id: TurnId,
        failed: bool,
    ) -> bool {
        if !active
            .as_ref()
            .is_some_and(|a| a.turn.id == id && !a.cancel.is_cancelled())
        {
            return false;
        }
        *active = None;
        if failed {
            self.publish_state(Some(id), TurnState::Error);
        }
        self.publish_state(Some(id), TurnState::Idle);
        debug!(turn = %id, failed, "turn finished");
        true
    }

    async fn run_capture(
        &self,
        id: TurnId,
        mut events: mpsc::UnboundedReceiver<CaptureEvent>,
        cancel: CancellationToken,
    ) {
        let limit = self.capture_config.timeout();
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                event = tokio::time::timeout_at(deadline, events.recv()) => event,
            };
            let Ok(event) = event else {
                warn!(turn = %id, "no transcript within {}s", limit.as_secs());
                self.capture.abort();
                self.fail_capture(
                    id,
                    CaptureError::Timeout {
                        secs: limit.as_secs(),
                    },
                );
                return;
            };
            match event {
                Some(CaptureEvent::Started) => debug!(turn = %id, "capture started"),
                Some(CaptureEvent::Interim(text)) => {
                    self.emit(RuntimeEvent::Interim { turn: id, text });
                }
                Some(CaptureEvent::Final(text)) => {
                    let text = text.trim();
                    if text.is_empty() {
                        info!(turn = %id, "empty transcript");
                        self.fail_capture(id, CaptureError::NoSpeech);
                    } else {
                        self.run_reply(id, text.to_owned(), cancel).await;
                    }
                    return;
                }
                Some(CaptureEvent::Error(error)) => {
                    warn!(turn = %id, "capture failed: {error}");
                    self.fail_capture(id, error);
                    return;
                }
                Some(CaptureEvent::Ended) | None => {
                    debug!(turn = %id, "capture ended without a transcript");
                    self.finish(id, false);
                    return;
                }
            }
        }
    }

    fn fail_capture(&self, id: TurnId, error: CaptureError) {
        let mut active = self.lock_active();
        if active.as_ref().is_some_and(|a| a.turn.id == id) {
            self.emit(RuntimeEvent::CaptureFailed { turn: id, error });
            self.finish_locked(&mut active, id, true);
        }
    }

    async fn run_reply(&self, id: TurnId, text: String, cancel: CancellationToken) {
        let context = self.with_current(id, |turn| {
            turn.user_text.clone_from(&text);
            let mut history = self.lock_history();
            let context = history.messages();
            history.push_user(id, &text);
            context
        });
        let Some(context) = context else { return };
        self.emit(RuntimeEvent::Transcript {
            turn: id,
            text: text.clone(),
        });
        if !self.advance(id, TurnState::Thinking) {
            return;
        }

        debug!(turn = %id, context = context.len(), "generating reply");
        let secs = self.generation_timeout.as_secs();
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(turn = %id, "reply discarded");
                return;
            }
            result = tokio::time::timeout(
                self.generation_timeout,
                self.generator.generate(&context, &text),
            ) => result.unwrap_or_else(|_| Err(GenerationError::Timeout { secs })),
        };

        match result {
            Ok(reply) => {
                let recorded = self.with_current(id, |turn| {
                    turn.reply_text = Some(reply.clone());
                    self.lock_history().push_reply(id, &reply);
                    self.emit(RuntimeEvent::Reply {
                        turn: id,
                        text: reply.clone(),
                    });
                });
                if recorded.is_none() {
                    return;
                }
                info!(turn = %id, chars = reply.chars().count(), "reply ready");
                if self.auto_speak {
                    self.speak(id, reply, cancel).await;
                } else {
                    self.finish(id, false);
                }
            }
            Err(error) => {
                warn!(turn = %id, "generation failed: {error}");
                let mut active = self.lock_active();
                if active.as_ref().is_some_and(|a| a.turn.id == id) {
                    self.emit(RuntimeEvent::GenerationFailed {
                        turn: id,
                        error: error.clone(),
                    });
                    self.emit(RuntimeEvent::Apology {
                        turn: id,
                        text: apology(&error.to_string()),
                    });
                    self.finish_locked(&mut active, id, true);
                }
            }
        }
    }

    async fn speak(&self, id: TurnId, reply: String, cancel: CancellationToken) {
        if !self.advance(id, TurnState::Speaking) {
            return;
        }
        let emotion = detect_emotion(&reply);
        let mut events = self.chain.synthesize(&reply, self.settings.tts_snapshot());
        let mut animating = false;

        let outcome = loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                event = events.recv() => event,
            };
            match event {
                Some(SynthesisEvent::Started { provider }) => {
                    self.emit(RuntimeEvent::SynthesisStarted { turn: id, provider });
                }
                Some(SynthesisEvent::FallingBack { from, to, reason }) => {
                    self.emit(RuntimeEvent::ProviderFallback {
                        turn: id,
                        from,
                        to,
                        reason,
                    });
                }
                Some(SynthesisEvent::AudioReady { provider, .. }) => {
                    debug!(turn = %id, %provider, "audio ready");
                }
                Some(SynthesisEvent::PlaybackStarted { provider }) => {
                    self.emit(RuntimeEvent::PlaybackStarted { turn: id, provider });
                    if !animating {
                        animating = self
                            .with_current(id, |_| {
                                self.animator.start_for_playback(&reply);
                                self.emit(RuntimeEvent::AnimationStarted { turn: id });
                            })
                            .is_some();
                    }
                }
                Some(SynthesisEvent::Level(level)) => self.animator.push_level(level),
                Some(SynthesisEvent::Ended { provider }) => break SpeechOutcome::Ended(provider),
                Some(SynthesisEvent::Failed(error)) => break SpeechOutcome::Failed(error),
                None => {
                    break SpeechOutcome::Failed(SynthesisError::Playback(
                        "synthesis stream closed".into(),
                    ));
                }
            }
        };

        self.end_speaking(id, outcome, emotion);
    }

    /// Report the synthesis outcome, stop the animator, return to `Idle`.
    fn end_speaking(&self, id: TurnId, outcome: SpeechOutcome, emotion: Emotion) {
        let mut active = self.lock_active();
        if !active
            .as_ref()
            .is_some_and(|a| a.turn.id == id && !a.cancel.is_cancelled())
        {
            return;
        }

        let failed = match outcome {
            SpeechOutcome::Ended(provider) => {
                info!(turn = %id, %provider, "reply spoken");
                self.emit(RuntimeEvent::SynthesisEnded { turn: id, provider });
                self.animator.stop(emotion);
                self.emit(RuntimeEvent::AnimationStopped { turn: id });
                false
            }
            SpeechOutcome::Failed(error) => {
                warn!(turn = %id, "speech failed: {error}");
                self.emit(RuntimeEvent::SynthesisFailed {
                    turn: id,
                    error: error.clone(),
                });
                self.animator.stop(Emotion::Neutral);
                self.emit(RuntimeEvent::AnimationStopped { turn: id });
                self.emit(RuntimeEvent::Apology {
                    turn: id,
                    text: apology(&error.to_string()),
                });
                true
            }
        };
        self.finish_locked(&mut active, id, failed);
    }
}

/// Apology shown when a turn fails.
pub fn apology(detail: &str) -> String {
    if detail.is_empty() {
        APOLOGY_PREFIX.to_owned()
    } else {
        format!("{APOLOGY_PREFIX} {detail}")
    }
}
