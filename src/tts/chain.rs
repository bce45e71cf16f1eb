//! Provider selection, polling, one-hop fallback and playback.
//!
//! A call to [`ProviderChain::synthesize`] runs in its own task and reports
//! progress on a bounded channel. The stream always opens with
//! [`SynthesisEvent::Started`] and closes with exactly one terminal event,
//! [`SynthesisEvent::Ended`] or [`SynthesisEvent::Failed`].

use super::{
    DEFAULT_PROVIDER, JobHandle, PollStatus, ProviderKind, SpeechProvider, SynthesisOutcome,
};
use crate::audio::{AudioHandle, Playback, PlaybackEvent};
use crate::config::TtsConfig;
use crate::error::SynthesisError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const EVENT_CHANNEL_SIZE: usize = 64;

/// How long pending jobs are polled before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay before each poll.
    pub interval: Duration,
    /// Polls made before the attempt fails with a timeout.
    pub max_attempts: u32,
}

impl PollPolicy {
    /// Policy from the configured interval and attempt bound.
    pub fn from_config(config: &TtsConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.poll_interval_ms),
            max_attempts: config.max_poll_attempts,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from_config(&TtsConfig::default())
    }
}

/// Progress of one synthesis request.
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisEvent {
    /// Emitted once, before any provider is contacted.
    Started {
        /// Provider selected from the configuration snapshot.
        provider: ProviderKind,
    },
    /// The active provider failed and the default provider is being tried.
    FallingBack {
        /// Provider that failed.
        from: ProviderKind,
        /// Provider being tried next.
        to: ProviderKind,
        /// Why the first attempt failed.
        reason: SynthesisError,
    },
    /// A provider produced audio.
    AudioReady {
        /// Provider that produced it.
        provider: ProviderKind,
        /// The audio handed to playback.
        audio: AudioHandle,
    },
    /// Playback is audible.
    PlaybackStarted {
        /// Provider whose audio is playing.
        provider: ProviderKind,
    },
    /// Output amplitude sample, `0.0..=1.0`.
    Level(f32),
    /// Playback finished normally. Terminal.
    Ended {
        /// Provider whose audio played.
        provider: ProviderKind,
    },
    /// The request failed or was cancelled. Terminal.
    Failed(SynthesisError),
}

impl SynthesisEvent {
    /// Whether this event closes the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended { .. } | Self::Failed(_))
    }
}

type ProviderMap = HashMap<ProviderKind, Arc<dyn SpeechProvider>>;

/// Builder for [`ProviderChain`].
pub struct ProviderChainBuilder {
    providers: ProviderMap,
    playback: Arc<dyn Playback>,
    policy: PollPolicy,
}

impl ProviderChainBuilder {
    /// Register a provider, replacing any earlier one of the same kind.
    pub fn provider(mut self, provider: Arc<dyn SpeechProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    /// Register the system voice and the three cloned-voice HTTP providers.
    pub fn with_builtin_providers(self) -> Self {
        self.provider(Arc::new(super::SystemVoiceProvider))
            .provider(Arc::new(super::ElevenLabsProvider::new()))
            .provider(Arc::new(super::ResembleProvider::new()))
            .provider(Arc::new(super::CoquiProvider::new()))
    }

    /// Override the polling policy.
    pub fn poll_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Finish the chain. The default provider must be registered.
    pub fn build(self) -> Result<ProviderChain, SynthesisError> {
        if !self.providers.contains_key(&DEFAULT_PROVIDER) {
            return Err(SynthesisError::Unavailable(DEFAULT_PROVIDER));
        }
        Ok(ProviderChain {
            providers: Arc::new(self.providers),
            playback: self.playback,
            policy: self.policy,
            current: Mutex::new(None),
        })
    }
}

/// Runs synthesis requests against the configured provider with fallback.
pub struct ProviderChain {
    providers: Arc<ProviderMap>,
    playback: Arc<dyn Playback>,
    policy: PollPolicy,
    current: Mutex<Option<CancellationToken>>,
}

impl ProviderChain {
    /// Start building a chain that plays through `playback`.
    pub fn builder(playback: Arc<dyn Playback>) -> ProviderChainBuilder {
        ProviderChainBuilder {
            providers: HashMap::new(),
            playback,
            policy: PollPolicy::default(),
        }
    }

    /// Polling policy in effect.
    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Registered providers.
    pub fn providers(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<_> = self.providers.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    /// Speak `text` using the provider selected in `config`.
    ///
    /// Any request still running is cancelled first.
    pub fn synthesize(&self, text: &str, config: TtsConfig) -> mpsc::Receiver<SynthesisEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let cancel = CancellationToken::new();
        self.replace_token(Some(cancel.clone()));
        let run = ChainRun {
            providers: Arc::clone(&self.providers),
            playback: Arc::clone(&self.playback),
            policy: self.policy,
            cancel,
            tx,
        };
        tokio::spawn(run.run(text.to_owned(), config));
        rx
    }

    /// Cancel the request in flight, if any, and stop playback.
    pub fn cancel(&self) {
        self.replace_token(None);
    }

    fn replace_token(&self, next: Option<CancellationToken>) {
        let mut guard = match self.current.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let previous = std::mem::replace(&mut *guard, next);
        drop(guard);
        if let Some(previous) = previous {
            if !previous.is_cancelled() {
                debug!("cancelling in-flight synthesis");
            }
            previous.cancel();
            self.playback.cancel();
        }
    }
}

enum AttemptError {
    BeforePlayback(SynthesisError),
    DuringPlayback(SynthesisError),
}

impl AttemptError {
    fn at(started: bool, err: SynthesisError) -> Self {
        if started {
            Self::DuringPlayback(err)
        } else {
            Self::BeforePlayback(err)
        }
    }

    fn into_inner(self) -> SynthesisError {
        match self {
            Self::BeforePlayback(e) | Self::DuringPlayback(e) => e,
        }
    }
}

struct ChainRun {
    providers: Arc<ProviderMap>,
    playback: Arc<dyn Playback>,
    policy: PollPolicy,
    cancel: CancellationToken,
    tx: mpsc::Sender<SynthesisEvent>,
}

impl ChainRun {
    async fn emit(&self, event: SynthesisEvent) {
        let _ = self.tx.send(event).await;
    }

    async fn run(self, text: String, config: TtsConfig) {
        let active = config.provider;
        self.emit(SynthesisEvent::Started { provider: active }).await;

        let terminal = match self.attempt(active, &text, &config).await {
            Ok(()) => SynthesisEvent::Ended { provider: active },
            Err(AttemptError::BeforePlayback(reason))
                if reason.is_fallback_eligible() && !active.is_default() =>
            {
                warn!("{active} failed, falling back to {DEFAULT_PROVIDER}: {reason}");
                self.emit(SynthesisEvent::FallingBack {
                    from: active,
                    to: DEFAULT_PROVIDER,
                    reason,
                })
                .await;
                match self.attempt(DEFAULT_PROVIDER, &text, &config).await {
                    Ok(()) => SynthesisEvent::Ended {
                        provider: DEFAULT_PROVIDER,
                    },
                    Err(e) => SynthesisEvent::Failed(e.into_inner()),
                }
            }
            Err(e) => SynthesisEvent::Failed(e.into_inner()),
        };

        match &terminal {
            SynthesisEvent::Failed(SynthesisError::Cancelled) => debug!("synthesis cancelled"),
            SynthesisEvent::Failed(e) => warn!("synthesis failed: {e}"),
            _ => debug!("synthesis finished"),
        }
        self.emit(terminal).await;
    }

    async fn attempt(
        &self,
        kind: ProviderKind,
        text: &str,
        config: &TtsConfig,
    ) -> Result<(), AttemptError> {
        let provider = self
            .providers
            .get(&kind)
            .cloned()
            .ok_or(AttemptError::BeforePlayback(SynthesisError::Unavailable(
                kind,
            )))?;

        info!("synthesizing {} chars with {kind}", text.chars().count());
        let outcome = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                return Err(AttemptError::BeforePlayback(SynthesisError::Cancelled));
            }
            result = provider.synthesize(text, config) => {
                result.map_err(AttemptError::BeforePlayback)?
            }
        };

        let audio = match outcome {
            SynthesisOutcome::Audio(audio) => audio,
            SynthesisOutcome::Pending(job) => self
                .poll_until_ready(provider.as_ref(), &job, config)
                .await
                .map_err(AttemptError::BeforePlayback)?,
        };

        self.emit(SynthesisEvent::AudioReady {
            provider: kind,
            audio: audio.clone(),
        })
        .await;
        self.play(kind, audio).await
    }

    async fn poll_until_ready(
        &self,
        provider: &dyn SpeechProvider,
        job: &JobHandle,
        config: &TtsConfig,
    ) -> Result<AudioHandle, SynthesisError> {
        let kind = provider.kind();
        for attempt in 1..=self.policy.max_attempts {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(SynthesisError::Cancelled),
                () = tokio::time::sleep(self.policy.interval) => {}
            }

            let status = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(SynthesisError::Cancelled),
                status = provider.poll_status(job, config) => status?,
            };

            match status {
                PollStatus::Pending => debug!(attempt, job = job.id.as_str(), "job pending"),
                PollStatus::Ready(audio) => {
                    info!("{kind} job {} ready after {attempt} polls", job.id);
                    return Ok(audio);
                }
                PollStatus::Failed(reason) => {
                    return Err(SynthesisError::JobFailed {
                        provider: kind,
                        reason,
                    });
                }
            }
        }
        Err(SynthesisError::PollTimeout {
            provider: kind,
            attempts: self.policy.max_attempts,
        })
    }

    async fn play(&self, kind: ProviderKind, audio: AudioHandle) -> Result<(), AttemptError> {
        let mut events = self.playback.play(audio);
        let mut started = false;
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    return Err(AttemptError::at(started, SynthesisError::Cancelled));
                }
                event = events.recv() => match event {
                    Some(PlaybackEvent::Started) => {
                        if !started {
                            started = true;
                            self.emit(SynthesisEvent::PlaybackStarted { provider: kind }).await;
                        }
                    }
                    Some(PlaybackEvent::Level(level)) => {
                        self.emit(SynthesisEvent::Level(level)).await;
                    }
                    Some(PlaybackEvent::Ended) if started => return Ok(()),
                    Some(PlaybackEvent::Ended) => {
                        return Err(AttemptError::BeforePlayback(SynthesisError::Playback(
                            "playback ended before it started".into(),
                        )));
                    }
                    Some(PlaybackEvent::Failed(reason)) => {
                        return Err(AttemptError::at(started, SynthesisError::Playback(reason)));
                    }
                    None => {
                        return Err(AttemptError::at(
                            started,
                            SynthesisError::Playback("playback stream closed".into()),
                        ));
                    }
                }
            }
        }
    }
}
