//! Deterministic fakes shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use nanna::audio::{AudioHandle, Playback, PlaybackEvent};
use nanna::avatar::AnimationSynchronizer;
use nanna::config::{NannaConfig, TtsConfig};
use nanna::error::{GenerationError, SynthesisError};
use nanna::history::HistoryMessage;
use nanna::llm::TextGenerator;
use nanna::pipeline::orchestrator::Collaborators;
use nanna::settings::SharedSettings;
use nanna::stt::{CaptureFeed, ChannelCapture};
use nanna::tts::{
    JobHandle, PollPolicy, PollStatus, ProviderChain, ProviderKind, SpeechProvider,
    SynthesisOutcome,
};
use nanna::{RuntimeEvent, TurnId, TurnOrchestrator, TurnState};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// One scripted generation result.
#[derive(Debug, Clone)]
pub enum Step {
    Reply(String),
    Fail(GenerationError),
    /// Never resolves.
    Hang,
}

/// Generator that replays a script and records every call.
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<(Vec<HistoryMessage>, String)>>,
}

impl ScriptedGenerator {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(replies: &[&str]) -> Arc<Self> {
        Self::new(replies.iter().map(|r| Step::Reply((*r).to_owned())))
    }

    pub fn calls(&self) -> Vec<(Vec<HistoryMessage>, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        history: &[HistoryMessage],
        user_text: &str,
    ) -> Result<String, GenerationError> {
        self.calls
            .lock()
            .unwrap()
            .push((history.to_vec(), user_text.to_owned()));
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Step::Reply("Baaga cheppav!".to_owned()));
        match step {
            Step::Reply(text) => Ok(text),
            Step::Fail(error) => Err(error),
            Step::Hang => std::future::pending().await,
        }
    }
}

/// How a [`FakeProvider`] answers.
#[derive(Debug, Clone)]
pub enum Voice {
    Audio,
    Fail(SynthesisError),
    PendingForever,
}

/// Provider with a fixed behaviour and call counters.
pub struct FakeProvider {
    kind: ProviderKind,
    voice: Voice,
    calls: AtomicU32,
    polls: AtomicU32,
}

impl FakeProvider {
    pub fn new(kind: ProviderKind, voice: Voice) -> Arc<Self> {
        Arc::new(Self {
            kind,
            voice,
            calls: AtomicU32::new(0),
            polls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechProvider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn synthesize(
        &self,
        text: &str,
        _config: &TtsConfig,
    ) -> Result<SynthesisOutcome, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.voice {
            Voice::Audio => Ok(SynthesisOutcome::Audio(AudioHandle::Url(format!(
                "mem://{}/{}",
                self.kind,
                text.chars().count()
            )))),
            Voice::Fail(error) => Err(error.clone()),
            Voice::PendingForever => Ok(SynthesisOutcome::Pending(JobHandle {
                provider: self.kind,
                id: "clip-1".into(),
            })),
        }
    }

    async fn poll_status(
        &self,
        _job: &JobHandle,
        _config: &TtsConfig,
    ) -> Result<PollStatus, SynthesisError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(PollStatus::Pending)
    }
}

/// Playback that starts at once and ends after a fixed duration.
pub struct TimedPlayback {
    duration: Duration,
    plays: Mutex<Vec<AudioHandle>>,
    cancel: Mutex<CancellationToken>,
}

impl TimedPlayback {
    pub fn new(duration: Duration) -> Arc<Self> {
        Arc::new(Self {
            duration,
            plays: Mutex::new(Vec::new()),
            cancel: Mutex::new(CancellationToken::new()),
        })
    }

    pub fn plays(&self) -> Vec<AudioHandle> {
        self.plays.lock().unwrap().clone()
    }
}

impl Playback for TimedPlayback {
    fn play(&self, audio: AudioHandle) -> mpsc::Receiver<PlaybackEvent> {
        self.plays.lock().unwrap().push(audio);
        let token = CancellationToken::new();
        *self.cancel.lock().unwrap() = token.clone();
        let (tx, rx) = mpsc::channel(8);
        let duration = self.duration;
        tokio::spawn(async move {
            let _ = tx.send(PlaybackEvent::Started).await;
            let _ = tx.send(PlaybackEvent::Level(0.5)).await;
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(duration) => {
                    let _ = tx.send(PlaybackEvent::Ended).await;
                }
            }
        });
        rx
    }

    fn cancel(&self) {
        self.cancel.lock().unwrap().cancel();
    }
}

/// A wired orchestrator plus handles on its fakes.
pub struct Harness {
    pub orchestrator: TurnOrchestrator,
    pub feed: CaptureFeed,
    pub generator: Arc<ScriptedGenerator>,
    pub playback: Arc<TimedPlayback>,
    pub settings: SharedSettings,
    pub events: broadcast::Receiver<RuntimeEvent>,
}

pub struct HarnessBuilder {
    config: NannaConfig,
    generator: Arc<ScriptedGenerator>,
    providers: Vec<Arc<dyn SpeechProvider>>,
    playback: Duration,
    poll: PollPolicy,
}

impl HarnessBuilder {
    pub fn new(generator: Arc<ScriptedGenerator>) -> Self {
        let mut config = NannaConfig::default();
        config.animation.rng_seed = Some(42);
        Self {
            config,
            generator,
            providers: Vec::new(),
            playback: Duration::from_millis(500),
            poll: PollPolicy {
                interval: Duration::from_millis(500),
                max_attempts: 3,
            },
        }
    }

    pub fn config(mut self, f: impl FnOnce(&mut NannaConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn SpeechProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn playback(mut self, duration: Duration) -> Self {
        self.playback = duration;
        self
    }

    pub fn poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn build(self) -> Harness {
        let playback = TimedPlayback::new(self.playback);
        let mut chain = ProviderChain::builder(playback.clone()).poll_policy(self.poll);
        if !self.providers.iter().any(|p| p.kind() == ProviderKind::System) {
            chain = chain.provider(FakeProvider::new(ProviderKind::System, Voice::Audio));
        }
        for provider in self.providers {
            chain = chain.provider(provider);
        }
        let chain = chain.build().unwrap();

        let (capture, feed) = ChannelCapture::new();
        let settings = SharedSettings::new(self.config.tts.clone());
        let orchestrator = TurnOrchestrator::new(
            &self.config,
            Collaborators {
                capture: Arc::new(capture),
                generator: self.generator.clone(),
                chain: Arc::new(chain),
                animator: Arc::new(AnimationSynchronizer::new(self.config.animation.clone())),
                settings: Arc::new(settings.clone()),
            },
        );
        let events = orchestrator.subscribe();
        Harness {
            orchestrator,
            feed,
            generator: self.generator,
            playback,
            settings,
            events,
        }
    }
}

impl Harness {
    /// Collect events until `turn` returns to `Idle`.
    pub async fn run_to_idle(&mut self, turn: TurnId) -> Vec<RuntimeEvent> {
        let mut seen = Vec::new();
        tokio::time::timeout(Duration::from_secs(600), async {
            loop {
                let event = self.events.recv().await.unwrap();
                let done = matches!(
                    event,
                    RuntimeEvent::StateChanged { turn: Some(t), state: TurnState::Idle } if t == turn
                );
                seen.push(event);
                if done {
                    return;
                }
            }
        })
        .await
        .expect("turn never returned to idle");
        seen
    }
}

/// Index of the first event matching `pred`.
pub fn position(events: &[RuntimeEvent], pred: impl Fn(&RuntimeEvent) -> bool) -> Option<usize> {
    events.iter().position(pred)
}

/// States the turn passed through, in order.
pub fn states(events: &[RuntimeEvent]) -> Vec<TurnState> {
    events
        .iter()
        .filter_map(|e| match e {
            RuntimeEvent::StateChanged { state, .. } => Some(*state),
            _ => None,
        })
        .collect()
}
