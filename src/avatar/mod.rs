//! Avatar animation synchronized with speech playback.
//!
//! [`AnimationSynchronizer`] owns at most one animation loop. A loop pulls
//! expressions from a [`FrameStrategy`] and publishes them on a watch
//! channel. Starting a loop stops the previous one; stopping resets the face
//! to neutral, or holds a smile briefly for a cheerful reply.
//!
//! Every published frame is stamped with the epoch of the loop that produced
//! it. Start and stop advance the epoch under the channel lock, so a loop that
//! was stopped can never publish afterwards.

mod assets;
mod strategy;

pub use assets::ExpressionAssets;
pub use strategy::{AmplitudeStrategy, FrameStrategy, TextTimedStrategy};

use crate::config::{AnimationConfig, AnimationMode};
use crate::sentiment::{Emotion, detect_emotion};
use crate::viseme::{Expression, estimate_speaking_duration, text_plan};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const LEVEL_CHANNEL_SIZE: usize = 32;

struct Shared {
    frames: watch::Sender<Expression>,
    epoch: AtomicU64,
    assets: Option<ExpressionAssets>,
}

impl Shared {
    fn can_show(&self, expression: Expression) -> bool {
        expression == Expression::Neutral
            || self
                .assets
                .as_ref()
                .is_none_or(|a| a.is_available(expression))
    }

    /// Publish `expression` if `epoch` is still current.
    fn show(&self, epoch: u64, expression: Expression) -> bool {
        if !self.can_show(expression) {
            debug!("no image for {}, frame skipped", expression.name());
            return false;
        }
        self.frames.send_if_modified(|current| {
            if self.epoch.load(Ordering::SeqCst) != epoch || *current == expression {
                return false;
            }
            *current = expression;
            true
        })
    }

    /// Start a new epoch showing `expression`. Returns the new epoch.
    fn advance(&self, expression: Expression) -> u64 {
        let mut next = 0;
        self.frames.send_modify(|current| {
            next = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            *current = expression;
        });
        next
    }
}

struct ActiveLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    levels: Option<mpsc::Sender<f32>>,
}

/// Drives the avatar's expression from reply text or live amplitude.
pub struct AnimationSynchronizer {
    config: AnimationConfig,
    shared: Arc<Shared>,
    rng: Mutex<StdRng>,
    active: Mutex<Option<ActiveLoop>>,
}

impl AnimationSynchronizer {
    /// Create a synchronizer. Uses `config.rng_seed` when set.
    pub fn new(config: AnimationConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (frames, _) = watch::channel(Expression::Neutral);
        Self {
            config,
            shared: Arc::new(Shared {
                frames,
                epoch: AtomicU64::new(0),
                assets: None,
            }),
            rng: Mutex::new(rng),
            active: Mutex::new(None),
        }
    }

    /// Only show expressions that have a loaded image.
    pub fn with_assets(mut self, assets: ExpressionAssets) -> Self {
        let (frames, _) = watch::channel(*self.shared.frames.borrow());
        self.shared = Arc::new(Shared {
            frames,
            epoch: AtomicU64::new(0),
            assets: Some(assets),
        });
        self
    }

    /// Animation settings.
    pub fn config(&self) -> &AnimationConfig {
        &self.config
    }

    /// Expression currently shown.
    pub fn current(&self) -> Expression {
        *self.shared.frames.borrow()
    }

    /// Follow expression changes.
    pub fn subscribe(&self) -> watch::Receiver<Expression> {
        self.shared.frames.subscribe()
    }

    /// Whether an animation loop is running.
    pub fn is_running(&self) -> bool {
        self.lock_active()
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }

    /// Start the configured strategy for speech of `text` that just became
    /// audible.
    pub fn start_for_playback(&self, text: &str) {
        match self.config.mode {
            AnimationMode::Text => {
                let duration = estimate_speaking_duration(text, self.config.ms_per_char);
                self.start_text(text, duration);
            }
            AnimationMode::Amplitude => self.start_amplitude(),
        }
    }

    /// Play a text-timed plan for `text` spread over `duration`.
    pub fn start_text(&self, text: &str, duration: Duration) {
        let emotion = detect_emotion(text);
        let plan = text_plan(text, duration, self.config.min_frame());
        debug!(
            frames = plan.len(),
            emotion = emotion.as_str(),
            "text animation plan"
        );
        let strategy = TextTimedStrategy::new(
            plan,
            emotion,
            self.config.emotion_override_probability,
            self.child_rng(),
        );
        self.launch(Box::new(strategy), None);
    }

    /// Follow amplitude samples fed through [`push_level`](Self::push_level).
    pub fn start_amplitude(&self) {
        let (tx, rx) = mpsc::channel(LEVEL_CHANNEL_SIZE);
        let strategy = AmplitudeStrategy::new(rx, self.config.amplitude_thresholds);
        self.launch(Box::new(strategy), Some(tx));
    }

    /// Feed one amplitude sample. Ignored unless the amplitude strategy runs.
    pub fn push_level(&self, level: f32) {
        if let Some(levels) = self.lock_active().as_ref().and_then(|a| a.levels.as_ref()) {
            let _ = levels.try_send(level);
        }
    }

    /// Stop the running loop, if any, and settle the face.
    ///
    /// A smiling reply holds the smile for `smile_hold_ms` before returning to
    /// neutral; anything else resets to neutral at once.
    pub fn stop(&self, settle: Emotion) {
        if let Some(active) = self.lock_active().take() {
            active.cancel.cancel();
            info!("animation stopped");
        }

        match settle.settle_expression() {
            Some(expression) if self.shared.can_show(expression) => {
                let epoch = self.shared.advance(expression);
                let shared = Arc::clone(&self.shared);
                let hold = self.config.smile_hold();
                tokio::spawn(async move {
                    tokio::time::sleep(hold).await;
                    shared.show(epoch, Expression::Neutral);
                });
            }
            _ => {
                self.shared.advance(Expression::Neutral);
            }
        }
    }

    fn launch(&self, mut strategy: Box<dyn FrameStrategy>, levels: Option<mpsc::Sender<f32>>) {
        let mut active = self.lock_active();
        if let Some(previous) = active.take() {
            previous.cancel.cancel();
            debug!("previous animation replaced");
        }

        let epoch = self.shared.advance(Expression::Neutral);
        let cancel = CancellationToken::new();
        let shared = Arc::clone(&self.shared);
        let token = cancel.clone();
        info!("animation started ({})", strategy.name());

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => return,
                    frame = strategy.next_frame() => match frame {
                        Some(expression) => {
                            shared.show(epoch, expression);
                        }
                        None => break,
                    }
                }
            }
            shared.show(epoch, Expression::Neutral);
            debug!("animation plan finished");
        });

        *active = Some(ActiveLoop {
            cancel,
            handle,
            levels,
        });
    }

    fn child_rng(&self) -> StdRng {
        let mut rng = match self.rng.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        StdRng::seed_from_u64(rng.next_u64())
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveLoop>> {
        match self.active.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for AnimationSynchronizer {
    fn drop(&mut self) {
        if let Some(active) = self.lock_active().take() {
            active.cancel.cancel();
        }
    }
}
