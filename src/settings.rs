//! Read-only settings snapshots consumed by the conversation core.
//!
//! The core never writes settings. It asks the store for a fresh
//! [`TtsConfig`] each time a reply is synthesized, so edits made between
//! calls (a new API key, a different active provider) apply to the next
//! call only.

use crate::config::TtsConfig;
use crate::tts::ProviderKind;
use std::sync::{Arc, RwLock};

/// Source of synthesis settings.
pub trait SettingsStore: Send + Sync {
    /// Current synthesis settings, including the active provider.
    fn tts_snapshot(&self) -> TtsConfig;

    /// Currently selected provider.
    fn active_provider(&self) -> ProviderKind {
        self.tts_snapshot().provider
    }
}

/// In-memory settings shared with the UI layer that edits them.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<TtsConfig>>,
}

impl SharedSettings {
    /// Create a store seeded with `tts`.
    pub fn new(tts: TtsConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(tts)),
        }
    }

    /// Apply an edit. Takes effect on the next snapshot.
    pub fn update(&self, f: impl FnOnce(&mut TtsConfig)) {
        let mut guard = match self.inner.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard);
    }
}

impl SettingsStore for SharedSettings {
    fn tts_snapshot(&self) -> TtsConfig {
        match self.inner.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
