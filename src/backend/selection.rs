//! Backend selection policy
//!
//! The runtime is inspected on every session start, so a browser engine that
//! appears or disappears between sessions is picked up.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::adapter::{BackendAdapter, BackendKind};
use super::browser::BrowserSpeechAdapter;
use super::engine::SpeechEngine;
use super::native::NativeSpeechAdapter;
use super::simulated::SimulatedAdapter;

/// Kind of runtime the daemon serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Browser runtime, may expose a recognition engine
    Web,
    /// Non-browser device runtime with a native speech engine
    Native,
    /// Neither; only the simulated backend applies
    Headless,
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "web" | "browser" => Ok(Platform::Web),
            "native" | "mobile" => Ok(Platform::Native),
            "headless" | "none" => Ok(Platform::Headless),
            other => Err(format!("unknown platform '{other}'")),
        }
    }
}

/// Capabilities observed at session start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeEnvironment {
    pub platform: Platform,
    /// A browser recognition engine is present and usable
    pub browser_speech: bool,
}

/// Pick the backend for a runtime
pub fn select_backend(env: &RuntimeEnvironment) -> BackendKind {
    match env.platform {
        Platform::Native => BackendKind::Native,
        Platform::Web if env.browser_speech => BackendKind::Browser,
        _ => BackendKind::Simulated,
    }
}

/// Builds a fresh adapter for every session
#[derive(Clone)]
pub struct AdapterFactory {
    platform: Platform,
    browser: Option<Arc<dyn SpeechEngine>>,
    native: Option<Arc<dyn SpeechEngine>>,
}

impl AdapterFactory {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            browser: None,
            native: None,
        }
    }

    /// Install the browser recognition engine
    #[cfg(test)]
    pub fn with_browser_engine(mut self, engine: Arc<dyn SpeechEngine>) -> Self {
        self.browser = Some(engine);
        self
    }

    /// Install the device speech engine
    pub fn with_native_engine(mut self, engine: Arc<dyn SpeechEngine>) -> Self {
        self.native = Some(engine);
        self
    }

    /// Inspect the runtime as it is right now
    pub fn detect(&self) -> RuntimeEnvironment {
        RuntimeEnvironment {
            platform: self.platform,
            browser_speech: self
                .browser
                .as_ref()
                .map(|engine| engine.is_available())
                .unwrap_or(false),
        }
    }

    /// Create an idle adapter of the given kind
    pub fn create(&self, kind: BackendKind) -> Box<dyn BackendAdapter> {
        match kind {
            BackendKind::Browser => match &self.browser {
                Some(engine) => Box::new(BrowserSpeechAdapter::new(Arc::clone(engine))),
                None => Box::new(SimulatedAdapter::new()),
            },
            BackendKind::Native => Box::new(NativeSpeechAdapter::new(self.native.clone())),
            BackendKind::Simulated => Box::new(SimulatedAdapter::new()),
        }
    }
}
