//! Speech recognition backends
//!
//! Three adapters share one contract:
//! - Browser: a browser-hosted recognition engine
//! - Native: a device speech engine (an external recognizer process here)
//! - Simulated: timed fallback when neither is usable

mod adapter;
mod browser;
mod engine;
mod native;
mod process;
mod selection;
mod simulated;

pub use adapter::{AdapterEvent, AdapterSink, BackendAdapter, BackendKind, SessionEvent};
pub use process::ProcessEngine;
pub use selection::{select_backend, AdapterFactory, Platform};

#[cfg(test)]
pub(crate) use engine::{testing, EngineError, EngineEvent};
#[cfg(test)]
pub(crate) use simulated::SIMULATED_PHRASES;

/// Locale every real backend recognizes in
pub const LOCALE: &str = "id-ID";
