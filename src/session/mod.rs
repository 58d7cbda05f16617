//! Voice session state machine
//!
//! States:
//! - Idle: waiting for a start request
//! - Listening: a backend is capturing speech
//! - Processing: simulated backend is producing its result
//! - Error: last session failed, message shown until the next request

mod controller;
mod state;

pub use controller::{Command, SessionController, SessionStatus};
