//! Device speech engine backed by an external recognizer command
//!
//! The command is run once per session with the locale in `SPEECH_LOCALE`.
//! Each non-empty stdout line is an alternative, best first. A non-zero exit
//! is a failure described by stderr.

use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::Mutex;

use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::engine::{EngineError, EngineEvent, RecognitionConfig, SpeechEngine};

/// Runs a recognizer process per session
pub struct ProcessEngine {
    program: String,
    args: Vec<String>,
    running: Mutex<Option<JoinHandle<()>>>,
}

impl ProcessEngine {
    /// Build from a whitespace-separated command line; `None` if it is blank
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            running: Mutex::new(None),
        })
    }

    /// Program that will be executed
    pub fn program(&self) -> &str {
        &self.program
    }
}

impl SpeechEngine for ProcessEngine {
    fn name(&self) -> &'static str {
        "process"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn start(
        &self,
        config: &RecognitionConfig,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Result<(), EngineError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .env("SPEECH_LOCALE", &config.locale)
            .env("SPEECH_MAX_ALTERNATIVES", config.max_alternatives.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::PermissionDenied => EngineError::PermissionDenied,
                ErrorKind::NotFound => {
                    EngineError::Unavailable(format!("{} not found", self.program))
                }
                _ => EngineError::Failed(e.to_string()),
            })?;

        debug!(program = %self.program, pid = ?child.id(), "recognizer process spawned");

        let max_alternatives = config.max_alternatives.max(1) as usize;
        let handle = tokio::spawn(async move {
            let event = match child.wait_with_output().await {
                Ok(output) if output.status.success() => {
                    let alternatives: Vec<String> = String::from_utf8_lossy(&output.stdout)
                        .lines()
                        .map(str::trim)
                        .filter(|line| !line.is_empty())
                        .take(max_alternatives)
                        .map(str::to_string)
                        .collect();
                    if alternatives.is_empty() {
                        EngineEvent::End
                    } else {
                        EngineEvent::Result { alternatives }
                    }
                }
                Ok(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                    if stderr.is_empty() {
                        EngineEvent::Error(format!("recognizer exited with {}", output.status))
                    } else {
                        EngineEvent::Error(stderr)
                    }
                }
                Err(e) => {
                    warn!(?e, "failed to wait for recognizer process");
                    EngineEvent::Error(e.to_string())
                }
            };
            let _ = events.send(event);
        });

        if let Ok(mut running) = self.running.lock() {
            if let Some(previous) = running.replace(handle) {
                previous.abort();
            }
        }

        Ok(())
    }

    fn stop(&self) {
        let handle = self.running.lock().ok().and_then(|mut running| running.take());
        if let Some(handle) = handle {
            debug!(program = %self.program, "killing recognizer process");
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(line: &str) -> ProcessEngine {
        ProcessEngine::from_command_line(line).unwrap()
    }

    #[test]
    fn test_command_line_parsing() {
        let engine = engine("recognize --once  --model small");
        assert_eq!(engine.program(), "recognize");
        assert_eq!(engine.args, vec!["--once", "--model", "small"]);
        assert!(ProcessEngine::from_command_line("   ").is_none());
    }

    #[tokio::test]
    async fn test_stdout_becomes_result() {
        let engine = ProcessEngine {
            args: vec!["-c".into(), "echo \"$SPEECH_LOCALE\"; echo kedua".into()],
            ..engine("sh")
        };
        let (tx, mut rx) = mpsc::unbounded_channel();

        engine.start(&RecognitionConfig::single_shot("id-ID"), tx).unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            EngineEvent::Result { alternatives: vec!["id-ID".into()] }
        );
    }

    #[tokio::test]
    async fn test_silent_exit_is_end() {
        let engine = engine("true");
        let (tx, mut rx) = mpsc::unbounded_channel();

        engine.start(&RecognitionConfig::single_shot("id-ID"), tx).unwrap();
        assert_eq!(rx.recv().await.unwrap(), EngineEvent::End);
    }

    #[tokio::test]
    async fn test_failure_reports_stderr() {
        let engine = ProcessEngine {
            args: vec!["-c".into(), "echo 'mic busy' >&2; exit 3".into()],
            ..engine("sh")
        };
        let (tx, mut rx) = mpsc::unbounded_channel();

        engine.start(&RecognitionConfig::single_shot("id-ID"), tx).unwrap();
        assert_eq!(rx.recv().await.unwrap(), EngineEvent::Error("mic busy".into()));
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_start() {
        let engine = engine("/nonexistent/voice-recognizer");
        let (tx, _rx) = mpsc::unbounded_channel();

        assert!(matches!(
            engine.start(&RecognitionConfig::single_shot("id-ID"), tx),
            Err(EngineError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_kills_running_recognizer() {
        let engine = engine("sleep 30");
        let (tx, mut rx) = mpsc::unbounded_channel();

        engine.start(&RecognitionConfig::single_shot("id-ID"), tx).unwrap();
        engine.stop();
        engine.stop();

        assert!(rx.recv().await.is_none());
    }
}
