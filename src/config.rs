//! Configuration loading and management

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

use crate::backend::Platform;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Whether voice input accepts start requests
    pub enabled: bool,

    /// Runtime the daemon serves, decides which backend is tried
    pub platform: Platform,

    /// Recognizer command used as the native speech engine
    pub native_command: Option<String>,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let home = lookup("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("voice-input");

        let socket_path = lookup("VOICE_INPUT_SOCKET")
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("daemon.sock"));

        let enabled = match lookup("VOICE_INPUT_ENABLED") {
            Some(value) => parse_bool(&value)
                .with_context(|| format!("invalid VOICE_INPUT_ENABLED '{value}'"))?,
            None => true,
        };

        let native_command =
            lookup("VOICE_INPUT_NATIVE_COMMAND").filter(|cmd| !cmd.trim().is_empty());

        let platform = match lookup("VOICE_INPUT_PLATFORM") {
            Some(value) => value
                .parse::<Platform>()
                .map_err(|e| anyhow!(e))
                .context("invalid VOICE_INPUT_PLATFORM")?,
            None if native_command.is_some() => Platform::Native,
            None => Platform::Headless,
        };

        Ok(Self {
            socket_path,
            data_dir,
            enabled,
            platform,
            native_command,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("expected true or false")),
    }
}
