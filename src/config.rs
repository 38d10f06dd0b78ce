//! Configuration loading and management
//!
//! Defaults come from `$HOME`, an optional TOML file is merged on top,
//! then environment overrides are applied.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::extract::DEFAULT_WAKE_PHRASES;
use crate::state::VoiceMode;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Request listening as soon as the daemon is up
    pub auto_start: bool,

    pub voice: VoiceConfig,
    pub narration: NarrationConfig,
    pub capture: CaptureConfig,
    pub sink: SinkConfig,
}

/// Arbitrator timing, wake phrases and fan-out settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Mode at startup
    pub mode: VoiceMode,
    /// Delay between an engine-initiated session end and the restart
    pub restart_debounce_ms: u64,
    /// Delay between a resume request and the new capture session
    pub resume_settle_ms: u64,
    /// How long a wake phrase keeps capture paused
    pub wake_timeout_ms: u64,
    pub wake_phrases: Vec<String>,
    /// Narrated when a wake phrase is heard
    pub wake_acknowledgement: String,
    /// Narrated when the wake pause expires; capture resumes directly when unset
    pub resume_prompt: Option<String>,
    /// Reported to the command sink with every transcript
    pub user_type: String,
    /// Events buffered per subscriber before it starts lagging
    pub event_capacity: usize,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            mode: VoiceMode::default(),
            restart_debounce_ms: 300,
            resume_settle_ms: 200,
            wake_timeout_ms: 8000,
            wake_phrases: DEFAULT_WAKE_PHRASES.iter().map(|p| p.to_string()).collect(),
            wake_acknowledgement: "Yes? I'm listening. What would you like me to do?".to_string(),
            resume_prompt: None,
            user_type: "user".to_string(),
            event_capacity: 64,
        }
    }
}

impl VoiceConfig {
    pub fn restart_debounce(&self) -> Duration {
        Duration::from_millis(self.restart_debounce_ms)
    }

    pub fn resume_settle(&self) -> Duration {
        Duration::from_millis(self.resume_settle_ms)
    }

    pub fn wake_timeout(&self) -> Duration {
        Duration::from_millis(self.wake_timeout_ms)
    }
}

/// Narration voice settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrationConfig {
    /// Speech rate multiplier (1.0 = normal)
    pub rate: f32,
    /// 0.0 to 2.0, 1.0 is the voice's natural pitch
    pub pitch: f32,
    /// 0.0 to 1.0
    pub volume: f32,
    pub language: String,
    /// Speaking speed at rate 1.0, used to estimate narration length
    pub words_per_minute: u32,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            rate: 0.95,
            pitch: 1.0,
            volume: 1.0,
            language: "en-US".to_string(),
            words_per_minute: 170,
        }
    }
}

/// Recognition engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub language: String,
    /// Forward provisional results to subscribers
    pub interim_results: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            interim_results: true,
        }
    }
}

/// Command sink settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Backend URL; transcripts are echoed back when unset
    pub endpoint: Option<String>,
    pub timeout_ms: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 10_000,
        }
    }
}

impl SinkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// On-disk layout; every section is optional
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    socket_path: Option<PathBuf>,
    auto_start: Option<bool>,
    voice: Option<VoiceConfig>,
    narration: Option<NarrationConfig>,
    capture: Option<CaptureConfig>,
    sink: Option<SinkConfig>,
}

impl Config {
    /// Load configuration from defaults, the config file and environment
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("voice-arbiter");

        let mut config = Self::with_data_dir(data_dir);

        let file = std::env::var_os("VOICE_ARBITER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| config.data_dir.join("config.toml"));
        if file.exists() {
            config.merge_file(&file)?;
        }

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Defaults rooted at `data_dir`
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        let socket_path = data_dir.join("daemon.sock");

        Self {
            socket_path,
            data_dir,
            auto_start: false,
            voice: VoiceConfig::default(),
            narration: NarrationConfig::default(),
            capture: CaptureConfig::default(),
            sink: SinkConfig::default(),
        }
    }

    fn merge_file(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        self.merge_toml(&text)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    fn merge_toml(&mut self, text: &str) -> Result<()> {
        let file: FileConfig = toml::from_str(text)?;

        if let Some(socket_path) = file.socket_path {
            self.socket_path = socket_path;
        }
        if let Some(auto_start) = file.auto_start {
            self.auto_start = auto_start;
        }
        if let Some(voice) = file.voice {
            self.voice = voice;
        }
        if let Some(narration) = file.narration {
            self.narration = narration;
        }
        if let Some(capture) = file.capture {
            self.capture = capture;
        }
        if let Some(sink) = file.sink {
            self.sink = sink;
        }

        Ok(())
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(socket) = lookup("VOICE_ARBITER_SOCKET") {
            self.socket_path = PathBuf::from(socket);
        }
        if let Some(url) = lookup("VOICE_ARBITER_SINK_URL") {
            self.sink.endpoint = Some(url).filter(|u| !u.trim().is_empty());
        }
        if let Some(mode) = lookup("VOICE_ARBITER_MODE") {
            self.voice.mode = mode.parse().context("VOICE_ARBITER_MODE")?;
        }
        if let Some(flag) = lookup("VOICE_ARBITER_AUTO_START") {
            self.auto_start = matches!(flag.trim(), "1" | "true" | "yes" | "on");
        }
        Ok(())
    }

    /// Reject values that would break the arbitrator
    pub fn validate(&self) -> Result<()> {
        if self.voice.restart_debounce_ms == 0 {
            bail!("restart_debounce_ms must be positive");
        }
        if self.voice.wake_timeout_ms == 0 {
            bail!("wake_timeout_ms must be positive");
        }
        if self.voice.event_capacity == 0 {
            bail!("event_capacity must be positive");
        }
        if !(0.1..=10.0).contains(&self.narration.rate) {
            bail!("narration rate {} out of range", self.narration.rate);
        }
        if !(0.0..=2.0).contains(&self.narration.pitch) {
            bail!("narration pitch {} out of range", self.narration.pitch);
        }
        if !(0.0..=1.0).contains(&self.narration.volume) {
            bail!("narration volume {} out of range", self.narration.volume);
        }
        if self.narration.language.trim().is_empty() {
            bail!("narration language must be set");
        }
        if self.narration.words_per_minute == 0 {
            bail!("words_per_minute must be positive");
        }
        Ok(())
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Config {
        Config::with_data_dir(PathBuf::from("/tmp/voice-arbiter-test"))
    }

    #[test]
    fn test_config_load() {
        let config = Config::load().unwrap();
        assert!(config.data_dir.to_string_lossy().contains("voice-arbiter"));
    }

    #[test]
    fn test_defaults() {
        let config = defaults();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/voice-arbiter-test/daemon.sock"));
        assert_eq!(config.voice.restart_debounce(), Duration::from_millis(300));
        assert_eq!(config.voice.resume_settle(), Duration::from_millis(200));
        assert_eq!(config.voice.wake_timeout(), Duration::from_secs(8));
        assert_eq!(config.voice.mode, VoiceMode::Interactive);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let mut config = defaults();
        config
            .merge_toml(
                r#"
                auto_start = true

                [voice]
                wake_timeout_ms = 5000
                mode = "talkative"

                [sink]
                endpoint = "http://localhost:1117/api/ledger/log"
                "#,
            )
            .unwrap();

        assert!(config.auto_start);
        assert_eq!(config.voice.wake_timeout_ms, 5000);
        assert_eq!(config.voice.mode, VoiceMode::Talkative);
        assert_eq!(config.voice.restart_debounce_ms, 300);
        assert_eq!(config.sink.timeout_ms, 10_000);
        assert_eq!(
            config.sink.endpoint.as_deref(),
            Some("http://localhost:1117/api/ledger/log")
        );
    }

    #[test]
    fn test_unknown_key_rejected() {
        let mut config = defaults();
        assert!(config.merge_toml("push_to_talk = true").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = defaults();
        config
            .apply_env(|key| match key {
                "VOICE_ARBITER_SOCKET" => Some("/run/voice.sock".to_string()),
                "VOICE_ARBITER_MODE" => Some("text".to_string()),
                "VOICE_ARBITER_AUTO_START" => Some("yes".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.socket_path, PathBuf::from("/run/voice.sock"));
        assert_eq!(config.voice.mode, VoiceMode::Text);
        assert!(config.auto_start);
    }

    #[test]
    fn test_bad_mode_env() {
        let mut config = defaults();
        let result = config.apply_env(|key| (key == "VOICE_ARBITER_MODE").then(|| "shouty".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_narration_voice_settings() {
        let mut config = defaults();
        config
            .merge_toml(
                r#"
                [narration]
                pitch = 1.2
                volume = 0.5
                language = "en-GB"
                "#,
            )
            .unwrap();
        assert_eq!(config.narration.pitch, 1.2);
        assert_eq!(config.narration.volume, 0.5);
        assert_eq!(config.narration.language, "en-GB");
        assert_eq!(config.narration.rate, 0.95);
        assert!(config.validate().is_ok());

        config.narration.volume = 1.5;
        assert!(config.validate().is_err());

        config.narration.volume = 1.0;
        config.narration.language = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_debounce() {
        let mut config = defaults();
        config.voice.restart_debounce_ms = 0;
        assert!(config.validate().is_err());
    }
}
