//! Configuration management for the whisker client
//!
//! Defaults, overlaid by an optional TOML file
//! (`~/.config/whisker/config.toml`), overlaid by `WHISKER_*` environment
//! variables. All file fields are optional — the file is a partial overlay.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result};

/// Default chat backend base URL
const DEFAULT_BACKEND_URL: &str = "http://localhost:5000";

/// Whisker client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Chat backend base URL (endpoints are joined under `/api/...`)
    pub backend_url: String,

    /// Path to data directory (history database, etc)
    pub data_dir: PathBuf,

    /// Voice configuration
    pub voice: VoiceConfig,

    /// Wake-word configuration
    pub wake: WakeConfig,

    /// Phrases that end a voice session (case-insensitive substrings)
    pub exit_phrases: Vec<String>,

    /// Spoken line when the chat backend fails
    pub apology_text: String,

    /// Timing knobs for background capture restarts
    pub timing: TimingConfig,
}

/// Voice output configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Speak assistant responses aloud
    pub output_enabled: bool,

    /// Synthesizer voice hint (backend-specific identifier)
    pub voice_hint: Option<String>,

    /// Recognition language tag (e.g. "en-US")
    pub language: String,
}

/// Wake-word activation configuration
#[derive(Debug, Clone)]
pub struct WakeConfig {
    /// The activation phrase (e.g. "hello kitty")
    pub phrase: String,

    /// Accepted phonetic near-misses of the activation phrase
    pub variants: Vec<String>,

    /// Spoken acknowledgment after activation
    pub ack_text: String,

    /// Spoken farewell before teardown
    pub farewell_text: String,
}

/// Delays used by the session restart loops
#[derive(Debug, Clone, Copy)]
pub struct TimingConfig {
    /// Debounce before restarting background capture after a clean end
    pub restart_debounce: Duration,

    /// Delay before restarting background capture after an error
    pub error_restart_delay: Duration,

    /// Delay before re-listening after the assistant finishes speaking
    pub relisten_delay: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            restart_debounce: Duration::from_millis(100),
            error_restart_delay: Duration::from_millis(1000),
            relisten_delay: Duration::from_millis(500),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            data_dir: default_data_dir(),
            voice: VoiceConfig {
                output_enabled: true,
                voice_hint: None,
                language: "en-US".to_string(),
            },
            wake: WakeConfig {
                phrase: "hello kitty".to_string(),
                variants: vec![
                    "hello katie".to_string(),
                    "hey kitty".to_string(),
                    "hi kitty".to_string(),
                ],
                ack_text: "Yes? How can I help you?".to_string(),
                farewell_text: "Goodbye! Have a wonderful day!".to_string(),
            },
            exit_phrases: vec![
                "goodbye".to_string(),
                "exit".to_string(),
                "bye".to_string(),
            ],
            apology_text: "Sorry, I had trouble responding. Please try again!".to_string(),
            timing: TimingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration: defaults + optional TOML file + env overrides
    ///
    /// # Errors
    ///
    /// Returns error if the config file exists but cannot be read or parsed
    pub fn load(path: Option<&std::path::Path>) -> Result<Self> {
        let mut config = Self::default();

        let file_path = path.map_or_else(default_config_path, std::path::Path::to_path_buf);
        if file_path.exists() {
            let raw = std::fs::read_to_string(&file_path)?;
            let file: ConfigFile = toml::from_str(&raw)?;
            config.apply_file(file);
            tracing::debug!(path = %file_path.display(), "loaded config file");
        } else if path.is_some() {
            return Err(Error::Config(format!(
                "config file not found: {}",
                file_path.display()
            )));
        }

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(url) = file.backend_url {
            self.backend_url = url;
        }
        if let Some(dir) = file.data_dir {
            self.data_dir = dir;
        }
        if let Some(phrases) = file.exit_phrases {
            self.exit_phrases = phrases;
        }
        if let Some(text) = file.apology_text {
            self.apology_text = text;
        }

        if let Some(enabled) = file.voice.output_enabled {
            self.voice.output_enabled = enabled;
        }
        if let Some(hint) = file.voice.voice_hint {
            self.voice.voice_hint = Some(hint);
        }
        if let Some(lang) = file.voice.language {
            self.voice.language = lang;
        }

        if let Some(phrase) = file.wake.phrase {
            self.wake.phrase = phrase;
        }
        if let Some(variants) = file.wake.variants {
            self.wake.variants = variants;
        }
        if let Some(text) = file.wake.ack_text {
            self.wake.ack_text = text;
        }
        if let Some(text) = file.wake.farewell_text {
            self.wake.farewell_text = text;
        }

        if let Some(ms) = file.timing.restart_debounce_ms {
            self.timing.restart_debounce = Duration::from_millis(ms);
        }
        if let Some(ms) = file.timing.error_restart_delay_ms {
            self.timing.error_restart_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = file.timing.relisten_delay_ms {
            self.timing.relisten_delay = Duration::from_millis(ms);
        }
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("WHISKER_BACKEND_URL") {
            self.backend_url = url;
        }
        if let Ok(dir) = std::env::var("WHISKER_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(phrase) = std::env::var("WHISKER_WAKE_PHRASE") {
            self.wake.phrase = phrase;
        }
    }

    fn validate(&self) -> Result<()> {
        url::Url::parse(&self.backend_url)
            .map_err(|e| Error::Config(format!("invalid backend_url: {e}")))?;
        if self.wake.phrase.trim().is_empty() {
            return Err(Error::Config("wake.phrase must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Default config file location (`~/.config/whisker/config.toml`)
fn default_config_path() -> PathBuf {
    directories::ProjectDirs::from("dev", "omni", "whisker").map_or_else(
        || PathBuf::from("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default data directory (`~/.local/share/whisker` on Linux)
fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("dev", "omni", "whisker").map_or_else(
        || PathBuf::from("."),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    backend_url: Option<String>,
    data_dir: Option<PathBuf>,
    exit_phrases: Option<Vec<String>>,
    apology_text: Option<String>,

    #[serde(default)]
    voice: VoiceFileConfig,

    #[serde(default)]
    wake: WakeFileConfig,

    #[serde(default)]
    timing: TimingFileConfig,
}

#[derive(Debug, Default, Deserialize)]
struct VoiceFileConfig {
    output_enabled: Option<bool>,
    voice_hint: Option<String>,
    language: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WakeFileConfig {
    phrase: Option<String>,
    variants: Option<Vec<String>>,
    ack_text: Option<String>,
    farewell_text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TimingFileConfig {
    restart_debounce_ms: Option<u64>,
    error_restart_delay_ms: Option<u64>,
    relisten_delay_ms: Option<u64>,
}
