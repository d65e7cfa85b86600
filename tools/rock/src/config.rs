use crate::errors::RockError;
use crate::runtime::FileSystem;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_MODE: &str = "ROCK_MODE";
pub const ENV_FIXTURE_DIR: &str = "ROCK_FIXTURE_DIR";

pub type EnvMap = BTreeMap<String, String>;

/// What the caller asked for. The session's actual mode also depends on
/// whether the fixture already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeRequest {
    /// Replay when a fixture exists, otherwise call through without capture.
    #[default]
    Auto,
    /// Replay when a fixture exists, otherwise record one.
    Record,
    /// Never intercept.
    Wild,
}

impl ModeRequest {
    pub fn parse(value: &str) -> Result<Self, RockError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "record" => Ok(Self::Record),
            "wild" => Ok(Self::Wild),
            _ => Err(RockError::InvalidConfig(format!(
                "unknown mode {value:?} (expected auto, record or wild)"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Record => "record",
            Self::Wild => "wild",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimingConfig {
    /// Store start/end timestamps on every record.
    pub capture: bool,
    /// Delay replayed outcomes by a fraction of the recorded duration.
    pub replay_delay: bool,
    pub replay_delay_divisor: u32,
}

impl TimingConfig {
    pub fn replay_delay_for(&self, recorded: Option<Duration>) -> Option<Duration> {
        if !self.replay_delay || self.replay_delay_divisor == 0 {
            return None;
        }
        recorded.map(|d| d / self.replay_delay_divisor)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            capture: true,
            replay_delay: true,
            replay_delay_divisor: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    /// Directory holding fixture files. See [`crate::fixture::default_storage_dir`].
    pub storage_dir: Option<PathBuf>,
    pub mode: ModeRequest,
    pub timing: TimingConfig,
    /// JSONL journal of session events.
    pub event_log: Option<PathBuf>,
}

impl SessionConfig {
    pub fn record() -> Self {
        Self {
            mode: ModeRequest::Record,
            ..Self::default()
        }
    }

    pub fn wild() -> Self {
        Self {
            mode: ModeRequest::Wild,
            ..Self::default()
        }
    }

    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    pub fn with_mode(mut self, mode: ModeRequest) -> Self {
        self.mode = mode;
        self
    }

    pub fn without_replay_delay(mut self) -> Self {
        self.timing.replay_delay = false;
        self
    }

    pub fn with_event_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.event_log = Some(path.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialSessionConfig {
    storage_dir: Option<PathBuf>,
    mode: Option<ModeRequest>,
    timing: Option<PartialTimingConfig>,
    event_log: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialTimingConfig {
    capture: Option<bool>,
    replay_delay: Option<bool>,
    replay_delay_divisor: Option<u32>,
}

/// Reads a TOML file whose keys all default, e.g.
///
/// ```toml
/// storage_dir = "tests/__rock-fixtures__"
/// mode = "record"
///
/// [timing]
/// replay_delay_divisor = 4
/// ```
pub fn load_config(path: &Path, fs: &dyn FileSystem) -> Result<SessionConfig, RockError> {
    let file_contents = fs.read_to_string(path)?;
    let partial: PartialSessionConfig =
        toml::from_str(&file_contents).map_err(|e| RockError::ConfigParse(e.to_string()))?;
    let mut cfg = SessionConfig::default();
    merge_partial_config(&mut cfg, partial);
    validate_config(&cfg)?;
    Ok(cfg)
}

fn merge_partial_config(cfg: &mut SessionConfig, partial: PartialSessionConfig) {
    if let Some(storage_dir) = partial.storage_dir {
        cfg.storage_dir = Some(storage_dir);
    }
    if let Some(mode) = partial.mode {
        cfg.mode = mode;
    }
    if let Some(event_log) = partial.event_log {
        cfg.event_log = Some(event_log);
    }

    if let Some(timing) = partial.timing {
        if let Some(value) = timing.capture {
            cfg.timing.capture = value;
        }
        if let Some(value) = timing.replay_delay {
            cfg.timing.replay_delay = value;
        }
        if let Some(value) = timing.replay_delay_divisor {
            cfg.timing.replay_delay_divisor = value;
        }
    }
}

/// `ROCK_MODE` and `ROCK_FIXTURE_DIR` win over file and code settings.
pub fn apply_env_overrides(cfg: &mut SessionConfig, env: &EnvMap) -> Result<(), RockError> {
    if let Some(mode) = env.get(ENV_MODE).filter(|v| !v.trim().is_empty()) {
        cfg.mode = ModeRequest::parse(mode)
            .map_err(|e| RockError::InvalidConfig(format!("{ENV_MODE}: {e}")))?;
    }
    if let Some(dir) = env.get(ENV_FIXTURE_DIR).filter(|v| !v.trim().is_empty()) {
        cfg.storage_dir = Some(PathBuf::from(dir));
    }
    Ok(())
}

pub fn process_env() -> EnvMap {
    std::env::vars().collect()
}

pub fn validate_config(cfg: &SessionConfig) -> Result<(), RockError> {
    if cfg.timing.replay_delay && cfg.timing.replay_delay_divisor == 0 {
        return Err(RockError::InvalidConfig(
            "timing.replay_delay_divisor must be greater than zero".to_string(),
        ));
    }
    if let Some(dir) = &cfg.storage_dir {
        if dir.as_os_str().is_empty() {
            return Err(RockError::InvalidConfig(
                "storage_dir must not be empty".to_string(),
            ));
        }
    }
    Ok(())
}
