//! One fixture's interception lifecycle: setup, intercept, persist, restore.

use crate::config::{
    apply_env_overrides, process_env, validate_config, ModeRequest, SessionConfig, TimingConfig,
};
use crate::errors::RockError;
use crate::fixture::{default_storage_dir, FixtureLocation};
use crate::logging::{Journal, JsonlLogger};
use crate::replay::player::Player;
use crate::replay::recorder::{RecordSink, Recorder};
use crate::replay::recording::FixtureDocument;
use crate::runtime::Runtime;
use crate::target::{Method, Target};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassThroughReason {
    /// Wild mode was requested.
    Wild,
    /// No fixture exists and recording was not requested.
    NotRecording,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Recording,
    Replaying,
    PassThrough(PassThroughReason),
}

impl Mode {
    /// Existing fixture wins over everything but an explicit wild request.
    pub fn resolve(requested: ModeRequest, fixture_exists: bool) -> Self {
        match (requested, fixture_exists) {
            (ModeRequest::Wild, _) => Self::PassThrough(PassThroughReason::Wild),
            (_, true) => Self::Replaying,
            (ModeRequest::Record, false) => Self::Recording,
            (ModeRequest::Auto, false) => Self::PassThrough(PassThroughReason::NotRecording),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recording => "recording",
            Self::Replaying => "replaying",
            Self::PassThrough(PassThroughReason::Wild) => "wild",
            Self::PassThrough(PassThroughReason::NotRecording) => "pass_through",
        }
    }
}

/// One installed interception. Owns the callable it replaced.
#[derive(Debug, Clone)]
pub struct InterceptionSlot {
    pub key: String,
    pub target: Target,
    pub method_name: String,
    original: Method,
}

impl InterceptionSlot {
    pub fn original(&self) -> &Method {
        &self.original
    }

    fn restore(&self) {
        self.target.define(self.method_name.clone(), self.original.clone());
    }
}

#[derive(Default)]
struct SessionState {
    slots: Vec<InterceptionSlot>,
    sinks: BTreeMap<String, RecordSink>,
    loaded: FixtureDocument,
    counters: BTreeMap<String, Arc<AtomicUsize>>,
    closed: bool,
}

struct SessionInner {
    location: FixtureLocation,
    mode: Mode,
    timing: TimingConfig,
    runtime: Runtime,
    journal: Journal,
    state: Mutex<SessionState>,
}

/// A fixture-bound interception session. Clones share state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Production file system and clock, with `ROCK_*` environment overrides
    /// applied on top of `config`.
    pub fn begin(name: &str, mut config: SessionConfig) -> Result<Self, RockError> {
        apply_env_overrides(&mut config, &process_env())?;
        Self::begin_with(name, config, Runtime::new())
    }

    /// Decides the mode and loads or prepares storage before returning.
    pub fn begin_with(
        name: &str,
        config: SessionConfig,
        runtime: Runtime,
    ) -> Result<Self, RockError> {
        validate_config(&config)?;
        let dir = match &config.storage_dir {
            Some(dir) => dir.clone(),
            None => {
                let cwd = std::env::current_dir().map_err(|e| RockError::Io(e.to_string()))?;
                default_storage_dir(&process_env(), &cwd)
            }
        };
        let location = FixtureLocation::new(name, dir);
        let fs = runtime.file_system.as_ref();

        let exists = location.exists(fs)?;
        let mode = Mode::resolve(config.mode, exists);
        let loaded = match mode {
            Mode::Replaying => location.load(fs)?,
            _ => FixtureDocument::default(),
        };
        if !exists {
            location.ensure_dir(fs)?;
        }

        let journal = Journal::new(name, config.event_log.as_ref().map(JsonlLogger::new));
        journal.append(
            "info",
            "session_setup",
            json!({
                "mode": mode.as_str(),
                "requested": config.mode.as_str(),
                "fixture_path": location.file.display().to_string(),
                "recorded_slots": loaded.slots.len(),
            }),
        )?;
        info!(
            fixture = %name,
            mode = mode.as_str(),
            path = %location.file.display(),
            recorded_calls = loaded.total_records(),
            "rock session ready"
        );

        Ok(Self {
            inner: Arc::new(SessionInner {
                location,
                mode,
                timing: config.timing,
                runtime,
                journal,
                state: Mutex::new(SessionState {
                    loaded,
                    ..SessionState::default()
                }),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.location.name
    }

    pub fn mode(&self) -> Mode {
        self.inner.mode
    }

    pub fn fixture_path(&self) -> &Path {
        &self.inner.location.file
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.inner.location.dir.clone()
    }

    /// Swaps `target.method_name` for a recorder or player.
    ///
    /// Returns the slot key, or `None` when the session passes calls through
    /// (nothing is installed then, so there is nothing to restore).
    pub fn intercept(
        &self,
        target: &Target,
        method_name: &str,
    ) -> Result<Option<String>, RockError> {
        let inner = &self.inner;
        let mut state = inner.state.lock().expect("session state lock");
        if state.closed {
            return Err(RockError::SessionClosed(format!(
                "cannot intercept {method_name} on finished session {}",
                inner.location.name
            )));
        }
        if let Mode::PassThrough(reason) = inner.mode {
            debug!(
                fixture = %inner.location.name,
                method = method_name,
                ?reason,
                "pass-through, not intercepting"
            );
            return Ok(None);
        }

        let original = target.method(method_name).ok_or_else(|| RockError::UnknownMethod {
            method: format!("{}.{method_name}", target.label()),
        })?;
        let key = format!("{method_name}-{}", state.slots.len());
        // Journal first: a failed write must leave the target untouched.
        inner.journal.append(
            "debug",
            "slot_installed",
            json!({"slot": key, "target": target.label(), "method": method_name}),
        )?;
        let journal = inner.journal.clone();
        let clock = Arc::clone(&inner.runtime.clock);

        let wrapper = match inner.mode {
            Mode::Recording => {
                let sink = RecordSink::default();
                state.sinks.insert(key.clone(), sink.clone());
                Recorder::new(&key, sink, clock, inner.timing.capture, journal)
                    .wrap(original.clone())
            }
            _ => {
                let records = state.loaded.records(&key).to_vec();
                let counter = Arc::new(AtomicUsize::new(0));
                state.counters.insert(key.clone(), Arc::clone(&counter));
                Player::new(&key, records, counter, clock, inner.timing.clone(), journal)
                    .into_method()
            }
        };

        target.define(method_name, wrapper);
        state.slots.push(InterceptionSlot {
            key: key.clone(),
            target: target.clone(),
            method_name: method_name.to_string(),
            original,
        });
        drop(state);

        debug!(fixture = %inner.location.name, slot = %key, target = target.label(), "slot installed");
        Ok(Some(key))
    }

    /// Puts every original method back and drops in-memory records.
    /// Safe to call any number of times.
    pub fn restore(&self) {
        let inner = &self.inner;
        let slots = {
            let mut state = inner.state.lock().expect("session state lock");
            if state.closed {
                return;
            }
            state.closed = true;
            state.sinks.clear();
            state.counters.clear();
            state.loaded = FixtureDocument::default();
            std::mem::take(&mut state.slots)
        };
        // Newest first, so a method intercepted twice ends on its true original.
        for slot in slots.iter().rev() {
            slot.restore();
        }
        debug!(fixture = %inner.location.name, restored = slots.len(), "session restored");
        inner
            .journal
            .append_or_warn("debug", "session_restored", json!({"slots": slots.len()}));
    }

    /// Writes the fixture when recording, then restores regardless of how
    /// the write went.
    pub fn complete_recording(&self) -> Result<(), RockError> {
        let saved = match self.inner.mode {
            Mode::Recording => self.save(),
            _ => Ok(()),
        };
        self.restore();
        saved
    }

    fn save(&self) -> Result<(), RockError> {
        let inner = &self.inner;
        let doc = {
            let state = inner.state.lock().expect("session state lock");
            if state.closed {
                return Ok(());
            }
            FixtureDocument {
                slots: state
                    .sinks
                    .iter()
                    .map(|(key, sink)| (key.clone(), sink.snapshot()))
                    .collect(),
            }
        };
        inner.location.save(inner.runtime.file_system.as_ref(), &doc)?;
        info!(
            fixture = %inner.location.name,
            path = %inner.location.file.display(),
            slots = doc.slots.len(),
            calls = doc.total_records(),
            "fixture saved"
        );
        inner.journal.append(
            "info",
            "fixture_saved",
            json!({"slots": doc.slots.len(), "calls": doc.total_records()}),
        )
    }

    pub fn is_finished(&self) -> bool {
        self.inner.state.lock().expect("session state lock").closed
    }

    /// Installed slots in intercept order.
    pub fn slots(&self) -> Vec<InterceptionSlot> {
        self.inner.state.lock().expect("session state lock").slots.clone()
    }

    pub fn slot_keys(&self) -> Vec<String> {
        self.slots().into_iter().map(|slot| slot.key).collect()
    }

    /// Calls captured so far for `slot` while recording.
    pub fn recorded_calls(&self, slot: &str) -> Option<usize> {
        let state = self.inner.state.lock().expect("session state lock");
        state.sinks.get(slot).map(RecordSink::len)
    }

    /// Player calls made so far for `slot`, including failed ones.
    pub fn replayed_calls(&self, slot: &str) -> Option<usize> {
        let state = self.inner.state.lock().expect("session state lock");
        state.counters.get(slot).map(|c| c.load(Ordering::SeqCst))
    }

    pub fn same_as(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("fixture", &self.inner.location.name)
            .field("mode", &self.inner.mode)
            .field("path", &self.inner.location.file)
            .finish()
    }
}
