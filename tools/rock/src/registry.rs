use crate::config::SessionConfig;
use crate::errors::RockError;
use crate::session::Session;
use std::sync::{Mutex, OnceLock};
use tracing::debug;

/// Sessions awaiting bulk teardown.
///
/// Tests that run in parallel can each own a `Registry`; code that does not
/// care uses [`Registry::global`].
#[derive(Default)]
pub struct Registry {
    sessions: Mutex<Vec<Session>>,
}

static GLOBAL_REGISTRY: OnceLock<Registry> = OnceLock::new();

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static Registry {
        GLOBAL_REGISTRY.get_or_init(Registry::new)
    }

    /// No dedup; a session registered twice is restored twice.
    pub fn register(&self, session: Session) {
        self.sessions.lock().expect("registry lock").push(session);
    }

    /// [`Session::begin`] followed by [`Registry::register`].
    pub fn begin(&self, name: &str, config: SessionConfig) -> Result<Session, RockError> {
        let session = Session::begin(name, config)?;
        self.register(session.clone());
        Ok(session)
    }

    /// Restores every registered session and forgets them all.
    pub fn clear_all(&self) {
        let sessions = std::mem::take(&mut *self.sessions.lock().expect("registry lock"));
        for session in &sessions {
            session.restore();
        }
        debug!(sessions = sessions.len(), "registry cleared");
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().expect("registry lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{FakeClock, FakeFileSystem, Runtime};
    use crate::target::{Method, Target};
    use serde_json::Value;
    use std::sync::Arc;

    fn recording_session(fs: &FakeFileSystem, name: &str) -> Session {
        let runtime = Runtime::new()
            .with_file_system(Arc::new(fs.clone()))
            .with_clock(Arc::new(FakeClock::default()));
        Session::begin_with(name, SessionConfig::record().with_storage_dir("/fx"), runtime)
            .expect("begin")
    }

    #[test]
    fn clear_all_restores_every_session_and_empties() {
        let fs = FakeFileSystem::default();
        let registry = Registry::new();
        let target = Target::new("svc")
            .with_method("a", Method::new(|_| async { Ok(Value::Null) }))
            .with_method("b", Method::new(|_| async { Ok(Value::Null) }));
        let original_a = target.method("a").expect("a");
        let original_b = target.method("b").expect("b");

        let first = recording_session(&fs, "first");
        let second = recording_session(&fs, "second");
        first.intercept(&target, "a").expect("intercept a");
        second.intercept(&target, "b").expect("intercept b");
        registry.register(first.clone());
        registry.register(second.clone());
        registry.register(first.clone());
        assert_eq!(registry.len(), 3);

        registry.clear_all();
        assert!(registry.is_empty());
        assert!(first.is_finished() && second.is_finished());
        assert!(target.method("a").expect("a").ptr_eq(&original_a));
        assert!(target.method("b").expect("b").ptr_eq(&original_b));
        assert!(fs.writes().is_empty());
    }

    #[test]
    fn clear_all_on_empty_registry_is_a_no_op() {
        let registry = Registry::new();
        registry.clear_all();
        registry.clear_all();
        assert!(registry.is_empty());
    }
}
