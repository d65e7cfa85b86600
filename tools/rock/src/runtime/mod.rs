use crate::errors::RockError;
use futures::future::{self, BoxFuture, FutureExt};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;

    fn now_ms(&self) -> u64 {
        self.now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, RockError>;
    fn write_string(&self, path: &Path, contents: &str) -> Result<(), RockError>;
    fn create_dir_all(&self, path: &Path) -> Result<(), RockError>;
    fn exists(&self, path: &Path) -> Result<bool, RockError>;
}

pub struct ProductionClock;

impl Clock for ProductionClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        tokio::time::sleep(duration).boxed()
    }
}

pub struct ProductionFileSystem;

impl FileSystem for ProductionFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, RockError> {
        std::fs::read_to_string(path)
            .map_err(|e| RockError::Io(format!("read {}: {e}", path.display())))
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<(), RockError> {
        std::fs::write(path, contents)
            .map_err(|e| RockError::Io(format!("write {}: {e}", path.display())))
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), RockError> {
        std::fs::create_dir_all(path)
            .map_err(|e| RockError::Io(format!("create {}: {e}", path.display())))
    }

    fn exists(&self, path: &Path) -> Result<bool, RockError> {
        path.try_exists()
            .map_err(|e| RockError::Io(format!("probe {}: {e}", path.display())))
    }
}

/// The collaborators a session performs I/O and timekeeping through.
#[derive(Clone)]
pub struct Runtime {
    pub clock: Arc<dyn Clock>,
    pub file_system: Arc<dyn FileSystem>,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(ProductionClock),
            file_system: Arc::new(ProductionFileSystem),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_file_system(mut self, file_system: Arc<dyn FileSystem>) -> Self {
        self.file_system = file_system;
        self
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Clock for tests: `now` only moves when advanced, and sleeps are recorded
/// and resolve immediately.
#[derive(Clone)]
pub struct FakeClock {
    now: Arc<Mutex<SystemTime>>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl FakeClock {
    pub fn new(now: SystemTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
            sleeps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock lock");
        *now += by;
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().expect("sleep lock").clone()
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(UNIX_EPOCH + Duration::from_secs(1_700_000_000))
    }
}

impl Clock for FakeClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().expect("clock lock")
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        self.sleeps.lock().expect("sleep lock").push(duration);
        future::ready(()).boxed()
    }
}

#[derive(Default, Clone)]
pub struct FakeFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
    dirs: Arc<Mutex<HashSet<PathBuf>>>,
    writes: Arc<Mutex<Vec<PathBuf>>>,
    fail_next: Arc<Mutex<Option<(usize, RockError)>>>,
}

impl FakeFileSystem {
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let fs = Self::default();
        fs.files
            .lock()
            .expect("files lock")
            .insert(path.into(), contents.into());
        fs
    }

    pub fn set_fail_next(&self, error: RockError) {
        self.set_fail_after(0, error);
    }

    /// Lets `skip` operations succeed, then fails the next one once.
    pub fn set_fail_after(&self, skip: usize, error: RockError) {
        *self.fail_next.lock().expect("fail lock") = Some((skip, error));
    }

    pub fn file(&self, path: &Path) -> Option<String> {
        self.files.lock().expect("files lock").get(path).cloned()
    }

    pub fn created_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = self
            .dirs
            .lock()
            .expect("dirs lock")
            .iter()
            .cloned()
            .collect::<Vec<_>>();
        dirs.sort();
        dirs
    }

    /// Every successful write, in order.
    pub fn writes(&self) -> Vec<PathBuf> {
        self.writes.lock().expect("writes lock").clone()
    }

    fn maybe_fail(&self) -> Result<(), RockError> {
        let mut pending = self.fail_next.lock().expect("fail lock");
        if let Some((skip, _)) = pending.as_mut() {
            if *skip > 0 {
                *skip -= 1;
                return Ok(());
            }
        }
        match pending.take() {
            Some((_, err)) => Err(err),
            None => Ok(()),
        }
    }
}

impl FileSystem for FakeFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, RockError> {
        self.maybe_fail()?;
        self.file(path)
            .ok_or_else(|| RockError::Io(format!("missing file {}", path.display())))
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<(), RockError> {
        self.maybe_fail()?;
        self.files
            .lock()
            .expect("files lock")
            .insert(path.to_path_buf(), contents.to_string());
        self.writes
            .lock()
            .expect("writes lock")
            .push(path.to_path_buf());
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), RockError> {
        self.maybe_fail()?;
        self.dirs
            .lock()
            .expect("dirs lock")
            .insert(path.to_path_buf());
        Ok(())
    }

    fn exists(&self, path: &Path) -> Result<bool, RockError> {
        self.maybe_fail()?;
        Ok(self.files.lock().expect("files lock").contains_key(path)
            || self.dirs.lock().expect("dirs lock").contains(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_records_sleeps_without_moving_time() {
        let clock = FakeClock::default();
        let before = clock.now_ms();
        futures::executor::block_on(clock.sleep(Duration::from_millis(25)));
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(25)]);
        assert_eq!(clock.now_ms(), before);

        clock.advance(Duration::from_millis(40));
        assert_eq!(clock.now_ms(), before + 40);
    }

    #[test]
    fn fake_fs_fail_next_is_one_shot() {
        let fs = FakeFileSystem::default();
        fs.set_fail_next(RockError::Io("disk full".to_string()));
        assert!(fs.write_string(Path::new("/a.json"), "{}").is_err());
        fs.write_string(Path::new("/a.json"), "{}").expect("second write");
        assert_eq!(fs.writes(), vec![PathBuf::from("/a.json")]);
        assert!(fs.exists(Path::new("/a.json")).expect("probe"));
    }

    #[test]
    fn fake_fs_fail_after_skips_earlier_operations() {
        let fs = FakeFileSystem::default();
        fs.set_fail_after(1, RockError::Io("quota".to_string()));
        assert!(!fs.exists(Path::new("/d")).expect("first op passes"));
        assert!(fs.create_dir_all(Path::new("/d")).is_err());
        fs.create_dir_all(Path::new("/d")).expect("third op passes");
        assert_eq!(fs.created_dirs(), vec![PathBuf::from("/d")]);
    }

    #[test]
    fn production_fs_probes_and_creates_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("a/b");
        let fs = ProductionFileSystem;
        assert!(!fs.exists(&nested).expect("probe"));
        fs.create_dir_all(&nested).expect("create");
        assert!(fs.exists(&nested).expect("probe"));
    }
}
