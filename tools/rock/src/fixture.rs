//! Where a fixture lives on disk and how it is read and written.

use crate::config::EnvMap;
use crate::errors::RockError;
use crate::replay::recording::FixtureDocument;
use crate::runtime::FileSystem;
use std::path::{Path, PathBuf};

pub const FIXTURE_DIR_NAME: &str = "__rock-fixtures__";
const MAX_NAME_BYTES: usize = 255 - ".json".len();
const RESERVED_NAMES: &[&str] = &[
    "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8",
    "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Resolves to `<caller crate>/tests/__rock-fixtures__` at compile time.
#[macro_export]
macro_rules! fixture_dir {
    () => {
        ::std::path::PathBuf::from(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/",
            "__rock-fixtures__"
        ))
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureLocation {
    pub name: String,
    pub dir: PathBuf,
    pub file: PathBuf,
}

impl FixtureLocation {
    pub fn new(name: &str, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let file = dir.join(format!("{}.json", sanitize_fixture_name(name)));
        Self {
            name: name.to_string(),
            dir,
            file,
        }
    }

    pub fn exists(&self, fs: &dyn FileSystem) -> Result<bool, RockError> {
        fs.exists(&self.file)
    }

    /// Creates the storage directory unless it is already there.
    pub fn ensure_dir(&self, fs: &dyn FileSystem) -> Result<(), RockError> {
        if !fs.exists(&self.dir)? {
            fs.create_dir_all(&self.dir)?;
        }
        Ok(())
    }

    pub fn load(&self, fs: &dyn FileSystem) -> Result<FixtureDocument, RockError> {
        let raw = fs.read_to_string(&self.file)?;
        FixtureDocument::parse(&self.file, &raw)
    }

    pub fn save(&self, fs: &dyn FileSystem, doc: &FixtureDocument) -> Result<(), RockError> {
        let rendered = doc.render()?;
        fs.write_string(&self.file, &rendered)
    }
}

/// Strips characters that are unsafe in a file name on common platforms.
pub fn sanitize_fixture_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .filter(|ch| !ch.is_control() && !matches!(ch, '/' | '\\' | '?' | '<' | '>' | ':' | '*' | '|' | '"'))
        .collect();

    let trimmed_len = out.trim_end_matches(['.', ' ']).len();
    out.truncate(trimmed_len);
    let out = out.trim_start_matches('.').to_string();

    let mut out = if out.is_empty() || RESERVED_NAMES.contains(&out.to_ascii_lowercase().as_str()) {
        "fixture".to_string()
    } else {
        out
    };

    if out.len() > MAX_NAME_BYTES {
        let mut cut = MAX_NAME_BYTES;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
    }
    out
}

/// `CARGO_MANIFEST_DIR/tests/__rock-fixtures__` when running under cargo,
/// else `./__rock-fixtures__`.
pub fn default_storage_dir(env: &EnvMap, cwd: &Path) -> PathBuf {
    match env.get("CARGO_MANIFEST_DIR").filter(|v| !v.is_empty()) {
        Some(manifest) => Path::new(manifest).join("tests").join(FIXTURE_DIR_NAME),
        None => cwd.join(FIXTURE_DIR_NAME),
    }
}
