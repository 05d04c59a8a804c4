use std::fmt::{Display, Formatter};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::StoreError;
use crate::snapshot::schema::AssignmentSnapshot;

/// Identifies one assignment's snapshot file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssignmentKey {
    pub course: String,
    pub period: String,
    pub assignment: String,
}

impl AssignmentKey {
    pub fn new(
        course: impl Into<String>,
        period: impl Into<String>,
        assignment: impl Into<String>,
    ) -> Self {
        Self {
            course: course.into(),
            period: period.into(),
            assignment: assignment.into(),
        }
    }

    pub fn course_period(&self) -> String {
        format!("{} {}", self.course, self.period)
    }

    /// Snapshot location relative to the store root. Distinct keys can map to
    /// the same path once sanitized; config validation rejects those.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(sanitize_component(&self.course_period()))
            .join(format!("{}.json", sanitize_component(&self.assignment)))
    }
}

impl Display for AssignmentKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {}", self.course_period(), self.assignment)
    }
}

/// One JSON file per assignment under `<root>/<course> <period>/<assignment>.json`.
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(root).map_err(|source| StoreError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &AssignmentKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    /// Reads the stored snapshot, distinguishing "never written" from "unreadable".
    pub fn try_load(&self, key: &AssignmentKey) -> Result<Option<AssignmentSnapshot>, StoreError> {
        let path = self.path_for(key);
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        let snapshot: AssignmentSnapshot =
            serde_json::from_str(&data).map_err(|e| StoreError::Corrupt {
                path: path.clone(),
                message: e.to_string(),
            })?;
        if !snapshot.counts().is_consistent() {
            return Err(StoreError::Corrupt {
                path,
                message: "counts do not add up to total".to_string(),
            });
        }
        Ok(Some(snapshot))
    }

    /// Loads a snapshot, falling back to an empty baseline when the file is
    /// missing or unreadable. Corrupt files are moved aside first so their
    /// history survives the next save.
    pub fn load(&self, key: &AssignmentKey) -> AssignmentSnapshot {
        self.load_or_baseline(key, true)
    }

    /// Like [`SnapshotStore::load`], but leaves corrupt files where they are.
    pub fn load_untouched(&self, key: &AssignmentKey) -> AssignmentSnapshot {
        self.load_or_baseline(key, false)
    }

    fn load_or_baseline(&self, key: &AssignmentKey, quarantine_corrupt: bool) -> AssignmentSnapshot {
        match self.try_load(key) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!(assignment = %key, "no stored snapshot, starting from baseline");
                AssignmentSnapshot::default()
            }
            Err(StoreError::Corrupt { path, message }) => {
                warn!(assignment = %key, "corrupt snapshot {}: {message}", path.display());
                if !quarantine_corrupt {
                    return AssignmentSnapshot::default();
                }
                match quarantine(&path) {
                    Ok(moved) => warn!(assignment = %key, "moved corrupt snapshot to {}", moved.display()),
                    Err(err) => warn!(assignment = %key, "failed moving corrupt snapshot aside: {err}"),
                }
                AssignmentSnapshot::default()
            }
            Err(err) => {
                warn!(assignment = %key, "failed reading snapshot: {err}");
                AssignmentSnapshot::default()
            }
        }
    }

    /// Writes the snapshot through a temporary sibling file and a rename, so
    /// readers see either the previous file or the complete new one.
    pub fn save(&self, key: &AssignmentKey, snapshot: &AssignmentSnapshot) -> Result<(), StoreError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let body = serde_json::to_string_pretty(snapshot)?;
        atomic_write(&path, body.as_bytes()).map_err(|source| StoreError::Io { path, source })
    }
}

fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot".to_string());
    let temp_path = path.with_file_name(format!(".{file_name}.tmp"));

    let result = (|| {
        let mut file = File::create(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn quarantine(path: &Path) -> std::io::Result<PathBuf> {
    let mut target = path.with_extension("json.corrupt");
    let mut n = 1;
    while target.exists() {
        target = path.with_extension(format!("json.corrupt.{n}"));
        n += 1;
    }
    fs::rename(path, &target)?;
    Ok(target)
}

fn sanitize_component(raw: &str) -> String {
    let mut out: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if out.starts_with('.') {
        out.replace_range(..1, "_");
    }
    if out.is_empty() {
        out.push('_');
    }
    out
}
