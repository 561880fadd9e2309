// backuptool/src/backup/artifact.rs
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// The run timestamp as it appears in object keys: an ISO-8601 instant with
/// millisecond precision, `:` and `.` replaced by `-`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStamp(String);

impl RunStamp {
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        let iso = at.to_rfc3339_opts(SecondsFormat::Millis, true);
        RunStamp(iso.replace([':', '.'], "-"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Database,
    Volume,
}

impl ArtifactKind {
    pub fn file_name(self, stamp: &RunStamp) -> String {
        match self {
            ArtifactKind::Database => format!("backup-db-{}.tar.gz", stamp),
            ArtifactKind::Volume => format!("backup-{}.zip", stamp),
        }
    }
}

/// A file staged in the temp directory. Its remote key is its file name.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub name: String,
    pub path: PathBuf,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, stamp: &RunStamp, temp_dir: &Path) -> Self {
        let name = kind.file_name(stamp);
        let path = temp_dir.join(&name);
        Artifact { kind, name, path }
    }

    pub fn key(&self) -> &str {
        &self.name
    }
}
