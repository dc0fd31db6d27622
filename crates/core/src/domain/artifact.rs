// Artifact Domain Model
//
// Layout per artifact under the cache root:
//   <root>/<id>/.hash   verification marker, content = expected hash
//   <root>/<id>/.lock   cross-process lock file
//   <root>/<id>/...     extracted payload

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::error::{DomainError, Result};

pub const HASH_MARKER_FILE: &str = ".hash";
pub const LOCK_FILE: &str = ".lock";

/// Prefix of expected hashes that are verified against the downloaded archive
pub const SHA256_PREFIX: &str = "sha256:";

/// Archive format of a downloaded artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveKind {
    #[serde(rename = "zip")]
    Zip,
    #[serde(rename = "tar.gz")]
    TarGz,
    #[serde(rename = "tar.xz")]
    TarXz,
}

impl ArchiveKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveKind::Zip => "zip",
            ArchiveKind::TarGz => "tar.gz",
            ArchiveKind::TarXz => "tar.xz",
        }
    }

    /// Guess the archive kind from a file name or URL
    pub fn from_file_name(name: &str) -> Option<ArchiveKind> {
        if name.ends_with(".zip") {
            Some(ArchiveKind::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveKind::TarGz)
        } else if name.ends_with(".tar.xz") {
            Some(ArchiveKind::TarXz)
        } else {
            None
        }
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ArchiveKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "zip" => Ok(ArchiveKind::Zip),
            "tar.gz" | "tgz" => Ok(ArchiveKind::TarGz),
            "tar.xz" => Ok(ArchiveKind::TarXz),
            other => Err(DomainError::ValidationError(format!(
                "unknown archive kind '{other}'"
            ))),
        }
    }
}

/// Fix-up applied to the payload after extraction, before the marker is written
///
/// Paths are relative to the install directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostExtract {
    RemoveDir(PathBuf),
    /// chmod u+rwx (no-op on non-unix hosts)
    MakeExecutable(PathBuf),
}

/// Lifecycle of an artifact on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactState {
    Absent,
    Downloading,
    ExtractedUnverified,
    Verified,
}

impl fmt::Display for ArtifactState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactState::Absent => write!(f, "ABSENT"),
            ArtifactState::Downloading => write!(f, "DOWNLOADING"),
            ArtifactState::ExtractedUnverified => write!(f, "EXTRACTED_UNVERIFIED"),
            ArtifactState::Verified => write!(f, "VERIFIED"),
        }
    }
}

/// A downloadable, content-hashed dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    id: String,
    pub url: String,
    /// Written verbatim to the marker; may be empty for unversioned bundles
    pub expected_hash: String,
    pub archive: ArchiveKind,
    pub post_extract: Vec<PostExtract>,
}

impl Artifact {
    /// Create an artifact; the id becomes a relative path under the cache root
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        expected_hash: impl Into<String>,
        archive: ArchiveKind,
    ) -> Result<Self> {
        let id = id.into();
        validate_id(&id)?;

        Ok(Self {
            id,
            url: url.into(),
            expected_hash: expected_hash.into(),
            archive,
            post_extract: Vec::new(),
        })
    }

    pub fn with_post_extract(mut self, step: PostExtract) -> Self {
        self.post_extract.push(step);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn install_dir(&self, cache_root: &Path) -> PathBuf {
        self.id
            .split('/')
            .fold(cache_root.to_path_buf(), |dir, segment| dir.join(segment))
    }

    pub fn marker_path(&self, cache_root: &Path) -> PathBuf {
        self.install_dir(cache_root).join(HASH_MARKER_FILE)
    }

    pub fn lock_path(&self, cache_root: &Path) -> PathBuf {
        self.install_dir(cache_root).join(LOCK_FILE)
    }

    /// Hex digest to verify the archive against, when the hash is `sha256:<hex>`
    pub fn sha256_digest(&self) -> Option<&str> {
        self.expected_hash
            .strip_prefix(SHA256_PREFIX)
            .filter(|hex| !hex.is_empty())
    }
}

fn validate_id(id: &str) -> Result<()> {
    let invalid = |reason: &str| DomainError::InvalidArtifactId(format!("'{id}': {reason}"));

    if id.is_empty() {
        return Err(invalid("empty"));
    }
    if id.contains('\\') || id.contains(':') {
        return Err(invalid("use '/' separated relative segments"));
    }
    for segment in id.split('/') {
        match segment {
            "" => return Err(invalid("empty segment")),
            "." | ".." => return Err(invalid("relative segment")),
            _ => {}
        }
    }
    Ok(())
}
