//! On-disk artifact layout.
//!
//! ```text
//! <output>/project.json                 latest fresh build (manifest)
//! <output>/project/...                  exploded tree of that build
//! <modified>/project_<secs>[_<n>]/      one snapshot per modification
//! ```

use super::{validate_relative_path, Artifact, Manifest, MANIFEST_FILE};
use crate::error::StorageError;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

const TREE_DIR: &str = "project";
const SNAPSHOT_PREFIX: &str = "project_";

/// Where a persisted artifact landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedArtifact {
    /// Directory holding the manifest and tree
    pub root: PathBuf,
    pub manifest_path: PathBuf,
    pub tree_path: PathBuf,
    pub files_count: usize,
    /// Snapshot token (`<secs>` or `<secs>_<n>`); `None` for the latest slot
    pub version: Option<String>,
}

/// The artifact a modification would start from.
#[derive(Debug, Clone)]
pub struct LatestArtifact {
    pub manifest_path: PathBuf,
    pub artifact: Artifact,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    output_dir: PathBuf,
    modified_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(output_dir: impl Into<PathBuf>, modified_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            modified_dir: modified_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn modified_dir(&self) -> &Path {
        &self.modified_dir
    }

    pub fn latest_manifest_path(&self) -> PathBuf {
        self.output_dir.join(MANIFEST_FILE)
    }

    /// Overwrite the canonical latest slot. The previous exploded tree is replaced.
    pub fn save_latest(&self, artifact: &Artifact) -> Result<SavedArtifact, StorageError> {
        let saved = self.write_into(&self.output_dir, artifact, None)?;
        info!(
            manifest = %saved.manifest_path.display(),
            files = saved.files_count,
            "Saved latest artifact"
        );
        Ok(saved)
    }

    /// Write a new snapshot directory. Existing snapshots are never touched.
    pub fn save_snapshot(&self, artifact: &Artifact) -> Result<SavedArtifact, StorageError> {
        fs::create_dir_all(&self.modified_dir)?;
        let secs = chrono::Utc::now().timestamp();

        let mut seq = 0u32;
        let (dir, version) = loop {
            let version = if seq == 0 {
                secs.to_string()
            } else {
                format!("{}_{}", secs, seq)
            };
            let dir = self
                .modified_dir
                .join(format!("{}{}", SNAPSHOT_PREFIX, version));
            // create_dir fails on an existing directory, so racing writers never share one
            match fs::create_dir(&dir) {
                Ok(()) => break (dir, version),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => seq += 1,
                Err(err) => return Err(err.into()),
            }
        };

        let saved = self.write_into(&dir, artifact, Some(version))?;
        info!(
            manifest = %saved.manifest_path.display(),
            files = saved.files_count,
            "Saved modification snapshot"
        );
        Ok(saved)
    }

    fn write_into(
        &self,
        root: &Path,
        artifact: &Artifact,
        version: Option<String>,
    ) -> Result<SavedArtifact, StorageError> {
        artifact.validate_paths().map_err(StorageError::InvalidPath)?;
        fs::create_dir_all(root)?;

        let manifest_path = root.join(MANIFEST_FILE);
        let manifest = artifact
            .manifest_json()
            .map_err(|e| StorageError::MalformedManifest {
                path: manifest_path.clone(),
                message: e.to_string(),
            })?;
        let staging = root.join(format!(".{}.tmp", MANIFEST_FILE));
        fs::write(&staging, manifest)?;
        fs::rename(&staging, &manifest_path)?;

        let tree_path = root.join(TREE_DIR);
        if tree_path.exists() {
            fs::remove_dir_all(&tree_path)?;
        }
        fs::create_dir_all(&tree_path)?;
        for (relative, entry) in &artifact.files {
            let target = tree_path.join(relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, entry.text())?;
        }
        debug!(tree = %tree_path.display(), files = artifact.files.len(), "Exploded artifact tree");

        Ok(SavedArtifact {
            root: root.to_path_buf(),
            manifest_path,
            tree_path,
            files_count: artifact.files_count(),
            version,
        })
    }

    /// Read a manifest written by this store.
    pub fn load(&self, manifest_path: &Path) -> Result<Artifact, StorageError> {
        if !manifest_path.is_file() {
            return Err(StorageError::ArtifactNotFound(manifest_path.to_path_buf()));
        }
        let text = fs::read_to_string(manifest_path)?;
        let manifest: Manifest =
            serde_json::from_str(&text).map_err(|e| StorageError::MalformedManifest {
                path: manifest_path.to_path_buf(),
                message: e.to_string(),
            })?;
        Ok(manifest.project)
    }

    /// Snapshot directories ordered oldest to newest.
    pub fn snapshots(&self) -> Result<Vec<PathBuf>, StorageError> {
        if !self.modified_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut found: Vec<((i64, u32), PathBuf)> = Vec::new();
        for entry in fs::read_dir(&self.modified_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(order) = name.to_str().and_then(snapshot_order) else {
                continue;
            };
            if entry.path().join(MANIFEST_FILE).is_file() {
                found.push((order, entry.path()));
            }
        }
        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found.into_iter().map(|(_, path)| path).collect())
    }

    /// Newest snapshot manifest, else the latest slot, else `None`.
    pub fn latest_manifest(&self) -> Result<Option<PathBuf>, StorageError> {
        if let Some(newest) = self.snapshots()?.pop() {
            return Ok(Some(newest.join(MANIFEST_FILE)));
        }
        let latest = self.latest_manifest_path();
        Ok(latest.is_file().then_some(latest))
    }

    pub fn latest(&self) -> Result<Option<LatestArtifact>, StorageError> {
        match self.latest_manifest()? {
            Some(manifest_path) => {
                let artifact = self.load(&manifest_path)?;
                Ok(Some(LatestArtifact {
                    manifest_path,
                    artifact,
                }))
            }
            None => Ok(None),
        }
    }

    /// Resolve a caller-supplied base reference (manifest file or artifact dir).
    pub fn resolve_reference(&self, reference: &str, workspace: &Path) -> Result<PathBuf, StorageError> {
        let raw = Path::new(reference);
        let candidate = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            workspace.join(raw)
        };
        let candidate = if candidate.is_dir() {
            candidate.join(MANIFEST_FILE)
        } else {
            candidate
        };
        if !candidate.is_file() {
            return Err(StorageError::ArtifactNotFound(candidate));
        }
        Ok(dunce::canonicalize(&candidate)?)
    }

    /// Relative paths of the exploded tree under `root`, sorted, `/`-separated.
    pub fn tree_files(&self, root: &Path) -> Result<Vec<String>, StorageError> {
        let tree = root.join(TREE_DIR);
        let mut files = Vec::new();
        for entry in WalkDir::new(&tree).follow_links(false) {
            let entry = entry.map_err(|e| StorageError::IoError(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&tree)
                .map_err(|e| StorageError::InvalidPath(e.to_string()))?;
            let joined = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            validate_relative_path(&joined).map_err(StorageError::InvalidPath)?;
            files.push(joined);
        }
        files.sort();
        Ok(files)
    }
}

/// Sort key for `project_<secs>` or `project_<secs>_<n>`.
fn snapshot_order(name: &str) -> Option<(i64, u32)> {
    let token = name.strip_prefix(SNAPSHOT_PREFIX)?;
    match token.split_once('_') {
        Some((secs, seq)) => Some((secs.parse().ok()?, seq.parse().ok()?)),
        None => Some((token.parse().ok()?, 0)),
    }
}
