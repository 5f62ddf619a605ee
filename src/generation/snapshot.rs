//! Saving and loading a generation as a directory of files.
//!
//! Layout:
//! - `manifest.json`: format version, generation number, dimension, profile
//!   count, centroids and the state of every cluster
//! - `cluster_{id}.index` and `cluster_{id}_positions.bin` for each built
//!   cluster, always written and read as a pair
//!
//! Profiles themselves are not part of the snapshot; the caller supplies the
//! same `ProfileStore` on load and its size is checked against the manifest.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cluster::{ClusterIndex, ClusterSlot};
use crate::error::{EngineError, EngineResult, SnapshotContext};
use crate::generation::IndexGeneration;
use crate::profile::ProfileStore;
use crate::vector::{
    ClusterId, MmapIndexBlob, VectorDimension, index_blob_path, position_mapping_path,
    read_position_mapping, write_index_blob, write_position_mapping,
};

/// File name of the snapshot manifest.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Version written to new manifests. Newer versions are refused on load.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    generation: u64,
    dimension: usize,
    profile_count: usize,
    centroids: Vec<Vec<f32>>,
    clusters: Vec<ClusterEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ClusterEntry {
    id: ClusterId,
    state: SlotState,
    member_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum SlotState {
    Built,
    Empty,
    Failed,
}

impl ClusterEntry {
    fn describe(id: ClusterId, slot: &ClusterSlot) -> Self {
        let (state, reason) = match slot {
            ClusterSlot::Built(_) => (SlotState::Built, None),
            ClusterSlot::Empty => (SlotState::Empty, None),
            ClusterSlot::Failed { reason } => (SlotState::Failed, Some(reason.clone())),
        };
        Self {
            id,
            state,
            member_count: slot.member_count(),
            reason,
        }
    }
}

impl IndexGeneration {
    /// Writes this generation into `dir`, replacing any previous snapshot there.
    ///
    /// `dir` belongs to the snapshot: the new files are written into a
    /// sibling staging directory which then replaces `dir` as a whole. The
    /// previous snapshot is moved aside until the swap has happened, so an
    /// interrupted save leaves either the old or the new generation loadable.
    pub fn save(&self, dir: impl AsRef<Path>) -> EngineResult<()> {
        let dir = dir.as_ref();
        if dir.exists() && !dir.is_dir() {
            return Err(EngineError::Persist {
                path: dir.to_path_buf(),
                reason: "snapshot location exists and is not a directory".to_string(),
            });
        }
        let name = dir_name(dir)?;
        let parent = parent_of(dir);
        fs::create_dir_all(parent).persist_context(parent)?;

        let staging = tempfile::Builder::new()
            .prefix(&format!(".{name}.staging-"))
            .tempdir_in(parent)
            .persist_context(parent)?;
        self.write_files(staging.path())?;
        install(staging.path(), dir)?;

        tracing::info!(
            generation = self.number(),
            clusters = self.cluster_count(),
            path = %dir.display(),
            "saved index generation"
        );
        Ok(())
    }

    fn write_files(&self, dir: &Path) -> EngineResult<()> {
        let mut clusters = Vec::with_capacity(self.slots().len());
        for (i, slot) in self.slots().iter().enumerate() {
            let id = ClusterId::new(i as u32);
            if let ClusterSlot::Built(cluster) = slot {
                let blob = index_blob_path(dir, id);
                write_index_blob(&blob, cluster.index()).persist_context(&blob)?;
                let mapping = position_mapping_path(dir, id);
                write_position_mapping(&mapping, cluster.positions()).persist_context(&mapping)?;
            }
            clusters.push(ClusterEntry::describe(id, slot));
        }

        let manifest = Manifest {
            format_version: SNAPSHOT_FORMAT_VERSION,
            generation: self.number(),
            dimension: self.dimension().get(),
            profile_count: self.store().len(),
            centroids: self.centroids().to_vec(),
            clusters,
        };

        let manifest_path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(&manifest).persist_context(&manifest_path)?;
        fs::write(&manifest_path, json).persist_context(&manifest_path)
    }

    /// Reads a generation previously written by [`IndexGeneration::save`].
    ///
    /// `store` must be the corpus the generation was built from. Any
    /// inconsistency between the manifest and the cluster files is fatal.
    pub fn load(dir: impl AsRef<Path>, store: Arc<ProfileStore>) -> EngineResult<Self> {
        let requested = dir.as_ref();
        let Some(dir) = snapshot_root(requested) else {
            return Err(EngineError::Load {
                path: requested.join(MANIFEST_FILE),
                reason: "no snapshot has been saved here".to_string(),
            });
        };
        let dir = dir.as_path();
        let manifest_path = dir.join(MANIFEST_FILE);
        let json = fs::read_to_string(&manifest_path).load_context(&manifest_path)?;
        let manifest: Manifest = serde_json::from_str(&json).load_context(&manifest_path)?;

        let load_error = |reason: String| EngineError::Load {
            path: manifest_path.clone(),
            reason,
        };

        if manifest.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(load_error(format!(
                "snapshot format {} is newer than supported format {SNAPSHOT_FORMAT_VERSION}",
                manifest.format_version
            )));
        }
        if manifest.profile_count != store.len() {
            return Err(load_error(format!(
                "snapshot was built over {} profiles but the corpus has {}",
                manifest.profile_count,
                store.len()
            )));
        }
        if manifest.centroids.len() != manifest.clusters.len() {
            return Err(load_error(format!(
                "{} centroids listed for {} clusters",
                manifest.centroids.len(),
                manifest.clusters.len()
            )));
        }
        let dimension = VectorDimension::new(manifest.dimension).load_context(&manifest_path)?;

        let mut slots = Vec::with_capacity(manifest.clusters.len());
        for (i, entry) in manifest.clusters.iter().enumerate() {
            if entry.id.as_usize() != i {
                return Err(load_error(format!(
                    "cluster entry {i} is labelled {}",
                    entry.id
                )));
            }
            slots.push(load_slot(dir, entry, dimension)?);
        }

        tracing::info!(
            generation = manifest.generation,
            clusters = slots.len(),
            path = %dir.display(),
            "loaded index generation"
        );

        IndexGeneration::new(
            manifest.generation,
            dimension,
            manifest.centroids,
            slots,
            store,
        )
    }
}

/// Generation number of the snapshot in `dir`, if one has been saved there.
pub fn saved_generation_number(dir: impl AsRef<Path>) -> EngineResult<Option<u64>> {
    let Some(root) = snapshot_root(dir.as_ref()) else {
        return Ok(None);
    };
    let manifest_path = root.join(MANIFEST_FILE);
    let json = fs::read_to_string(&manifest_path).load_context(&manifest_path)?;
    let manifest: Manifest = serde_json::from_str(&json).load_context(&manifest_path)?;
    Ok(Some(manifest.generation))
}

fn load_slot(dir: &Path, entry: &ClusterEntry, dimension: VectorDimension) -> EngineResult<ClusterSlot> {
    let blob_path = index_blob_path(dir, entry.id);
    let mapping_path = position_mapping_path(dir, entry.id);

    match (entry.state, blob_path.exists(), mapping_path.exists()) {
        (SlotState::Built, true, true) => {}
        (SlotState::Built, false, _) => return Err(missing(&blob_path, entry.id)),
        (SlotState::Built, true, false) => return Err(missing(&mapping_path, entry.id)),
        (_, false, false) => {
            return Ok(match entry.state {
                SlotState::Failed => ClusterSlot::Failed {
                    reason: entry.reason.clone().unwrap_or_default(),
                },
                _ => ClusterSlot::Empty,
            });
        }
        (_, true, _) => return Err(orphan(&blob_path, entry.id)),
        (_, false, true) => return Err(orphan(&mapping_path, entry.id)),
    }

    let blob = MmapIndexBlob::open(&blob_path).load_context(&blob_path)?;
    let positions = read_position_mapping(&mapping_path).load_context(&mapping_path)?;

    if blob.dimension() != dimension {
        return Err(EngineError::Load {
            path: blob_path,
            reason: format!(
                "index has dimension {} but the snapshot uses {}",
                blob.dimension().get(),
                dimension.get()
            ),
        });
    }
    if blob.vector_count() != positions.len() || positions.len() != entry.member_count {
        return Err(EngineError::Load {
            path: mapping_path,
            reason: format!(
                "cluster {} has {} vectors, {} mapped positions and {} listed members",
                entry.id,
                blob.vector_count(),
                positions.len(),
                entry.member_count
            ),
        });
    }

    let index = blob.to_index().load_context(&blob_path)?;
    tracing::debug!(cluster = %entry.id, members = positions.len(), "loaded cluster index");
    Ok(ClusterSlot::Built(ClusterIndex::new(entry.id, index, positions)?))
}

fn missing(path: &Path, cluster: ClusterId) -> EngineError {
    EngineError::Load {
        path: path.to_path_buf(),
        reason: format!("file of built cluster {cluster} is missing"),
    }
}

fn orphan(path: &Path, cluster: ClusterId) -> EngineError {
    EngineError::Load {
        path: path.to_path_buf(),
        reason: format!("cluster {cluster} is not built but has files on disk"),
    }
}

fn dir_name(dir: &Path) -> EngineResult<String> {
    dir.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| EngineError::Persist {
            path: dir.to_path_buf(),
            reason: "snapshot location must end in a directory name".to_string(),
        })
}

fn parent_of(dir: &Path) -> &Path {
    match dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Where the previous snapshot waits while a new one is moved into place.
fn backup_path(dir: &Path) -> Option<PathBuf> {
    let name = dir.file_name()?.to_str()?;
    Some(parent_of(dir).join(format!(".{name}.previous")))
}

/// Directory holding the snapshot for `dir`.
///
/// Falls back to the moved-aside previous snapshot when a save was
/// interrupted between moving it away and installing its replacement.
fn snapshot_root(dir: &Path) -> Option<PathBuf> {
    if dir.join(MANIFEST_FILE).is_file() {
        return Some(dir.to_path_buf());
    }
    let backup = backup_path(dir)?;
    if backup.join(MANIFEST_FILE).is_file() {
        tracing::warn!(
            path = %dir.display(),
            previous = %backup.display(),
            "using the previous snapshot left by an interrupted save"
        );
        return Some(backup);
    }
    None
}

/// Replaces `dir` with the fully written `staging` directory.
fn install(staging: &Path, dir: &Path) -> EngineResult<()> {
    let backup = backup_path(dir).ok_or_else(|| EngineError::Persist {
        path: dir.to_path_buf(),
        reason: "snapshot location must end in a directory name".to_string(),
    })?;

    if dir.exists() {
        if backup.exists() {
            fs::remove_dir_all(&backup).persist_context(&backup)?;
        }
        fs::rename(dir, &backup).persist_context(dir)?;
    }

    if let Err(e) = fs::rename(staging, dir) {
        if backup.exists() && fs::rename(&backup, dir).is_err() {
            tracing::warn!(previous = %backup.display(), "previous snapshot left aside");
        }
        return Err(EngineError::Persist {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        });
    }

    if backup.exists() {
        if let Err(e) = fs::remove_dir_all(&backup) {
            tracing::warn!(path = %backup.display(), error = %e, "could not remove previous snapshot");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Profile;
    use crate::vector::{FlatIpIndex, ProfileIndex};
    use tempfile::TempDir;

    fn store(n: usize) -> Arc<ProfileStore> {
        let profiles = (0..n)
            .map(|i| Profile {
                profile_id: format!("p{i}"),
                ..Profile::default()
            })
            .collect();
        Arc::new(ProfileStore::new(profiles).unwrap())
    }

    fn generation() -> IndexGeneration {
        let dim = VectorDimension::new(3).unwrap();
        let mut index = FlatIpIndex::new(dim);
        index.add(&[1.0, 0.0, 0.0]).unwrap();
        index.add(&[0.8, 0.2, 0.0]).unwrap();
        let built = ClusterIndex::new(
            ClusterId::new(0),
            index,
            vec![ProfileIndex::new(3), ProfileIndex::new(1)],
        )
        .unwrap();

        IndexGeneration::new(
            7,
            dim,
            vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]],
            vec![
                ClusterSlot::Built(built),
                ClusterSlot::Empty,
                ClusterSlot::Failed {
                    reason: "dimension mismatch".to_string(),
                },
            ],
            store(4),
        )
        .unwrap()
    }

    #[test]
    fn test_save_then_load_restores_every_slot() {
        let dir = TempDir::new().unwrap();
        assert_eq!(saved_generation_number(dir.path()).unwrap(), None);
        generation().save(dir.path()).unwrap();

        assert!(dir.path().join(MANIFEST_FILE).exists());
        assert_eq!(saved_generation_number(dir.path()).unwrap(), Some(7));
        assert!(index_blob_path(dir.path(), ClusterId::new(0)).exists());
        assert!(!index_blob_path(dir.path(), ClusterId::new(1)).exists());

        let loaded = IndexGeneration::load(dir.path(), store(4)).unwrap();
        assert_eq!(loaded.number(), 7);
        assert_eq!(loaded.cluster_count(), 3);

        let cluster = loaded.slots()[0].as_built().unwrap();
        assert_eq!(
            cluster.positions(),
            &[ProfileIndex::new(3), ProfileIndex::new(1)]
        );
        assert_eq!(cluster.index().len(), 2);
        assert_eq!(loaded.slots()[1], ClusterSlot::Empty);
        assert!(matches!(
            &loaded.slots()[2],
            ClusterSlot::Failed { reason } if reason == "dimension mismatch"
        ));
    }

    #[test]
    fn test_missing_mapping_is_fatal() {
        let dir = TempDir::new().unwrap();
        generation().save(dir.path()).unwrap();
        fs::remove_file(position_mapping_path(dir.path(), ClusterId::new(0))).unwrap();

        let err = IndexGeneration::load(dir.path(), store(4)).unwrap_err();
        assert!(matches!(err, EngineError::Load { .. }));
    }

    #[test]
    fn test_orphan_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        generation().save(dir.path()).unwrap();
        fs::copy(
            index_blob_path(dir.path(), ClusterId::new(0)),
            index_blob_path(dir.path(), ClusterId::new(1)),
        )
        .unwrap();

        let err = IndexGeneration::load(dir.path(), store(4)).unwrap_err();
        assert!(matches!(err, EngineError::Load { .. }));
    }

    #[test]
    fn test_count_mismatch_between_blob_and_mapping_is_fatal() {
        let dir = TempDir::new().unwrap();
        generation().save(dir.path()).unwrap();
        write_position_mapping(
            &position_mapping_path(dir.path(), ClusterId::new(0)),
            &[ProfileIndex::new(3)],
        )
        .unwrap();

        let err = IndexGeneration::load(dir.path(), store(4)).unwrap_err();
        assert!(matches!(err, EngineError::Load { .. }));
    }

    #[test]
    fn test_profile_count_must_match_corpus() {
        let dir = TempDir::new().unwrap();
        generation().save(dir.path()).unwrap();
        let err = IndexGeneration::load(dir.path(), store(5)).unwrap_err();
        assert!(matches!(err, EngineError::Load { .. }));
    }

    #[test]
    fn test_resave_removes_stale_cluster_files() {
        let dir = TempDir::new().unwrap();
        let stale = index_blob_path(dir.path(), ClusterId::new(9));
        fs::write(&stale, b"stale").unwrap();

        generation().save(dir.path()).unwrap();
        assert!(!stale.exists());
        assert!(IndexGeneration::load(dir.path(), store(4)).is_ok());
    }

    fn other_generation() -> IndexGeneration {
        let dim = VectorDimension::new(3).unwrap();
        let mut index = FlatIpIndex::new(dim);
        index.add(&[0.0, 0.0, 1.0]).unwrap();
        let built =
            ClusterIndex::new(ClusterId::new(0), index, vec![ProfileIndex::new(0)]).unwrap();
        IndexGeneration::new(8, dim, vec![vec![0.0, 0.0, 1.0]], vec![ClusterSlot::Built(built)], store(4))
            .unwrap()
    }

    #[test]
    fn test_unfinished_staging_leaves_previous_generation() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("index");
        generation().save(&dir).unwrap();

        // A save that died while writing: its staging directory is incomplete
        let staging = root.path().join(".index.staging-dead");
        fs::create_dir(&staging).unwrap();
        other_generation().write_files(&staging).unwrap();
        fs::remove_file(staging.join(MANIFEST_FILE)).unwrap();

        let loaded = IndexGeneration::load(&dir, store(4)).unwrap();
        assert_eq!(loaded.number(), 7);
        assert_eq!(loaded.cluster_count(), 3);
    }

    #[test]
    fn test_interrupted_swap_falls_back_to_previous_generation() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("index");
        generation().save(&dir).unwrap();

        // Crash after moving the old snapshot aside, before installing the new one
        fs::rename(&dir, backup_path(&dir).unwrap()).unwrap();
        assert_eq!(saved_generation_number(&dir).unwrap(), Some(7));
        assert_eq!(IndexGeneration::load(&dir, store(4)).unwrap().number(), 7);

        other_generation().save(&dir).unwrap();
        assert_eq!(IndexGeneration::load(&dir, store(4)).unwrap().number(), 8);
        assert!(!backup_path(&dir).unwrap().exists());
    }

    #[test]
    fn test_failed_save_keeps_the_target_untouched() {
        let root = TempDir::new().unwrap();
        let target = root.path().join("index");
        fs::write(&target, b"not a snapshot").unwrap();

        let err = generation().save(&target).unwrap_err();
        assert!(matches!(err, EngineError::Persist { .. }));
        assert_eq!(fs::read(&target).unwrap(), b"not a snapshot");
        assert!(!backup_path(&target).unwrap().exists());
    }

    #[test]
    fn test_missing_snapshot_is_a_clean_load_error() {
        let root = TempDir::new().unwrap();
        let err = IndexGeneration::load(root.path().join("index"), store(4)).unwrap_err();
        assert!(matches!(err, EngineError::Load { ref reason, .. } if reason.contains("no snapshot")));
    }
}
