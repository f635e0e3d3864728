//! Artifact store (C2): per-commit directory layout, bundle map, duplicate
//! purge.

use crate::bundle::codec;
use crate::error::{Error, Result};
use crate::vcs::Vcs;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

const VERSIONS_DIR: &str = "versions";
const BUNDLES_DIR: &str = "bundles";
const STATE_DIR: &str = "state";
const IGNORE_FILE: &str = "ignored_commits";
const COMPILE_ERROR_FILE: &str = "compile_error_commits";

pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(self.versions_dir())?;
        fs::create_dir_all(self.bundles_dir())?;
        fs::create_dir_all(self.root.join(STATE_DIR))?;
        Ok(())
    }

    fn versions_dir(&self) -> PathBuf {
        self.root.join(VERSIONS_DIR)
    }

    /// Bundles live in their own subdirectory, never `versions/`: a bundle ID
    /// is conventionally its first member commit's ID, so a bundle path
    /// under `versions/` would collide with that commit's own loose
    /// directory of the same name.
    fn bundles_dir(&self) -> PathBuf {
        self.root.join(BUNDLES_DIR)
    }

    fn bundle_path(&self, bundle_id: &str) -> PathBuf {
        self.bundles_dir().join(format!("{bundle_id}.tar.zst"))
    }

    fn bundle_map_path(&self) -> PathBuf {
        self.root.join(STATE_DIR).join("bundle_map")
    }

    fn ignore_file_path(&self) -> PathBuf {
        self.root.join(IGNORE_FILE)
    }

    fn compile_error_file_path(&self) -> PathBuf {
        self.root.join(COMPILE_ERROR_FILE)
    }

    pub fn version_path(&self, commit: &str) -> PathBuf {
        self.versions_dir().join(commit)
    }

    fn read_bundle_map(&self) -> Result<HashMap<String, String>> {
        let path = self.bundle_map_path();
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let text = fs::read_to_string(path)?;
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let mut map = HashMap::new();
        let mut pairs = lines.chunks_exact(2);
        for pair in &mut pairs {
            map.insert(pair[0].trim().to_string(), pair[1].trim().to_string());
        }
        Ok(map)
    }

    /// Writes the map, then fsyncs it. `compress_bundle` relies on the bundle
    /// file itself already being synced before this is called, so that a
    /// crash never leaves a map entry pointing at a bundle that isn't there.
    fn write_bundle_map(&self, map: &HashMap<String, String>) -> Result<()> {
        use std::io::Write;
        let path = self.bundle_map_path();
        let mut file = fs::File::create(&path)?;
        for (commit, bundle_id) in map {
            writeln!(file, "{commit}\n{bundle_id}")?;
        }
        file.sync_all()?;
        Ok(())
    }

    /// Union of (loose directories named by a valid commit ID) and (bundle
    /// map keys).
    #[instrument(skip(self, vcs))]
    pub fn present_versions(&self, vcs: &Vcs) -> Result<HashSet<String>> {
        let mut result: HashSet<String> = HashSet::new();
        if self.versions_dir().exists() {
            for entry in fs::read_dir(self.versions_dir())? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if vcs.resolve(&name).as_deref() == Some(name.as_str()) {
                    result.insert(name);
                }
            }
        }
        result.extend(self.read_bundle_map()?.into_keys());
        Ok(result)
    }

    pub fn recursive_file_count(path: &Path) -> usize {
        if !path.exists() {
            return 0;
        }
        walkdir::WalkDir::new(path).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()).count()
    }

    /// Removes a file or directory, returning how many files were deleted.
    pub fn remove_path(path: &Path) -> Result<usize> {
        if !path.exists() {
            return Ok(0);
        }
        if path.is_dir() {
            let count = Self::recursive_file_count(path);
            fs::remove_dir_all(path)?;
            Ok(count)
        } else {
            fs::remove_file(path)?;
            Ok(1)
        }
    }

    /// Extracts `commit` to `target` if given and distinct from its home
    /// directory in the versions root.
    #[instrument(skip(self))]
    pub fn extract(&self, commit: &str, target: Option<&Path>) -> Result<()> {
        let version_path = self.version_path(commit);
        if !version_path.exists() {
            let bundle_map = self.read_bundle_map()?;
            let bundle_id = bundle_map
                .get(commit)
                .ok_or_else(|| Error::bundle_missing(commit, "<unknown>"))?;
            let bundle_path = self.bundle_path(bundle_id);
            let extracted =
                codec::extract_with_prefix(&bundle_path, commit, &self.versions_dir())?;
            if !extracted {
                return Err(Error::bundle_missing(commit, bundle_id.clone()));
            }
        }
        if let Some(target) = target {
            if target != version_path {
                copy_dir_all(&version_path, target)?;
            }
        }
        Ok(())
    }

    /// Writes a new bundle from `commits`' loose directories, updates the
    /// bundle map, then deletes the loose directories. Ordering matters:
    /// write-bundle (fsynced) → update-map → delete-loose, so a crash
    /// between stages never leaves a map entry with no backing bundle.
    #[instrument(skip(self, commits))]
    pub fn compress_bundle(&self, bundle_id: &str, commits: &[String]) -> Result<bool> {
        fs::create_dir_all(self.bundles_dir())?;
        let bundle_path = self.bundle_path(bundle_id);
        if bundle_path.exists() {
            let map = self.read_bundle_map()?;
            if map.values().any(|id| id == bundle_id) {
                return Ok(false);
            }
            // Stale leftover from a prior crash mid-compress; overwrite it.
            Self::remove_path(&bundle_path)?;
        }

        let version_paths: Vec<PathBuf> = commits.iter().map(|c| self.version_path(c)).collect();
        codec::compress(&version_paths, &bundle_path).map_err(|e| {
            Error::compress_failed(bundle_id, e.to_string())
        })?;
        // fsync the bundle before the map can point to it.
        fs::File::open(&bundle_path)?.sync_all()?;

        let mut map = self.read_bundle_map()?;
        for commit in commits {
            map.insert(commit.clone(), bundle_id.to_string());
        }
        self.write_bundle_map(&map)?;

        for version_path in &version_paths {
            Self::remove_path(version_path)?;
        }
        Ok(true)
    }

    /// Deletes loose directories that are already present in the bundle map,
    /// except those in `protected`.
    pub fn purge_duplicates(&self, protected: &HashSet<String>) -> Result<usize> {
        let map = self.read_bundle_map()?;
        let mut purged = 0;
        if !self.versions_dir().exists() {
            return Ok(0);
        }
        for entry in fs::read_dir(self.versions_dir())? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if map.contains_key(&name) && !protected.contains(&name) {
                Self::remove_path(&entry.path())?;
                purged += 1;
            }
        }
        Ok(purged)
    }

    /// Loose directories whose name is a valid commit ID and not yet bundled,
    /// in `full_rev_list` order.
    pub fn unbundled_versions(&self, full_rev_list: &[String]) -> Result<Vec<String>> {
        let map = self.read_bundle_map()?;
        let loose: HashSet<String> = if self.versions_dir().exists() {
            fs::read_dir(self.versions_dir())?
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        } else {
            HashSet::new()
        };
        Ok(full_rev_list
            .iter()
            .filter(|c| loose.contains(c.as_str()) && !map.contains_key(c.as_str()))
            .cloned()
            .collect())
    }

    pub fn ignored_commits(&self) -> Result<HashSet<String>> {
        read_commit_set(&self.ignore_file_path())
    }

    pub fn error_commits(&self) -> Result<HashSet<String>> {
        read_commit_set(&self.compile_error_file_path())
    }

    /// Appends only the commits not already present (append-only set).
    pub fn add_error_commits(&self, commits: &[String]) -> Result<()> {
        use std::io::Write;
        let existing = self.error_commits()?;
        let new: Vec<&String> = commits.iter().filter(|c| !existing.contains(c.as_str())).collect();
        if new.is_empty() {
            return Ok(());
        }
        let mut file = fs::OpenOptions::new().create(true).append(true).open(self.compile_error_file_path())?;
        for commit in new {
            writeln!(file, "{commit}")?;
        }
        Ok(())
    }
}

fn read_commit_set(path: &Path) -> Result<HashSet<String>> {
    if !path.exists() {
        return Ok(HashSet::new());
    }
    let text = fs::read_to_string(path)?;
    Ok(text.split_whitespace().map(str::to_string).collect())
}

fn copy_dir_all(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let dst_path = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &dst_path)?;
        } else {
            fs::copy(entry.path(), dst_path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_version(store: &ArtifactStore, commit: &str, contents: &str) {
        let dir = store.version_path(commit);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("bin"), contents).unwrap();
    }

    #[test]
    fn compress_then_extract_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());
        store.init().unwrap();

        let commits = vec!["a".repeat(40), "b".repeat(40)];
        for c in &commits {
            write_version(&store, c, c);
        }

        store.compress_bundle(&commits[0], &commits).unwrap();

        for c in &commits {
            assert!(!store.version_path(c).exists());
            store.extract(c, None).unwrap();
            let contents = fs::read_to_string(store.version_path(c).join("bin")).unwrap();
            assert_eq!(contents, *c);
        }
    }

    #[test]
    fn compress_bundle_is_idempotent_when_already_mapped() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());
        store.init().unwrap();
        let commits = vec!["c".repeat(40)];
        write_version(&store, &commits[0], "x");
        assert!(store.compress_bundle(&commits[0], &commits).unwrap());
        // loose dir is gone, re-running with the same bundle id is a no-op.
        assert!(!store.compress_bundle(&commits[0], &commits).unwrap());
    }

    #[test]
    fn purge_duplicates_keeps_protected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());
        store.init().unwrap();
        let commits: Vec<String> = (0..4).map(|i| format!("{i}").repeat(40)).collect();
        for c in &commits {
            write_version(&store, c, c);
        }
        store.compress_bundle(&commits[0], &commits).unwrap();
        // re-create loose copies to simulate duplicates alongside the bundle
        for c in &commits {
            write_version(&store, c, c);
        }
        let protected: HashSet<String> = [commits[1].clone()].into_iter().collect();
        let purged = store.purge_duplicates(&protected).unwrap();
        assert_eq!(purged, 3);
        assert!(store.version_path(&commits[1]).exists());
        assert!(!store.version_path(&commits[0]).exists());
    }
}
