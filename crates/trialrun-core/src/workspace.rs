//! Output workspace layout.
//!
//! Layout: `<root>/{formatted_data, model_predictions, allennlp_output, performance}`

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;

/// Subdirectory holding model input files.
pub const FORMATTED_DATA_DIR: &str = "formatted_data";
/// Subdirectory holding prediction files.
pub const PREDICTIONS_DIR: &str = "model_predictions";
/// Subdirectory holding raw runner console logs.
pub const RUN_LOGS_DIR: &str = "allennlp_output";
/// Subdirectory holding performance reports.
pub const PERFORMANCE_DIR: &str = "performance";

/// All fixed subdirectories, in creation order.
pub const SUBDIRS: [&str; 4] = [
    FORMATTED_DATA_DIR,
    PREDICTIONS_DIR,
    RUN_LOGS_DIR,
    PERFORMANCE_DIR,
];

/// A workspace root plus its four fixed sub-paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Wrap a root path without touching the filesystem.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn formatted_data_dir(&self) -> PathBuf {
        self.root.join(FORMATTED_DATA_DIR)
    }

    pub fn predictions_dir(&self) -> PathBuf {
        self.root.join(PREDICTIONS_DIR)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(RUN_LOGS_DIR)
    }

    pub fn performance_dir(&self) -> PathBuf {
        self.root.join(PERFORMANCE_DIR)
    }

    /// Path of the consolidated performance table for a prefix.
    pub fn report_path(&self, prefix: &str) -> PathBuf {
        self.performance_dir()
            .join(format!("{prefix}_model_performance.csv"))
    }

    /// Path of the batch manifest for a prefix.
    pub fn manifest_path(&self, prefix: &str) -> PathBuf {
        self.performance_dir()
            .join(format!("{prefix}_batch_manifest.json"))
    }
}

/// Create `root` and any missing fixed subdirectories.
///
/// Returns the workspace and whether `root` existed before the call.
/// Existing directories are left untouched; nothing is ever deleted.
pub fn ensure_workspace(root: impl AsRef<Path>) -> Result<(Workspace, bool)> {
    let root = root.as_ref();
    let existed = root.exists();
    if existed && !root.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("workspace root {} is not a directory", root.display()),
        )
        .into());
    }

    for sub in SUBDIRS {
        let dir = root.join(sub);
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "Creating workspace directory");
            fs::create_dir_all(&dir)?;
        }
    }

    Ok((Workspace::new(root), existed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subdir_names(root: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(root)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn fresh_root_gets_exactly_four_subdirs() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("ws");

        let (ws, existed) = ensure_workspace(&root).unwrap();

        assert!(!existed);
        assert_eq!(ws.root(), root.as_path());
        assert_eq!(
            subdir_names(&root),
            vec![
                "allennlp_output",
                "formatted_data",
                "model_predictions",
                "performance"
            ]
        );
    }

    #[test]
    fn existing_root_only_gains_missing_subdirs() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir(root.join(PREDICTIONS_DIR)).unwrap();
        fs::write(root.join(PREDICTIONS_DIR).join("keep.jsonl"), "{}").unwrap();

        let (_, existed) = ensure_workspace(root).unwrap();

        assert!(existed);
        assert_eq!(subdir_names(root).len(), 4);
        assert_eq!(
            fs::read_to_string(root.join(PREDICTIONS_DIR).join("keep.jsonl")).unwrap(),
            "{}"
        );
    }

    #[test]
    fn ensure_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("ws");
        let (_, first) = ensure_workspace(&root).unwrap();
        let (_, second) = ensure_workspace(&root).unwrap();
        assert!(!first);
        assert!(second);
        assert_eq!(subdir_names(&root).len(), 4);
    }

    #[test]
    fn root_that_is_a_file_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("not_a_dir");
        fs::write(&root, "x").unwrap();
        assert!(ensure_workspace(&root).is_err());
    }

    #[test]
    fn report_and_manifest_paths_are_prefixed() {
        let ws = Workspace::new("/tmp/ws");
        assert_eq!(
            ws.report_path("run1"),
            PathBuf::from("/tmp/ws/performance/run1_model_performance.csv")
        );
        assert_eq!(
            ws.manifest_path("run1"),
            PathBuf::from("/tmp/ws/performance/run1_batch_manifest.json")
        );
    }
}
