//! Disk source: turns configured files and directories into a pipeline.

use std::path::PathBuf;

use anyhow::{Context, Result};
use jwalk::WalkDir;
use rustc_hash::FxHashSet;
use sugar_path::SugarPath;

use super::Pipeline;
use crate::debug;
use crate::file::VirtualFile;

const IGNORED_FILES: &[&str] = &[".DS_Store"];

/// A path found on disk, and whether it is a directory.
type Entry = (PathBuf, bool);

/// Read every file (and directory) under `entries` into a new pipeline.
///
/// Directories are walked recursively and emitted in sorted order as
/// placeholders without contents. Missing entries are skipped, while a
/// directory that cannot be walked fails the pipeline. A path reachable
/// through several entries is read once.
pub fn read_files(entries: Vec<PathBuf>) -> Pipeline {
    Pipeline::spawn_source(|out| async move {
        let found = tokio::task::spawn_blocking(move || collect_entries(&entries))
            .await
            .context("file walker panicked")??;

        for (path, is_dir) in found {
            let file = if is_dir {
                VirtualFile::directory(path)
            } else {
                let contents = tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?;
                VirtualFile::new(path, contents)
            };
            out.emit(file).await?;
        }
        Ok(())
    })
}

fn collect_entries(entries: &[PathBuf]) -> Result<Vec<Entry>> {
    let mut seen = FxHashSet::default();
    let mut found = Vec::new();

    for entry in entries {
        let walked: Vec<Entry> = if entry.is_file() {
            vec![(entry.normalize(), false)]
        } else if entry.is_dir() {
            let mut walked = Vec::new();
            for e in WalkDir::new(entry) {
                let e = e.with_context(|| format!("failed to walk {}", entry.display()))?;
                let name = e.file_name().to_str().unwrap_or_default();
                if !IGNORED_FILES.contains(&name) {
                    walked.push((e.path().normalize(), e.file_type().is_dir()));
                }
            }
            walked.sort();
            walked
        } else {
            debug!("source"; "skipping missing {}", entry.display());
            continue;
        };

        for (path, is_dir) in walked {
            if seen.insert(path.clone()) {
                found.push((path, is_dir));
            }
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_read_files_walks_and_dedups() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src/elements")).unwrap();
        std::fs::write(root.join("index.html"), "<p>i</p>").unwrap();
        std::fs::write(root.join("src/b.js"), "b()").unwrap();
        std::fs::write(root.join("src/elements/a.html"), "<p>a</p>").unwrap();
        std::fs::write(root.join("src/.DS_Store"), "").unwrap();

        let files = read_files(vec![
            root.join("src"),
            root.join("index.html"),
            root.join("src/b.js"),
            root.join("missing"),
        ])
        .collect()
        .await
        .unwrap();

        let files_only: Vec<_> = files
            .iter()
            .filter(|f| f.contents.is_some())
            .map(|f| f.path.strip_prefix(root).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            files_only,
            [
                PathBuf::from("src/b.js"),
                PathBuf::from("src/elements/a.html"),
                PathBuf::from("index.html"),
            ]
        );
        assert!(files
            .iter()
            .any(|f| f.contents.is_none() && f.path == root.join("src/elements")));

        let b = files.iter().find(|f| f.path == root.join("src/b.js")).unwrap();
        assert_eq!(b.text().unwrap(), Some("b()"));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_is_an_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let locked = dir.path().join("src/locked");
        std::fs::create_dir_all(&locked).unwrap();
        std::fs::write(locked.join("a.js"), "a()").unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

        // Privileged users read through the mode bits.
        let readable = std::fs::read_dir(&locked).is_ok();
        let result = collect_entries(&[dir.path().join("src")]);
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

        if !readable {
            let err = result.unwrap_err();
            assert!(format!("{err:#}").contains("failed to walk"));
        }
    }
}
