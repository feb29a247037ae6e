//! Configuration utility functions.

use std::path::{Path, PathBuf};

/// Find config file by searching upward from current directory
///
/// Starts from cwd and walks up parent directories until finding `config_name`
/// Returns the absolute path to the config file if found
///
/// # Example
/// ```text
/// /home/user/app/src/elements/  ← cwd
/// /home/user/app/kiln.toml      ← found!
/// ```
pub fn find_config_file(config_name: &Path) -> Option<PathBuf> {
    if config_name.is_absolute() {
        return config_name.exists().then(|| config_name.to_path_buf());
    }

    let cwd = std::env::current_dir().ok()?;
    find_config_from(&cwd, config_name)
}

/// Walk up from `start` looking for `config_name`.
fn find_config_from(start: &Path, config_name: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(config_name))
        .find(|candidate| candidate.exists())
}

// ============================================================================
// tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_config_in_parent() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("src/elements");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("kiln.toml"), "").unwrap();

        let found = find_config_from(&nested, Path::new("kiln.toml")).unwrap();
        assert_eq!(found, dir.path().join("kiln.toml"));
    }

    #[test]
    fn test_find_config_absolute_missing() {
        assert_eq!(find_config_file(Path::new("/definitely/not/kiln.toml")), None);
    }
}
