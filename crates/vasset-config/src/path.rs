//! Path helpers for configured locations.

use std::path::{Path, PathBuf};

/// Expand a leading `~` to the current user's home directory.
///
/// Paths without a leading `~`, and `~user` forms, are returned unchanged.
/// If the home directory cannot be determined the path is also unchanged.
pub fn expand_home(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

/// Check whether `path` lies under `dir` after lexical comparison.
pub fn is_within_directory(path: impl AsRef<Path>, dir: impl AsRef<Path>) -> bool {
    path.as_ref().starts_with(dir.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_home() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_home("~/.vasset/store.lmdb"), home.join(".vasset/store.lmdb"));
        assert_eq!(expand_home("~"), home);
    }

    #[test]
    fn test_expand_home_leaves_other_paths() {
        assert_eq!(expand_home("/srv/store"), PathBuf::from("/srv/store"));
        assert_eq!(expand_home("relative/~"), PathBuf::from("relative/~"));
        assert_eq!(expand_home("~other/x"), PathBuf::from("~other/x"));
    }

    #[test]
    fn test_is_within_directory() {
        assert!(is_within_directory("/cache/ab/abcd.wav", "/cache"));
        assert!(!is_within_directory("/cachex/ab", "/cache"));
    }
}
