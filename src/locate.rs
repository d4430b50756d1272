// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::path::{Path, PathBuf};

use nix::unistd::{access, AccessFlags};
use tracing::debug;

/// Returns the first candidate that is a regular file executable by this process
pub fn select_daemon<P: AsRef<Path>>(candidates: &[P]) -> Option<PathBuf> {
    for candidate in candidates {
        let path: &Path = candidate.as_ref();
        if is_executable(path) {
            return Some(path.to_path_buf());
        }
    }

    None
}

/// Symlinks are followed, directories are never executable here
pub fn is_executable(path: &Path) -> bool {
    if !path.is_file() {
        debug!("not a file: {}", path.display());
        return false;
    }

    match access(path, AccessFlags::X_OK) {
        Ok(()) => true,
        Err(e) => {
            debug!("not executable: {}: {}", path.display(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    fn touch(path: &Path, mode: u32) {
        fs::write(path, b"#!/bin/sh\n").unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
    }

    #[test]
    fn test_first_executable_wins() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        touch(&first, 0o755);
        touch(&second, 0o755);

        assert_eq!(select_daemon(&[&first, &second]), Some(first.clone()));
        assert_eq!(select_daemon(&[&second, &first]), Some(second));
    }

    #[test]
    fn test_skips_missing_and_non_executable() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let plain = dir.path().join("plain");
        let exe = dir.path().join("exe");
        touch(&plain, 0o644);
        touch(&exe, 0o700);

        assert_eq!(select_daemon(&[&missing, &plain, &exe]), Some(exe));
    }

    #[test]
    fn test_none_when_nothing_executable() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("plain");
        touch(&plain, 0o600);

        assert_eq!(select_daemon(&[dir.path().join("missing"), plain]), None);
        assert_eq!(select_daemon::<PathBuf>(&[]), None);
    }

    #[test]
    fn test_directory_is_not_a_daemon() {
        let dir = tempfile::tempdir().unwrap();

        assert!(!is_executable(dir.path()));
    }
}
