//! Filesystem helpers for archive-extracted trees.
//!
//! Remote archives carry read-only members and odd names; these helpers make
//! deletion and rewriting robust against both.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Suffix for in-progress writes; stale ones are swept by [`cleanup_tmp_files`].
pub const TMP_SUFFIX: &str = "tmp";

/// Make `path` writable by its owner (rwxr-xr-x on unix).
pub fn relax_permissions(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
    }
    #[cfg(not(unix))]
    {
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_readonly(false);
        fs::set_permissions(path, perms)
    }
}

/// Delete a file even if it was extracted read-only.
pub fn force_remove_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            relax_permissions(path)?;
            fs::remove_file(path)
        }
        Err(e) => Err(e),
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(TMP_SUFFIX);
    path.with_file_name(name)
}

/// Replace `path` with `contents` via tmp file + rename.
///
/// Readers never observe a half-written file; a crash leaves either the old
/// contents or a stale `.tmp` sibling.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let tmp_path = tmp_path_for(path);
    if tmp_path.exists() {
        force_remove_file(&tmp_path)?;
    }
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_data()?;
    }
    if path.exists() {
        // rename over a read-only target fails on some platforms
        relax_permissions(path)?;
    }
    fs::rename(&tmp_path, path)
}

/// Remove stale .tmp files anywhere under `dir`. Returns the count removed.
pub fn cleanup_tmp_files(dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            removed += cleanup_tmp_files(&path)?;
        } else if path.extension().is_some_and(|ext| ext == TMP_SUFFIX) {
            log::warn!("Removing stale tmp file: {}", path.display());
            force_remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Remove every directory under `dir` (not `dir` itself) left empty.
///
/// Returns true when `dir` ended up empty.
pub fn remove_empty_dirs(dir: &Path) -> io::Result<bool> {
    let mut empty = true;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            let path = entry.path();
            if remove_empty_dirs(&path)? {
                fs::remove_dir(&path)?;
                continue;
            }
        }
        empty = false;
    }
    Ok(empty)
}

/// Move every entry of `src` into `dest`, replacing same-named entries.
///
/// Both directories must be on the same filesystem. Returns entries moved.
pub fn move_children(src: &Path, dest: &Path) -> io::Result<usize> {
    fs::create_dir_all(dest)?;
    let mut moved = 0;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if let Ok(meta) = fs::symlink_metadata(&target) {
            if meta.is_dir() {
                fs::remove_dir_all(&target)?;
            } else {
                force_remove_file(&target)?;
            }
        }
        fs::rename(entry.path(), &target)?;
        moved += 1;
    }
    Ok(moved)
}
