//! Recursive keep-pattern pruning of extracted trees

use std::fs;
use std::path::{Path, PathBuf};

use texpile_core::fsutil::force_remove_file;

/// Counters from one [`prune`] walk.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PruneStats {
    pub kept: usize,
    pub removed: usize,
    /// Entries renamed because their names were not UTF-8
    pub renamed: usize,
    /// Filesystem errors logged and skipped
    pub errors: usize,
}

impl std::ops::AddAssign for PruneStats {
    fn add_assign(&mut self, rhs: Self) {
        self.kept += rhs.kept;
        self.removed += rhs.removed;
        self.renamed += rhs.renamed;
        self.errors += rhs.errors;
    }
}

/// Walk `dir` depth-first, deleting every regular file whose name does not
/// match `keep` and handing every match to `on_keep`.
///
/// Symlinks are removed whatever their name. Directories are never deleted
/// here. Errors are logged and the walk continues.
pub fn prune(dir: &Path, keep: &glob::Pattern, on_keep: &mut dyn FnMut(&Path)) -> PruneStats {
    let mut stats = PruneStats::default();
    walk(dir, keep, on_keep, &mut stats);
    stats
}

fn walk(dir: &Path, keep: &glob::Pattern, on_keep: &mut dyn FnMut(&Path), stats: &mut PruneStats) {
    // Snapshot first: on_keep may rewrite files in this directory
    let entries: Vec<_> = match fs::read_dir(dir) {
        Ok(entries) => entries.collect(),
        Err(e) => {
            log::warn!("Cannot list {}: {e}", dir.display());
            stats.errors += 1;
            return;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Bad entry in {}: {e}", dir.display());
                stats.errors += 1;
                continue;
            }
        };
        let file_type = match entry.file_type() {
            Ok(t) => t,
            Err(e) => {
                log::warn!("Cannot stat {}: {e}", entry.path().display());
                stats.errors += 1;
                continue;
            }
        };

        let Some((path, name)) = utf8_entry(&entry, stats) else {
            continue;
        };

        if file_type.is_dir() {
            walk(&path, keep, on_keep, stats);
        } else if file_type.is_file() && keep.matches(&name) {
            on_keep(&path);
            stats.kept += 1;
        } else if let Err(e) = force_remove_file(&path) {
            log::warn!("Cannot remove {}: {e}", path.display());
            stats.errors += 1;
        } else {
            stats.removed += 1;
        }
    }
}

/// Path and name of `entry`, renaming it first if the name is not UTF-8.
fn utf8_entry(entry: &fs::DirEntry, stats: &mut PruneStats) -> Option<(PathBuf, String)> {
    let raw = entry.file_name();
    if let Some(name) = raw.to_str() {
        return Some((entry.path(), name.to_string()));
    }

    let name = raw.to_string_lossy().into_owned();
    let from = entry.path();
    let to = from.with_file_name(&name);
    match fs::rename(&from, &to) {
        Ok(()) => {
            log::debug!("Renamed non-UTF-8 entry to {}", to.display());
            stats.renamed += 1;
            Some((to, name))
        }
        Err(e) => {
            log::warn!("Cannot rename {}: {e}", from.display());
            stats.errors += 1;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tex() -> glob::Pattern {
        glob::Pattern::new("*.tex").unwrap()
    }

    #[test]
    fn keeps_matches_and_deletes_rest() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("rec/figs")).unwrap();
        fs::write(root.join("main.tex"), "a").unwrap();
        fs::write(root.join("rec/body.tex"), "b").unwrap();
        fs::write(root.join("rec/figs/plot.eps"), "c").unwrap();
        fs::write(root.join("rec/refs.bib"), "d").unwrap();

        let mut seen = Vec::new();
        let stats = prune(root, &tex(), &mut |p| seen.push(p.to_path_buf()));
        seen.sort();

        assert_eq!(seen, vec![root.join("main.tex"), root.join("rec/body.tex")]);
        assert_eq!(stats.kept, 2);
        assert_eq!(stats.removed, 2);
        assert!(!root.join("rec/refs.bib").exists());
        // directories survive, even when emptied
        assert!(root.join("rec/figs").is_dir());
    }

    #[test]
    fn suffix_must_be_exact() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.tex.bak"), "x").unwrap();
        fs::write(dir.path().join("b.TEX"), "x").unwrap();
        let stats = prune(dir.path(), &tex(), &mut |_| {});
        assert_eq!(stats.kept, 0);
        assert_eq!(stats.removed, 2);
    }

    #[cfg(unix)]
    #[test]
    fn removes_read_only_files() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fig.ps");
        fs::write(&path, "x").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o444)).unwrap();
        prune(dir.path(), &tex(), &mut |_| {});
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_removed() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("victim.tex"), "x").unwrap();
        std::os::unix::fs::symlink(outside.path().join("victim.tex"), dir.path().join("link.tex"))
            .unwrap();

        let mut called = false;
        prune(dir.path(), &tex(), &mut |_| called = true);
        assert!(!called);
        assert!(!dir.path().join("link.tex").exists());
        assert!(outside.path().join("victim.tex").exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn non_utf8_names_are_renamed() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;
        let dir = TempDir::new().unwrap();
        let name = OsStr::from_bytes(b"caf\xE9.tex");
        fs::write(dir.path().join(name), "x").unwrap();

        let mut seen = Vec::new();
        let stats = prune(dir.path(), &tex(), &mut |p| seen.push(p.to_path_buf()));
        assert_eq!(stats.renamed, 1);
        assert_eq!(seen, vec![dir.path().join("caf\u{FFFD}.tex")]);
    }

    #[test]
    fn rewrites_during_walk_are_not_visited() {
        let dir = TempDir::new().unwrap();
        for i in 0..64 {
            fs::write(dir.path().join(format!("{i:02}.tex")), "x").unwrap();
        }

        let mut seen = Vec::new();
        let stats = prune(dir.path(), &tex(), &mut |p| {
            texpile_core::fsutil::write_atomic(p, b"rewritten").unwrap();
            fs::write(p.with_extension("aux"), "side").unwrap();
            seen.push(p.to_path_buf());
        });

        assert_eq!(seen.len(), 64);
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 64);
        assert_eq!(stats.kept, 64);
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.removed, 0);
        // siblings created by the callback are outside the snapshot
        assert!(dir.path().join("00.aux").exists());
    }

    #[test]
    fn missing_dir_counts_an_error() {
        let dir = TempDir::new().unwrap();
        let stats = prune(&dir.path().join("nope"), &tex(), &mut |_| {});
        assert_eq!(stats.errors, 1);
    }
}
