//! Shard tarball unpacking
//!
//! A shard is a tar holding `<YYMM>/<record>.gz` members. Each member is
//! either a gzipped single `.tex` file or a gzipped tar of a whole source
//! tree; which one is only known after decompressing.

use std::fs::{self, File};
use std::io::{self, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use texpile_core::fsutil::{force_remove_file, remove_empty_dirs};

use crate::document::DocumentStatus;
use crate::error::IngestError;
use crate::index::MetadataIndex;
use crate::manifest::period_token;
use crate::prune::{PruneStats, prune};
use crate::repair::Repairer;

/// Canonical extension of kept documents.
pub const DOC_EXTENSION: &str = "tex";

const TAR_BLOCK: usize = 512;

/// Which record stems of a shard belong to the target subject class.
#[derive(Debug, Clone, Copy)]
pub enum MembershipPolicy<'a> {
    /// Legacy shards name members after their subject (`math0601001`)
    Prefix(&'a str),
    /// Modern shards use bare ids, resolved against the metadata index
    Index(&'a MetadataIndex),
}

impl MembershipPolicy<'_> {
    pub fn admits(&self, stem: &str) -> bool {
        match self {
            Self::Prefix(prefix) => stem.starts_with(prefix),
            Self::Index(index) => index.contains(stem),
        }
    }
}

/// Counters for one shard.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UnpackStats {
    /// `.gz` members the policy admitted
    pub admitted: usize,
    /// `.gz` members deleted without decompressing
    pub rejected: usize,
    /// Admitted members that held a source tree
    pub trees: usize,
    /// Admitted members that held a single file
    pub single_files: usize,
    /// Admitted members that failed to decompress
    pub corrupt: usize,
    /// Documents repaired and kept
    pub documents: usize,
    /// Documents dropped by the repairer
    pub undecodable: usize,
    pub prune: PruneStats,
}

/// Result of [`unpack_shard`]: the period directory holding kept documents.
#[derive(Debug)]
pub struct UnpackedShard {
    pub dir: PathBuf,
    pub stats: UnpackStats,
}

/// Whether `header` is a valid tar header block (checksum verified).
pub fn looks_like_tar(header: &[u8]) -> bool {
    if header.len() < TAR_BLOCK {
        return false;
    }
    let field = &header[148..156];
    let digits: String = field
        .iter()
        .map(|&b| b as char)
        .filter(|c| !matches!(c, '\0' | ' '))
        .collect();
    let Ok(expected) = u32::from_str_radix(&digits, 8) else {
        return false;
    };
    let actual: u32 = header[..TAR_BLOCK]
        .iter()
        .enumerate()
        .map(|(i, &b)| if (148..156).contains(&i) { u32::from(b' ') } else { u32::from(b) })
        .sum();
    actual == expected
}

/// Extract one shard tarball under `work_dir` and reduce it to repaired
/// documents of the target class.
///
/// The tarball is deleted on success. Member failures are logged and
/// counted; only a broken outer tar or a missing period directory fails the
/// shard.
pub fn unpack_shard(
    tarball: &Path,
    work_dir: &Path,
    policy: MembershipPolicy<'_>,
    repairer: &Repairer,
) -> Result<UnpackedShard, IngestError> {
    let name = tarball
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let shard = name.strip_suffix(".tar").unwrap_or(&name).to_string();

    let token = period_token(&name)
        .ok_or_else(|| IngestError::unpack(&shard, "no period token in file name"))?;

    let file = File::open(tarball)?;
    tar::Archive::new(BufReader::new(file))
        .unpack(work_dir)
        .map_err(|e| IngestError::unpack(&shard, e.to_string()))?;

    let dir = work_dir.join(token);
    if !dir.is_dir() {
        return Err(IngestError::unpack(&shard, format!("no {token}/ directory in shard")));
    }

    let mut stats = UnpackStats::default();
    let entries = fs::read_dir(&dir)?.collect::<io::Result<Vec<_>>>()?;
    for entry in entries {
        let file_name = entry.file_name();
        let Some(member) = file_name.to_str() else {
            continue;
        };
        let Some(stem) = member.strip_suffix(".gz") else {
            continue;
        };
        if !entry.file_type()?.is_file() {
            continue;
        }

        let path = entry.path();
        if !policy.admits(stem) {
            force_remove_file(&path)?;
            stats.rejected += 1;
            continue;
        }

        stats.admitted += 1;
        match expand_member(&path, &dir, stem) {
            Ok(Member::Tree) => stats.trees += 1,
            Ok(Member::Single) => stats.single_files += 1,
            Err(e) => {
                log::warn!("{shard}: corrupt member {member}: {e}");
                stats.corrupt += 1;
                let tree = dir.join(stem);
                if tree.is_dir() {
                    fs::remove_dir_all(&tree)?;
                }
            }
        }
        if path.exists() {
            force_remove_file(&path)?;
        }
    }

    let keep = glob::Pattern::new(&format!("*.{DOC_EXTENSION}"))
        .map_err(|e| IngestError::unpack(&shard, e.to_string()))?;
    let (mut documents, mut undecodable) = (0, 0);
    stats.prune = prune(&dir, &keep, &mut |path| match repairer.repair_in_place(path) {
        DocumentStatus::Rejected(_) => undecodable += 1,
        _ => documents += 1,
    });
    stats.documents = documents;
    stats.undecodable = undecodable;
    remove_empty_dirs(&dir)?;
    force_remove_file(tarball)?;

    log::debug!(
        "{shard}: {} admitted ({} trees, {} files, {} corrupt), {} rejected, {} documents",
        stats.admitted,
        stats.trees,
        stats.single_files,
        stats.corrupt,
        stats.rejected,
        stats.documents
    );
    Ok(UnpackedShard { dir, stats })
}

enum Member {
    Tree,
    Single,
}

/// Decompress one admitted member next to it: a tar payload is unpacked into
/// `<dir>/<stem>/`, anything else becomes `<dir>/<stem>.tex`.
fn expand_member(path: &Path, dir: &Path, stem: &str) -> io::Result<Member> {
    let mut payload = Vec::new();
    GzDecoder::new(BufReader::new(File::open(path)?)).read_to_end(&mut payload)?;

    if looks_like_tar(&payload) {
        let tree = dir.join(stem);
        fs::create_dir_all(&tree)?;
        tar::Archive::new(Cursor::new(payload)).unpack(&tree)?;
        Ok(Member::Tree)
    } else {
        fs::write(dir.join(format!("{stem}.{DOC_EXTENSION}")), payload)?;
        Ok(Member::Single)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::TempDir;

    fn gz(bytes: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::fast());
        enc.write_all(bytes).unwrap();
        enc.finish().unwrap()
    }

    fn tar_of(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn write_shard(dir: &Path, name: &str, members: &[(&str, Vec<u8>)]) -> PathBuf {
        let files: Vec<(&str, &[u8])> = members.iter().map(|(n, d)| (*n, d.as_slice())).collect();
        let path = dir.join(name);
        fs::write(&path, tar_of(&files)).unwrap();
        path
    }

    #[test]
    fn tar_detection() {
        let tar = tar_of(&[("a.tex", b"hello")]);
        assert!(looks_like_tar(&tar));
        assert!(!looks_like_tar(b"\\documentclass{article}"));
        assert!(!looks_like_tar(&[b'x'; 1024]));
    }

    #[test]
    fn policies() {
        let index: MetadataIndex = ["0704.0001".to_string()].into_iter().collect();
        assert!(MembershipPolicy::Prefix("math").admits("math0601001"));
        assert!(!MembershipPolicy::Prefix("math").admits("hep-th0601001"));
        assert!(MembershipPolicy::Index(&index).admits("0704.0001"));
        assert!(!MembershipPolicy::Index(&index).admits("0704.0002"));
    }

    #[test]
    fn legacy_shard_keeps_prefixed_members() {
        let dir = TempDir::new().unwrap();
        let nested = tar_of(&[
            ("main.tex", b"\\begin{document}tree\\end{document}junk"),
            ("fig.eps", b"%!PS"),
        ]);
        let tarball = write_shard(
            dir.path(),
            "arXiv_src_0601_001.tar",
            &[
                ("0601/math0601001.gz", gz(b"single\\end{document}junk")),
                ("0601/math0601002.gz", gz(&nested)),
                ("0601/hep-th0601001.gz", gz(b"physics")),
                ("0601/math0601003.pdf", b"%PDF".to_vec()),
            ],
        );

        let repairer = Repairer::default();
        let out = unpack_shard(&tarball, dir.path(), MembershipPolicy::Prefix("math"), &repairer).unwrap();

        assert_eq!(out.dir, dir.path().join("0601"));
        assert_eq!(
            fs::read_to_string(out.dir.join("math0601001.tex")).unwrap(),
            "single\\end{document}"
        );
        assert_eq!(
            fs::read_to_string(out.dir.join("math0601002/main.tex")).unwrap(),
            "\\begin{document}tree\\end{document}"
        );
        assert!(!out.dir.join("math0601002/fig.eps").exists());
        assert!(!out.dir.join("hep-th0601001.gz").exists());
        assert!(!out.dir.join("math0601003.pdf").exists());
        assert!(!tarball.exists());

        assert_eq!(out.stats.admitted, 2);
        assert_eq!(out.stats.rejected, 1);
        assert_eq!(out.stats.trees, 1);
        assert_eq!(out.stats.single_files, 1);
        assert_eq!(out.stats.documents, 2);
    }

    #[test]
    fn modern_shard_keeps_only_indexed_members() {
        let dir = TempDir::new().unwrap();
        let tarball = write_shard(
            dir.path(),
            "arXiv_src_1001_003.tar",
            &[
                ("1001/X.gz", gz(b"kept")),
                ("1001/Y.gz", gz(b"dropped")),
                ("1001/math1001001.gz", gz(b"prefixed but unlisted")),
            ],
        );
        let index: MetadataIndex = ["X".to_string()].into_iter().collect();

        let out = unpack_shard(&tarball, dir.path(), MembershipPolicy::Index(&index), &Repairer::default())
            .unwrap();

        let mut names: Vec<String> = fs::read_dir(&out.dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["X.tex"]);
        assert_eq!(out.stats.admitted, 1);
        assert_eq!(out.stats.rejected, 2);
    }

    #[test]
    fn legacy_policy_ignores_the_index() {
        let index: MetadataIndex = ["0601.0001".to_string()].into_iter().collect();
        assert!(!index.contains("math0601999"));
        assert!(MembershipPolicy::Prefix("math").admits("math0601999"));
        assert!(!MembershipPolicy::Index(&index).admits("math0601999"));

        let dir = TempDir::new().unwrap();
        let tarball = write_shard(
            dir.path(),
            "arXiv_src_0605_001.tar",
            &[("0605/math0601999.gz", gz(b"unlisted legacy paper"))],
        );
        let out = unpack_shard(&tarball, dir.path(), MembershipPolicy::Prefix("math"), &Repairer::default())
            .unwrap();
        assert_eq!(
            fs::read_to_string(out.dir.join("math0601999.tex")).unwrap(),
            "unlisted legacy paper"
        );
    }

    #[test]
    fn corrupt_member_does_not_fail_shard() {
        let dir = TempDir::new().unwrap();
        let tarball = write_shard(
            dir.path(),
            "arXiv_src_0602_001.tar",
            &[
                ("0602/math0602001.gz", b"not gzip at all".to_vec()),
                ("0602/math0602002.gz", gz(b"fine")),
            ],
        );
        let out = unpack_shard(&tarball, dir.path(), MembershipPolicy::Prefix("math"), &Repairer::default())
            .unwrap();
        assert_eq!(out.stats.corrupt, 1);
        assert_eq!(out.stats.documents, 1);
        assert!(!out.dir.join("math0602001.gz").exists());
    }

    #[test]
    fn missing_period_dir_fails_shard() {
        let dir = TempDir::new().unwrap();
        let tarball = write_shard(dir.path(), "arXiv_src_0603_001.tar", &[("other/a.gz", gz(b"x"))]);
        let err = unpack_shard(&tarball, dir.path(), MembershipPolicy::Prefix("math"), &Repairer::default())
            .unwrap_err();
        assert!(matches!(err, IngestError::Unpack { .. }));
        assert!(err.to_string().contains("0603/"));
    }

    #[test]
    fn broken_outer_tar_fails_shard() {
        let dir = TempDir::new().unwrap();
        let tarball = dir.path().join("arXiv_src_0604_001.tar");
        fs::write(&tarball, vec![0xAB; 2048]).unwrap();
        let err = unpack_shard(&tarball, dir.path(), MembershipPolicy::Prefix("math"), &Repairer::default())
            .unwrap_err();
        assert!(!err.is_fatal());
    }
}
