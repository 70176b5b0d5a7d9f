use std::fs;
use std::io;
use std::path::Path;

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::core::error::Result;
use crate::core::ignore::ExclusionFilter;

/// Counters from one [`build`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    pub files_added: usize,
    pub dirs_added: usize,
    pub entries_excluded: usize,
}

/// Zip `staging_root` into `archive_path` with deflate compression.
///
/// The filter is re-applied during the walk, and the archive's own absolute
/// path is always excluded by equality, so an archive written inside
/// `staging_root` never contains itself. Surviving directories get explicit
/// entries; unpacking reproduces the staged tree including empty directories.
/// Entry names are relative to `staging_root` with `/` separators.
pub fn build(
    staging_root: &Path,
    archive_path: &Path,
    filter: &ExclusionFilter,
) -> Result<ArchiveStats> {
    let mut filter = filter.clone();
    filter.exclude_file(&std::path::absolute(archive_path)?);

    let file = fs::File::create(archive_path)?;
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut stats = ArchiveStats::default();
    add_dir(&mut writer, staging_root, "", &filter, options, &mut stats)?;
    writer.finish()?;
    Ok(stats)
}

fn add_dir(
    writer: &mut ZipWriter<fs::File>,
    dir: &Path,
    rel_prefix: &str,
    filter: &ExclusionFilter,
    options: FileOptions,
    stats: &mut ArchiveStats,
) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        let rel = if rel_prefix.is_empty() {
            name.to_string()
        } else {
            format!("{rel_prefix}/{name}")
        };
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            if filter.matches(&rel) {
                stats.entries_excluded += 1;
                continue;
            }
            writer.add_directory(format!("{rel}/"), options)?;
            stats.dirs_added += 1;
            add_dir(writer, &path, &rel, filter, options, stats)?;
        } else {
            if filter.is_excluded_file(&std::path::absolute(&path)?) || filter.matches(&rel) {
                stats.entries_excluded += 1;
                continue;
            }
            if file_type.is_symlink() && !path.is_file() {
                continue;
            }
            writer.start_file(rel.as_str(), options)?;
            let mut reader = fs::File::open(&path)?;
            io::copy(&mut reader, writer)?;
            stats.files_added += 1;
        }
    }
    Ok(())
}

/// Extract a zip archive into `dest`, returning the number of files written.
///
/// Entries with unsafe names (absolute, or escaping `dest` via `..`) are
/// skipped rather than extracted.
pub fn unpack(archive_path: &Path, dest: &Path) -> Result<usize> {
    let file = fs::File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;
    fs::create_dir_all(dest)?;

    let mut extracted = 0;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let Some(rel) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            continue;
        };
        let target = dest.join(rel);
        if entry.is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = fs::File::create(&target)?;
            io::copy(&mut entry, &mut out)?;
            extracted += 1;
        }
    }
    Ok(extracted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, contents: &str) -> PathBuf {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    fn entry_names(archive_path: &Path) -> BTreeSet<String> {
        let mut archive = ZipArchive::new(fs::File::open(archive_path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn archive_never_contains_itself() {
        let stage = tempdir().unwrap();
        write(stage.path(), "main.py", "print('hi')");
        write(stage.path(), "data.csv", "a,b");
        let archive_path = stage.path().join("project.zip");

        let stats = build(stage.path(), &archive_path, &ExclusionFilter::default()).unwrap();

        let names = entry_names(&archive_path);
        assert!(names.contains("main.py"));
        assert!(names.contains("data.csv"));
        assert!(!names.contains("project.zip"));
        assert_eq!(stats.files_added, 2);
    }

    #[test]
    fn filter_applies_during_the_walk() {
        let stage = tempdir().unwrap();
        write(stage.path(), "main.py", "print('hi')");
        write(stage.path(), ".git/config", "[core]");
        write(stage.path(), "notes.log", "x");
        let archive_path = stage.path().join("out.zip");

        let filter = ExclusionFilter::new(vec![".git".to_string(), "*.log".to_string()]);
        build(stage.path(), &archive_path, &filter).unwrap();

        let names = entry_names(&archive_path);
        assert!(names.contains("main.py"));
        assert!(!names.iter().any(|n| n.starts_with(".git")));
        assert!(!names.contains("notes.log"));
    }

    #[test]
    fn entries_use_forward_slashes() {
        let stage = tempdir().unwrap();
        write(stage.path(), "src/deep/util.py", "pass");
        let archive_path = stage.path().join("out.zip");

        build(stage.path(), &archive_path, &ExclusionFilter::default()).unwrap();

        let names = entry_names(&archive_path);
        assert!(names.contains("src/"));
        assert!(names.contains("src/deep/"));
        assert!(names.contains("src/deep/util.py"));
    }

    #[test]
    fn round_trip_preserves_empty_directories() {
        let stage = tempdir().unwrap();
        write(stage.path(), "main.py", "print('hi')");
        fs::create_dir_all(stage.path().join("results")).unwrap();
        let archive_path = stage.path().join("out.zip");

        build(stage.path(), &archive_path, &ExclusionFilter::default()).unwrap();

        let out = tempdir().unwrap();
        let extracted = unpack(&archive_path, out.path()).unwrap();
        assert_eq!(extracted, 1);
        assert!(out.path().join("main.py").is_file());
        assert!(out.path().join("results").is_dir());
    }

    #[test]
    fn unpack_restores_contents() {
        let stage = tempdir().unwrap();
        write(stage.path(), "nested/data.bin", "payload");
        let archive_path = stage.path().join("out.zip");
        build(stage.path(), &archive_path, &ExclusionFilter::default()).unwrap();

        let out = tempdir().unwrap();
        unpack(&archive_path, out.path()).unwrap();
        let restored = fs::read(out.path().join("nested/data.bin")).unwrap();
        assert_eq!(restored, b"payload");
    }
}
