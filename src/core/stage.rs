use std::fs;
use std::io;
use std::path::Path;

use crate::core::error::Result;
use crate::core::ignore::ExclusionFilter;

/// Counters from one [`filter_copy`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub files_copied: usize,
    pub files_skipped: usize,
    pub dirs_pruned: usize,
}

/// Copy `source` into `dest`, dropping everything the filter excludes.
///
/// Pre-order walk: a directory whose relative path matches is pruned whole,
/// nothing below it is visited. Files are copied content-only; the copies
/// get fresh default permissions. `dest` is created if missing.
///
/// A pattern matching the source root's own base name suppresses the root's
/// contents while leaving `dest` itself in place.
pub fn filter_copy(source: &Path, dest: &Path, filter: &ExclusionFilter) -> Result<FilterStats> {
    let mut stats = FilterStats::default();
    fs::create_dir_all(dest)?;

    if let Some(name) = source.file_name().and_then(|n| n.to_str()) {
        if filter.matches(name) {
            stats.dirs_pruned += 1;
            return Ok(stats);
        }
    }

    copy_tree(source, dest, "", filter, &mut stats)?;
    Ok(stats)
}

fn copy_tree(
    dir: &Path,
    dest: &Path,
    rel_prefix: &str,
    filter: &ExclusionFilter,
    stats: &mut FilterStats,
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
                stats.dirs_pruned += 1;
                continue;
            }
            let target = dest.join(name);
            fs::create_dir_all(&target)?;
            copy_tree(&path, &target, &rel, filter, stats)?;
        } else {
            // Directory and dangling symlinks are dropped; file symlinks are
            // followed and copied as plain content.
            if file_type.is_symlink() && !path.is_file() {
                continue;
            }
            if filter.matches(&rel) {
                stats.files_skipped += 1;
                continue;
            }
            copy_contents(&path, &dest.join(name))?;
            stats.files_copied += 1;
        }
    }
    Ok(())
}

fn copy_contents(from: &Path, to: &Path) -> Result<()> {
    let mut reader = fs::File::open(from)?;
    let mut writer = fs::File::create(to)?;
    io::copy(&mut reader, &mut writer)?;
    Ok(())
}
