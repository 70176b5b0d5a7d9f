use std::path::{Path, PathBuf};

use glob_match::glob_match;

/// Shell-style glob test (`*`, `?`, character classes).
///
/// Malformed patterns never error, they simply match nothing.
pub fn matches_pattern(path: &str, pattern: &str) -> bool {
    glob_match(pattern, path)
}

/// Exclusion rules applied while staging a project tree and while writing
/// an archive. Both stages consume this one type, so glob semantics cannot
/// diverge between them.
///
/// A path is excluded when ANY pattern matches either its full relative path
/// or its base name alone. `*` does not cross `/`, so the base-name check is
/// what makes `*.log` exclude `logs/app.log`.
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    patterns: Vec<String>,
    excluded_file: Option<PathBuf>,
}

impl ExclusionFilter {
    pub fn new(patterns: Vec<String>) -> Self {
        Self {
            patterns,
            excluded_file: None,
        }
    }

    pub fn add_pattern(&mut self, pattern: impl Into<String>) {
        self.patterns.push(pattern.into());
    }

    /// Exclude one file by path equality rather than by pattern. Used for
    /// the archive's own output path. Callers pass an absolute path.
    pub fn exclude_file(&mut self, path: &Path) {
        self.excluded_file = Some(path.to_path_buf());
    }

    /// True if any pattern matches the relative path or its base name.
    pub fn matches(&self, rel_path: &str) -> bool {
        let base = rel_path.rsplit('/').next().unwrap_or(rel_path);
        self.patterns
            .iter()
            .any(|pattern| glob_match(pattern, rel_path) || glob_match(pattern, base))
    }

    /// True if `abs_path` is the file registered via [`exclude_file`].
    ///
    /// [`exclude_file`]: ExclusionFilter::exclude_file
    pub fn is_excluded_file(&self, abs_path: &Path) -> bool {
        self.excluded_file.as_deref() == Some(abs_path)
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_simple_globs() {
        assert!(matches_pattern("main.py", "*.py"));
        assert!(matches_pattern("data.csv", "data.?sv"));
        assert!(!matches_pattern("main.py", "*.rs"));
    }

    #[test]
    fn malformed_pattern_matches_nothing() {
        assert!(!matches_pattern("data.csv", "["));
        assert!(!matches_pattern("data.csv", "[a-"));
    }

    #[test]
    fn filter_matches_full_path_or_base_name() {
        let filter = ExclusionFilter::new(vec!["*.log".to_string(), ".git".to_string()]);
        assert!(filter.matches("app.log"));
        assert!(filter.matches("logs/app.log"));
        assert!(filter.matches(".git"));
        assert!(filter.matches("vendor/.git"));
        assert!(!filter.matches("src/main.py"));
    }

    #[test]
    fn filter_matches_path_scoped_patterns() {
        let filter = ExclusionFilter::new(vec!["build/*".to_string()]);
        assert!(filter.matches("build/out.bin"));
        assert!(!filter.matches("src/build.py"));
    }

    #[test]
    fn excluded_file_is_matched_by_equality_only() {
        let mut filter = ExclusionFilter::new(Vec::new());
        filter.exclude_file(Path::new("/stage/project.zip"));
        assert!(filter.is_excluded_file(Path::new("/stage/project.zip")));
        assert!(!filter.is_excluded_file(Path::new("/stage/other.zip")));
        assert!(!filter.matches("project.zip"));
    }

    #[test]
    fn empty_filter_excludes_nothing() {
        let filter = ExclusionFilter::default();
        assert!(!filter.matches("anything"));
        assert!(!filter.is_excluded_file(Path::new("/x")));
    }
}
