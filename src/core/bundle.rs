use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::core::archive;
use crate::core::config::JobConfig;
use crate::core::defaults;
use crate::core::error::{Error, Result};
use crate::core::ignore::ExclusionFilter;
use crate::core::script;
use crate::core::stage;

/// A fully staged submission: the archive plus the config file that goes
/// with it. Job bundles keep both inside the staging root; pipeline bundles
/// point `config_path` at the user's original file, submitted verbatim.
///
/// The staging directory (and everything in it, the archive included) is
/// removed when the Bundle drops, on success and on every failure path.
/// Callers must upload before letting the Bundle go out of scope.
#[derive(Debug)]
pub struct Bundle {
    staging: TempDir,
    pub archive_path: PathBuf,
    pub config_path: PathBuf,
}

impl Bundle {
    pub(crate) fn new(staging: TempDir, archive_path: PathBuf, config_path: PathBuf) -> Self {
        Self {
            staging,
            archive_path,
            config_path,
        }
    }

    pub fn staging_path(&self) -> &Path {
        self.staging.path()
    }
}

/// Stage a single-step project for submission.
///
/// Inside a fresh staging root: the entry script (if any) is copied in with
/// its remote-execution decorators stripped and its base name recorded in
/// the config; the mutated config is written as `config.yaml`; the project
/// tree is copied through the exclusion filter; and the whole root is
/// zipped into `project.zip`.
///
/// The filter is the user's ignore patterns plus `extra_ignore` plus the
/// staged file names, so nothing is included twice and the staged config
/// is never clobbered by a project file of the same name.
pub fn stage_project(
    project_dir: &Path,
    entry_script: Option<&Path>,
    config: &mut JobConfig,
    extra_ignore: &[String],
) -> Result<Bundle> {
    if !project_dir.is_dir() {
        return Err(Error::Config(format!(
            "project directory not found: {}",
            project_dir.display()
        )));
    }

    let staging = TempDir::new()?;
    let staging_path = staging.path();

    let mut patterns = config.ignore_patterns();
    patterns.extend_from_slice(extra_ignore);

    if let Some(script_path) = entry_script {
        let base = script_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::Config(format!(
                    "entry script has no file name: {}",
                    script_path.display()
                ))
            })?;
        let source = fs::read_to_string(script_path)?;
        fs::write(staging_path.join(base), script::strip_decorators(&source))?;
        config.set_entry_script(base);
        patterns.push(base.to_string());
    }

    let config_path = staging_path.join(defaults::CONFIG_FILE_NAME);
    config.save(&config_path)?;
    patterns.push(defaults::CONFIG_FILE_NAME.to_string());

    let filter = ExclusionFilter::new(patterns);
    log_status!(
        "bundle",
        "Staging {} into {}",
        project_dir.display(),
        staging_path.display()
    );
    let stats = stage::filter_copy(project_dir, staging_path, &filter)?;
    log_status!(
        "bundle",
        "Copied {} files ({} skipped, {} directories pruned)",
        stats.files_copied,
        stats.files_skipped,
        stats.dirs_pruned
    );

    // The copy pass above already applied every ignore rule; re-applying
    // them here would drop the force-staged entry script and config from
    // the archive. Only the archive itself is excluded.
    let archive_path = staging_path.join(defaults::PROJECT_ARCHIVE_NAME);
    let mut archive_filter = ExclusionFilter::default();
    archive_filter.add_pattern(defaults::PROJECT_ARCHIVE_NAME);
    let archive_stats = archive::build(staging_path, &archive_path, &archive_filter)?;
    log_status!(
        "bundle",
        "Wrote {} ({} files, {} directories)",
        defaults::PROJECT_ARCHIVE_NAME,
        archive_stats.files_added,
        archive_stats.dirs_added
    );

    Ok(Bundle::new(staging, archive_path, config_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::tempdir;
    use zip::ZipArchive;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
    }

    fn entry_names(archive_path: &Path) -> BTreeSet<String> {
        let mut archive = ZipArchive::new(fs::File::open(archive_path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn stages_config_entry_script_and_project() {
        let project = tempdir().unwrap();
        write(project.path(), "main.py", "@conveyor.job(gpu=1)\ndef main():\n    pass\n");
        write(project.path(), "data.csv", "a,b");
        write(project.path(), "scratch.log", "noise");

        let mut config = JobConfig::parse("job_name: demo\nignore_patterns: ['*.log']\n").unwrap();
        let entry = project.path().join("main.py");
        let bundle = stage_project(project.path(), Some(&entry), &mut config, &[]).unwrap();

        assert_eq!(config.entry_script(), Some("main.py"));

        let staged_script = fs::read_to_string(bundle.staging_path().join("main.py")).unwrap();
        assert!(!staged_script.contains("@conveyor"));
        assert!(staged_script.contains("def main():"));

        let staged_config = fs::read_to_string(&bundle.config_path).unwrap();
        assert!(staged_config.contains("entry_script: main.py"));

        let names = entry_names(&bundle.archive_path);
        assert!(names.contains("main.py"));
        assert!(names.contains("data.csv"));
        assert!(names.contains("config.yaml"));
        assert!(!names.contains("scratch.log"));
        assert!(!names.contains("project.zip"));
    }

    #[test]
    fn entry_script_appears_exactly_once() {
        let project = tempdir().unwrap();
        write(project.path(), "main.py", "print('hi')\n");

        let mut config = JobConfig::parse("job_name: demo\n").unwrap();
        let entry = project.path().join("main.py");
        let bundle = stage_project(project.path(), Some(&entry), &mut config, &[]).unwrap();

        let mut archive =
            ZipArchive::new(fs::File::open(&bundle.archive_path).unwrap()).unwrap();
        let count = (0..archive.len())
            .filter(|i| archive.by_index(*i).unwrap().name() == "main.py")
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn staged_config_is_not_clobbered_by_project_copy() {
        let project = tempdir().unwrap();
        write(project.path(), "config.yaml", "job_name: stale\n");
        write(project.path(), "run.py", "pass\n");

        let mut config = JobConfig::parse("job_name: fresh\n").unwrap();
        config.set_token("tok-1");
        let bundle = stage_project(project.path(), None, &mut config, &[]).unwrap();

        let staged = fs::read_to_string(&bundle.config_path).unwrap();
        assert!(staged.contains("job_name: fresh"));
        assert!(staged.contains("tok-1"));
    }

    #[test]
    fn extra_ignore_skips_the_original_config_file() {
        let project = tempdir().unwrap();
        write(project.path(), "job.yaml", "job_name: demo\n");
        write(project.path(), "run.py", "pass\n");

        let mut config = JobConfig::parse("job_name: demo\n").unwrap();
        let bundle =
            stage_project(project.path(), None, &mut config, &["job.yaml".to_string()]).unwrap();

        let names = entry_names(&bundle.archive_path);
        assert!(names.contains("run.py"));
        assert!(names.contains("config.yaml"));
        assert!(!names.contains("job.yaml"));
    }

    #[test]
    fn missing_project_dir_is_a_config_error() {
        let mut config = JobConfig::parse("job_name: demo\n").unwrap();
        let err = stage_project(Path::new("/no/such/dir"), None, &mut config, &[]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn staging_root_is_removed_on_drop() {
        let project = tempdir().unwrap();
        write(project.path(), "run.py", "pass\n");

        let mut config = JobConfig::parse("job_name: demo\n").unwrap();
        let bundle = stage_project(project.path(), None, &mut config, &[]).unwrap();
        let staging_path = bundle.staging_path().to_path_buf();
        assert!(staging_path.exists());

        drop(bundle);
        assert!(!staging_path.exists());
    }
}
