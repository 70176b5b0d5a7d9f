use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::core::archive;
use crate::core::bundle::Bundle;
use crate::core::config::{JobConfig, StepSpec};
use crate::core::defaults;
use crate::core::error::{Error, Result};
use crate::core::ignore::ExclusionFilter;
use crate::core::paths;
use crate::core::stage;

/// Everything the assembler needs for one pipeline submission.
#[derive(Debug)]
pub struct PipelineSpec {
    pub steps: Vec<StepSpec>,
    pub config_path: PathBuf,
}

impl PipelineSpec {
    pub fn from_config(config: &JobConfig, config_path: &Path) -> Result<Self> {
        Ok(Self {
            steps: config.steps()?,
            config_path: config_path.to_path_buf(),
        })
    }
}

/// Assemble a multi-step pipeline bundle.
///
/// Layout inside the staging root:
///
/// ```text
/// <staging>/pipeline/<config base name>     byte-copy, never re-serialized
/// <staging>/pipeline/<step_id>/...          one dir per step with a project_dir
/// <staging>/pipeline.zip                    archive over the pipeline root
/// ```
///
/// Step ids are derived from each step's normalized `project_dir` base name
/// and must be unique; a collision aborts before anything touches the
/// filesystem. Each step directory is populated through that step's own
/// ignore patterns, then the step's entry script is force-copied in so it
/// is always present exactly once. The returned Bundle points at the
/// user's original config file, which is submitted verbatim.
pub fn assemble(spec: &PipelineSpec) -> Result<Bundle> {
    let mut seen: HashMap<String, String> = HashMap::new();
    let mut staged: Vec<(String, &str, &StepSpec)> = Vec::new();
    for step in &spec.steps {
        let Some(dir) = step.project_dir.as_deref() else {
            continue;
        };
        let id = step.step_id().ok_or_else(|| {
            Error::Config(format!("step project_dir '{dir}' has no usable directory name"))
        })?;
        if let Some(first) = seen.insert(id.clone(), dir.to_string()) {
            return Err(Error::StepCollision {
                step_id: id,
                first,
                second: dir.to_string(),
            });
        }
        staged.push((id, dir, step));
    }

    let config_name = spec
        .config_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            Error::Config(format!(
                "pipeline config path has no file name: {}",
                spec.config_path.display()
            ))
        })?;

    let staging = TempDir::new()?;
    let pipeline_root = staging.path().join(defaults::PIPELINE_DIR_NAME);
    fs::create_dir(&pipeline_root)?;
    fs::copy(&spec.config_path, pipeline_root.join(config_name))?;

    for (id, dir, step) in &staged {
        let source = paths::expand(dir)?;
        if !source.is_dir() {
            return Err(Error::Config(format!(
                "step project directory not found: {dir}"
            )));
        }

        let step_dir = pipeline_root.join(id);
        fs::create_dir_all(&step_dir)?;

        let mut patterns = step.ignore_patterns.clone();
        let entry = match step.entry_script.as_deref() {
            Some(entry) => {
                let base = Path::new(entry)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| {
                        Error::Config(format!("entry script '{entry}' has no file name"))
                    })?;
                patterns.push(base.to_string());
                Some((entry, base))
            }
            None => None,
        };

        let filter = ExclusionFilter::new(patterns);
        let stats = stage::filter_copy(&source, &step_dir, &filter)?;
        log_status!(
            "pipeline",
            "Staged step '{}' ({} files, {} skipped)",
            id,
            stats.files_copied,
            stats.files_skipped
        );

        // Entry scripts are always shipped, even when a blanket pattern
        // would have filtered them out.
        if let Some((entry, base)) = entry {
            fs::copy(source.join(entry), step_dir.join(base))?;
        }
    }

    let archive_path = staging.path().join(defaults::PIPELINE_ARCHIVE_NAME);
    let archive_stats = archive::build(&pipeline_root, &archive_path, &ExclusionFilter::default())?;
    log_status!(
        "pipeline",
        "Wrote {} ({} files, {} directories)",
        defaults::PIPELINE_ARCHIVE_NAME,
        archive_stats.files_added,
        archive_stats.dirs_added
    );

    Ok(Bundle::new(
        staging,
        archive_path,
        spec.config_path.clone(),
    ))
}
