use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_yml::{Mapping, Value};

use crate::core::defaults;
use crate::core::error::{Error, Result};
use crate::core::paths;

/// Parsed job or deployment configuration.
///
/// Wraps the YAML document whole: known keys are read and written through
/// accessors, everything else rides along untouched and re-serializes with
/// the document.
#[derive(Debug, Clone)]
pub struct JobConfig {
    doc: Mapping,
}

impl JobConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read config {}: {e}", path.display())))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_yml::from_str(text)?;
        match value {
            Value::Mapping(doc) => Ok(Self { doc }),
            _ => Err(Error::Config(
                "config root must be a YAML mapping".to_string(),
            )),
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yml::to_string(&self.doc)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.doc
            .get(Value::String(key.to_string()))
            .and_then(Value::as_str)
    }

    pub fn set_str(&mut self, key: &str, value: &str) {
        self.doc.insert(
            Value::String(key.to_string()),
            Value::String(value.to_string()),
        );
    }

    pub fn token(&self) -> Option<&str> {
        self.get_str(defaults::TOKEN_CONFIG_KEY)
            .filter(|t| !t.trim().is_empty())
    }

    pub fn set_token(&mut self, token: &str) {
        self.set_str(defaults::TOKEN_CONFIG_KEY, token);
    }

    pub fn entry_script(&self) -> Option<&str> {
        self.get_str("entry_script")
    }

    pub fn set_entry_script(&mut self, name: &str) {
        self.set_str("entry_script", name);
    }

    pub fn job_name(&self) -> Option<&str> {
        self.get_str("job_name").or_else(|| self.get_str("name"))
    }

    pub fn ignore_patterns(&self) -> Vec<String> {
        self.doc
            .get(Value::String("ignore_patterns".to_string()))
            .and_then(Value::as_sequence)
            .map(|seq| {
                seq.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Typed view over the `steps` sequence. Absent key means no steps.
    pub fn steps(&self) -> Result<Vec<StepSpec>> {
        match self.doc.get(Value::String("steps".to_string())) {
            Some(value) => Ok(serde_yml::from_value(value.clone())?),
            None => Ok(Vec::new()),
        }
    }
}

/// One step of a pipeline configuration. Only the keys the assembler needs
/// are modeled; the submitted config file is byte-copied, so anything else
/// in the YAML reaches the backend regardless.
#[derive(Debug, Clone, Deserialize)]
pub struct StepSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub project_dir: Option<String>,
    #[serde(default)]
    pub entry_script: Option<String>,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl StepSpec {
    /// Directory name this step stages into: the base name of the
    /// normalized `project_dir`. Steps without a project directory stage
    /// nothing and have no id.
    pub fn step_id(&self) -> Option<String> {
        self.project_dir.as_deref().and_then(paths::dir_name)
    }
}

/// Token from the config file, else the CONVEYOR_API_TOKEN environment
/// variable. Absence is a configuration error raised before any network
/// or filesystem work; there is no fallback credential.
pub fn resolve_token(config: &JobConfig) -> Result<String> {
    if let Some(token) = config.token() {
        return Ok(token.to_string());
    }
    env_token()
}

/// Environment-only variant for commands that operate on existing jobs and
/// pipelines without loading a config file.
pub fn env_token() -> Result<String> {
    match env::var(defaults::API_TOKEN_ENV) {
        Ok(token) if !token.trim().is_empty() => Ok(token),
        _ => Err(Error::MissingToken),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
job_name: train-model
docker_image: python:3.11
conveyor_api_token: tok-123
entry_script: main.py
ignore_patterns:
  - '*.log'
  - .git
gpu:
  type: a100
  count: 2
";

    #[test]
    fn reads_known_keys() {
        let config = JobConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.token(), Some("tok-123"));
        assert_eq!(config.entry_script(), Some("main.py"));
        assert_eq!(config.job_name(), Some("train-model"));
        assert_eq!(
            config.ignore_patterns(),
            vec!["*.log".to_string(), ".git".to_string()]
        );
    }

    #[test]
    fn unknown_keys_survive_reserialization() {
        let mut config = JobConfig::parse(SAMPLE).unwrap();
        config.set_entry_script("serve.py");
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("docker_image: python:3.11"));
        assert!(yaml.contains("type: a100"));
        assert!(yaml.contains("serve.py"));
        assert!(!yaml.contains("main.py"));
    }

    #[test]
    fn non_mapping_root_is_rejected() {
        let err = JobConfig::parse("- just\n- a\n- list\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn steps_deserialize_with_defaults() {
        let yaml = "\
steps:
  - name: fetch
    project_dir: ./steps/fetch
    entry_script: fetch.py
  - project_dir: ./steps/train/
    ignore_patterns: ['*.ckpt']
    dependencies: [fetch]
";
        let config = JobConfig::parse(yaml).unwrap();
        let steps = config.steps().unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].step_id(), Some("fetch".to_string()));
        assert!(steps[0].ignore_patterns.is_empty());
        assert_eq!(steps[1].step_id(), Some("train".to_string()));
        assert_eq!(steps[1].dependencies, vec!["fetch".to_string()]);
        assert!(steps[1].name.is_none());
    }

    #[test]
    fn missing_steps_key_means_no_steps() {
        let config = JobConfig::parse("job_name: solo\n").unwrap();
        assert!(config.steps().unwrap().is_empty());
    }

    #[test]
    fn config_token_wins_over_environment() {
        let config = JobConfig::parse("conveyor_api_token: from-file\n").unwrap();
        assert_eq!(resolve_token(&config).unwrap(), "from-file");
    }

    // Env manipulation stays inside one test to keep the suite parallel-safe.
    #[test]
    fn token_falls_back_to_environment_then_errors() {
        env::remove_var(defaults::API_TOKEN_ENV);
        let config = JobConfig::parse("job_name: solo\n").unwrap();
        assert!(matches!(
            resolve_token(&config).unwrap_err(),
            Error::MissingToken
        ));

        env::set_var(defaults::API_TOKEN_ENV, "from-env");
        assert_eq!(resolve_token(&config).unwrap(), "from-env");
        env::remove_var(defaults::API_TOKEN_ENV);

        let blank = JobConfig::parse("conveyor_api_token: ''\n").unwrap();
        assert!(matches!(
            resolve_token(&blank).unwrap_err(),
            Error::MissingToken
        ));
    }
}
