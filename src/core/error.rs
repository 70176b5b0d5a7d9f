use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(
        "API token is missing from both the configuration file and the \
         CONVEYOR_API_TOKEN environment variable"
    )]
    MissingToken,

    #[error("Duplicate step directory '{step_id}': '{first}' and '{second}' stage into the same step directory")]
    StepCollision {
        step_id: String,
        first: String,
        second: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend error (HTTP {status}): {body}")]
    Backend { status: u16, body: String },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::MissingToken => "MISSING_TOKEN",
            Error::StepCollision { .. } => "STEP_COLLISION",
            Error::Io(_) => "IO_ERROR",
            Error::Yaml(_) => "YAML_ERROR",
            Error::Json(_) => "JSON_ERROR",
            Error::Zip(_) => "ARCHIVE_ERROR",
            Error::Http(_) => "HTTP_ERROR",
            Error::Backend { .. } => "BACKEND_ERROR",
            Error::Other(_) => "ERROR",
        }
    }

    /// True for errors raised by user-supplied configuration rather than by
    /// the filesystem or the backend.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::MissingToken | Error::StepCollision { .. } | Error::Yaml(_)
        )
    }

    /// True for errors raised at the HTTP boundary.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Backend { .. })
    }

    /// Process exit code: 2 configuration, 20 transport, 1 everything else.
    pub fn exit_code(&self) -> i32 {
        if self.is_configuration() {
            2
        } else if self.is_transport() {
            20
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_the_taxonomy() {
        assert_eq!(Error::MissingToken.exit_code(), 2);
        assert_eq!(Error::Config("bad".into()).exit_code(), 2);
        assert_eq!(
            Error::StepCollision {
                step_id: "proj".into(),
                first: "./a/proj".into(),
                second: "./b/proj".into(),
            }
            .exit_code(),
            2
        );
        assert_eq!(
            Error::Backend {
                status: 503,
                body: "unavailable".into(),
            }
            .exit_code(),
            20
        );
        assert_eq!(
            Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")).exit_code(),
            1
        );
    }

    #[test]
    fn codes_are_stable_strings() {
        assert_eq!(Error::MissingToken.code(), "MISSING_TOKEN");
        assert_eq!(Error::Config(String::new()).code(), "CONFIG_ERROR");
    }
}
