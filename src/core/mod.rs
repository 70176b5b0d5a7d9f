// Public modules
pub mod api;
pub mod archive;
pub mod bundle;
pub mod config;
pub mod defaults;
pub mod error;
pub mod ignore;
pub mod paths;
pub mod pipeline;
pub mod script;
pub mod stage;

// Re-export common types for convenience
pub use api::{ApiClient, JobSelector, LogStream};
pub use archive::ArchiveStats;
pub use bundle::Bundle;
pub use config::JobConfig;
pub use error::{Error, Result};
pub use ignore::ExclusionFilter;
pub use stage::FilterStats;
