use std::path::{Path, PathBuf};

use crate::core::error::Result;

/// Expand `~` and environment variables, then absolutize against the
/// current working directory. The path does not have to exist.
pub fn expand(input: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(input)
        .map_err(|e| crate::core::error::Error::Config(format!("cannot expand '{input}': {e}")))?;
    Ok(std::path::absolute(Path::new(expanded.as_ref()))?)
}

/// Final component of a path after normalization, the way
/// `basename(normpath(p))` reads a trailing-slash path.
///
/// `"./steps/train/"` and `"steps/train"` both yield `"train"`.
pub fn dir_name(input: &str) -> Option<String> {
    let trimmed = input.trim_end_matches(['/', '\\']);
    let path = Path::new(if trimmed.is_empty() { input } else { trimmed });
    path.components()
        .filter_map(|c| match c {
            std::path::Component::Normal(os) => os.to_str(),
            _ => None,
        })
        .next_back()
        .map(|s| s.to_string())
}
