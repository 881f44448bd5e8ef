//! Startup config loading: reads a TOML file into `velotrain_core::Config`,
//! applying the documented defaults for any key the file omits. `core`
//! itself never touches the filesystem — this is the one place that does.

use std::path::Path;

use velotrain_core::Config;

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("could not read config file {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("could not parse config file {path}: {source}")]
    Parse { path: String, source: toml::de::Error },
}

/// Loads `path` as TOML into a `Config`. When `path` does not exist, the
/// documented defaults are used as-is (a bare `velotrain-server` with no
/// `--config` is a valid, if minimal, deployment).
pub fn load(path: &Path) -> Result<Config, ConfigLoadError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigLoadError::Parse { path: path.display().to_string(), source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = load(Path::new("/nonexistent/velotrain.toml")).unwrap();
        assert_eq!(cfg.laplen, 250.0);
    }
}
