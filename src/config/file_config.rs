//! Configuration file discovery and persistence.
//!
//! # Configuration File Format
//!
//! ```toml
//! [crawl]
//! base_url = "https://www.semanticscholar.org"
//! max_pages = 20
//!
//! [session]
//! ready_timeout_ms = 10000
//! bypass_attempts = 1
//!
//! [retry]
//! max_attempts = 3
//!
//! [pacing]
//! page_delay_min_ms = 2000
//! page_delay_max_ms = 4000
//!
//! [output]
//! directory = "./out"
//!
//! [[selectors.title]]
//! locator = "h2[data-test-id='title'] a"
//! ```
//!
//! Every section is optional; omitted keys take their defaults.

use std::path::{Path, PathBuf};

use super::{Config, ConfigError};

/// File name looked up in the working directory and the user config directory
pub const CONFIG_FILE_NAME: &str = "research-harvester.toml";

/// Locate a configuration file.
///
/// Checks the working directory first, then `<config dir>/research-harvester/config.toml`.
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join("research-harvester").join("config.toml"))
        .filter(|path| path.is_file())
}

/// Write `config` as TOML, creating parent directories as needed
pub fn save_config(config: &Config, path: &Path) -> Result<(), ConfigError> {
    let content =
        toml::to_string_pretty(config).map_err(|e| ConfigError::Serialize(e.to_string()))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
    }

    std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_config, LogFormat};
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_config_file_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let toml_content = r##"
[crawl]
max_pages = 5
sort = "citations"

[session]
bypass_attempts = 2
challenge_markers = ["#blocked"]

[retry]
max_attempts = 4
backoff_multiplier = 1.5

[output]
directory = "/tmp/harvest"

[logging]
level = "debug"
format = "json"
"##;

        let mut file = File::create(&path).unwrap();
        file.write_all(toml_content.as_bytes()).unwrap();

        let config = load_config(Some(path.as_path())).unwrap();

        assert_eq!(config.crawl.max_pages, 5);
        assert_eq!(config.crawl.sort, "citations");
        assert_eq!(config.crawl.default_limit, 50);
        assert_eq!(config.session.bypass_attempts, 2);
        assert_eq!(config.session.challenge_markers, vec!["#blocked".to_string()]);
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.backoff_multiplier, 1.5);
        assert_eq!(config.output.directory, PathBuf::from("/tmp/harvest"));
        assert_eq!(config.output.papers_file, "papers.csv");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_config_file_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.crawl.max_pages = 3;
        config.pacing.author_delay_max_ms = 1_500;

        save_config(&config, &path).unwrap();

        let loaded = load_config(Some(path.as_path())).unwrap();
        assert_eq!(loaded.crawl.max_pages, 3);
        assert_eq!(loaded.pacing.author_delay_max_ms, 1_500);
        assert_eq!(loaded.selectors, config.selectors);
    }

    #[test]
    fn test_config_file_nonexistent() {
        let path = PathBuf::from("/nonexistent/config.toml");
        assert!(load_config(Some(path.as_path())).is_err());
    }

    #[test]
    fn test_config_file_invalid_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("invalid.toml");

        std::fs::write(&path, "invalid = toml = content").unwrap();

        assert!(load_config(Some(path.as_path())).is_err());
    }

    #[test]
    fn test_config_file_invalid_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        std::fs::write(&path, "[crawl]\nmax_pages = 0\n").unwrap();

        assert!(matches!(
            load_config(Some(path.as_path())),
            Err(ConfigError::Invalid(_))
        ));
    }
}
