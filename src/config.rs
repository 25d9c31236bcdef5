// src/config.rs

//! Configuration loading utilities.

use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::Config;

/// Load and validate the configuration file.
///
/// A missing file falls back to defaults with a warning; a file that is
/// present but unparseable or invalid is fatal, per the startup
/// contract.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        log::warn!("No configuration file at {path:?}, using defaults");
        let config = Config::default();
        config.validate()?;
        return Ok(config);
    }

    let config = Config::load(path)?;
    config.validate()?;
    Ok(config)
}

/// Write a default configuration file for a fresh installation.
pub fn write_default_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(AppError::config(format!(
            "{path:?} already exists (use --force to overwrite)"
        )));
    }

    let mut content = String::from(
        "# huizenzoeker configuration\n\
         #\n\
         # Fill in telegram.bot_token and telegram.chat_id to receive\n\
         # notifications; leave them empty to only record changes.\n\n",
    );
    content.push_str(&toml::to_string_pretty(&Config::default())?);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.general.scan_interval_minutes, 30);
    }

    #[test]
    fn test_load_invalid_file_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "not valid toml [[[").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_load_rejects_semantically_invalid_config() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[crawler]\nmax_concurrent = 0\n").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_write_default_round_trips() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");

        write_default_config(&path, false).unwrap();
        let config = load_config(&path).unwrap();
        assert!(config.sources["ooms"]);

        // Refuses to clobber without force
        assert!(write_default_config(&path, false).is_err());
        assert!(write_default_config(&path, true).is_ok());
    }
}
