//! Per-environment registry settings.
//!
//! Settings are passed to [`crate::TypeRegistry::new`] by value; nothing in
//! this crate reads ambient global state.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::stamp::FileTimeout;

/// Settings consumed by a [`crate::TypeRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
	/// Name of the owning environment, used for error context and logs.
	pub environment: String,
	/// Seconds between stats of a watched file. Negative disables caching.
	pub file_timeout: i64,
	/// Command whose trimmed stdout becomes the registry version. Empty means
	/// the registry's creation time is used instead.
	pub config_version: String,
	/// Seconds the version command may run before it is killed.
	pub version_timeout: u64,
	/// Refuse to merge code into the top-level container class.
	pub freeze_main: bool,
}

impl Default for RegistryConfig {
	fn default() -> Self {
		Self {
			environment: "production".to_owned(),
			file_timeout: 15,
			config_version: String::new(),
			version_timeout: 30,
			freeze_main: false,
		}
	}
}

impl RegistryConfig {
	/// Parses settings from TOML text; absent keys keep their defaults.
	pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(text)?)
	}

	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		Self::from_toml(&text)
	}

	pub fn file_timeout(&self) -> FileTimeout {
		FileTimeout::from_secs(self.file_timeout)
	}

	pub fn version_timeout(&self) -> Duration {
		Duration::from_secs(self.version_timeout)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_document_uses_defaults() {
		assert_eq!(RegistryConfig::from_toml("").unwrap(), RegistryConfig::default());
	}

	#[test]
	fn parses_all_keys() {
		let config = RegistryConfig::from_toml(
			r#"
environment = "staging"
file_timeout = -1
config_version = "git rev-parse HEAD"
version_timeout = 5
freeze_main = true
"#,
		)
		.unwrap();

		assert_eq!(config.environment, "staging");
		assert_eq!(config.file_timeout(), FileTimeout::Disabled);
		assert_eq!(config.config_version, "git rev-parse HEAD");
		assert_eq!(config.version_timeout(), Duration::from_secs(5));
		assert!(config.freeze_main);
	}

	#[test]
	fn rejects_unknown_keys() {
		assert!(matches!(RegistryConfig::from_toml("filetimeout = 3"), Err(ConfigError::Parse(_))));
	}

	#[test]
	fn load_reports_missing_file() {
		let dir = tempfile::tempdir().expect("create tempdir");
		let err = RegistryConfig::load(&dir.path().join("absent.toml")).unwrap_err();
		assert!(matches!(err, ConfigError::Read { .. }));
	}

	#[test]
	fn load_reads_file() {
		let dir = tempfile::tempdir().expect("create tempdir");
		let path = dir.path().join("registry.toml");
		std::fs::write(&path, "file_timeout = 0\n").unwrap();
		assert_eq!(RegistryConfig::load(&path).unwrap().file_timeout(), FileTimeout::Every(Duration::ZERO));
	}
}
