use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Configuration for import and export sessions.
///
/// Normally stored at `.nodeset/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Versions", into = "Versions")]
pub struct Config {
    /// Directory used to cache imported nodesets.
    ///
    /// If unset, an in-memory cache is used and nothing persists between
    /// runs.
    pub cache_dir: Option<PathBuf>,

    /// Directories searched for nodesets that neither the inputs nor the
    /// cache provide.
    pub search_paths: Vec<PathBuf>,

    /// Opaque token scoping cached nodesets.
    pub tenant: Option<String>,

    /// Whether a document with the same revision as a known model may add
    /// nodes to it.
    pub allow_augment: bool,

    /// Whether importing only already-known models is an error, and a
    /// failed import rolls back newly cached models.
    pub fail_on_existing: bool,

    /// Whether exports are seeded with the standard alias set.
    pub standard_aliases: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: None,
            search_paths: Vec::new(),
            tenant: None,
            allow_augment: true,
            fail_on_existing: false,
            standard_aliases: default_standard_aliases(),
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the TOML content is
    /// invalid.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {e}"))?;
        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {e}"))
    }

    /// Saves the configuration to a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized to TOML or if
    /// the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content =
            toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize config: {e}"))?;
        std::fs::write(path, content).map_err(|e| format!("Failed to write config file: {e}"))
    }
}

const fn default_true() -> bool {
    true
}

const fn default_standard_aliases() -> bool {
    true
}

/// The serialized versions of the configuration.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum Versions {
    #[serde(rename = "1")]
    V1 {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_dir: Option<PathBuf>,

        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        search_paths: Vec<PathBuf>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        tenant: Option<String>,

        #[serde(default = "default_true")]
        allow_augment: bool,

        #[serde(default)]
        fail_on_existing: bool,

        #[serde(default = "default_standard_aliases")]
        standard_aliases: bool,
    },
}

impl From<Versions> for Config {
    fn from(versions: Versions) -> Self {
        match versions {
            Versions::V1 {
                cache_dir,
                search_paths,
                tenant,
                allow_augment,
                fail_on_existing,
                standard_aliases,
            } => Self {
                cache_dir,
                search_paths,
                tenant,
                allow_augment,
                fail_on_existing,
                standard_aliases,
            },
        }
    }
}

impl From<Config> for Versions {
    fn from(config: Config) -> Self {
        Self::V1 {
            cache_dir: config.cache_dir,
            search_paths: config.search_paths,
            tenant: config.tenant,
            allow_augment: config.allow_augment,
            fail_on_existing: config.fail_on_existing,
            standard_aliases: config.standard_aliases,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn load_reads_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            b"_version = \"1\"\ncache_dir = \"cache\"\nsearch_paths = [\"a\", \"b\"]\ntenant = \"acme\"\nallow_augment = false\nfail_on_existing = true\nstandard_aliases = false\n",
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.cache_dir, Some(PathBuf::from("cache")));
        assert_eq!(config.search_paths, [PathBuf::from("a"), PathBuf::from("b")]);
        assert_eq!(config.tenant.as_deref(), Some("acme"));
        assert!(!config.allow_augment);
        assert!(config.fail_on_existing);
        assert!(!config.standard_aliases);
    }

    #[test]
    fn load_missing_file_returns_error() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing.toml");

        let error = Config::load(&missing).unwrap_err();
        assert!(error.starts_with("Failed to read config file:"));
    }

    #[test]
    fn load_invalid_toml_returns_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"_version = \"1\"\nallow_augment = \"yes\"\n")
            .unwrap();

        let error = Config::load(file.path()).unwrap_err();
        assert!(error.starts_with("Failed to parse config file:"));
    }

    #[test]
    fn empty_file_returns_default() {
        let expected = Config::default();
        let actual: Config = toml::from_str(r#"_version = "1""#).unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn save_then_load_preserves_settings() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        let config = Config {
            cache_dir: Some(PathBuf::from("/var/cache/nodesets")),
            tenant: Some("acme".into()),
            ..Config::default()
        };

        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }
}
