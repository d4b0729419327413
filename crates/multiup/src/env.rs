use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use home::home_dir;
use multiup_hosts::HostRegistry;
use multiup_upload::{EngineConfig, TokenStore};

/// Where multiup keeps its files.
///
/// Everything lives under one root, `~/.multiup` unless `MULTIUP_ROOT`
/// says otherwise:
///
/// ```text
/// <root>/multiup.toml   engine settings and credentials
/// <root>/hosts.toml     host descriptor overrides
/// <root>/tokens/        cached login tokens
/// ```
#[derive(Debug, Clone)]
pub struct MultiupEnv {
    root: PathBuf,
    config_file: PathBuf,
}

impl MultiupEnv {
    pub fn new(config_file: Option<&Path>) -> Result<Self> {
        let root = match env::var_os("MULTIUP_ROOT") {
            Some(root) => PathBuf::from(root),
            None => home_dir()
                .context("failed to locate the home directory")?
                .join(".multiup"),
        };
        Ok(Self::from_root(root, config_file))
    }

    pub fn from_root(root: impl Into<PathBuf>, config_file: Option<&Path>) -> Self {
        let root = root.into();
        let config_file = config_file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.join("multiup.toml"));
        Self { root, config_file }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn hosts_file(&self) -> PathBuf {
        self.root.join("hosts.toml")
    }

    pub fn tokens_dir(&self) -> PathBuf {
        self.root.join("tokens")
    }

    /// Defaults, then the config file, then `MULTIUP_*` variables.
    ///
    /// Nested keys use a double underscore:
    /// `MULTIUP_HOSTS__IMX__API_KEY=...`.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        self.figment()
            .merge(Env::prefixed("MULTIUP_").split("__"))
            .extract()
            .with_context(|| format!("invalid configuration in {}", self.config_file.display()))
    }

    fn figment(&self) -> Figment {
        Figment::from(Serialized::defaults(EngineConfig::default())).merge(Toml::file(&self.config_file))
    }

    pub fn registry(&self) -> Result<HostRegistry> {
        let registry = HostRegistry::load(Some(&self.hosts_file())).context("failed to load host descriptors")?;
        for rejected in registry.rejected() {
            tracing::warn!(error = %rejected, "host descriptor skipped");
        }
        Ok(registry)
    }

    pub fn token_store(&self) -> Result<TokenStore> {
        let dir = self.tokens_dir();
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {}", self.root.display()))?;
        TokenStore::open(&dir).with_context(|| format!("failed to open token store at {}", dir.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_file_layers_over_defaults() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(
            root.path().join("multiup.toml"),
            r#"
parallelism = 8
max_retries = 5

[hosts.imx]
api_key = "k"
max_connections = 1

[hosts.rapidgator]
username = "me"
password = "pw"
enabled = false
"#,
        )
        .unwrap();

        let env = MultiupEnv::from_root(root.path(), None);
        let config: EngineConfig = env.figment().extract().unwrap();
        assert_eq!(config.parallelism, 8);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.max_global_connections, EngineConfig::default().max_global_connections);
        assert_eq!(config.hosts["imx"].max_connections, Some(1));
        assert_eq!(config.hosts["imx"].api_key.as_ref().map(|k| k.expose()), Some("k"));
        assert!(config.hosts["imx"].enabled);
        assert!(!config.hosts["rapidgator"].enabled);
    }

    #[test]
    fn missing_config_file_means_defaults() {
        let root = tempfile::tempdir().unwrap();
        let env = MultiupEnv::from_root(root.path(), None);
        let config: EngineConfig = env.figment().extract().unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn paths_hang_off_the_root() {
        let env = MultiupEnv::from_root("/data/mu", Some(Path::new("/etc/multiup.toml")));
        assert_eq!(env.root(), Path::new("/data/mu"));
        assert_eq!(env.hosts_file(), PathBuf::from("/data/mu/hosts.toml"));
        assert_eq!(env.tokens_dir(), PathBuf::from("/data/mu/tokens"));
        assert_eq!(env.config_file, PathBuf::from("/etc/multiup.toml"));
    }

    #[test]
    fn registry_and_store_open_under_the_root() {
        let root = tempfile::tempdir().unwrap();
        let env = MultiupEnv::from_root(root.path().join("nested"), None);
        assert!(env.registry().unwrap().get("imx").is_ok());
        let store = env.token_store().unwrap();
        assert!(store.hosts().is_empty());
    }
}
