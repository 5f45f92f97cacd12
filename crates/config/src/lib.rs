//! Layered configuration.
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults,
//! 2. a config file (`.toml`, `.yaml`/`.yml` or `.json`, picked by extension),
//!    by default `config.toml` in the platform config directory,
//! 3. environment variables prefixed `DEXSPRITE_`, with `__` separating
//!    nested keys (`DEXSPRITE_DISCOVERY__MAX_DEPTH=20`).

pub mod error;
mod sections;

pub use crate::sections::{
    CacheConfig, DiscoveryConfig, EFFECTIVE_TYPES, ImagesConfig, NetworkOverride, PrefetchConfig, ProxyConfig,
    RemoteConfig,
};
use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::OptionExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const ENV_PREFIX: &str = "DEXSPRITE_";
pub const CONFIG_FILE: &str = "config.toml";
const DATABASE_FILE: &str = "variants.sqlite";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub remote: RemoteConfig,
    pub cache: CacheConfig,
    pub discovery: DiscoveryConfig,
    pub prefetch: PrefetchConfig,
    pub images: ImagesConfig,
    pub proxy: ProxyConfig,
}

impl Config {
    /// Load and validate.
    ///
    /// With `file = None` the default config file is used if it exists. An
    /// explicitly given file must exist.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let config: Self = Self::figment(file)?.extract().map_err(|e| ErrorKind::Load(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// The layered sources, without extracting. Useful for callers that want
    /// to merge more providers (e.g. CLI flags) on top.
    pub fn figment(file: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        let file = match file {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::MissingFile(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|path| path.is_file()),
        };
        if let Some(path) = file {
            debug!(path = %path.display(), "Loading config file");
            figment = match path.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => figment.merge(Toml::file_exact(&path)),
                Some("yaml" | "yml") => figment.merge(Yaml::file_exact(&path)),
                Some("json") => figment.merge(Json::file_exact(&path)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(path)),
            };
        }
        // `DEXSPRITE_CONFIG` names the file itself, it isn't a key.
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]).split("__")))
    }

    pub fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("dev", "dexsprite", "dexsprite")
    }

    /// `config.toml` in the platform config directory.
    pub fn default_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    pub fn validate(&self) -> Result<()> {
        let base = url::Url::parse(&self.remote.base_url)
            .map_err(|e| ErrorKind::Invalid(format!("remote.base_url {:?}: {e}", self.remote.base_url)))?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            exn::bail!(ErrorKind::Invalid("remote.base_url must be an http(s) directory URL".to_string()));
        }
        let extension = self.remote.extension.trim_start_matches('.');
        if extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
            exn::bail!(ErrorKind::Invalid("remote.extension must be alphanumeric".to_string()));
        }
        if self.remote.probe_timeout_ms == 0 || self.remote.request_timeout_ms == 0 {
            exn::bail!(ErrorKind::Invalid("remote timeouts must be greater than zero".to_string()));
        }
        if self.cache.ttl_secs == 0 {
            exn::bail!(ErrorKind::Invalid("cache.ttl_secs must be greater than zero".to_string()));
        }
        if self.discovery.max_depth == 0 {
            exn::bail!(ErrorKind::Invalid("discovery.max_depth must be greater than zero".to_string()));
        }
        if self.discovery.preview_depth > self.discovery.max_depth {
            exn::bail!(ErrorKind::Invalid("discovery.preview_depth cannot exceed discovery.max_depth".to_string()));
        }
        if let Some(network) = &self.prefetch.network {
            if !EFFECTIVE_TYPES.contains(&network.effective_type.as_str()) {
                exn::bail!(ErrorKind::Invalid(format!(
                    "prefetch.network.effective_type {:?} is not one of {}",
                    network.effective_type,
                    EFFECTIVE_TYPES.join(", ")
                )));
            }
            if !(network.downlink_mbps.is_finite() && network.downlink_mbps >= 0.0) {
                exn::bail!(ErrorKind::Invalid("prefetch.network.downlink_mbps must be a non-negative number".to_string()));
            }
        }
        if !self.proxy.api_path.starts_with('/') || !self.proxy.shell_path.starts_with('/') {
            exn::bail!(ErrorKind::Invalid("proxy paths must start with '/'".to_string()));
        }
        Ok(())
    }

    /// Configured database path, or the platform default.
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.cache.path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::project_dirs()
                .ok_or_raise(|| ErrorKind::NoProjectDirs)?
                .data_dir()
                .join(DATABASE_FILE)),
        }
    }

    /// Configured resource cache directory, or the platform default.
    pub fn images_dir(&self) -> Result<PathBuf> {
        match &self.images.dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::project_dirs()
                .ok_or_raise(|| ErrorKind::NoProjectDirs)?
                .cache_dir()
                .to_path_buf()),
        }
    }
}

impl RemoteConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn flush_window(&self) -> Duration {
        Duration::from_millis(self.flush_window_ms)
    }
}

impl PrefetchConfig {
    /// `None` when the periodic wake is disabled.
    pub fn wake_interval(&self) -> Option<Duration> {
        (self.wake_interval_secs > 0).then(|| Duration::from_secs(self.wake_interval_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.discovery.max_depth, 50);
        assert_eq!(config.remote.probe_timeout(), Duration::from_secs(3));
        assert_eq!(config.cache.ttl(), Duration::from_secs(86_400));
        assert_eq!(config.cache.flush_window(), Duration::from_millis(100));
        assert!(!config.discovery.retry_transient);
    }

    #[test]
    fn test_load_toml_and_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [remote]
                base_url = "https://cdn.example/sprites/"

                [discovery]
                max_depth = 10
                retry_transient = true
                "#,
            )?;
            jail.set_env("DEXSPRITE_DISCOVERY__MAX_DEPTH", "20");
            jail.set_env("DEXSPRITE_PREFETCH__NETWORK__EFFECTIVE_TYPE", "3g");
            jail.set_env("DEXSPRITE_CONFIG", "config.toml");
            let config = Config::load(Some(Path::new("config.toml"))).unwrap();
            assert_eq!(config.remote.base_url, "https://cdn.example/sprites/");
            // Environment wins over the file.
            assert_eq!(config.discovery.max_depth, 20);
            assert!(config.discovery.retry_transient);
            let network = config.prefetch.network.unwrap();
            assert_eq!(network.effective_type, "3g");
            assert!(!network.save_data);
            Ok(())
        });
    }

    #[test]
    fn test_load_yaml_and_json() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yaml", "cache:\n  ttl_secs: 60\n")?;
            jail.create_file("config.json", r#"{"proxy": {"api_path": "/api/variants"}}"#)?;
            let yaml = Config::load(Some(Path::new("config.yaml"))).unwrap();
            assert_eq!(yaml.cache.ttl_secs, 60);
            let json = Config::load(Some(Path::new("config.json"))).unwrap();
            assert_eq!(json.proxy.api_path, "/api/variants");
            Ok(())
        });
    }

    #[test]
    fn test_missing_and_unsupported_files() {
        Jail::expect_with(|jail| {
            let err = Config::load(Some(Path::new("nope.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::MissingFile(_)));
            jail.create_file("config.ini", "x=1")?;
            let err = Config::load(Some(Path::new("config.ini"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
            Ok(())
        });
    }

    #[test]
    fn test_unknown_keys_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[discovery]\nmax_dpeth = 3\n")?;
            let err = Config::load(Some(Path::new("config.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Load(_)));
            Ok(())
        });
    }

    #[rstest]
    #[case::zero_depth(|c: &mut Config| c.discovery.max_depth = 0)]
    #[case::zero_probe_timeout(|c: &mut Config| c.remote.probe_timeout_ms = 0)]
    #[case::bad_base_url(|c: &mut Config| c.remote.base_url = "not a url".into())]
    #[case::non_http_base_url(|c: &mut Config| c.remote.base_url = "data:text/plain,x".into())]
    #[case::bad_extension(|c: &mut Config| c.remote.extension = "p/ng".into())]
    #[case::zero_ttl(|c: &mut Config| c.cache.ttl_secs = 0)]
    #[case::preview_too_deep(|c: &mut Config| c.discovery.preview_depth = 51)]
    #[case::bad_effective_type(|c: &mut Config| c.prefetch.network = Some(NetworkOverride { effective_type: "5g".into(), ..Default::default() }))]
    #[case::negative_downlink(|c: &mut Config| c.prefetch.network = Some(NetworkOverride { downlink_mbps: -1.0, ..Default::default() }))]
    #[case::relative_api_path(|c: &mut Config| c.proxy.api_path = "variants".into())]
    fn test_validate_rejects(#[case] mutate: fn(&mut Config)) {
        let mut config = Config::default();
        mutate(&mut config);
        let err = config.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }

    #[test]
    fn test_explicit_paths_win() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.cache.path = Some(dir.path().join("db.sqlite"));
        config.images.dir = Some(dir.path().join("images"));
        assert_eq!(config.database_path().unwrap(), dir.path().join("db.sqlite"));
        assert_eq!(config.images_dir().unwrap(), dir.path().join("images"));
    }

    #[test]
    fn test_wake_interval() {
        let mut prefetch = PrefetchConfig::default();
        assert_eq!(prefetch.wake_interval(), Some(Duration::from_secs(60)));
        prefetch.wake_interval_secs = 0;
        assert_eq!(prefetch.wake_interval(), None);
    }
}
