//! Loader for workspace configuration with YAML + environment overlays.
//!
//! Sources are merged in this order, later ones winning:
//! 1. built-in defaults (every section has them, so an empty document is valid);
//! 2. YAML files (`threadline.yaml` in the user config dir, then the working
//!    directory, then any explicit `--config` path) and inline YAML;
//! 3. environment variables prefixed `THREADLINE__`, with `__` between
//!    nesting levels, e.g. `THREADLINE__SERVER__PORT=8080`.
//!
//! After merging, `${VAR}` placeholders in any string value are expanded
//! from the process environment.
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use threadline_common::observability::LogFormat;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;
pub const ENV_PREFIX: &str = "THREADLINE";
pub const DEFAULT_FILE_NAME: &str = "threadline.yaml";
pub const DEFAULT_SOCIAL_BASE_URL: &str = "https://go-workshop-2zcpzmfnyq-de.a.run.app/";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Source(#[from] config::ConfigError),
    #[error("configuration does not match the schema: {0}")]
    Schema(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadlineConfig {
    pub server: ServerConfig,
    pub mongodb: MongoConfig,
    pub amqp: AmqpConfig,
    pub social: SocialConfig,
    pub worker: WorkerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 4231,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
    pub users_collection: String,
    pub hashtags_collection: String,
    pub timeout_secs: u64,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".into(),
            database: "go_workshop".into(),
            users_collection: "users".into(),
            hashtags_collection: "hashtags".into(),
            timeout_secs: 10,
        }
    }
}

impl MongoConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmqpConfig {
    pub uri: String,
    pub job_queue: String,
    pub result_queue: String,
}

impl Default for AmqpConfig {
    fn default() -> Self {
        Self {
            uri: "amqp://localhost:5672/%2f".into(),
            job_queue: "local:workshop:hashtag:job".into(),
            result_queue: "local:workshop:hashtag:result".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialConfig {
    pub base_url: String,
    pub page_size: u32,
    pub timeout_secs: u64,
    pub retries: usize,
    /// Sent as a bearer token when set.
    pub api_token: Option<String>,
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SOCIAL_BASE_URL.into(),
            page_size: 5,
            timeout_secs: 15,
            retries: 2,
            api_token: None,
        }
    }
}

impl SocialConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub concurrency: usize,
    /// `0` disables the per-job deadline.
    pub job_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            job_timeout_secs: 10,
        }
    }
}

impl WorkerConfig {
    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_secs > 0).then(|| Duration::from_secs(self.job_timeout_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub emit_stderr: bool,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            emit_stderr: true,
            filter: "info".into(),
            dir: None,
        }
    }
}

impl ThreadlineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "worker.concurrency must be at least 1".into(),
            ));
        }
        if self.social.page_size == 0 {
            return Err(ConfigError::Invalid(
                "social.page_size must be at least 1".into(),
            ));
        }
        let base = self.social.base_url.trim();
        match url::Url::parse(base) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => {}
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "social.base_url must be an http(s) URL, got {base:?}"
                )));
            }
        }
        for (key, value) in [
            ("mongodb.uri", &self.mongodb.uri),
            ("mongodb.database", &self.mongodb.database),
            ("amqp.uri", &self.amqp.uri),
            ("amqp.job_queue", &self.amqp.job_queue),
            ("amqp.result_queue", &self.amqp.result_queue),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{key} must not be empty")));
            }
        }
        Ok(())
    }

    /// YAML rendering with secrets masked, for `threadline config`.
    pub fn to_redacted_yaml(&self) -> Result<String, ConfigError> {
        let mut shown = self.clone();
        if shown.social.api_token.is_some() {
            shown.social.api_token = Some("***".into());
        }
        serde_yaml::to_string(&shown).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Candidate locations for an implicit config file, lowest precedence first.
pub fn default_file_locations() -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        out.push(dir.join("threadline").join(DEFAULT_FILE_NAME));
    }
    out.push(PathBuf::from(DEFAULT_FILE_NAME));
    out
}

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct ThreadlineConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
    env_prefix: String,
}

impl Default for ThreadlineConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadlineConfigLoader {
    /// Defaults plus `THREADLINE__` env overrides; add files as needed.
    ///
    /// ```
    /// use threadline_config::ThreadlineConfigLoader;
    ///
    /// let config = ThreadlineConfigLoader::new()
    ///     .with_yaml_str("server:\n  port: 8080")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.server.port, 8080);
    /// assert_eq!(config.worker.concurrency, 8);
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
            env_prefix: ENV_PREFIX.into(),
        }
    }

    /// Use a different environment prefix (tests isolate themselves this way).
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Attach a file that must exist; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that is merged only when present.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    pub fn with_default_files(self) -> Self {
        default_file_locations()
            .into_iter()
            .fold(self, |loader, path| loader.with_optional_file(path))
    }

    /// Allow tests/CLI to merge inline YAML snippets.
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, FileFormat::Yaml));
        self
    }

    /// Merge all sources, expand `${VAR}` placeholders, then deserialize and
    /// validate.
    ///
    /// ```
    /// use threadline_config::ThreadlineConfigLoader;
    ///
    /// unsafe { std::env::set_var("DOC_MONGO_HOST", "db.internal"); }
    ///
    /// let config = ThreadlineConfigLoader::new()
    ///     .with_yaml_str(r#"
    /// mongodb:
    ///   uri: "mongodb://${DOC_MONGO_HOST}:27017"
    /// "#)
    ///     .load()
    ///     .expect("valid configuration");
    ///
    /// assert_eq!(config.mongodb.uri, "mongodb://db.internal:27017");
    /// assert_eq!(config.mongodb.database, "go_workshop");
    ///
    /// unsafe { std::env::remove_var("DOC_MONGO_HOST"); }
    /// ```
    pub fn load(self) -> Result<ThreadlineConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: ThreadlineConfig = serde_json::from_value(v)?;
        typed.validate()?;
        Ok(typed)
    }
}
