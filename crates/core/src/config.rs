use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

/// Process-level configuration. Runtime credentials (help-desk, Slack) are
/// deliberately absent here - they live in the `configuration` table so the
/// admin can rotate them without a restart.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub admin: AdminConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

/// Pass-throughs for the admin-console collaborator. The Google OAuth pair
/// is required at startup; the daemon never uses it itself.
#[derive(Clone, Debug)]
pub struct AdminConfig {
    pub google_client_id: String,
    pub google_client_secret: SecretString,
    pub session_key: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub session_key: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://tagwatch.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            admin: AdminConfig {
                google_client_id: String::new(),
                google_client_secret: String::new().into(),
                session_key: None,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl AppConfig {
    /// Layering: defaults, then config file, then environment, then
    /// programmatic overrides; validated at the end.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("tagwatch.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(admin) = patch.admin {
            if let Some(client_id) = admin.google_client_id {
                self.admin.google_client_id = client_id;
            }
            if let Some(client_secret) = admin.google_client_secret {
                self.admin.google_client_secret = client_secret.into();
            }
            if let Some(session_key) = admin.session_key {
                self.admin.session_key = Some(session_key.into());
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TAGWATCH_DATABASE_URL") {
            self.database.url = value;
        } else if let Some(value) = read_env("DB_FILEPATH") {
            // Legacy alias carrying a bare filesystem path rather than a URL.
            self.database.url = if value.starts_with("sqlite:") {
                value
            } else {
                format!("sqlite://{value}")
            };
        }
        if let Some(value) = read_env("TAGWATCH_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_env("TAGWATCH_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("TAGWATCH_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("TAGWATCH_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TAGWATCH_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TAGWATCH_SERVER_PORT") {
            self.server.port = parse_env("TAGWATCH_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("TAGWATCH_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_env("TAGWATCH_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let client_id =
            read_env("TAGWATCH_GOOGLE_CLIENT_ID").or_else(|| read_env("GOOGLE_CLIENT_ID"));
        if let Some(value) = client_id {
            self.admin.google_client_id = value;
        }
        let client_secret =
            read_env("TAGWATCH_GOOGLE_CLIENT_SECRET").or_else(|| read_env("GOOGLE_CLIENT_SECRET"));
        if let Some(value) = client_secret {
            self.admin.google_client_secret = value.into();
        }
        let session_key = read_env("TAGWATCH_SESSION_KEY").or_else(|| read_env("SESSION_KEY"));
        if let Some(value) = session_key {
            self.admin.session_key = Some(value.into());
        }

        let log_level =
            read_env("TAGWATCH_LOGGING_LEVEL").or_else(|| read_env("TAGWATCH_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TAGWATCH_LOGGING_FORMAT").or_else(|| read_env("TAGWATCH_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(client_id) = overrides.google_client_id {
            self.admin.google_client_id = client_id;
        }
        if let Some(client_secret) = overrides.google_client_secret {
            self.admin.google_client_secret = client_secret.into();
        }
        if let Some(session_key) = overrides.session_key {
            self.admin.session_key = Some(session_key.into());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_admin(&self.admin)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

const DEFAULT_CONFIG_LOCATIONS: &[&str] = &["tagwatch.toml", "config/tagwatch.toml"];

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    match explicit_path {
        Some(path) => path.exists().then(|| path.to_path_buf()),
        None => DEFAULT_CONFIG_LOCATIONS.iter().map(PathBuf::from).find(|path| path.exists()),
    }
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

/// Replace `${VAR}` references in the raw config text with environment
/// values. Any referenced variable must be set; a `${` with no closing
/// brace is malformed.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);

        let expression = &rest[start + 2..];
        let Some(end) = expression.find('}') else {
            return Err(ConfigError::UnterminatedInterpolation);
        };

        let var = &expression[..end];
        let value = env::var(var)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: var.to_string() })?;
        output.push_str(&value);

        rest = &expression[end + 1..];
    }

    output.push_str(rest);
    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    if !(url == ":memory:" || url.starts_with("sqlite:")) {
        return Err(ConfigError::Validation(format!(
            "database.url `{url}` is not a sqlite URL (expected `sqlite://...` or `:memory:`)"
        )));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be at least 1".to_string(),
        ));
    }

    if !(1..=300).contains(&database.timeout_secs) {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be between 1 and 300 seconds".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_admin(admin: &AdminConfig) -> Result<(), ConfigError> {
    if admin.google_client_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "admin.google_client_id is required (set GOOGLE_CLIENT_ID)".to_string(),
        ));
    }

    if admin.google_client_secret.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "admin.google_client_secret is required (set GOOGLE_CLIENT_SECRET)".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

/// A set-but-blank variable reads as absent, matching the "missing or
/// empty" treatment the config gates apply to runtime keys.
fn read_env(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    admin: Option<AdminPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AdminPatch {
    google_client_id: Option<String>,
    google_client_secret: Option<String>,
    session_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    const ALL_VARS: &[&str] = &[
        "TAGWATCH_DATABASE_URL",
        "TAGWATCH_DATABASE_MAX_CONNECTIONS",
        "TAGWATCH_DATABASE_TIMEOUT_SECS",
        "TAGWATCH_SERVER_BIND_ADDRESS",
        "TAGWATCH_SERVER_PORT",
        "TAGWATCH_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "TAGWATCH_GOOGLE_CLIENT_ID",
        "TAGWATCH_GOOGLE_CLIENT_SECRET",
        "TAGWATCH_SESSION_KEY",
        "TAGWATCH_LOGGING_LEVEL",
        "TAGWATCH_LOGGING_FORMAT",
        "TAGWATCH_LOG_LEVEL",
        "TAGWATCH_LOG_FORMAT",
        "DB_FILEPATH",
        "GOOGLE_CLIENT_ID",
        "GOOGLE_CLIENT_SECRET",
        "SESSION_KEY",
    ];

    fn with_clean_env<R>(vars: &[(&str, &str)], run: impl FnOnce() -> R) -> R {
        let _guard = env_lock().lock().expect("env lock");
        let previous: Vec<(&str, Option<String>)> =
            ALL_VARS.iter().map(|key| (*key, env::var(key).ok())).collect();

        for key in ALL_VARS {
            env::remove_var(key);
        }
        for (key, value) in vars {
            env::set_var(key, value);
        }

        let result = run();

        for (key, value) in previous {
            match value {
                Some(value) => env::set_var(key, value),
                None => env::remove_var(key),
            }
        }
        result
    }

    fn google_env<'a>() -> Vec<(&'a str, &'a str)> {
        vec![("GOOGLE_CLIENT_ID", "client-id"), ("GOOGLE_CLIENT_SECRET", "client-secret")]
    }

    #[test]
    fn missing_google_credentials_fail_validation() {
        with_clean_env(&[], || {
            let error = AppConfig::load(LoadOptions::default()).err().expect("load must fail");
            assert!(matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("google_client_id")
            ));
        });
    }

    #[test]
    fn db_filepath_alias_becomes_sqlite_url() {
        with_clean_env(
            &[
                ("DB_FILEPATH", "/var/lib/tagwatch/tagwatch.db"),
                ("GOOGLE_CLIENT_ID", "client-id"),
                ("GOOGLE_CLIENT_SECRET", "client-secret"),
            ],
            || {
                let config = AppConfig::load(LoadOptions::default()).expect("config load");
                assert_eq!(config.database.url, "sqlite:///var/lib/tagwatch/tagwatch.db");
            },
        );
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        with_clean_env(
            &[
                ("GOOGLE_CLIENT_ID", "client-from-env"),
                ("GOOGLE_CLIENT_SECRET", "secret-from-env"),
            ],
            || {
                let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
                let path = dir.path().join("tagwatch.toml");
                fs::write(
                    &path,
                    r#"
[admin]
google_client_id = "${GOOGLE_CLIENT_ID}"
google_client_secret = "${GOOGLE_CLIENT_SECRET}"
"#,
                )
                .map_err(|err| err.to_string())?;

                let config = AppConfig::load(LoadOptions {
                    config_path: Some(path),
                    ..LoadOptions::default()
                })
                .map_err(|err| format!("config load failed: {err}"))?;

                if config.admin.google_client_id != "client-from-env" {
                    return Err("client id should come from interpolated env".to_string());
                }
                if config.admin.google_client_secret.expose_secret() != "secret-from-env" {
                    return Err("client secret should come from interpolated env".to_string());
                }
                Ok(())
            },
        )
    }

    #[test]
    fn unterminated_interpolation_is_rejected() -> Result<(), String> {
        with_clean_env(&google_env(), || {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("tagwatch.toml");
            fs::write(&path, "[logging]\nlevel = \"${TAGWATCH_LOG\"\n")
                .map_err(|err| err.to_string())?;

            let error =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .err()
                    .ok_or("load must fail")?;
            match error {
                ConfigError::UnterminatedInterpolation => Ok(()),
                other => Err(format!("unexpected error: {other}")),
            }
        })
    }

    #[test]
    fn precedence_overrides_beat_env_and_file() {
        let mut vars = google_env();
        vars.push(("TAGWATCH_DATABASE_URL", "sqlite://from-env.db"));
        with_clean_env(&vars, || {
            let config = AppConfig::load(LoadOptions {
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .expect("config load");

            assert_eq!(config.database.url, "sqlite://from-override.db");
            assert_eq!(config.logging.level, "debug");
        });
    }

    #[test]
    fn logging_env_aliases_are_supported() {
        let mut vars = google_env();
        vars.push(("TAGWATCH_LOG_LEVEL", "warn"));
        vars.push(("TAGWATCH_LOG_FORMAT", "pretty"));
        with_clean_env(&vars, || {
            let config = AppConfig::load(LoadOptions::default()).expect("config load");
            assert_eq!(config.logging.level, "warn");
            assert!(matches!(config.logging.format, LogFormat::Pretty));
        });
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() {
        let mut vars = google_env();
        vars.push(("SESSION_KEY", "session-secret-value"));
        with_clean_env(&vars, || {
            let config = AppConfig::load(LoadOptions::default()).expect("config load");
            let debug = format!("{config:?}");
            assert!(!debug.contains("client-secret"));
            assert!(!debug.contains("session-secret-value"));
        });
    }

    #[test]
    fn invalid_log_level_fails_validation() {
        let mut vars = google_env();
        vars.push(("TAGWATCH_LOG_LEVEL", "verbose"));
        with_clean_env(&vars, || {
            let error = AppConfig::load(LoadOptions::default()).err().expect("load must fail");
            assert!(matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("logging.level")
            ));
        });
    }
}
